//! Host-side VM handle (C5): the high-level lifecycle the pool drives,
//! wrapping `firecracker-sdk`'s low-level API client plus the host-guest
//! vsock channel. [`VmLifecycle`] is the trait the pool is generic over, so
//! its race/timeout invariants can be tested against a fake implementation
//! without booting real microVMs.

use crate::config::Settings;
use crate::network::subnet_for_id;
use async_trait::async_trait;
use firecracker_sdk::FirecrackerBuilder;
use firecracker_sdk::dto::{
    BootSource, Drive, MachineConfiguration, NetworkInterface, Vsock as VsockDto,
};
use firecracker_sdk::firecracker::Firecracker;
use shared::dto::{BootAck, ConfigurationPayload, InvocationReply, ProgramContent, RunCodePayload, Scope, VmHash};
use shared::framing::{read_length_prefixed, write_length_prefixed};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("vm startup failed: {0}")]
    StartupFailed(String),
    #[error("vm invocation failed: {0}")]
    InvokeFailed(String),
    #[error(transparent)]
    Firecracker(#[from] firecracker_sdk::firecracker::Error),
    #[error(transparent)]
    Framing(#[from] shared::framing::FramingError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The operations the pool drives against a VM. Generic implementations let
/// `VmPool<V: VmLifecycle>` be exercised in tests against a fake that records
/// calls instead of booting real microVMs.
#[async_trait]
pub trait VmLifecycle: Send + Sync + 'static {
    fn vm_hash(&self) -> &VmHash;
    async fn setup(&self) -> Result<(), Error>;
    async fn start(&self) -> Result<(), Error>;
    async fn configure(&self, program: &ProgramContent) -> Result<(), Error>;
    async fn start_guest_api(&self) -> Result<(), Error>;
    async fn invoke(&self, scope: Scope) -> Result<InvocationReply, Error>;
    async fn teardown(&self) -> Result<(), Error>;
}

struct Inner {
    firecracker: Option<Firecracker>,
    guest_api_task: Option<tokio::task::JoinHandle<()>>,
    torn_down: bool,
}

/// A single microVM, addressed by the pool via its monotonic `id` and keyed
/// in the cache by `vm_hash`.
pub struct VmHandle {
    pub id: u64,
    pub vm_hash: VmHash,
    pub enable_networking: bool,
    settings: Arc<Settings>,
    api_socket_path: PathBuf,
    vsock_uds_path: PathBuf,
    inner: Mutex<Inner>,
}

impl VmHandle {
    pub fn new(id: u64, vm_hash: VmHash, enable_networking: bool, settings: Arc<Settings>) -> Self {
        let api_socket_path = PathBuf::from(format!("/tmp/firecracker-{id}.sock"));
        let vsock_uds_path = PathBuf::from(format!("/tmp/firecracker-{id}.vsock"));
        Self {
            id,
            vm_hash,
            enable_networking,
            settings,
            api_socket_path,
            vsock_uds_path,
            inner: Mutex::new(Inner {
                firecracker: None,
                guest_api_task: None,
                torn_down: false,
            }),
        }
    }

    async fn open_guest_channel(&self) -> Result<UnixStream, Error> {
        let mut stream = UnixStream::connect(&self.vsock_uds_path).await?;
        let handshake = format!("CONNECT {}\n", self.settings.vsock_port);
        stream.write_all(handshake.as_bytes()).await?;

        let mut response = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).await?;
            if byte[0] == b'\n' {
                break;
            }
            response.push(byte[0]);
        }
        if !response.starts_with(b"OK") {
            return Err(Error::StartupFailed(format!(
                "vsock handshake refused: {}",
                String::from_utf8_lossy(&response)
            )));
        }
        Ok(stream)
    }
}

#[async_trait]
impl VmLifecycle for VmHandle {
    fn vm_hash(&self) -> &VmHash {
        &self.vm_hash
    }

    async fn setup(&self) -> Result<(), Error> {
        let subnet = subnet_for_id(self.id);

        if self.enable_networking {
            let status = tokio::process::Command::new("ip")
                .args(["tuntap", "add", &subnet.tap_name, "mode", "tap"])
                .status()
                .await?;
            if !status.success() {
                return Err(Error::StartupFailed(format!(
                    "failed to create tap device {}",
                    subnet.tap_name
                )));
            }
            let _ = tokio::process::Command::new("ip")
                .args([
                    "addr",
                    "add",
                    &format!("{}/{}", subnet.host_address, subnet.prefix_len),
                    "dev",
                    &subnet.tap_name,
                ])
                .status()
                .await?;
            let _ = tokio::process::Command::new("ip")
                .args(["link", "set", &subnet.tap_name, "up"])
                .status()
                .await?;
        }

        let mut builder = FirecrackerBuilder::new(self.settings.firecracker_binary.clone());
        builder
            .with_api_socket_path(self.api_socket_path.clone())
            .with_id(self.vm_hash.as_str().to_string());
        let mut firecracker = builder.build().map_err(|e| Error::StartupFailed(e.to_string()))?;

        firecracker
            .set_boot_source(BootSource {
                boot_args: Some("console=ttyS0 reboot=k panic=1 pci=off".to_string()),
                initrd_path: None,
                kernel_image_path: self.settings.kernel_image_path.to_string_lossy().into_owned(),
            })
            .map_err(Error::Firecracker)?;
        firecracker
            .set_machine_config(MachineConfiguration {
                cpu_template: None,
                smt: None,
                mem_size_mib: 128,
                track_dirty_pages: None,
                vcpu_count: 1,
                huge_pages: None,
            })
            .map_err(Error::Firecracker)?;
        firecracker
            .add_drive(Drive {
                drive_id: "rootfs".to_string(),
                partuuid: None,
                is_root_device: true,
                cache_type: None,
                is_read_only: Some(false),
                path_on_host: Some(self.settings.rootfs_path.to_string_lossy().into_owned()),
                rate_limiter: None,
                io_engine: None,
                socket: None,
            })
            .map_err(Error::Firecracker)?;

        if self.enable_networking {
            firecracker
                .add_network(NetworkInterface {
                    guest_mac: None,
                    host_dev_name: subnet.tap_name.clone(),
                    iface_id: "eth0".to_string(),
                    rx_rate_limiter: None,
                    tx_rate_limiter: None,
                })
                .map_err(Error::Firecracker)?;
        }

        firecracker
            .set_vsock(VsockDto {
                guest_cid: 3,
                uds_path: self.vsock_uds_path.to_string_lossy().into_owned(),
                vsock_id: None,
            })
            .map_err(Error::Firecracker)?;

        self.inner.lock().await.firecracker = Some(firecracker);
        Ok(())
    }

    async fn start(&self) -> Result<(), Error> {
        let mut guard = self.inner.lock().await;
        let firecracker = guard
            .firecracker
            .as_mut()
            .ok_or_else(|| Error::StartupFailed("setup not called before start".to_string()))?;
        firecracker.start(self.api_socket_path.clone()).await?;
        Ok(())
    }

    async fn configure(&self, program: &ProgramContent) -> Result<(), Error> {
        let subnet = subnet_for_id(self.id);
        let config = ConfigurationPayload {
            ip: self.enable_networking.then(|| subnet.guest_address.to_string()),
            route: self.enable_networking.then(|| subnet.host_address.to_string()),
            dns_servers: self.settings.dns_servers.clone(),
            code: program.code.clone(),
            encoding: program.encoding,
            entrypoint: program.entrypoint.clone(),
            input_data: program.input_data.clone(),
            interface: program.interface,
            vm_hash: self.vm_hash.clone(),
            volumes: program.volumes.clone(),
            log_level: self.settings.guest_log_level.clone(),
        };

        let mut stream = self.open_guest_channel().await?;
        let bytes = shared::framing::encode_msgpack(&config)?;
        write_length_prefixed(&mut stream, &bytes).await?;
        let ack_bytes = read_length_prefixed(&mut stream).await?;
        let ack: BootAck = shared::framing::decode_msgpack(&ack_bytes)?;
        if !ack.success {
            return Err(Error::StartupFailed(
                ack.error.unwrap_or_else(|| "unknown guest boot failure".to_string()),
            ));
        }
        Ok(())
    }

    async fn start_guest_api(&self) -> Result<(), Error> {
        // Stub forwarding loop: proxies the guest's localhost HTTP traffic to
        // the host's local API socket over vsock. Out of scope in depth per
        // the spec; present because the pool depends on this step existing.
        let handle = tokio::spawn(async move {
            std::future::pending::<()>().await;
        });
        self.inner.lock().await.guest_api_task = Some(handle);
        Ok(())
    }

    async fn invoke(&self, scope: Scope) -> Result<InvocationReply, Error> {
        let mut stream = self.open_guest_channel().await?;
        let payload = RunCodePayload { scope };
        let bytes = shared::framing::encode_msgpack(&payload)?;
        stream.write_all(&bytes).await?;
        stream.shutdown().await?;

        let mut reply_bytes = Vec::new();
        stream.read_to_end(&mut reply_bytes).await?;
        let reply: InvocationReply = shared::framing::decode_msgpack(&reply_bytes)?;
        Ok(reply)
    }

    async fn teardown(&self) -> Result<(), Error> {
        let mut guard = self.inner.lock().await;
        if guard.torn_down {
            return Ok(());
        }
        if let Some(task) = guard.guest_api_task.take() {
            task.abort();
        }
        if let Some(mut firecracker) = guard.firecracker.take() {
            firecracker.shutdown().await?;
        }
        if self.enable_networking {
            let subnet = subnet_for_id(self.id);
            let _ = tokio::process::Command::new("ip")
                .args(["tuntap", "del", &subnet.tap_name, "mode", "tap"])
                .status()
                .await;
        }
        guard.torn_down = true;
        Ok(())
    }
}

//! Supervisor configuration: layered TOML + `SUPERVISOR_`-prefixed
//! environment overrides, the same layering the teacher's control-plane
//! services use the `config` crate for.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Path to the `firecracker` binary.
    pub firecracker_binary: PathBuf,
    /// Kernel image passed as every VM's boot source.
    pub kernel_image_path: PathBuf,
    /// Root filesystem image copied/derived for each VM.
    pub rootfs_path: PathBuf,
    /// Guest vsock port the guest-init agent listens on.
    #[serde(default = "default_vsock_port")]
    pub vsock_port: u32,
    /// How long a VM stays warm in the pool after a response, in seconds.
    #[serde(default = "default_reuse_timeout")]
    pub reuse_timeout_secs: u64,
    /// Parent domain the reverse-proxy registrar appends the base32 hostname
    /// prefix to.
    pub proxy_domain: String,
    /// Base URL of the Caddy admin API.
    #[serde(default = "default_proxy_admin_url")]
    pub proxy_admin_url: String,
    /// First id handed out by the pool's monotonic counter.
    #[serde(default)]
    pub start_id_index: u64,
    /// Address the HTTP edge binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
    /// DNS servers written into every guest's `/etc/resolv.conf`.
    #[serde(default = "default_dns_servers")]
    pub dns_servers: Vec<String>,
    /// Log level passed to the guest agent via `ConfigurationPayload`.
    #[serde(default = "default_guest_log_level")]
    pub guest_log_level: String,
    /// Directory holding one MessagePack-encoded `ProgramContent` file per
    /// `VmHash`, named `<hash>.mpk`. Spec.md does not define program
    /// ingestion; this is this rewrite's minimal content-addressed store.
    #[serde(default = "default_program_store_dir")]
    pub program_store_dir: PathBuf,
}

fn default_program_store_dir() -> PathBuf {
    PathBuf::from("/var/lib/supervisor/programs")
}

fn default_vsock_port() -> u32 {
    52
}

fn default_reuse_timeout() -> u64 {
    30
}

fn default_proxy_admin_url() -> String {
    "http://127.0.0.1:2019".to_string()
}

fn default_bind_address() -> SocketAddr {
    "0.0.0.0:8000".parse().unwrap()
}

fn default_dns_servers() -> Vec<String> {
    vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()]
}

fn default_guest_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl Settings {
    /// Load from `supervisor.toml` in the current directory (or the path in
    /// `SUPERVISOR_CONFIG_FILE`), overridden by `SUPERVISOR_*` env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let config_file = std::env::var("SUPERVISOR_CONFIG_FILE")
            .unwrap_or_else(|_| "supervisor.toml".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&config_file).required(false))
            .add_source(config::Environment::with_prefix("SUPERVISOR").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

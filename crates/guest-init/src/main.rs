mod bridge;
mod constants;
mod loader;
mod os_setup;

use shared::dto::{BootAck, ConfigurationPayload};
use shared::framing::{read_length_prefixed, read_single_shot, write_length_prefixed, write_single_shot};
use tokio_vsock::{VMADDR_CID_ANY, VsockAddr, VsockListener};

#[tokio::main]
async fn main() -> Result<(), GuestInitError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addr = VsockAddr::new(VMADDR_CID_ANY, constants::VSOCK_PORT);
    let listener = VsockListener::bind(addr)?;
    tracing::info!(port = constants::VSOCK_PORT, "guest agent listening");

    let (mut config_conn, _) = listener.accept().await?;
    let config_bytes = read_length_prefixed(&mut config_conn).await?;
    let config: ConfigurationPayload = shared::framing::decode_msgpack(&config_bytes)?;
    tracing::info!(vm_hash = %config.vm_hash, "received configuration");

    let ack = apply_configuration(&config).await;
    write_length_prefixed(&mut config_conn, &shared::framing::encode_msgpack(&ack)?).await?;
    drop(config_conn);

    if !ack.success {
        tracing::error!(error = ?ack.error, "boot configuration failed, guest agent exiting");
        return Ok(());
    }

    let launcher = loader::AsgiLauncher::default();
    let mut backend = loader::load(&config, &launcher)
        .await
        .map_err(GuestInitError::Loader)?;
    tracing::info!("backend spawned, serving commands");

    loop {
        let (mut conn, _) = listener.accept().await?;
        let frame = match read_single_shot(&mut conn).await {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(%err, "failed to read command frame");
                continue;
            }
        };

        match bridge::classify(&frame) {
            Ok(bridge::Command::Halt) => {
                os_setup::sync_filesystems();
                let _ = write_single_shot(&mut conn, b"STOP\n").await;
                let _ = backend.child_mut().start_kill();
                break;
            }
            Ok(bridge::Command::Shell(cmd)) => {
                let output = bridge::run_shell(&cmd).await;
                let _ = write_single_shot(&mut conn, &output).await;
            }
            Ok(bridge::Command::Invoke(payload)) => {
                let reply = bridge::invoke_backend(payload).await;
                match shared::framing::encode_msgpack(&reply) {
                    Ok(bytes) => {
                        let _ = write_single_shot(&mut conn, &bytes).await;
                    }
                    Err(err) => tracing::error!(%err, "failed to encode response envelope"),
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to decode command frame");
            }
        }
    }

    Ok(())
}

async fn apply_configuration(config: &ConfigurationPayload) -> BootAck {
    if let Err(err) = os_setup::set_hostname(config.vm_hash.as_str()).await {
        return BootAck::failed(err.to_string(), format!("{err:?}"));
    }
    if let Err(err) = os_setup::mount_volumes(&config.volumes).await {
        return BootAck::failed(err.to_string(), format!("{err:?}"));
    }
    if let Err(err) = os_setup::configure_network(
        "eth0",
        config.ip.as_deref(),
        config.route.as_deref(),
        &config.dns_servers,
    )
    .await
    {
        return BootAck::failed(err.to_string(), format!("{err:?}"));
    }
    if let Err(err) = os_setup::extract_input_data(&config.input_data).await {
        return BootAck::failed(err.to_string(), format!("{err:?}"));
    }
    BootAck::ok()
}

#[derive(Debug, thiserror::Error)]
enum GuestInitError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("framing error: {0}")]
    Framing(#[from] shared::framing::FramingError),
    #[error("loader error: {0}")]
    Loader(loader::LoaderError),
}

//! Guest OS configuration applied from the [`shared::dto::ConfigurationPayload`]
//! on boot, in the order spec'd by the host: hostname, volumes, network, input
//! data. Every step is a typed `tokio::process::Command` invocation rather than
//! a raw `system()` shell-out, per the redesign flag that ad-hoc subprocess
//! calls should become typed operations with a clear input/output contract.

use crate::constants::{INPUT_DATA_ARCHIVE_PATH, INPUT_DATA_MOUNT, VM_HASH_ENV_VAR};
use shared::dto::Volume;
use std::path::Path;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum OsSetupError {
    #[error("failed to spawn `{0}`: {1}")]
    Spawn(&'static str, std::io::Error),
    #[error("`{0}` exited with failure status: {1}")]
    CommandFailed(&'static str, std::process::ExitStatus),
    #[error("mounting volume {mount} failed: {source}")]
    MountFailed {
        mount: String,
        #[source]
        source: Box<OsSetupError>,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

async fn run(program: &'static str, args: &[&str]) -> Result<(), OsSetupError> {
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|e| OsSetupError::Spawn(program, e))?;
    if !status.success() {
        return Err(OsSetupError::CommandFailed(program, status));
    }
    Ok(())
}

/// Flush all pending filesystem writes before the halt command replies
/// `STOP\n` and the guest agent exits. A direct `libc::sync()` call rather
/// than shelling out to the `sync` binary, since this is a bare syscall with
/// no argument/output contract worth wrapping a subprocess around.
pub fn sync_filesystems() {
    // SAFETY: `sync(2)` takes no arguments and cannot fail from the caller's
    // perspective (its return value is always ignored per POSIX).
    unsafe {
        libc::sync();
    }
}

/// Set the guest hostname to the program's vm hash and record it in the
/// environment so the spawned user-code process can read it back.
pub async fn set_hostname(vm_hash: &str) -> Result<(), OsSetupError> {
    // SAFETY: called once, early in guest boot, before any other thread or
    // spawned process reads the environment.
    unsafe {
        std::env::set_var(VM_HASH_ENV_VAR, vm_hash);
    }
    run("hostname", &[vm_hash]).await
}

/// Mount each declared volume read-only. Any failure here is fatal per spec:
/// a program that declares a volume it cannot mount must not boot further.
pub async fn mount_volumes(volumes: &[Volume]) -> Result<(), OsSetupError> {
    for volume in volumes {
        tokio::fs::create_dir_all(&volume.mount).await?;
        let device_path = format!("/dev/{}", volume.device);
        run(
            "mount",
            &["-t", "squashfs", "-o", "ro", &device_path, &volume.mount],
        )
        .await
        .map_err(|source| OsSetupError::MountFailed {
            mount: volume.mount.clone(),
            source: Box::new(source),
        })?;
    }
    Ok(())
}

/// Configure loopback, the primary interface, the default route, and
/// `/etc/resolv.conf`. Skips silently (not an error) if there is no primary
/// interface or no `ip` was assigned — spec's documented no-network case.
pub async fn configure_network(
    primary_iface: &str,
    ip: Option<&str>,
    route: Option<&str>,
    dns_servers: &[String],
) -> Result<(), OsSetupError> {
    let iface_path = format!("/sys/class/net/{primary_iface}");
    if !Path::new(&iface_path).exists() {
        tracing::info!(primary_iface, "no network interface present, skipping network setup");
        return Ok(());
    }
    let Some(ip) = ip else {
        tracing::info!("no ip assigned, skipping network setup");
        return Ok(());
    };

    run("ip", &["addr", "add", "127.0.0.1/8", "dev", "lo", "brd", "+", "scope", "host"]).await?;
    run("ip", &["addr", "add", "::1/128", "dev", "lo"]).await?;
    run("ip", &["link", "set", "lo", "up"]).await?;

    let cidr = format!("{ip}/24");
    run("ip", &["addr", "add", &cidr, "dev", primary_iface]).await?;
    run("ip", &["link", "set", primary_iface, "up"]).await?;

    if let Some(route) = route {
        run("ip", &["route", "add", "default", "via", route, "dev", primary_iface]).await?;
    } else {
        tracing::warn!("ip set with no network route");
    }

    let mut resolv_conf = String::new();
    for server in dns_servers {
        resolv_conf.push_str("nameserver ");
        resolv_conf.push_str(server);
        resolv_conf.push('\n');
    }
    tokio::fs::write("/etc/resolv.conf", resolv_conf).await?;

    Ok(())
}

/// Extract `input_data` into `/data`, idempotently: if the archive marker
/// already exists on disk, assume a prior boot attempt already extracted it.
pub async fn extract_input_data(input_data: &[u8]) -> Result<(), OsSetupError> {
    extract_input_data_at(input_data, INPUT_DATA_ARCHIVE_PATH, INPUT_DATA_MOUNT).await
}

/// Same as [`extract_input_data`] but with the archive/mount paths injected,
/// so the idempotency behavior can be exercised against a tempdir in tests
/// instead of the real `/opt`/`/data`.
async fn extract_input_data_at(
    input_data: &[u8],
    archive_path: &str,
    mount: &str,
) -> Result<(), OsSetupError> {
    if input_data.is_empty() {
        return Ok(());
    }
    if Path::new(archive_path).exists() {
        tracing::debug!("input data archive already present, skipping extraction");
        return Ok(());
    }

    tokio::fs::write(archive_path, input_data).await?;
    tokio::fs::create_dir_all(mount).await?;

    let archive_path = archive_path.to_string();
    let mount = mount.to_string();
    tokio::task::spawn_blocking(move || -> Result<(), OsSetupError> {
        let file = std::fs::File::open(&archive_path)?;
        let mut archive = zip::ZipArchive::new(file)?;
        archive.extract(&mount)?;
        Ok(())
    })
    .await
    .map_err(|e| OsSetupError::Spawn("extract_input_data", std::io::Error::other(e.to_string())))??;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn configure_network_skips_silently_without_interface() {
        let result = configure_network("if-that-does-not-exist", Some("10.0.0.2"), None, &[]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn configure_network_skips_silently_without_ip() {
        let result = configure_network("lo", None, None, &[]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn extract_input_data_noop_on_empty_bytes() {
        assert!(extract_input_data(&[]).await.is_ok());
    }

    fn zip_with_one_file(name: &str, contents: &[u8]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options: zip::write::FileOptions<'_, ()> = zip::write::FileOptions::default();
        writer.start_file(name, options).unwrap();
        std::io::Write::write_all(&mut writer, contents).unwrap();
        writer.finish().unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn extract_input_data_at_extracts_archive_into_mount() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("input.zip");
        let mount = dir.path().join("data");
        let bytes = zip_with_one_file("greeting.txt", b"hello");

        extract_input_data_at(
            &bytes,
            archive_path.to_str().unwrap(),
            mount.to_str().unwrap(),
        )
        .await
        .unwrap();

        let extracted = tokio::fs::read(mount.join("greeting.txt")).await.unwrap();
        assert_eq!(extracted, b"hello");
    }

    #[tokio::test]
    async fn extract_input_data_at_is_idempotent_across_reconnects() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("input.zip");
        let mount = dir.path().join("data");
        let bytes = zip_with_one_file("greeting.txt", b"hello");

        extract_input_data_at(&bytes, archive_path.to_str().unwrap(), mount.to_str().unwrap())
            .await
            .unwrap();
        tokio::fs::remove_file(mount.join("greeting.txt")).await.unwrap();

        // Second call with the same archive marker present must be a no-op,
        // not re-extract over whatever the guest's own code wrote into /data.
        extract_input_data_at(&bytes, archive_path.to_str().unwrap(), mount.to_str().unwrap())
            .await
            .unwrap();
        assert!(tokio::fs::metadata(mount.join("greeting.txt")).await.is_err());
    }
}

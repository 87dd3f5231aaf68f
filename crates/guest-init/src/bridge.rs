//! Guest request bridge (C4): one accepted connection per command. Classifies
//! the first frame as `halt`, a `!`-prefixed shell escape, or a MessagePack
//! `RunCodePayload`, and drives the loaded backend for the last case.
//!
//! Because both interfaces (spec's redesign notes) now resolve to a child
//! listening on `localhost:8080`, invocation is uniformly the "executable"
//! path from spec §4.4: translate the scope into an HTTP request, retry on
//! connect-refused with backoff, translate the reply back into the response
//! envelope.

use crate::constants::{BACKEND_CONNECT_BACKOFF_MS, BACKEND_CONNECT_MAX_ATTEMPTS, BACKEND_PORT, INPUT_DATA_MOUNT};
use shared::dto::{ByteBuf, ErrorEnvelope, InvocationReply, ResponseBody, ResponseEnvelope, ResponseHeaders, RunCodePayload};
use shared::framing::FramingError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to decode command payload: {0}")]
    ConfigDecodeError(#[from] FramingError),
    #[error("user code raised: {0}")]
    UserCodeError(String),
    #[error("could not reach backend after {0} attempts: {1}")]
    TransientConnectError(u32, reqwest::Error),
}

/// Classified first-frame command.
pub enum Command {
    Halt,
    Shell(Vec<u8>),
    Invoke(RunCodePayload),
}

pub fn classify(frame: &[u8]) -> Result<Command, BridgeError> {
    if frame == b"halt" {
        return Ok(Command::Halt);
    }
    if let Some(rest) = frame.strip_prefix(b"!") {
        return Ok(Command::Shell(rest.to_vec()));
    }
    let payload: RunCodePayload = shared::framing::decode_msgpack(frame)?;
    Ok(Command::Invoke(payload))
}

/// Run a shell escape command (`!<cmd>`) via the system shell, capturing
/// combined stdout+stderr. Never returns an `Err` — failures are folded into
/// the reply bytes per spec.
pub async fn run_shell(cmd: &[u8]) -> Vec<u8> {
    let cmd = String::from_utf8_lossy(cmd).into_owned();
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&cmd)
        .output()
        .await;
    match output {
        Ok(output) if output.status.success() => {
            let mut combined = output.stdout;
            combined.extend_from_slice(&output.stderr);
            combined
        }
        Ok(output) => {
            let mut reply = format!("error: shell command exited with {}\n", output.status).into_bytes();
            reply.extend_from_slice(&output.stdout);
            reply.extend_from_slice(&output.stderr);
            reply
        }
        Err(err) => format!("error: failed to spawn shell: {err}\n").into_bytes(),
    }
}

/// Invoke the backend for an application request and produce the response
/// envelope (or an error envelope if the backend itself errors out).
pub async fn invoke_backend(payload: RunCodePayload) -> InvocationReply {
    match invoke_backend_inner(payload).await {
        Ok(envelope) => InvocationReply::Ok(envelope),
        Err(err) => InvocationReply::Err(ErrorEnvelope::new(err.to_string())),
    }
}

async fn invoke_backend_inner(payload: RunCodePayload) -> Result<ResponseEnvelope, BridgeError> {
    let scope = payload.scope;
    let client = reqwest::Client::new();
    let mut url = format!("http://localhost:{}{}", BACKEND_PORT, scope.path);
    if !scope.query_string.is_empty() {
        url.push('?');
        url.push_str(&String::from_utf8_lossy(&scope.query_string));
    }

    let mut attempt = 0u32;
    let response = loop {
        attempt += 1;
        let method = reqwest::Method::from_bytes(scope.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let mut request = client.request(method, &url);
        for (name, value) in &scope.headers {
            if let (Ok(name), Ok(value)) = (
                String::from_utf8(name.0.clone()),
                String::from_utf8(value.0.clone()),
            ) {
                request = request.header(name, value);
            }
        }
        if let Some(body) = &scope.body {
            request = request.body(body.0.clone());
        }

        match request.send().await {
            Ok(response) => break response,
            Err(err) if err.is_connect() && attempt < BACKEND_CONNECT_MAX_ATTEMPTS => {
                tokio::time::sleep(Duration::from_millis(BACKEND_CONNECT_BACKOFF_MS)).await;
                continue;
            }
            Err(err) => return Err(BridgeError::TransientConnectError(attempt, err)),
        }
    };

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                ByteBuf(name.as_str().as_bytes().to_vec()),
                ByteBuf(value.as_bytes().to_vec()),
            )
        })
        .collect();
    let body_bytes = response
        .bytes()
        .await
        .map_err(|e| BridgeError::TransientConnectError(attempt, e))?
        .to_vec();

    let output_data = archive_output_data().await;

    Ok(ResponseEnvelope {
        headers: ResponseHeaders { status, headers },
        body: ResponseBody { body: body_bytes },
        output: String::new(),
        output_data,
    })
}

/// If `/data` exists and is non-empty after the call, zip it and return the
/// bytes; otherwise `None`.
async fn archive_output_data() -> Option<ByteBuf> {
    let has_entries = match tokio::fs::read_dir(INPUT_DATA_MOUNT).await {
        Ok(mut entries) => entries.next_entry().await.ok().flatten().is_some(),
        Err(_) => false,
    };
    if !has_entries {
        return None;
    }

    tokio::task::spawn_blocking(|| -> Option<Vec<u8>> {
        let mut buf = std::io::Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options: zip::write::FileOptions<'_, ()> = zip::write::FileOptions::default();
        let walker = std::fs::read_dir(INPUT_DATA_MOUNT).ok()?;
        for entry in walker.flatten() {
            if entry.file_type().ok()?.is_file() {
                let name = entry.file_name().to_string_lossy().into_owned();
                let data = std::fs::read(entry.path()).ok()?;
                writer.start_file(name, options).ok()?;
                std::io::Write::write_all(&mut writer, &data).ok()?;
            }
        }
        writer.finish().ok()?;
        Some(buf.into_inner())
    })
    .await
    .ok()
    .flatten()
    .map(ByteBuf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognizes_halt() {
        assert!(matches!(classify(b"halt").unwrap(), Command::Halt));
    }

    #[test]
    fn classify_recognizes_shell_escape() {
        match classify(b"!ls /").unwrap() {
            Command::Shell(cmd) => assert_eq!(cmd, b"ls /"),
            _ => panic!("expected shell command"),
        }
    }

    #[tokio::test]
    async fn run_shell_captures_stdout() {
        let out = run_shell(b"echo hi").await;
        assert_eq!(String::from_utf8_lossy(&out).trim(), "hi");
    }

    #[tokio::test]
    async fn run_shell_reports_nonzero_exit() {
        let out = run_shell(b"exit 3").await;
        assert!(String::from_utf8_lossy(&out).starts_with("error:"));
    }
}

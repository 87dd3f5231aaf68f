//! Length-prefixed and single-shot framing over the host-guest stream
//! channel, plus the MessagePack codec used for every structured payload.
//!
//! Warning: this is a private wire protocol between the supervisor and the
//! guest agent — do not read or write frames on the channel without going
//! through these helpers.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Length prefixes are capped at this many ASCII decimal digits.
pub const MAX_LENGTH_DIGITS: usize = 9;

/// Single-shot command frames (one per accepted connection) are capped at
/// roughly 1 MiB, matching the guest agent's per-connection `recv` cap.
pub const MAX_SINGLE_SHOT_BYTES: usize = 1_001_000;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("connection closed before {expected} bytes arrived (got {got})")]
    ShortRead { expected: usize, got: usize },
    #[error("length prefix is not a valid decimal number: {0:?}")]
    BadLength(Vec<u8>),
    #[error("length prefix {0} exceeds the {MAX_LENGTH_DIGITS}-digit cap")]
    LengthTooLong(usize),
    #[error("payload exceeds the single-shot cap of {MAX_SINGLE_SHOT_BYTES} bytes")]
    PayloadTooLarge,
    #[error("failed to decode MessagePack payload: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("failed to encode MessagePack payload: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Write `payload` as a length-prefixed frame: ASCII decimal length, `\n`,
/// then the raw bytes.
pub async fn write_length_prefixed<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), FramingError> {
    let header = format!("{}\n", payload.len());
    if header.len() - 1 > MAX_LENGTH_DIGITS {
        return Err(FramingError::LengthTooLong(payload.len()));
    }
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a length-prefixed frame: digits up to `\n`, then exactly that many
/// bytes.
pub async fn read_length_prefixed<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>, FramingError> {
    let mut digits = Vec::with_capacity(MAX_LENGTH_DIGITS);
    loop {
        let mut byte = [0u8; 1];
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            return Err(FramingError::ShortRead {
                expected: usize::MAX,
                got: digits.len(),
            });
        }
        if byte[0] == b'\n' {
            break;
        }
        digits.push(byte[0]);
        if digits.len() > MAX_LENGTH_DIGITS {
            return Err(FramingError::BadLength(digits));
        }
    }

    let text = std::str::from_utf8(&digits).map_err(|_| FramingError::BadLength(digits.clone()))?;
    let length: usize = text
        .parse()
        .map_err(|_| FramingError::BadLength(digits.clone()))?;

    let mut payload = vec![0u8; length];
    match reader.read_exact(&mut payload).await {
        Ok(_) => Ok(payload),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(FramingError::ShortRead {
                expected: length,
                got: 0,
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Read one single-shot command frame: all bytes the peer sends on this
/// connection, up to [`MAX_SINGLE_SHOT_BYTES`].
pub async fn read_single_shot<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_SINGLE_SHOT_BYTES {
            return Err(FramingError::PayloadTooLarge);
        }
    }
    Ok(buf)
}

/// Write `payload` as a single-shot frame (no length prefix), then shut the
/// write half down so the peer's `read_single_shot` sees EOF.
pub async fn write_single_shot<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), FramingError> {
    writer.write_all(payload).await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

pub fn encode_msgpack<T: Serialize>(value: &T) -> Result<Vec<u8>, FramingError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

pub fn decode_msgpack<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FramingError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{BootAck, ByteBuf, RunCodePayload, Scope};

    #[tokio::test]
    async fn length_prefixed_round_trips_empty_payload() {
        let mut buf = Vec::new();
        write_length_prefixed(&mut buf, b"").await.unwrap();
        assert_eq!(buf, b"0\n");
        let mut cursor = std::io::Cursor::new(buf);
        let out = read_length_prefixed(&mut cursor).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn length_prefixed_round_trips_arbitrary_payload() {
        let payload = vec![7u8; 4096];
        let mut buf = Vec::new();
        write_length_prefixed(&mut buf, &payload).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let out = read_length_prefixed(&mut cursor).await.unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn length_prefixed_short_read_on_truncated_stream() {
        let mut cursor = std::io::Cursor::new(b"10\nabc".to_vec());
        let err = read_length_prefixed(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FramingError::ShortRead { expected: 10, .. }));
    }

    #[tokio::test]
    async fn length_prefixed_bad_length_on_non_numeric_prefix() {
        let mut cursor = std::io::Cursor::new(b"abc\nxyz".to_vec());
        let err = read_length_prefixed(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FramingError::BadLength(_)));
    }

    #[tokio::test]
    async fn single_shot_round_trips_via_duplex_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let payload = b"halt".to_vec();
        let write = write_single_shot(&mut client, &payload);
        let read = read_single_shot(&mut server);
        let (write_res, read_res) = tokio::join!(write, read);
        write_res.unwrap();
        assert_eq!(read_res.unwrap(), payload);
    }

    #[test]
    fn msgpack_round_trips_boot_ack() {
        let ack = BootAck::ok();
        let bytes = encode_msgpack(&ack).unwrap();
        let back: BootAck = decode_msgpack(&bytes).unwrap();
        assert!(back.success);
        assert!(back.error.is_none());
    }

    #[test]
    fn msgpack_round_trips_run_code_payload_with_bytes_and_optional_body() {
        let payload = RunCodePayload {
            scope: Scope {
                method: "GET".to_string(),
                path: "/".to_string(),
                query_string: b"a=1".to_vec(),
                headers: vec![(
                    ByteBuf(b"accept".to_vec()),
                    ByteBuf(b"*/*".to_vec()),
                )],
                body: None,
            },
        };
        let bytes = encode_msgpack(&payload).unwrap();
        let back: RunCodePayload = decode_msgpack(&bytes).unwrap();
        assert_eq!(back.scope.method, "GET");
        assert_eq!(back.scope.query_string, b"a=1");
        assert!(back.scope.body.is_none());

        let with_body = RunCodePayload {
            scope: Scope {
                body: Some(ByteBuf(b"hello".to_vec())),
                ..payload.scope
            },
        };
        let bytes = encode_msgpack(&with_body).unwrap();
        let back: RunCodePayload = decode_msgpack(&bytes).unwrap();
        assert_eq!(back.scope.body.unwrap().0, b"hello");
    }
}

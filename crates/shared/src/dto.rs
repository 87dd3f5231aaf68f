//! Wire types shared between the host supervisor and the in-guest agent.
//!
//! Everything here round-trips through [`crate::framing::encode_msgpack`] /
//! [`crate::framing::decode_msgpack`], so every byte-valued field is tagged
//! `#[serde(with = "serde_bytes")]` to force MessagePack's `bin` type instead
//! of an array of small integers.

use serde::{Deserialize, Serialize};

/// Content hash identifying a program: 64 lowercase hex characters.
///
/// Equality is exact string comparison; the type only guarantees the shape
/// was checked at construction time, not that the hash refers to anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmHash(String);

#[derive(Debug, thiserror::Error)]
pub enum VmHashError {
    #[error("vm hash must be exactly 64 hex characters, got {0}")]
    WrongLength(usize),
    #[error("vm hash must be hex-only, found non-hex byte at index {0}")]
    NotHex(usize),
}

impl VmHash {
    pub fn parse(raw: impl Into<String>) -> Result<Self, VmHashError> {
        let raw = raw.into();
        if raw.len() != 64 {
            return Err(VmHashError::WrongLength(raw.len()));
        }
        if let Some(idx) = raw.find(|c: char| !c.is_ascii_hexdigit()) {
            return Err(VmHashError::NotHex(idx));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the hash's hex digits back into raw bytes, e.g. for base32
    /// hostname derivation.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0
            .as_bytes()
            .chunks(2)
            .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).unwrap(), 16).unwrap())
            .collect()
    }
}

impl std::fmt::Display for VmHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How user code is packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Plain,
    Zip,
    Squashfs,
}

/// How user code is invoked once materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    Asgi,
    Executable,
}

/// A read-only squashfs mount requested by a program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub mount: String,
    pub device: String,
}

/// Hardware resources requested by a program (vCPUs / memory / disk).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareResources {
    pub vcpus: u32,
    pub memory_mib: u32,
    pub seconds: u32,
}

/// Per-program runtime flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub internet: bool,
}

/// Declarative description of a program, keyed by [`VmHash`] in the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramContent {
    #[serde(with = "serde_bytes")]
    pub code: Vec<u8>,
    pub encoding: Encoding,
    pub entrypoint: String,
    pub interface: Interface,
    pub resources: HardwareResources,
    pub environment: Environment,
    pub volumes: Vec<Volume>,
    /// Bytes to extract into `/data` on boot, carried alongside the program
    /// rather than per-request since it is bound to the program's content
    /// hash like everything else the guest needs at configure time.
    #[serde(default, with = "serde_bytes")]
    pub input_data: Vec<u8>,
}

/// Everything the guest needs on boot, sent as the first (length-prefixed)
/// frame over the host-guest channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationPayload {
    pub ip: Option<String>,
    pub route: Option<String>,
    pub dns_servers: Vec<String>,
    #[serde(with = "serde_bytes")]
    pub code: Vec<u8>,
    pub encoding: Encoding,
    pub entrypoint: String,
    #[serde(with = "serde_bytes")]
    pub input_data: Vec<u8>,
    pub interface: Interface,
    pub vm_hash: VmHash,
    pub volumes: Vec<Volume>,
    pub log_level: String,
}

/// A single (name, value) HTTP header pair, carried as raw bytes both ways
/// since header values are not guaranteed to be valid UTF-8.
pub type HeaderPair = (ByteBuf, ByteBuf);

/// Newtype over `Vec<u8>` that forces MessagePack's `bin` encoding even when
/// nested inside a `Vec<(ByteBuf, ByteBuf)>`, where a bare `#[serde(with =
/// "serde_bytes")]` field attribute cannot reach through the tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteBuf(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl From<Vec<u8>> for ByteBuf {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<ByteBuf> for Vec<u8> {
    fn from(b: ByteBuf) -> Self {
        b.0
    }
}

/// Per-request envelope: method, path, query string, headers, optional body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub method: String,
    pub path: String,
    #[serde(with = "serde_bytes")]
    pub query_string: Vec<u8>,
    pub headers: Vec<HeaderPair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<ByteBuf>,
}

/// The command frame carrying a single invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCodePayload {
    pub scope: Scope,
}

/// Response headers half of the response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseHeaders {
    pub status: u16,
    pub headers: Vec<HeaderPair>,
}

/// Response body half of the response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

/// Successful invocation result, returned by the guest over the command
/// channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub headers: ResponseHeaders,
    pub body: ResponseBody,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_data: Option<ByteBuf>,
}

/// Failure result for an invocation whose application code raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub traceback: String,
    #[serde(with = "serde_bytes")]
    pub output: Vec<u8>,
}

impl ErrorEnvelope {
    pub fn new(traceback: impl Into<String>) -> Self {
        Self {
            error: "ERROR".to_string(),
            traceback: traceback.into(),
            output: Vec::new(),
        }
    }
}

/// Either outcome of an invocation, as actually carried over the wire: the
/// guest always replies with one MessagePack map, distinguished by presence
/// of the `error` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvocationReply {
    Ok(ResponseEnvelope),
    Err(ErrorEnvelope),
}

/// Boot acknowledgement sent by the guest right after applying the
/// [`ConfigurationPayload`] and spawning the user backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl BootAck {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            traceback: None,
        }
    }

    pub fn failed(error: impl Into<String>, traceback: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            traceback: Some(traceback.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_hash_rejects_wrong_length() {
        assert!(matches!(
            VmHash::parse("ab"),
            Err(VmHashError::WrongLength(2))
        ));
    }

    #[test]
    fn vm_hash_rejects_non_hex() {
        let raw = "z".repeat(64);
        assert!(matches!(VmHash::parse(raw), Err(VmHashError::NotHex(0))));
    }

    #[test]
    fn vm_hash_lowercases_and_round_trips_bytes() {
        let hash = VmHash::parse("AB".repeat(32)).unwrap();
        assert_eq!(hash.as_str(), "ab".repeat(32));
        assert_eq!(hash.to_bytes(), vec![0xabu8; 32]);
    }
}

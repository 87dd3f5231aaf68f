/// Vsock port the guest agent listens on for the host-guest channel.
pub const VSOCK_PORT: u32 = 52;

/// Local TCP port the loaded backend (ASGI launcher or executable) is
/// expected to bind and listen on.
pub const BACKEND_PORT: u16 = 8080;

/// Backoff between connect attempts while the backend is still booting.
pub const BACKEND_CONNECT_BACKOFF_MS: u64 = 50;

/// Max connect attempts before a cold-start is surfaced as a failure.
pub const BACKEND_CONNECT_MAX_ATTEMPTS: u32 = 20;

/// Marker file used to make input-data extraction idempotent across
/// reconnects (the guest may receive the same config more than once if the
/// host retries).
pub const INPUT_DATA_ARCHIVE_PATH: &str = "/opt/input.zip";

pub const INPUT_DATA_MOUNT: &str = "/data";

pub const ASGI_CODE_ZIP_PATH: &str = "/opt/archive.zip";

pub const EXECUTABLE_PLAIN_PATH: &str = "/opt/executable";

/// Environment variable the spawned user-code process can read to recover
/// the program's own vm hash, generalizing the teacher's vendor-branded
/// equivalent.
pub const VM_HASH_ENV_VAR: &str = "FUNCTION_VM_HASH";

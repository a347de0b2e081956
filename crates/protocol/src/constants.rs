use std::time::Duration;

/// Version string carried in every transfer handshake.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Default TCP port for the file transfer listener.
pub const DEFAULT_TCP_PORT: u16 = 8888;

/// Default chunk size dictated by the sender (1 MiB).
pub const FILE_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest chunk a receiver accepts unless configured otherwise (16 MiB).
///
/// The raw chunk payload is buffered in memory before verification, so a
/// header declaring a larger size is rejected before any bytes are read.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Maximum size of a single control-channel message (64 KiB).
pub const MAX_CONTROL_MESSAGE_SIZE: usize = 64 * 1024;

/// Minimum time between two progress notifications.
pub const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Timeout for establishing the outbound transfer connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Status value sent by a receiver that is ready for chunks.
pub const STATUS_READY: &str = "ready";

/// Source tag stamped on locally created control messages.
pub const DEFAULT_SOURCE: &str = "android";

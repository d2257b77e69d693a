use std::time::Duration;

/// Defaults when no environment override is present.
pub const DEFAULT_BATCH_SIZE: usize = 64 * 1024; // 64 KiB
pub const DEFAULT_WORK_SIZE: usize = 1;

/// Read queue depth between the reader thread and the driver.
pub const READ_QUEUE_CAP: usize = 2;

/// Length of the random seeds behind the token and the endpoint path.
pub const SEED_LEN: usize = 16;

/// Hex-encoded token length on the wire.
pub const TOKEN_LEN: usize = SEED_LEN * 2;

/// Endpoint path (31 bytes) plus the trailing newline.
pub const ENDPOINT_LEN: usize = 32;

/// Full rendezvous announcement: address line followed by the hex token.
pub const RENDEZVOUS_LEN: usize = ENDPOINT_LEN + TOKEN_LEN;

/// Accept-loop retry delay after an accept error, doubling per consecutive
/// failure up to the cap.
pub const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
pub const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Path prefix for the listening socket. Must be 8 bytes so that the
/// base64 suffix lands the address at exactly `ENDPOINT_LEN`.
pub const DEFAULT_PATH_PREFIX: &str = "/tmp/bp-";

/// Environment overrides.
pub mod env {
    pub const BATCH_SIZE: &str = "BATCHPIPE_BATCH_SIZE";
    pub const WORK_SIZE: &str = "BATCHPIPE_WORK_SIZE";
    pub const PATH_PREFIX: &str = "BATCHPIPE_PATH_PREFIX";
}

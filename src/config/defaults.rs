//! Default configuration values

/// Maximum number of download attempts for a tarball
pub const MAX_DOWNLOAD_RETRIES: u32 = 3;

/// First backoff delay between download attempts (in milliseconds)
pub const DOWNLOAD_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Upper bound on the backoff delay (in milliseconds)
pub const DOWNLOAD_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Whole-request timeout for downloads (in seconds)
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// How often a blocked prompt checks for an interrupt (in milliseconds)
pub const PROMPT_POLL_INTERVAL_MS: u64 = 200;

/// Autotools configure script name when a module does not set one
pub const DEFAULT_AUTOGEN_SH: &str = "autogen.sh";

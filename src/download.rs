//! HTTP downloads with retry and SHA-256 verification.
//!
//! This layer reports [`DownloadError`]; the installer wraps it into a
//! [`WandError`](crate::error::WandError) with the kind from [`DownloadError::kind`].

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use crate::error::{ErrorKind, Result, WandError};

#[derive(Debug, Error)]
pub enum DownloadError {
    /// The server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),
    /// The request never produced a response, or the body could not be read.
    #[error("connection failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("checksum file {0} is empty")]
    EmptyChecksum(String),
    #[error("gave up after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<DownloadError>,
    },
}

impl DownloadError {
    /// 4xx responses will not get better by asking again.
    pub fn is_client_error(&self) -> bool {
        matches!(self, DownloadError::Status(code) if (400..500).contains(code))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::Status(_) => ErrorKind::HttpError,
            DownloadError::Transport(_) => ErrorKind::NetworkUnreachable,
            DownloadError::Io(_) | DownloadError::RetriesExhausted { .. } => ErrorKind::DownloadFailed,
            DownloadError::ChecksumMismatch { .. } | DownloadError::EmptyChecksum(_) => {
                ErrorKind::ChecksumMismatch
            }
        }
    }
}

pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Streams the body of a GET request.
pub trait Transport: Send + Sync {
    /// Writes the response body of `url` into `out`, returning the byte count.
    fn get(&self, url: &str, out: &mut dyn Write) -> DownloadResult<u64>;

    fn get_text(&self, url: &str) -> DownloadResult<String> {
        let mut buf = Vec::new();
        self.get(url, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// [`Transport`] backed by a blocking reqwest client.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("wand/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WandError::wrap(ErrorKind::NetworkUnreachable, "Failed to create HTTP client", e))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, out: &mut dyn Write) -> DownloadResult<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| DownloadError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }
        response
            .copy_to(out)
            .map_err(|e| DownloadError::Transport(e.to_string()))
    }
}

/// Exponential backoff between attempts: `base`, `2 * base`, ... capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Same attempt count, no waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1 for the first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Downloads `url` to `dest`, retrying transient failures, and returns the
    /// byte count.
    ///
    /// A 4xx answer is returned at once as [`DownloadError::Status`]; running
    /// out of attempts gives [`DownloadError::RetriesExhausted`].
    pub fn download(&self, url: &str, dest: &Path) -> DownloadResult<u64> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.policy.delay(attempt - 1);
                debug!(%url, attempt, ?delay, "Retrying download");
                std::thread::sleep(delay);
            }
            match self.try_download(url, dest) {
                Ok(bytes) => {
                    debug!(%url, bytes, "Downloaded");
                    return Ok(bytes);
                }
                Err(e) if e.is_client_error() => {
                    let _ = std::fs::remove_file(dest);
                    return Err(e);
                }
                Err(e) => {
                    warn!(%url, attempt, error = %e, "Download attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let _ = std::fs::remove_file(dest);
        Err(DownloadError::RetriesExhausted {
            attempts,
            last: Box::new(last_error.unwrap_or(DownloadError::Transport("no attempt made".into()))),
        })
    }

    fn try_download(&self, url: &str, dest: &Path) -> DownloadResult<u64> {
        let mut file = File::create(dest)?;
        let bytes = self.transport.get(url, &mut file)?;
        file.flush()?;
        Ok(bytes)
    }

    /// Compares the SHA-256 of `path` with the first token of the text at
    /// `checksum_url`, ignoring case.
    pub fn verify_checksum(&self, path: &Path, checksum_url: &str) -> DownloadResult<()> {
        let text = self.transport.get_text(checksum_url)?;
        let expected = text
            .split_whitespace()
            .next()
            .map(str::to_lowercase)
            .ok_or_else(|| DownloadError::EmptyChecksum(checksum_url.to_string()))?;

        let actual = sha256_file(path)?;
        if actual != expected {
            return Err(DownloadError::ChecksumMismatch { expected, actual });
        }
        debug!(path = %path.display(), "Checksum verified");
        Ok(())
    }
}

/// Lowercase hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

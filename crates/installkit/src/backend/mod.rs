//! Backend traits and implementations for fetching artifacts.
//!
//! This module provides the [`Backend`] trait and implementations for
//! different artifact sources. The primary implementation is
//! [`http::HttpBackend`], which downloads over HTTPS with deadlines.
//!
//! # Testing
//!
//! Use [`MockBackend`] for testing without network access:
//!
//! ```
//! use installkit::backend::{Backend, MockBackend};
//! use installkit::CancelToken;
//!
//! let mock = MockBackend::new();
//! mock.add("https://example.com/runc.amd64", b"binary".to_vec());
//!
//! let dir = tempfile::tempdir().unwrap();
//! let dest = dir.path().join("runc.amd64");
//! let size = mock
//!     .download("https://example.com/runc.amd64", &dest, &CancelToken::new())
//!     .unwrap();
//! assert_eq!(size, 6);
//! assert_eq!(mock.fetch_count(), 1);
//! ```

pub mod http;

use crate::cancel::CancelToken;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Why a download failed, before the installer attaches component context.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    #[error("HTTP {0}")]
    Status(u16),

    /// Connection, TLS, timeout or body errors.
    #[error("{0}")]
    Transport(String),

    /// Writing the downloaded bytes failed.
    #[error("write failed: {0}")]
    Io(#[from] io::Error),

    /// The cancel token fired mid-download.
    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    /// HTTP status code, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// Backend trait for fetching artifacts.
///
/// This abstraction allows for different sources (HTTPS, local mirrors,
/// in-memory fixtures) and enables testing.
pub trait Backend: Send + Sync {
    /// Download `url` into the file `dest`, returning the number of bytes
    /// written.
    ///
    /// Implementations should check `cancel` while waiting on the network.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Status` for non-2xx responses,
    /// `FetchError::Transport` for connection problems and timeouts, and
    /// `FetchError::Cancelled` when the token fires.
    fn download(&self, url: &str, dest: &Path, cancel: &CancelToken) -> Result<u64, FetchError>;
}

#[derive(Debug, Clone)]
enum MockResponse {
    Body(Vec<u8>),
    Status(u16),
}

/// Mock backend for testing without network access.
///
/// Clones share state, so a test can hand one clone to an installer and
/// keep another to inspect how many fetches happened. Unknown URLs answer
/// with HTTP 404.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockBackend {
    /// Create a new empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` for `url`.
    pub fn add(&self, url: impl Into<String>, data: impl Into<Vec<u8>>) {
        lock(&self.responses).insert(url.into(), MockResponse::Body(data.into()));
    }

    /// Answer `url` with an HTTP error status.
    pub fn fail(&self, url: impl Into<String>, status: u16) {
        lock(&self.responses).insert(url.into(), MockResponse::Status(status));
    }

    /// Number of download attempts so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        lock(&self.fetched).len()
    }

    /// URLs requested so far, in order.
    #[must_use]
    pub fn fetched_urls(&self) -> Vec<String> {
        lock(&self.fetched).clone()
    }
}

impl Backend for MockBackend {
    fn download(&self, url: &str, dest: &Path, cancel: &CancelToken) -> Result<u64, FetchError> {
        lock(&self.fetched).push(url.to_string());

        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let response = lock(&self.responses)
            .get(url)
            .cloned()
            .unwrap_or(MockResponse::Status(404));

        match response {
            MockResponse::Body(data) => {
                fs::write(dest, &data)?;
                Ok(data.len() as u64)
            }
            MockResponse::Status(code) => Err(FetchError::Status(code)),
        }
    }
}

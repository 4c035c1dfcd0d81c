//! HTTPS download backend.
//!
//! This module provides the [`HttpBackend`] implementation for fetching
//! release artifacts from any HTTPS origin (GitHub release downloads,
//! `dl.k8s.io`, mirrors).
//!
//! # Deadlines
//!
//! Every request carries a connect timeout and an overall deadline so a
//! stalled server cannot hang a provisioning run.
//!
//! # Cancellation
//!
//! The request runs on a worker thread that hands body chunks over a
//! bounded channel. The caller waits on that channel in short slices and
//! checks the cancel token between them, so a cancelled download returns
//! promptly even while the server has stopped sending. The abandoned worker
//! exits at its next chunk or when the overall deadline expires.

use crate::backend::{Backend, FetchError};
use crate::cancel::CancelToken;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

/// Maximum download size (the largest release tarball is well below this).
const MAX_BODY_SIZE: u64 = 512 * 1024 * 1024;

/// Bytes read per chunk.
const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between the worker and the writer.
const CHANNEL_DEPTH: usize = 8;

/// Longest wait before the cancel token is checked again.
const CANCEL_POLL: Duration = Duration::from_millis(200);

/// Default overall deadline for a single download.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default connect deadline.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// One message from the worker: a chunk, end of body (`None`), or an error.
type Chunk = Result<Option<Vec<u8>>, FetchError>;

/// HTTPS download backend.
///
/// # Example
///
/// ```no_run
/// use installkit::backend::http::HttpBackend;
/// use installkit::backend::Backend;
/// use installkit::CancelToken;
/// use std::path::Path;
///
/// let backend = HttpBackend::new();
/// backend
///     .download(
///         "https://dl.k8s.io/release/v1.30.2/bin/linux/amd64/kubectl.sha256",
///         Path::new("/tmp/kubectl.sha256"),
///         &CancelToken::new(),
///     )
///     .unwrap();
/// ```
pub struct HttpBackend {
    agent: ureq::Agent,
    user_agent: String,
}

impl HttpBackend {
    /// Create a backend with the default deadlines.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a backend with explicit overall and connect deadlines.
    #[must_use]
    pub fn with_timeouts(timeout: Duration, connect_timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .timeout_connect(Some(connect_timeout))
            .build()
            .into();
        Self {
            agent,
            user_agent: format!("nodestrap/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for HttpBackend {
    fn download(&self, url: &str, dest: &Path, cancel: &CancelToken) -> Result<u64, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        let agent = self.agent.clone();
        let user_agent = self.user_agent.clone();
        let request_url = url.to_string();
        thread::Builder::new()
            .name("nodestrap-fetch".to_string())
            .spawn(move || stream(&agent, &request_url, &user_agent, &tx))?;

        let mut file = File::create(dest)?;
        let mut total = 0u64;
        loop {
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(Ok(Some(chunk))) => {
                    file.write_all(&chunk)?;
                    total += chunk.len() as u64;
                }
                Ok(Ok(None)) => break,
                Ok(Err(_)) if cancel.is_cancelled() => return Err(FetchError::Cancelled),
                Ok(Err(e)) => return Err(e),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(FetchError::Transport(
                        "download worker stopped unexpectedly".to_string(),
                    ));
                }
            }
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
        }
        file.sync_all()?;

        log::trace!("fetched {url} ({total} bytes)");
        Ok(total)
    }
}

/// Run the request and forward the body in chunks until it ends, fails, or
/// the receiving side goes away.
fn stream(agent: &ureq::Agent, url: &str, user_agent: &str, tx: &SyncSender<Chunk>) {
    let response = agent
        .get(url)
        .header("Accept", "application/octet-stream")
        .header("User-Agent", user_agent)
        .call();
    let mut response = match response {
        Ok(response) => response,
        Err(ureq::Error::StatusCode(code)) => {
            let _ = tx.send(Err(FetchError::Status(code)));
            return;
        }
        Err(e) => {
            let _ = tx.send(Err(FetchError::Transport(e.to_string())));
            return;
        }
    };

    let mut reader = response
        .body_mut()
        .with_config()
        .limit(MAX_BODY_SIZE)
        .reader();
    loop {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let message = match reader.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(buf))
            }
            Err(e) => Err(FetchError::Transport(e.to_string())),
        };
        let last = !matches!(message, Ok(Some(_)));
        if tx.send(message).is_err() || last {
            return;
        }
    }
}

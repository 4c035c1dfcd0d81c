//! SIGINT/SIGTERM handling.
//!
//! The first signal cancels the shared token: in-flight downloads stop
//! within a fraction of a second, even when the server has stalled, and
//! scratch directories are removed on the way out. A second signal exits
//! immediately.

use installkit::CancelToken;
use std::sync::OnceLock;

static TOKEN: OnceLock<CancelToken> = OnceLock::new();

#[cfg(unix)]
extern "C" fn on_signal(_signal: libc::c_int) {
    if let Some(token) = TOKEN.get() {
        if token.is_cancelled() {
            // SAFETY: _exit is async-signal-safe.
            unsafe { libc::_exit(130) };
        }
        token.cancel();
    }
}

/// Route SIGINT and SIGTERM to `token`. Only the first call has an effect.
pub fn install(token: &CancelToken) {
    if TOKEN.set(token.clone()).is_err() {
        return;
    }

    #[cfg(unix)]
    {
        let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        // SAFETY: the handler only touches atomics (and _exit).
        unsafe {
            libc::signal(libc::SIGINT, handler);
            libc::signal(libc::SIGTERM, handler);
        }
    }
}

//! Cooperative job cancellation.
//!
//! The scheduler stops a filter with `SIGTERM`. The handler only flips a
//! flag; the translator checks it between scanlines and pages and then runs
//! its normal teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared "stop after the current unit" flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(unix)]
mod signal {
    use std::sync::OnceLock;

    use super::CancelToken;

    static SIGTERM_TOKEN: OnceLock<CancelToken> = OnceLock::new();

    extern "C" fn on_sigterm(_signal: libc::c_int) {
        // Only an atomic store happens here.
        if let Some(token) = SIGTERM_TOKEN.get() {
            token.cancel();
        }
    }

    /// Route `SIGTERM` to `token`. Only the first installed token is used.
    pub fn cancel_on_sigterm(token: &CancelToken) {
        if SIGTERM_TOKEN.set(token.clone()).is_err() {
            tracing::debug!("SIGTERM handler already installed");
            return;
        }
        let handler = on_sigterm as extern "C" fn(libc::c_int);
        // SAFETY: the handler is async-signal-safe (a single atomic store).
        unsafe {
            libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
        }
    }
}

#[cfg(unix)]
pub use signal::cancel_on_sigterm;

#[cfg(not(unix))]
pub fn cancel_on_sigterm(_token: &CancelToken) {}

// Bounded retry for write-back while another program holds the file.

use std::io;
use std::path::Path;
use std::time::Duration;

use wasteaudit_config::RetrySettings;

use crate::error::StoreError;

/// Waits between attempts. Tests substitute a counter.
pub trait Sleeper {
    fn sleep(&mut self, delay: Duration);
}

/// Real sleeper backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero behaves as one.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 5, delay: Duration::from_millis(2000) }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self { attempts: s.attempts, delay: Duration::from_millis(s.delay_ms) }
    }
}

/// True for errors a spreadsheet app's file lock produces.
pub fn is_busy(err: &io::Error) -> bool {
    if matches!(err.kind(), io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock) {
        return true;
    }
    if cfg!(windows) {
        // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
        matches!(err.raw_os_error(), Some(32) | Some(33))
    } else {
        // EBUSY
        err.raw_os_error() == Some(16)
    }
}

/// Run `op` until it succeeds, retrying busy failures after a fixed delay.
/// Non-busy errors return immediately.
pub fn write_with_retry<T>(
    policy: &RetryPolicy,
    sleeper: &mut dyn Sleeper,
    path: &Path,
    mut op: impl FnMut() -> io::Result<T>,
) -> Result<T, StoreError> {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match op() {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("{}: write succeeded on attempt {attempt}", path.display());
                }
                return Ok(value);
            }
            Err(e) if is_busy(&e) => {
                if attempt == attempts {
                    break;
                }
                log::warn!(
                    "{} is busy ({e}); retrying in {:?} (attempt {attempt}/{attempts})",
                    path.display(),
                    policy.delay
                );
                sleeper.sleep(policy.delay);
            }
            Err(e) => return Err(StoreError::Io(e)),
        }
    }
    Err(StoreError::WriteContention { path: path.to_path_buf(), attempts })
}

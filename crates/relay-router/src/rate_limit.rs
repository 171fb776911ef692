use std::sync::Mutex;

use dashmap::DashMap;

const WINDOW_SECS: i64 = 60;

/// Sliding-window rate limiter keyed by an arbitrary string (an account id,
/// or `tenant:<id>`). Each key's window is guarded by its own [`Mutex`] so
/// `check_and_record` is a single atomic critical section per key.
#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<String, Mutex<Vec<i64>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-mutating check: would the next call to [`Self::check_and_record`]
    /// be rejected? Used by the router to filter candidates without
    /// consuming a slot in their window.
    #[must_use]
    pub fn is_rate_limited(&self, key: &str, limit: u32) -> bool {
        if limit == 0 {
            return false;
        }
        let cutoff = now_epoch_secs() - WINDOW_SECS;
        match self.windows.get(key) {
            Some(entry) => {
                let window = entry.lock().expect("lock poisoned");
                window.iter().filter(|&&t| t > cutoff).count() >= limit as usize
            }
            None => false,
        }
    }

    /// Prune timestamps older than the window, then admit or reject.
    /// `limit == 0` means unlimited: always accepted, without recording.
    #[must_use]
    pub fn check_and_record(&self, key: &str, limit: u32) -> bool {
        if limit == 0 {
            return true;
        }
        let now = now_epoch_secs();
        let cutoff = now - WINDOW_SECS;
        let entry = self.windows.entry(key.to_owned()).or_default();
        let mut window = entry.lock().expect("lock poisoned");
        window.retain(|&t| t > cutoff);
        if window.len() >= limit as usize {
            return false;
        }
        window.push(now);
        true
    }
}

fn now_epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

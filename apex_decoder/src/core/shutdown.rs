//! Bounded-time thread joins.
//!
//! `std::thread::JoinHandle::join` blocks forever. Workers are asked to stop
//! through a shared flag; if one has not finished by the deadline its handle
//! is dropped and the thread is left detached.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Result of [`join_until`].
#[derive(Debug)]
pub enum JoinOutcome<T> {
    /// Thread exited; carries its result or panic payload.
    Finished(std::thread::Result<T>),
    /// Deadline passed first; the thread was detached.
    Abandoned,
}

impl<T> JoinOutcome<T> {
    pub fn is_finished(&self) -> bool {
        matches!(self, JoinOutcome::Finished(_))
    }
}

/// Join `handle` if it finishes before `deadline`.
pub fn join_until<T>(handle: JoinHandle<T>, deadline: Instant) -> JoinOutcome<T> {
    loop {
        if handle.is_finished() {
            return JoinOutcome::Finished(handle.join());
        }
        let now = Instant::now();
        if now >= deadline {
            return JoinOutcome::Abandoned;
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_finished_thread() {
        let handle = std::thread::spawn(|| 7);
        match join_until(handle, Instant::now() + Duration::from_secs(5)) {
            JoinOutcome::Finished(Ok(v)) => assert_eq!(v, 7),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_abandon_hung_thread() {
        let (_tx, rx) = crossbeam_channel::bounded::<()>(0);
        let handle = std::thread::spawn(move || {
            let _ = rx.recv_timeout(Duration::from_secs(2));
        });
        let outcome = join_until(handle, Instant::now() + Duration::from_millis(20));
        assert!(!outcome.is_finished());
    }
}

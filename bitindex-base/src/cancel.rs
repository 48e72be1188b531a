use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{kind_err, Error, Kind};

/// A cancellation signal shared between a caller and the evaluator running
/// on its behalf. Checked between children of AND/OR/XOR nodes and between
/// IndexSet steps in scans and mesh walks.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(kind_err(Kind::Cancelled, "evaluation cancelled"))
        } else {
            Ok(())
        }
    }
}

/// A deadline checked at the same points as a `CancellationToken`.
#[derive(Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(duration: std::time::Duration) -> Self {
        Deadline {
            at: Instant::now() + duration,
        }
    }

    pub fn check(&self) -> Result<(), Error> {
        if Instant::now() >= self.at {
            Err(kind_err(Kind::TimedOut, "evaluation deadline exceeded"))
        } else {
            Ok(())
        }
    }
}

/// Bundles a cancellation token and an optional deadline; both are checked
/// at the same points in the evaluator and mesh walks.
#[derive(Clone, Default)]
pub struct RunControl {
    pub cancel: CancellationToken,
    pub deadline: Option<Deadline>,
}

impl RunControl {
    pub fn check(&self) -> Result<(), Error> {
        self.cancel.check()?;
        if let Some(d) = self.deadline {
            d.check()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn cancellation_round_trip() {
        let tok = CancellationToken::new();
        assert!(tok.check().is_ok());
        tok.cancel();
        assert_eq!(tok.check().unwrap_err().kind(), Kind::Cancelled);
    }

    #[test]
    fn deadline_elapses() {
        let d = Deadline::after(std::time::Duration::from_millis(0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(d.check().unwrap_err().kind(), Kind::TimedOut);
    }
}

// Transfer progress reporting

use std::fmt;
use std::sync::Arc;

/// Bytes moved so far versus the expected total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub transferred: u64,
    /// `None` when the peer did not announce a length.
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Completed fraction in `[0, 1]`, if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        self.total.map(|total| {
            if total == 0 {
                1.0
            } else {
                (self.transferred as f64 / total as f64).clamp(0.0, 1.0)
            }
        })
    }
}

/// Progress callback invoked from the transfer task.
#[derive(Clone)]
pub struct ProgressFn(Arc<dyn Fn(TransferProgress) + Send + Sync>);

impl ProgressFn {
    pub fn new(f: impl Fn(TransferProgress) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn report(&self, progress: TransferProgress) {
        (self.0)(progress);
    }
}

impl fmt::Debug for ProgressFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressFn")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_handles_unknown_and_empty_totals() {
        let unknown = TransferProgress {
            transferred: 10,
            total: None,
        };
        assert_eq!(unknown.fraction(), None);

        let empty = TransferProgress {
            transferred: 0,
            total: Some(0),
        };
        assert_eq!(empty.fraction(), Some(1.0));

        let half = TransferProgress {
            transferred: 50,
            total: Some(100),
        };
        assert_eq!(half.fraction(), Some(0.5));
    }
}

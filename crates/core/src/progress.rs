//! Progress pair arithmetic.
//!
//! A progress pair is (current step, total steps), e.g. 3/9 while generating
//! section 3 of 9. The percentage is always derived from the pair -- it is
//! never stored as ground truth.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A validated (current, total) progress pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u32,
    pub total: u32,
}

impl Progress {
    /// Requires `total >= 1` and `current <= total`.
    pub fn new(current: u32, total: u32) -> Result<Progress, DomainError> {
        if total == 0 || current > total {
            return Err(DomainError::InvalidProgress { current, total });
        }
        Ok(Progress { current, total })
    }

    /// Integer percentage, truncated: 3/9 -> 33.
    pub fn percent(self) -> u8 {
        (u64::from(self.current) * 100 / u64::from(self.total)) as u8
    }
}

/// Derive a percentage from an optionally-present persisted pair.
///
/// Absent halves yield `None` rather than a fabricated 0. Values that slipped
/// past validation are capped at 100 so the 0-100 invariant holds on read.
pub fn derive_percent(current: Option<u32>, total: Option<u32>) -> Option<u8> {
    match (current, total) {
        (Some(current), Some(total)) if total > 0 => {
            Some((u64::from(current) * 100 / u64::from(total)).min(100) as u8)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_of_nine_is_thirty_three() {
        assert_eq!(Progress::new(3, 9).unwrap().percent(), 33);
    }

    #[test]
    fn boundaries() {
        assert_eq!(Progress::new(0, 9).unwrap().percent(), 0);
        assert_eq!(Progress::new(9, 9).unwrap().percent(), 100);
    }

    #[test]
    fn invalid_pairs_rejected() {
        assert!(Progress::new(1, 0).is_err());
        assert!(Progress::new(10, 9).is_err());
    }

    #[test]
    fn derive_requires_both_halves() {
        assert_eq!(derive_percent(Some(3), Some(9)), Some(33));
        assert_eq!(derive_percent(Some(3), None), None);
        assert_eq!(derive_percent(None, Some(9)), None);
        assert_eq!(derive_percent(None, None), None);
        assert_eq!(derive_percent(Some(3), Some(0)), None);
    }

    #[test]
    fn derive_caps_at_one_hundred() {
        assert_eq!(derive_percent(Some(12), Some(9)), Some(100));
    }
}

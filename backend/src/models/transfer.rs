//! Material transfer model
//!
//! A `MaterialTransfer` is a quantity of water moving at a constant rate
//! over `[start_time, end_time]`. Transfers are created by the sender when
//! it commits to a step and consumed, fully or in part, by the receiver.
//!
//! CRITICAL: a transfer never carries negative or non-finite material.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by transfer construction and inbox insertion
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransferError {
    #[error("transfer interval [{start_time}, {end_time}] is empty or reversed")]
    EmptyInterval { start_time: f64, end_time: f64 },

    #[error("transfer material {material} is negative or not finite")]
    InvalidMaterial { material: f64 },

    #[error(
        "transfer [{start_time}, {end_time}] overlaps queued transfer [{queued_start}, {queued_end}]"
    )]
    Overlap {
        start_time: f64,
        end_time: f64,
        queued_start: f64,
        queued_end: f64,
    },

    #[error(
        "transfer [{start_time}, {end_time}] lies outside the open window [{window_start}, {window_end}]"
    )]
    OutsideWindow {
        start_time: f64,
        end_time: f64,
        window_start: f64,
        window_end: f64,
    },
}

/// Water delivered at a constant rate over a fixed interval
///
/// # Example
/// ```
/// use hydro_simulator_core_rs::MaterialTransfer;
///
/// let transfer = MaterialTransfer::new(0.0, 5.0, 50.0).unwrap();
/// assert_eq!(transfer.duration(), 5.0);
/// assert_eq!(transfer.rate(), 10.0);
///
/// assert!(MaterialTransfer::new(5.0, 5.0, 1.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialTransfer {
    start_time: f64,
    end_time: f64,
    material: f64,
}

impl MaterialTransfer {
    /// Create a transfer, rejecting empty intervals and invalid quantities
    pub fn new(start_time: f64, end_time: f64, material: f64) -> Result<Self, TransferError> {
        if !(start_time < end_time) || !start_time.is_finite() || !end_time.is_finite() {
            return Err(TransferError::EmptyInterval {
                start_time,
                end_time,
            });
        }
        if !material.is_finite() || material < 0.0 {
            return Err(TransferError::InvalidMaterial { material });
        }

        Ok(Self {
            start_time,
            end_time,
            material,
        })
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn material(&self) -> f64 {
        self.material
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Constant delivery rate over the interval
    pub fn rate(&self) -> f64 {
        self.material / self.duration()
    }

    /// True if the two open intervals share any time
    pub fn overlaps(&self, other: &MaterialTransfer) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }

    /// Split at `time`, returning the consumed head and the remaining tail
    ///
    /// The head gets `material × (time − start) / duration`; the tail keeps
    /// the original end time and whatever material is left. Splitting at or
    /// past the end consumes the whole transfer.
    pub fn split_at(self, time: f64) -> (f64, Option<MaterialTransfer>) {
        if time >= self.end_time {
            return (self.material, None);
        }
        if time <= self.start_time {
            return (0.0, Some(self));
        }

        let share = self.material * ((time - self.start_time) / self.duration());
        let remainder = (self.material - share).max(0.0);
        (
            share,
            Some(MaterialTransfer {
                start_time: time,
                end_time: self.end_time,
                material: remainder,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_negative_material() {
        assert_eq!(
            MaterialTransfer::new(0.0, 1.0, -0.5),
            Err(TransferError::InvalidMaterial { material: -0.5 })
        );
    }

    #[test]
    fn test_rejects_nan_interval() {
        assert!(MaterialTransfer::new(f64::NAN, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        let a = MaterialTransfer::new(0.0, 2.0, 1.0).unwrap();
        let b = MaterialTransfer::new(2.0, 3.0, 1.0).unwrap();
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn test_split_prorates_linearly() {
        let transfer = MaterialTransfer::new(0.0, 4.0, 8.0).unwrap();
        let (share, rest) = transfer.split_at(1.0);
        assert_eq!(share, 2.0);
        let rest = rest.unwrap();
        assert_eq!(rest.start_time(), 1.0);
        assert_eq!(rest.end_time(), 4.0);
        assert_eq!(rest.material(), 6.0);
    }
}

//! Mass ledger: created/destroyed accounting per element
//!
//! Water only enters or leaves the exchange protocol through two doors:
//! external source terms supplied by physics, and floating-point
//! corrections (rationing residuals, clamping at zero, transfers rejected
//! under the record policy). Both are booked here so a mass-balance check
//! can account for every unit:
//!
//! ```text
//! Σ material + Σ queued = initial + Σ created − Σ destroyed
//! ```

use serde::{Deserialize, Serialize};

/// Created/destroyed totals for one element
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MassLedger {
    created: f64,
    destroyed: f64,
}

impl MassLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from checkpointed totals
    pub fn from_parts(created: f64, destroyed: f64) -> Self {
        Self { created, destroyed }
    }

    /// Book a signed discrepancy: positive created, negative destroyed
    pub fn record(&mut self, discrepancy: f64) {
        if discrepancy > 0.0 {
            self.created += discrepancy;
        } else if discrepancy < 0.0 {
            self.destroyed -= discrepancy;
        }
    }

    pub fn record_created(&mut self, amount: f64) {
        self.created += amount.abs();
    }

    pub fn record_destroyed(&mut self, amount: f64) {
        self.destroyed += amount.abs();
    }

    pub fn created(&self) -> f64 {
        self.created
    }

    pub fn destroyed(&self) -> f64 {
        self.destroyed
    }

    /// Created minus destroyed
    pub fn net(&self) -> f64 {
        self.created - self.destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_record_splits_buckets() {
        let mut ledger = MassLedger::new();
        ledger.record(2.0);
        ledger.record(-0.5);
        ledger.record(0.0);
        assert_eq!(ledger.created(), 2.0);
        assert_eq!(ledger.destroyed(), 0.5);
        assert_eq!(ledger.net(), 1.5);
    }
}

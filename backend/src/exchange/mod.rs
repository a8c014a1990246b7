//! Exchange Module
//!
//! Outflow planning for one element's step:
//! - Demand per outgoing link = nominal rate × step length
//! - Full delivery when the element holds enough material
//! - Proportional rationing when it does not
//!
//! # Critical Invariants
//!
//! 1. **Non-negativity**: planned outflow never exceeds available material
//! 2. **Fairness**: under rationing every link gets the same fraction of its demand
//! 3. **Visibility**: the rounding residual of a rationed plan is reported, never hidden
//!
//! # Example
//!
//! ```rust
//! use hydro_simulator_core_rs::exchange::plan_outflows;
//!
//! let plan = plan_outflows(20.0, &[25.0, 25.0]);
//! assert!(plan.is_rationed());
//! assert_eq!(plan.amounts(), &[10.0, 10.0]);
//! assert_eq!(plan.remaining(), 0.0);
//! ```

pub mod rationing;

pub use rationing::{plan_outflows, OutflowPlan};

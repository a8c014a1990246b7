//! Proportional outflow rationing
//!
//! Outgoing demand that exceeds the material an element holds is not an
//! error. Every outgoing quantity is scaled by `f = available / demand`
//! and the element is emptied. In either case the rounding left over by
//! withdrawing the quantities is handed back to the caller for the mass
//! ledger, together with any amount needed to clamp the remainder at zero.

/// Outflow decision for one step
#[derive(Debug, Clone, PartialEq)]
pub struct OutflowPlan {
    /// Quantity per demand, same order as the input
    amounts: Vec<f64>,
    /// Total requested
    demand: f64,
    /// Material the element held before the step
    available: f64,
    /// Material left after the outflow, never negative
    remaining: f64,
    /// Scale applied to every demand (1.0 when not rationed)
    fraction: f64,
    /// Exact `available − Σ amounts` minus `remaining`
    residual: f64,
    /// Water added to lift a negative remainder back to zero
    clamped: f64,
}

impl OutflowPlan {
    pub fn amounts(&self) -> &[f64] {
        &self.amounts
    }

    pub fn demand(&self) -> f64 {
        self.demand
    }

    pub fn available(&self) -> f64 {
        self.available
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Positive: water vanished in rounding. Negative: water appeared.
    ///
    /// Booked in the sender's ledger as `record(-residual)`.
    pub fn residual(&self) -> f64 {
        self.residual
    }

    /// Non-zero only when round-off drove an unrationed remainder below zero
    pub fn clamped(&self) -> f64 {
        self.clamped
    }

    pub fn is_rationed(&self) -> bool {
        self.fraction < 1.0
    }

    pub fn total_outflow(&self) -> f64 {
        self.amounts.iter().sum()
    }
}

/// `a − b` and the rounding error of that subtraction (TwoSum)
fn subtract_with_error(a: f64, b: f64) -> (f64, f64) {
    let diff = a - b;
    let b_virtual = a - diff;
    let a_virtual = diff + b_virtual;
    let error = (a - a_virtual) - (b - b_virtual);
    (diff, error)
}

/// Subtract every amount in turn, returning the rounded remainder and the
/// accumulated rounding error
fn withdraw(available: f64, amounts: &[f64]) -> (f64, f64) {
    amounts.iter().fold((available, 0.0), |(left, error), &amount| {
        let (next, e) = subtract_with_error(left, amount);
        (next, error + e)
    })
}

/// Plan the outflow of `available` material against per-link `demands`
///
/// Demands are non-negative quantities (rate × step length). When their
/// sum fits in `available`, each link gets its full demand and the demands
/// are withdrawn one by one; otherwise every link gets `demand × available
/// / Σ demand` and nothing remains.
///
/// Withdrawing link by link can round below zero even when the summed
/// demand fits. The remainder is then clamped at zero and the lifted
/// amount reported through [`OutflowPlan::clamped`]. Every rounding
/// discrepancy, clamping included, ends up in [`OutflowPlan::residual`].
///
/// # Example
///
/// ```rust
/// use hydro_simulator_core_rs::exchange::plan_outflows;
///
/// let plan = plan_outflows(100.0, &[50.0]);
/// assert!(!plan.is_rationed());
/// assert_eq!(plan.remaining(), 50.0);
/// ```
pub fn plan_outflows(available: f64, demands: &[f64]) -> OutflowPlan {
    let available = available.max(0.0);
    let demand: f64 = demands.iter().sum();

    let (amounts, fraction) = if demand <= available {
        (demands.to_vec(), 1.0)
    } else {
        let fraction = available / demand;
        (demands.iter().map(|d| d * fraction).collect(), fraction)
    };

    let (left, error) = withdraw(available, &amounts);
    let remaining = if fraction < 1.0 { 0.0 } else { left.max(0.0) };
    let clamped = if fraction < 1.0 { 0.0 } else { remaining - left };
    let residual = (left - remaining) + error;

    OutflowPlan {
        amounts,
        demand,
        available,
        remaining,
        fraction,
        residual,
        clamped,
    }
}

//! Scalar neighbor proxy with an inbox of material transfers
//!
//! Wraps a [`NeighborProxy`] with:
//! - `incoming_material`: transfers the neighbor has sent, sorted by start
//!   time and pairwise non-overlapping
//! - split cumulative flow: a short-term accumulator that takes every
//!   realized transfer, folded periodically into a long-term accumulator so
//!   rounding error stays bounded over long runs
//!
//! # Critical Invariants
//!
//! 1. **Ordering**: inbox entries are sorted ascending and never overlap
//! 2. **Contiguity**: a window is complete only if the entries starting at
//!    the owner's current time cover it without gaps
//! 3. **Proration**: a partially consumed transfer releases material in
//!    proportion to the consumed fraction of its interval

use crate::models::id::ElementId;
use crate::models::neighbor::{NeighborKind, NeighborProxy};
use crate::models::transfer::{MaterialTransfer, TransferError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Neighbor proxy carrying a scalar quantity (water volume)
///
/// # Example
/// ```
/// use hydro_simulator_core_rs::{
///     ElementId, MaterialTransfer, NeighborKind, NeighborProxy, SimpleNeighborProxy,
/// };
///
/// let link = NeighborProxy::new(ElementId(1), 0, NeighborKind::Mesh, false, false, 0.0);
/// let mut proxy = SimpleNeighborProxy::new(link);
///
/// proxy.insert_material(MaterialTransfer::new(0.0, 2.0, 4.0).unwrap()).unwrap();
/// proxy.insert_material(MaterialTransfer::new(2.0, 6.0, 8.0).unwrap()).unwrap();
///
/// assert!(proxy.all_material_has_arrived(0.0, 3.0));
/// assert_eq!(proxy.get_material(0.0, 3.0), 6.0);
/// assert_eq!(proxy.total_water_in_incoming_material(), 6.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleNeighborProxy {
    link: NeighborProxy,

    /// Transfers not yet consumed, ascending by start time
    incoming_material: VecDeque<MaterialTransfer>,

    /// Net flow since the last fold; positive = outflow
    flow_cumulative_short_term: f64,

    /// Net flow folded from the short-term accumulator
    flow_cumulative_long_term: f64,
}

impl SimpleNeighborProxy {
    pub fn new(link: NeighborProxy) -> Self {
        Self {
            link,
            incoming_material: VecDeque::new(),
            flow_cumulative_short_term: 0.0,
            flow_cumulative_long_term: 0.0,
        }
    }

    /// Restore a proxy with its inbox and accumulators (checkpoint restoration)
    ///
    /// The inbox is re-inserted transfer by transfer, so a corrupted
    /// checkpoint with overlapping entries is rejected here.
    pub fn from_parts(
        link: NeighborProxy,
        incoming_material: Vec<MaterialTransfer>,
        flow_cumulative_short_term: f64,
        flow_cumulative_long_term: f64,
    ) -> Result<Self, TransferError> {
        let mut proxy = Self {
            link,
            incoming_material: VecDeque::with_capacity(incoming_material.len()),
            flow_cumulative_short_term,
            flow_cumulative_long_term,
        };
        for transfer in incoming_material {
            proxy.insert_material(transfer)?;
        }
        Ok(proxy)
    }

    // ========================================================================
    // Link accessors
    // ========================================================================

    pub fn link(&self) -> &NeighborProxy {
        &self.link
    }

    pub(crate) fn link_mut(&mut self) -> &mut NeighborProxy {
        &mut self.link
    }

    pub fn neighbor(&self) -> ElementId {
        self.link.neighbor()
    }

    pub fn reciprocal_index(&self) -> usize {
        self.link.reciprocal_index()
    }

    pub fn kind(&self) -> NeighborKind {
        self.link.kind()
    }

    pub fn inflow_only(&self) -> bool {
        self.link.inflow_only()
    }

    pub fn expiration_time(&self) -> f64 {
        self.link.expiration_time()
    }

    pub fn nominal_flow_rate(&self) -> f64 {
        self.link.nominal_flow_rate()
    }

    // ========================================================================
    // Inbox
    // ========================================================================

    /// Queued transfers in ascending time order
    pub fn incoming_material(&self) -> impl Iterator<Item = &MaterialTransfer> {
        self.incoming_material.iter()
    }

    pub fn incoming_len(&self) -> usize {
        self.incoming_material.len()
    }

    /// Insert a transfer keeping the inbox sorted
    ///
    /// # Errors
    ///
    /// `TransferError::Overlap` if the interval shares time with a queued
    /// transfer. Correct negotiation never produces overlap, so this points
    /// at a bug upstream; the inbox is left unchanged.
    pub fn insert_material(&mut self, transfer: MaterialTransfer) -> Result<(), TransferError> {
        let position = self
            .incoming_material
            .partition_point(|queued| queued.start_time() < transfer.start_time());

        let neighbors = [
            position.checked_sub(1).and_then(|i| self.incoming_material.get(i)),
            self.incoming_material.get(position),
        ];
        for queued in neighbors.into_iter().flatten() {
            if queued.overlaps(&transfer) {
                return Err(TransferError::Overlap {
                    start_time: transfer.start_time(),
                    end_time: transfer.end_time(),
                    queued_start: queued.start_time(),
                    queued_end: queued.end_time(),
                });
            }
        }

        self.incoming_material.insert(position, transfer);
        Ok(())
    }

    /// True if queued transfers cover `[current_time, timestep_end_time]`
    /// contiguously, starting exactly at `current_time`
    pub fn all_material_has_arrived(&self, current_time: f64, timestep_end_time: f64) -> bool {
        if current_time >= timestep_end_time {
            return true;
        }

        let mut covered_until = current_time;
        for transfer in &self.incoming_material {
            if transfer.start_time() != covered_until {
                return false;
            }
            covered_until = transfer.end_time();
            if covered_until >= timestep_end_time {
                return true;
            }
        }
        false
    }

    /// Remove and sum the material inside `[current_time, timestep_end_time]`
    ///
    /// A transfer extending past `timestep_end_time` is split: the consumed
    /// share is `material × overlap / duration`, and the remainder stays
    /// queued starting at `timestep_end_time`. The retrieved amount is
    /// booked as inflow (negative) in the short-term accumulator.
    pub fn get_material(&mut self, current_time: f64, timestep_end_time: f64) -> f64 {
        let mut total = 0.0;
        if current_time >= timestep_end_time {
            return total;
        }

        while let Some(front) = self.incoming_material.front().copied() {
            if front.start_time() >= timestep_end_time {
                break;
            }

            self.incoming_material.pop_front();
            let (consumed, remainder) = front.split_at(timestep_end_time);
            total += consumed;

            if let Some(remainder) = remainder {
                self.incoming_material.push_front(remainder);
                break;
            }
        }

        self.flow_cumulative_short_term -= total;
        total
    }

    /// Sum of everything still queued (mass balance, checkpointing)
    pub fn total_water_in_incoming_material(&self) -> f64 {
        self.incoming_material.iter().map(|t| t.material()).sum()
    }

    /// Check ordering and that every entry lies inside `[window_start, window_end]`
    ///
    /// Returns the first offending transfer, if any.
    pub fn first_misplaced_transfer(
        &self,
        window_start: f64,
        window_end: f64,
    ) -> Option<MaterialTransfer> {
        let mut previous_end = window_start;
        for transfer in &self.incoming_material {
            if transfer.start_time() < previous_end || transfer.end_time() > window_end {
                return Some(*transfer);
            }
            previous_end = transfer.end_time();
        }
        None
    }

    // ========================================================================
    // Cumulative flow
    // ========================================================================

    /// Book material sent to the neighbor
    pub fn record_outflow(&mut self, amount: f64) {
        self.flow_cumulative_short_term += amount;
    }

    /// Fold the short-term accumulator into the long-term one
    pub fn fold_cumulative_flow(&mut self) {
        self.flow_cumulative_long_term += self.flow_cumulative_short_term;
        self.flow_cumulative_short_term = 0.0;
    }

    pub fn flow_cumulative_short_term(&self) -> f64 {
        self.flow_cumulative_short_term
    }

    pub fn flow_cumulative_long_term(&self) -> f64 {
        self.flow_cumulative_long_term
    }

    /// True cumulative flow: both accumulators summed
    pub fn cumulative_flow(&self) -> f64 {
        self.flow_cumulative_long_term + self.flow_cumulative_short_term
    }
}

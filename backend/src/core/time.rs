//! Global tick counter and sync-point schedule
//!
//! Elements keep their own clocks; the driver only counts ticks and imposes
//! the next global sync point, an upper bound no element may step past until
//! every element has reached it.

use serde::{Deserialize, Serialize};

/// Tick counter plus the schedule of global sync points
///
/// # Example
/// ```
/// use hydro_simulator_core_rs::SyncSchedule;
///
/// let mut schedule = SyncSchedule::new(100.0, Some(25.0));
/// assert_eq!(schedule.current_tick(), 0);
/// assert_eq!(schedule.next_sync_point(), 25.0);
///
/// schedule.advance_tick();
/// assert_eq!(schedule.current_tick(), 1);
///
/// assert!(schedule.reach_sync_point());
/// assert_eq!(schedule.next_sync_point(), 50.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSchedule {
    /// Driver ticks elapsed since the run started
    current_tick: u64,
    /// Time every element runs to
    simulation_end_time: f64,
    /// Spacing of sync points; `None` means the end time is the only one
    sync_interval: Option<f64>,
    /// Bound handed to `select_timestep_and_move_water` this tick
    next_sync_point: f64,
    /// Number of sync points every element has reached
    sync_points_reached: u64,
}

impl SyncSchedule {
    /// Create a schedule starting at time zero
    ///
    /// # Panics
    /// Panics if `simulation_end_time` is not positive and finite, or if
    /// `sync_interval` is present but not positive and finite. The driver
    /// validates both before building a schedule.
    pub fn new(simulation_end_time: f64, sync_interval: Option<f64>) -> Self {
        assert!(
            simulation_end_time.is_finite() && simulation_end_time > 0.0,
            "simulation_end_time must be positive"
        );
        if let Some(interval) = sync_interval {
            assert!(
                interval.is_finite() && interval > 0.0,
                "sync_interval must be positive"
            );
        }

        let next_sync_point = match sync_interval {
            Some(interval) => interval.min(simulation_end_time),
            None => simulation_end_time,
        };

        Self {
            current_tick: 0,
            simulation_end_time,
            sync_interval,
            next_sync_point,
            sync_points_reached: 0,
        }
    }

    /// Rebuild a schedule from checkpointed values
    pub fn from_state(
        simulation_end_time: f64,
        sync_interval: Option<f64>,
        current_tick: u64,
        next_sync_point: f64,
        sync_points_reached: u64,
    ) -> Self {
        Self {
            current_tick,
            simulation_end_time,
            sync_interval,
            next_sync_point,
            sync_points_reached,
        }
    }

    /// Advance by one driver tick
    pub fn advance_tick(&mut self) {
        self.current_tick += 1;
    }

    /// Record that every element reached the current sync point
    ///
    /// Moves the bound to the next multiple of the interval, capped at the
    /// end time. Returns `false` once the end time itself has been reached,
    /// in which case the schedule no longer moves.
    pub fn reach_sync_point(&mut self) -> bool {
        if self.is_final() {
            return false;
        }

        self.sync_points_reached += 1;
        self.next_sync_point = match self.sync_interval {
            Some(interval) => {
                let next = interval * (self.sync_points_reached + 1) as f64;
                next.min(self.simulation_end_time)
            }
            None => self.simulation_end_time,
        };
        true
    }

    /// Current driver tick
    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Upper bound for any element's next step
    pub fn next_sync_point(&self) -> f64 {
        self.next_sync_point
    }

    /// Number of sync points already reached by every element
    pub fn sync_points_reached(&self) -> u64 {
        self.sync_points_reached
    }

    pub fn simulation_end_time(&self) -> f64 {
        self.simulation_end_time
    }

    pub fn sync_interval(&self) -> Option<f64> {
        self.sync_interval
    }

    /// True when the bound has reached the simulation end time
    pub fn is_final(&self) -> bool {
        self.next_sync_point >= self.simulation_end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "simulation_end_time must be positive")]
    fn test_zero_end_time_panics() {
        SyncSchedule::new(0.0, None);
    }

    #[test]
    #[should_panic(expected = "sync_interval must be positive")]
    fn test_negative_interval_panics() {
        SyncSchedule::new(10.0, Some(-1.0));
    }

    #[test]
    fn test_interval_larger_than_end_time_is_capped() {
        let schedule = SyncSchedule::new(10.0, Some(40.0));
        assert_eq!(schedule.next_sync_point(), 10.0);
        assert!(schedule.is_final());
    }
}

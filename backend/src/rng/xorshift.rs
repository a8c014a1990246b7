//! xorshift64* random number generator
//!
//! Fast PRNG with 64-bit state. Same seed → same sequence.
//!
//! # Streams
//!
//! Hosts evaluate links in whatever order their elements happen to be
//! stored, and possibly on different threads. A single shared generator
//! would make results depend on that order, so callers that need
//! per-link randomness derive an independent stream with
//! [`RngManager::for_stream`] keyed on stable identifiers instead.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use hydro_simulator_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let index = rng.range(0, 100); // [0, 100)
/// let rate = rng.range_f64(-2.0, 2.0);
/// assert!((0..100).contains(&index));
/// assert!((-2.0..2.0).contains(&rate));
/// # let _ = value;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    /// Internal state (64-bit, never zero)
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    pub fn new(seed: u64) -> Self {
        // xorshift must never hold a zero state
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Derive an independent generator for `stream` under `seed`
    ///
    /// The two inputs are mixed with splitmix64 so that nearby stream keys
    /// (consecutive element IDs, adjacent times) start far apart.
    ///
    /// # Example
    /// ```
    /// use hydro_simulator_core_rs::RngManager;
    ///
    /// let mut a = RngManager::for_stream(7, 42);
    /// let mut b = RngManager::for_stream(7, 42);
    /// assert_eq!(a.next(), b.next());
    /// ```
    pub fn for_stream(seed: u64, stream: u64) -> Self {
        let mixed = splitmix64(seed ^ splitmix64(stream));
        Self::new(mixed)
    }

    /// Generate next random u64 value
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Generate random value in range [min, max)
    ///
    /// # Panics
    /// Panics if min >= max
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        assert!(min < max, "min must be less than max");

        let value = self.next();
        let range_size = (max - min) as u64;
        min + (value % range_size) as i64
    }

    /// Generate random f64 in range [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Generate random f64 in range [min, max)
    ///
    /// # Panics
    /// Panics if min >= max
    pub fn range_f64(&mut self, min: f64, max: f64) -> f64 {
        assert!(min < max, "min must be less than max");
        min + self.next_f64() * (max - min)
    }

    /// Get current RNG state (for checkpointing)
    pub fn get_state(&self) -> u64 {
        self.state
    }
}

fn splitmix64(value: u64) -> u64 {
    let mut z = value.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

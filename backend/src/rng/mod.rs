//! Deterministic random number generation
//!
//! Uses xorshift64* for fast, deterministic random number generation.
//! The random topology generator and the random exchange physics both draw
//! from here, so a seed fully determines a run regardless of host layout.

mod xorshift;

pub use xorshift::RngManager;

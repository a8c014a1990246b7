//! Driver-side time keeping

pub mod time;

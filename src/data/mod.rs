//! Measurement data loading

pub mod loader;

pub use loader::{parse_time, DataLoader};

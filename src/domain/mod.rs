pub mod measurement;

pub use measurement::*;

#[cfg(test)]
pub(crate) use measurement::test_support;

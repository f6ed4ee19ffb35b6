//! Test problems shared by tests and benchmarks.

#[cfg(any(test, feature = "test-utils"))]
pub mod test_problems;

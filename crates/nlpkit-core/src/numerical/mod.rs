//! Numerical diagnostics.

pub mod derivative_check;

pub use derivative_check::{CheckKind, DerivativeChecker, DerivativeEntry, DerivativeReport};

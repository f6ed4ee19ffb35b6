//! Building blocks shared by the solvers.

pub mod callback;
pub mod history;
pub mod line_search;
pub mod options;
pub mod quasi_newton;
pub mod record;

pub use callback::*;
pub use history::LbfgsHistory;
pub use line_search::*;
pub use options::SolverOptions;
pub use quasi_newton::QuasiNewtonModel;
pub use record::*;

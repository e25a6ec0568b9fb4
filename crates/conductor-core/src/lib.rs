pub mod control;
pub mod error;
pub mod launch;
pub mod node;
pub mod orchestration;
pub mod ordering;
pub mod policy;
pub mod store;
pub mod types;

pub use error::{ConductorError, Result};

pub mod envelope;
pub mod error;

pub use envelope::{CommandEnvelope, ResultEnvelope};
pub use error::{DispatchError, Result};

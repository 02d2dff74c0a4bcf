pub mod actions;
pub mod context;
pub mod executor;
pub mod normalizer;
pub mod observation;
pub mod runner;
pub mod session;
pub mod stagnation;

#[cfg(test)]
mod testing;

pub use actions::BrowserAction;
pub use executor::{ActionExecutor, ActionOutcome};
pub use normalizer::{CoordinateNormalizer, Resolution};
pub use runner::TaskRunner;
pub use session::{BrowserSession, SessionReport, SessionState};

pub mod config;
pub mod error;
pub mod message;
pub mod paths;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use message::{BridgeNotice, ExecutorCommand, InboundFrame, MouseButton, ScrollDirection};
pub use paths::Paths;
pub use types::{ActionRequest, ActionResultEntry, Decision, Observation, Transcript, TranscriptEntry};

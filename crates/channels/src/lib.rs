pub mod correlator;
pub mod extension;

pub use correlator::{CommandCorrelator, ExecutorReply, FrameOutcome, FrameSink};
pub use extension::{ExtensionServer, TASK_ACK_MESSAGE};

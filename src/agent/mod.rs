pub mod core;
pub mod model;
pub mod providers;

pub use core::{LoopOutcome, LoopState, ReasoningLoop, SessionOutcome};
pub use model::{ReasoningProvider, ReasoningReply, ReasoningRequest};

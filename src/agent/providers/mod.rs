pub mod openai;
pub mod scripted;

pub use openai::OpenAiReasoner;
pub use scripted::ScriptedReasoner;

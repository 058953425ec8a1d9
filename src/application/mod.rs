pub mod use_cases;

pub use use_cases::chat_assistant::ChatAssistant;
pub use use_cases::rti_pipeline::RtiPipeline;

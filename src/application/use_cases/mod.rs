pub mod chat_assistant;
pub mod filter_parser;
pub mod filter_prompt_builder;
pub mod project_summary;
pub mod report_synthesizer;
pub mod rti_pipeline;

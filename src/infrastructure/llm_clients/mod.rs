pub mod gemini;
pub mod retry;

use crate::domain::error::Result;
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;

pub use gemini::GeminiClient;
pub use retry::{RetryPolicy, RetryingClient, Sleeper, TokioSleeper};

#[async_trait]
pub trait LLMClient {
    /// Send one prompt and return the raw generated text.
    async fn generate(&self, config: &LLMConfig, prompt: &str) -> Result<String>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::LLMClient;
    use crate::domain::error::{AppError, Result};
    use crate::domain::llm_config::LLMConfig;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses in order and records every prompt it saw.
    #[derive(Default)]
    pub struct ScriptedClient {
        responses: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        async fn generate(&self, _config: &LLMConfig, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Internal("script exhausted".to_string())))
        }
    }
}

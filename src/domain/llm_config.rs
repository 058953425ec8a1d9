use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum LLMProvider {
    Google,
}

/// Sampling parameters sent as `generationConfig`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
pub struct GenerationParams {
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    #[validate(range(min = 1))]
    pub top_k: u32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub top_p: f32,
    #[validate(range(min = 1))]
    pub max_output_tokens: u32,
}

impl GenerationParams {
    /// Near-greedy sampling for structured filter output.
    pub fn filter_generation() -> Self {
        Self {
            temperature: 0.1,
            top_k: 1,
            top_p: 0.8,
            max_output_tokens: 1024,
        }
    }

    /// Low temperature with room for a long formatted report.
    pub fn report_generation() -> Self {
        Self {
            temperature: 0.2,
            top_k: 40,
            top_p: 0.8,
            max_output_tokens: 8192,
        }
    }

    pub fn chat() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 2048,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub generation: GenerationParams,
}

impl LLMConfig {
    pub fn with_generation(&self, generation: GenerationParams) -> Self {
        Self {
            generation,
            ..self.clone()
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Google,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            generation: GenerationParams::filter_generation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_presets_validate() {
        assert!(GenerationParams::filter_generation().validate().is_ok());
        assert!(GenerationParams::report_generation().validate().is_ok());
        assert!(GenerationParams::chat().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_top_p_rejected() {
        let params = GenerationParams {
            top_p: 1.5,
            ..GenerationParams::filter_generation()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_with_generation_keeps_endpoint() {
        let base = LLMConfig {
            api_key: Some("k".to_string()),
            ..LLMConfig::default()
        };
        let report = base.with_generation(GenerationParams::report_generation());
        assert_eq!(report.model, base.model);
        assert_eq!(report.api_key.as_deref(), Some("k"));
        assert_eq!(report.generation.max_output_tokens, 8192);
    }
}

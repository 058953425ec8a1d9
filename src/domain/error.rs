use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AppError {
    Internal(String),
    NotFound(String),
    ValidationError(String),
    ParseError(String),
    ConfigError(String),
    LLMError(String),
    SecurityError(String),
    DatabaseError(String),
    IoError(String),
    /// Non-success, non-429 response from the text-generation service.
    Upstream { status: u16, body: String },
    /// HTTP 429 from the text-generation service.
    RateLimited(String),
    /// Network failure or timeout talking to the text-generation service.
    Transport(String),
    /// Model output is not a filter expression we can parse.
    MalformedFilter(String),
    /// Model output references a field outside the project schema.
    UnknownField(String),
    /// The filter matched no project records.
    NoMatch(String),
}

impl AppError {
    /// Stable tag for callers that map errors onto their own status codes.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal",
            AppError::NotFound(_) => "not_found",
            AppError::ValidationError(_) => "validation",
            AppError::ParseError(_) => "parse",
            AppError::ConfigError(_) => "config",
            AppError::LLMError(_) => "llm",
            AppError::SecurityError(_) => "security",
            AppError::DatabaseError(_) => "database",
            AppError::IoError(_) => "io",
            AppError::Upstream { .. } => "upstream",
            AppError::RateLimited(_) => "rate_limited",
            AppError::Transport(_) => "transport",
            AppError::MalformedFilter(_) => "malformed_filter",
            AppError::UnknownField(_) => "unknown_field",
            AppError::NoMatch(_) => "no_match",
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::RateLimited(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::LLMError(msg) => write!(f, "LLM error: {}", msg),
            AppError::SecurityError(msg) => write!(f, "Security error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
            AppError::Upstream { status, body } => {
                write!(f, "Upstream error ({}): {}", status, body)
            }
            AppError::RateLimited(msg) => write!(f, "Rate limited by upstream: {}", msg),
            AppError::Transport(msg) => write!(f, "Transport error: {}", msg),
            AppError::MalformedFilter(msg) => write!(f, "Malformed filter: {}", msg),
            AppError::UnknownField(field) => write!(f, "Unknown filter field: {}", field),
            AppError::NoMatch(msg) => write!(f, "No matching project: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

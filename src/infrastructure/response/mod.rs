use once_cell::sync::Lazy;
use regex::Regex;

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<think>[\s\S]*?</think>|<think\s*/>").unwrap());

static REASONING_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<reasoning>[\s\S]*?</reasoning>").unwrap());

static MULTIPLE_NEWLINES_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static LEADING_FENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```[A-Za-z]*[ \t]*\r?\n?").unwrap());

static TRAILING_FENCE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n?\s*```\s*$").unwrap());

/// Cleans LLM response by removing reasoning tags and excess blank lines
pub fn clean_llm_response(response: &str) -> String {
    let mut cleaned = THINK_TAG_PATTERN.replace_all(response, "").to_string();
    cleaned = REASONING_TAG_PATTERN.replace_all(&cleaned, "").to_string();

    cleaned = cleaned.trim().to_string();

    // Collapse multiple consecutive newlines into at most two
    MULTIPLE_NEWLINES_PATTERN
        .replace_all(&cleaned, "\n\n")
        .to_string()
}

/// Removes a surrounding Markdown code fence (```json ... ``` or ``` ... ```).
pub fn strip_code_fence(value: &str) -> String {
    let without_leading = LEADING_FENCE_PATTERN.replace(value, "");
    TRAILING_FENCE_PATTERN
        .replace(&without_leading, "")
        .trim()
        .to_string()
}

/// Clean + unfence: what the filter parser feeds to serde.
pub fn extract_json_payload(output: &str) -> String {
    strip_code_fence(&clean_llm_response(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_think_tags() {
        let input = "<think>Some reasoning here</think>The actual response";
        assert_eq!(clean_llm_response(input), "The actual response");
    }

    #[test]
    fn test_clean_self_closing_think() {
        assert_eq!(clean_llm_response("<think />Report"), "Report");
    }

    #[test]
    fn test_clean_multiple_newlines() {
        let input = "## 1. QUERY RECEIVED\n\n\n\n\n- Subject";
        assert_eq!(clean_llm_response(input), "## 1. QUERY RECEIVED\n\n- Subject");
    }

    #[test]
    fn test_strip_json_fence() {
        let input = "```json\n{\"status\":\"Ongoing\"}\n```";
        assert_eq!(strip_code_fence(input), "{\"status\":\"Ongoing\"}");
    }

    #[test]
    fn test_strip_bare_fence_single_line() {
        assert_eq!(strip_code_fence("```{}```"), "{}");
    }

    #[test]
    fn test_strip_leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_extract_json_payload_combined() {
        let input = "<think>map wayanad to district</think>\n```json\n{}\n```\n";
        assert_eq!(extract_json_payload(input), "{}");
    }
}

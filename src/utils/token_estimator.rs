//! Fast word-count token heuristic, used where an exact tokenizer call would
//! be overkill (batch-threshold decisions, rough budget checks). The chunker
//! (`document::chunker`) uses the real tiktoken-backed counter for anything
//! that determines chunk boundaries; this estimator is never used for that.

/// Estimate tokens from text using a word-based heuristic (~1.3 tokens/word
/// for mixed natural-language content, plus a small formatting overhead).
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let words = text.split_whitespace().count();
    ((words as f64 * 1.3) + 5.0).ceil() as usize
}

/// Check if adding `new_text` would push `current_tokens` past `max_tokens`.
pub fn would_exceed_limit(current_tokens: usize, new_text: &str, max_tokens: usize) -> bool {
    current_tokens + estimate_tokens(new_text) > max_tokens
}

/// Estimate tokens for a system prompt plus its context block.
pub fn estimate_system_tokens(system_prompt: &str, context: &str) -> usize {
    estimate_tokens(system_prompt) + estimate_tokens(context) + 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_heuristic() {
        let text = "the quick brown fox jumps over the lazy";
        let tokens = estimate_tokens(text);
        assert!(tokens >= 13 && tokens <= 16);
    }

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn would_exceed_respects_budget() {
        let current = 1000;
        let text = "word ".repeat(500);
        assert!(would_exceed_limit(current, &text, 1500));
        assert!(!would_exceed_limit(current, &text, 2000));
    }
}

const BYTES_PER_TOKEN: usize = 4;

/// Rough token estimate used for output budgets.
pub fn count_tokens(text: &str) -> usize {
    text.len().div_ceil(BYTES_PER_TOKEN)
}

/// Cuts `text` so that it fits in `max_tokens` including `suffix`.
pub fn truncate_text(text: &str, max_tokens: usize, suffix: &str) -> String {
    if count_tokens(text) <= max_tokens {
        return text.to_string();
    }

    let budget = (max_tokens * BYTES_PER_TOKEN).saturating_sub(suffix.len());
    let mut cut = budget.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }

    // Prefer ending on a line boundary when one is reasonably close.
    if let Some(newline) = text[..cut].rfind('\n')
        && newline >= cut / 2
    {
        cut = newline;
    }

    format!("{}{}", &text[..cut], suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_four_bytes_per_token() {
        assert_eq!(count_tokens(""), 0);
        assert_eq!(count_tokens("abcd"), 1);
        assert_eq!(count_tokens("abcde"), 2);
    }

    #[test]
    fn short_text_untouched() {
        assert_eq!(truncate_text("hello", 10, "..."), "hello");
    }

    #[test]
    fn truncates_within_budget() {
        let text = "line one\n".repeat(100);
        let out = truncate_text(&text, 10, "\n[cut]");
        assert!(out.ends_with("\n[cut]"));
        assert!(out.len() <= 40);
        assert!(out.starts_with("line one\nline one"));
    }

    #[test]
    fn never_splits_a_char() {
        let text = "é".repeat(50);
        let out = truncate_text(&text, 3, "");
        assert!(out.len() <= 12);
        assert!(out.chars().all(|c| c == 'é'));
    }
}

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\w+").expect("valid regex"));
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@[\w.]+").expect("valid regex"));

/// `#tags` in caption order, lowercased, `#` kept. Repeats are preserved.
pub fn extract_hashtags(caption: &str) -> Vec<String> {
    HASHTAG_RE
        .find_iter(caption)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// `@handles` in caption order, lowercased, `@` kept. Trailing dots (sentence
/// punctuation) are not part of the handle. Repeats are preserved.
pub fn extract_mentions(caption: &str) -> Vec<String> {
    MENTION_RE
        .find_iter(caption)
        .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
        .filter(|m| m.len() > 1)
        .collect()
}

/// Tokens from several captions concatenated, keeping only the first
/// occurrence of each.
pub fn merge_tokens<'a>(
    captions: impl IntoIterator<Item = &'a str>,
    extract: fn(&str) -> Vec<String>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    captions
        .into_iter()
        .flat_map(extract)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Normalize a tag supplied as structured data (with or without `#`).
pub fn normalize_tag(raw: &str) -> Option<String> {
    let tag = raw.trim().trim_start_matches('#');
    if tag.is_empty() || !tag.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some(format!("#{}", tag.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_hashtags_keep_caption_order() {
        let tags = extract_hashtags("Loving this #summer look, so #summer!");
        assert_eq!(tags, vec!["#summer", "#summer"]);
    }

    #[test]
    fn hashtags_are_lowercased() {
        assert_eq!(extract_hashtags("#LTKHome and #Cozy_Vibes"), vec!["#ltkhome", "#cozy_vibes"]);
    }

    #[test]
    fn mentions_drop_sentence_punctuation() {
        let mentions = extract_mentions("Dress from @Nordstrom. Shoes via @target.style");
        assert_eq!(mentions, vec!["@nordstrom", "@target.style"]);
    }

    #[test]
    fn merged_captions_dedup_across_captions() {
        let merged = merge_tokens(["#a #b #a", "#b #c"], extract_hashtags);
        assert_eq!(merged, vec!["#a", "#b", "#c"]);
    }

    #[test]
    fn structured_tags_are_normalized() {
        assert_eq!(normalize_tag("Summer").as_deref(), Some("#summer"));
        assert_eq!(normalize_tag("#Fall").as_deref(), Some("#fall"));
        assert_eq!(normalize_tag("two words"), None);
        assert_eq!(normalize_tag(""), None);
    }

    #[test]
    fn empty_caption_has_no_tokens() {
        assert!(extract_hashtags("").is_empty());
        assert!(extract_mentions("").is_empty());
    }
}

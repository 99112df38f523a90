// Embedded page-state strategy: reads the serialized `__NEXT_DATA__` blob the
// site ships with its HTML and emits one post fragment per post object.

use serde_json::Value;
use shopscout_common::{CandidateFragment, Position, Strategy};
use tracing::debug;

use super::json::{post_from_json, post_refs};
use super::{Extractor, StrategyOutput};
use crate::capture::RawCapture;
use crate::patterns::NEXT_DATA_RE;

/// Where post lists live inside the state blob, most specific first.
const POST_LIST_POINTERS: &[&str] = &[
    "/props/pageProps/posts",
    "/props/pageProps/ltks",
    "/pageProps/posts",
    "/posts",
];

pub struct EmbeddedStateExtractor;

impl EmbeddedStateExtractor {
    /// The blob the driver read directly, else the script tag in the snapshot.
    fn state_blob(capture: &RawCapture) -> Option<String> {
        if let Some(state) = capture.embedded_state.as_deref().filter(|s| !s.trim().is_empty()) {
            return Some(state.to_string());
        }
        let html = capture.dom_snapshot.as_deref()?;
        let raw = NEXT_DATA_RE.captures(html)?.get(1)?.as_str().trim();
        (!raw.is_empty()).then(|| raw.to_string())
    }
}

impl Extractor for EmbeddedStateExtractor {
    fn strategy(&self) -> Strategy {
        Strategy::EmbeddedState
    }

    fn extract(&self, capture: &RawCapture) -> StrategyOutput {
        let Some(blob) = Self::state_blob(capture) else {
            return StrategyOutput::unavailable(self.strategy(), "no embedded state blob");
        };

        let state: Value = match serde_json::from_str(&blob) {
            Ok(v) => v,
            Err(e) => {
                return StrategyOutput::unavailable(
                    self.strategy(),
                    format!("embedded state is not valid JSON: {e}"),
                );
            }
        };

        let Some(items) = POST_LIST_POINTERS
            .iter()
            .find_map(|pointer| state.pointer(pointer)?.as_array())
        else {
            return StrategyOutput::unavailable(self.strategy(), "embedded state has no post list");
        };

        let mut fragments = Vec::with_capacity(items.len());
        let mut skipped = 0;
        for (index, item) in items.iter().enumerate() {
            if !item.is_object() {
                skipped += 1;
                continue;
            }
            let fields = post_from_json(item);
            let refs = post_refs(item, &fields);
            let fragment = refs
                .into_iter()
                .fold(CandidateFragment::post(self.strategy(), fields), |f, r| f.with_ref(r))
                .with_position(Position::array_index(index));
            fragments.push(fragment);
        }

        debug!(posts = fragments.len(), skipped, "embedded_state: extracted");
        StrategyOutput::applied(self.strategy(), fragments, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::StrategyOutcome;

    fn capture_with_html(html: &str) -> RawCapture {
        RawCapture {
            dom_snapshot: Some(html.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn reads_posts_from_next_data_script() {
        let html = r#"<html><script id="__NEXT_DATA__" type="application/json">
            {"props":{"pageProps":{"posts":[
                {"id":"p1","url":"https://site/explore/alice/posts/p1","caption":"Hi #tag"},
                {"id":"p2","share_url":"https://site/explore/bob/posts/p2"}
            ]}}}
        </script></html>"#;

        let output = EmbeddedStateExtractor.extract(&capture_with_html(html));
        assert!(output.is_available());
        assert_eq!(output.fragments.len(), 2);

        let first = &output.fragments[0];
        assert_eq!(first.as_post().unwrap().post_id.as_deref(), Some("p1"));
        assert_eq!(first.username_ref(), Some("alice"));
        assert_eq!(first.position(), Some(Position::array_index(0)));
        assert_eq!(output.fragments[1].position(), Some(Position::array_index(1)));
    }

    #[test]
    fn direct_state_wins_over_script_tag() {
        let capture = RawCapture {
            embedded_state: Some(r#"{"props":{"pageProps":{"ltks":[{"id":"direct"}]}}}"#.into()),
            dom_snapshot: Some(
                r#"<script id="__NEXT_DATA__">{"props":{"pageProps":{"posts":[{"id":"tag"}]}}}</script>"#
                    .into(),
            ),
            ..Default::default()
        };
        let output = EmbeddedStateExtractor.extract(&capture);
        assert_eq!(output.fragments.len(), 1);
        assert_eq!(output.fragments[0].as_post().unwrap().post_id.as_deref(), Some("direct"));
    }

    #[test]
    fn missing_blob_is_unavailable() {
        let output = EmbeddedStateExtractor.extract(&capture_with_html("<html></html>"));
        assert!(matches!(output.outcome, StrategyOutcome::Unavailable(_)));
        assert!(output.fragments.is_empty());
    }

    #[test]
    fn malformed_blob_is_unavailable_not_a_panic() {
        let html = r#"<script id="__NEXT_DATA__">{"props": {"pageProps": </script>"#;
        let output = EmbeddedStateExtractor.extract(&capture_with_html(html));
        assert!(!output.is_available());
    }

    #[test]
    fn non_object_items_are_skipped() {
        let capture = RawCapture {
            embedded_state: Some(r#"{"posts":[42, {"id":"ok"}, null]}"#.into()),
            ..Default::default()
        };
        let output = EmbeddedStateExtractor.extract(&capture);
        assert_eq!(output.fragments.len(), 1);
        assert_eq!(output.skipped, 2);
        assert_eq!(output.fragments[0].position(), Some(Position::array_index(1)));
    }
}

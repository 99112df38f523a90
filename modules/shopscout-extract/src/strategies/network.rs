// Network-interception strategy: parses intercepted API responses. Posts,
// profiles and products are keyed by id across every response; a later
// response for the same id overwrites the earlier one, but the id keeps the
// slot where it was first seen.

use std::collections::HashMap;

use serde_json::Value;
use shopscout_common::{CandidateFragment, Position, Strategy};
use tracing::{debug, warn};

use super::json::{array_at, post_from_json, post_refs, product_from_json, profile_from_json, str_at};
use super::{Extractor, StrategyOutput};
use crate::capture::{CapturedResponse, RawCapture};

pub struct NetworkExtractor {
    host_filter: Option<String>,
}

/// Id-keyed map that remembers first-discovery order.
struct Keyed {
    order: Vec<String>,
    latest: HashMap<String, CandidateFragment>,
}

impl Keyed {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            latest: HashMap::new(),
        }
    }

    fn upsert(&mut self, id: String, fragment: CandidateFragment) {
        if !self.latest.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.latest.insert(id, fragment);
    }

    /// Fragments in discovery order, positioned by their discovery slot.
    fn into_fragments(mut self) -> Vec<CandidateFragment> {
        self.order
            .iter()
            .enumerate()
            .filter_map(|(slot, id)| {
                self.latest
                    .remove(id)
                    .map(|f| f.with_position(Position::array_index(slot)))
            })
            .collect()
    }
}

impl NetworkExtractor {
    pub fn new(host_filter: Option<String>) -> Self {
        Self { host_filter }
    }

    fn accepts(&self, response: &CapturedResponse) -> bool {
        if !response.content_type.to_ascii_lowercase().contains("json") {
            return false;
        }
        match (&self.host_filter, &response.url) {
            (Some(host), Some(url)) => url.contains(host.as_str()),
            _ => true,
        }
    }
}

impl Extractor for NetworkExtractor {
    fn strategy(&self) -> Strategy {
        Strategy::NetworkInterception
    }

    fn extract(&self, capture: &RawCapture) -> StrategyOutput {
        let strategy = self.strategy();
        if capture.responses.is_empty() {
            return StrategyOutput::unavailable(strategy, "no intercepted responses");
        }

        let mut posts = Keyed::new();
        let mut profiles = Keyed::new();
        let mut products = Keyed::new();
        let mut skipped = 0;
        let mut parsed = 0;

        for response in capture.responses.iter().filter(|r| self.accepts(r)) {
            let body: Value = match serde_json::from_slice(&response.body) {
                Ok(v) => v,
                Err(e) => {
                    warn!(url = ?response.url, error = %e, "network: unparsable response body");
                    skipped += 1;
                    continue;
                }
            };
            parsed += 1;

            for item in array_at(&body, &["ltks", "posts"]).into_iter().flatten() {
                let Some(id) = str_at(item, &["id"]) else {
                    skipped += 1;
                    continue;
                };
                let fields = post_from_json(item);
                let refs = post_refs(item, &fields);
                let fragment = refs
                    .into_iter()
                    .fold(CandidateFragment::post(strategy, fields), |f, r| f.with_ref(r));
                posts.upsert(id, fragment);
            }

            for item in array_at(&body, &["profiles"]).into_iter().flatten() {
                let Some(id) = str_at(item, &["id"]) else {
                    skipped += 1;
                    continue;
                };
                profiles.upsert(id, CandidateFragment::profile(strategy, profile_from_json(item)));
            }

            for item in array_at(&body, &["products"]).into_iter().flatten() {
                let Some(id) = str_at(item, &["id"]) else {
                    skipped += 1;
                    continue;
                };
                products.upsert(id, CandidateFragment::product(strategy, product_from_json(item)));
            }
        }

        if parsed == 0 {
            return StrategyOutput {
                skipped,
                ..StrategyOutput::unavailable(strategy, "no parsable JSON responses")
            };
        }

        let mut fragments = posts.into_fragments();
        fragments.extend(profiles.into_fragments());
        fragments.extend(products.into_fragments());

        debug!(fragments = fragments.len(), responses = parsed, skipped, "network: extracted");
        StrategyOutput::applied(strategy, fragments, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopscout_common::FragmentKind;

    const API: &str = "https://api-gateway.shopltk.com/api/v2/ltks";

    fn response(url: Option<&str>, content_type: &str, body: &str) -> CapturedResponse {
        CapturedResponse::new(url.map(String::from), content_type, body.to_string())
    }

    fn extractor() -> NetworkExtractor {
        NetworkExtractor::new(Some("api-gateway.shopltk.com".into()))
    }

    #[test]
    fn later_response_overwrites_but_keeps_first_slot() {
        let capture = RawCapture {
            responses: vec![
                response(Some(API), "application/json", r#"{"ltks":[{"id":"a","caption":"old"},{"id":"b"}]}"#),
                response(Some(API), "application/json; charset=utf-8", r#"{"ltks":[{"id":"a","caption":"new"}]}"#),
            ],
            ..Default::default()
        };
        let output = extractor().extract(&capture);
        let posts: Vec<_> = output.fragments.iter().filter_map(|f| f.as_post()).collect();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].post_id.as_deref(), Some("a"));
        assert_eq!(posts[0].caption.as_deref(), Some("new"));
        assert_eq!(posts[1].post_id.as_deref(), Some("b"));
    }

    #[test]
    fn profiles_and_products_become_fragments_with_refs_on_posts() {
        let body = r#"{
            "ltks": [{"id":"p1","profile_id":"u1","product_ids":["x1"],"ltk_url":"https://site/explore/alice/posts/p1"}],
            "profiles": [{"id":"u1","username":"alice","avatar_url":"https://a/alice.jpg"}],
            "products": [{"id":"x1","name":"Boots","retailer_display_name":"Shop","price":"$80"}]
        }"#;
        let capture = RawCapture {
            responses: vec![response(Some(API), "application/json", body)],
            ..Default::default()
        };
        let output = extractor().extract(&capture);
        let kinds: Vec<FragmentKind> = output.fragments.iter().map(|f| f.kind()).collect();
        assert_eq!(kinds, vec![FragmentKind::Post, FragmentKind::Profile, FragmentKind::Product]);

        let post = &output.fragments[0];
        assert_eq!(post.profile_id_ref(), Some("u1"));
        assert_eq!(post.product_id_refs().collect::<Vec<_>>(), vec!["x1"]);
        let product = output.fragments[2].as_product().unwrap();
        assert_eq!(product.brand.as_deref(), Some("Shop"));
        assert_eq!(product.price, Some(80.0));
    }

    #[test]
    fn non_json_and_foreign_hosts_are_ignored() {
        let capture = RawCapture {
            responses: vec![
                response(Some(API), "text/html", r#"{"ltks":[{"id":"html"}]}"#),
                response(Some("https://tracker.example/ev"), "application/json", r#"{"ltks":[{"id":"foreign"}]}"#),
                response(None, "application/json", r#"{"ltks":[{"id":"unknown-url"}]}"#),
            ],
            ..Default::default()
        };
        let output = extractor().extract(&capture);
        let ids: Vec<_> = output
            .fragments
            .iter()
            .filter_map(|f| f.as_post()?.post_id.clone())
            .collect();
        assert_eq!(ids, vec!["unknown-url"]);
    }

    #[test]
    fn bad_bodies_and_id_less_items_are_skipped() {
        let capture = RawCapture {
            responses: vec![
                response(Some(API), "application/json", "{not json"),
                response(Some(API), "application/json", r#"{"ltks":[{"caption":"no id"},{"id":"ok"}]}"#),
            ],
            ..Default::default()
        };
        let output = extractor().extract(&capture);
        assert!(output.is_available());
        assert_eq!(output.skipped, 2);
        assert_eq!(output.fragments.len(), 1);
    }

    #[test]
    fn nothing_parsable_is_unavailable() {
        let capture = RawCapture {
            responses: vec![response(Some(API), "application/json", "<html>")],
            ..Default::default()
        };
        let output = extractor().extract(&capture);
        assert!(!output.is_available());
        assert_eq!(output.skipped, 1);

        assert!(!extractor().extract(&RawCapture::default()).is_available());
    }
}

// DOM-regex strategy: fallback pattern matching over the raw HTML snapshot.
// Nothing here carries a structured id, so every fragment is stamped with
// the character offset of its match and left to proximity correlation.

use std::collections::HashSet;

use shopscout_common::{
    CandidateFragment, MediaRole, Position, PostFields, ProductFields, ProfileFields, Strategy,
};
use tracing::debug;

use super::json::product_from_json;
use super::{Extractor, StrategyOutput};
use crate::capture::RawCapture;
use crate::patterns::{
    decode_entities, AFFILIATE_RE, AVATAR_RE, CONTENT_IMAGE_RE, INLINE_PRODUCT_RE,
    OG_DESCRIPTION_RE, POST_PERMALINK_RE, PROFILE_LINK_RE, VIDEO_RE,
};

pub struct DomRegexExtractor;

impl DomRegexExtractor {
    fn posts(html: &str) -> Vec<CandidateFragment> {
        let mut seen = HashSet::new();
        let mut posts = Vec::new();
        for caps in POST_PERMALINK_RE.captures_iter(html) {
            let (Some(whole), Some(href), Some(id)) = (caps.get(0), caps.get(1), caps.get(3)) else {
                continue;
            };
            if !seen.insert(id.as_str().to_string()) {
                continue;
            }
            let fields = PostFields {
                post_id: Some(id.as_str().to_string()),
                post_url: Some(decode_entities(href.as_str())),
                ..Default::default()
            };
            posts.push(
                CandidateFragment::post(Strategy::DomRegex, fields)
                    .with_position(Position::byte_offset(whole.start())),
            );
        }
        posts
    }

    fn profiles(html: &str) -> Vec<CandidateFragment> {
        PROFILE_LINK_RE
            .captures_iter(html)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let fields = ProfileFields {
                    username: Some(caps.get(2)?.as_str().to_string()),
                    profile_url: Some(decode_entities(caps.get(1)?.as_str())),
                    ..Default::default()
                };
                Some(
                    CandidateFragment::profile(Strategy::DomRegex, fields)
                        .with_position(Position::byte_offset(whole.start())),
                )
            })
            .collect()
    }

    fn media(html: &str) -> Vec<CandidateFragment> {
        let roles = [
            (&*AVATAR_RE, MediaRole::Avatar),
            (&*CONTENT_IMAGE_RE, MediaRole::Image),
            (&*VIDEO_RE, MediaRole::Video),
        ];
        let mut found: Vec<CandidateFragment> = roles
            .into_iter()
            .flat_map(|(re, role)| {
                re.find_iter(html).map(move |m| {
                    CandidateFragment::media(Strategy::DomRegex, role, decode_entities(m.as_str()))
                        .with_position(Position::byte_offset(m.start()))
                })
            })
            .collect();
        found.sort_by_key(|f| f.position().map(|p| p.value));
        found
    }

    /// Affiliate links and inline product objects. Inline objects that do not
    /// parse are counted as skipped.
    fn products(html: &str) -> (Vec<CandidateFragment>, usize) {
        let mut products = Vec::new();
        let mut skipped = 0;

        for caps in AFFILIATE_RE.captures_iter(html) {
            let (Some(whole), Some(url), Some(id)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            let fields = ProductFields {
                id: Some(id.as_str().to_string()),
                url: Some(decode_entities(url.as_str())),
                ..Default::default()
            };
            products.push(
                CandidateFragment::product(Strategy::DomRegex, fields)
                    .with_position(Position::byte_offset(whole.start())),
            );
        }

        for caps in INLINE_PRODUCT_RE.captures_iter(html) {
            let (Some(whole), Some(object)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            match serde_json::from_str::<serde_json::Value>(object.as_str()) {
                Ok(value) => products.push(
                    CandidateFragment::product(Strategy::DomRegex, product_from_json(&value))
                        .with_position(Position::byte_offset(whole.start())),
                ),
                Err(_) => skipped += 1,
            }
        }

        products.sort_by_key(|f| f.position().map(|p| p.value));
        (products, skipped)
    }

    /// `og:description` of a single-post detail page.
    fn detail_caption(html: &str) -> Option<String> {
        let raw = OG_DESCRIPTION_RE.captures(html)?.get(1)?.as_str();
        let caption = decode_entities(raw.trim());
        (!caption.is_empty()).then_some(caption)
    }
}

impl Extractor for DomRegexExtractor {
    fn strategy(&self) -> Strategy {
        Strategy::DomRegex
    }

    fn extract(&self, capture: &RawCapture) -> StrategyOutput {
        let Some(html) = capture.dom_snapshot.as_deref() else {
            return StrategyOutput::unavailable(self.strategy(), "no DOM snapshot");
        };

        let mut posts = Self::posts(html);
        if posts.len() == 1 {
            if let Some(caption) = Self::detail_caption(html) {
                let only = &posts[0];
                let mut fields = only.as_post().cloned().unwrap_or_default();
                fields.caption = Some(caption);
                let mut rebuilt = CandidateFragment::post(Strategy::DomRegex, fields);
                if let Some(position) = only.position() {
                    rebuilt = rebuilt.with_position(position);
                }
                posts[0] = rebuilt;
            }
        }

        let profiles = Self::profiles(html);
        let media = Self::media(html);
        let (products, skipped) = Self::products(html);

        debug!(
            posts = posts.len(),
            profiles = profiles.len(),
            media = media.len(),
            products = products.len(),
            "dom_regex: extracted"
        );

        let mut fragments = posts;
        fragments.extend(profiles);
        fragments.extend(media);
        fragments.extend(products);
        StrategyOutput::applied(self.strategy(), fragments, skipped)
    }
}

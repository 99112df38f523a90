// Normalization: turns correlated posts into the canonical output shape.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use shopscout_common::{CanonicalPost, Creator, Media, PipelineConfig, Product, ProductFields};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::correlate::CorrelatedPost;
use crate::patterns::{profile_url, replace_width_param};
use crate::text::{extract_hashtags, extract_mentions, merge_tokens};

/// Labels stamped on every record of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub source_page: String,
    pub category: String,
    pub scraped_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(source_page: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source_page: source_page.into(),
            category: category.into(),
            scraped_at: Utc::now(),
        }
    }
}

/// Absolute form of a URL: trimmed, `//host` given `https:`, relative paths
/// joined onto `base`, fragment removed.
pub fn canonical_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut url = parse_absolute(trimmed, base)?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Post permalinks additionally lose their query string and trailing slash,
/// so two captures of one post compare equal.
pub fn canonical_post_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut url = parse_absolute(trimmed, base)?;
    url.set_fragment(None);
    url.set_query(None);
    let path = url.path().trim_end_matches('/').to_string();
    if !path.is_empty() {
        url.set_path(&path);
    }
    Some(url.to_string())
}

fn parse_absolute(raw: &str, base: Option<&Url>) -> Option<Url> {
    if let Some(rest) = raw.strip_prefix("//") {
        return Url::parse(&format!("https://{rest}")).ok();
    }
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(raw).ok(),
        Err(_) => None,
    }
}

/// Thumbnail URL for a hero image. Empty hero, empty thumbnail.
pub fn derive_thumbnail(hero_image_url: &str, width: u32) -> String {
    if hero_image_url.is_empty() {
        return String::new();
    }
    replace_width_param(hero_image_url, width)
}

/// RFC 3339 first, then naive date-times and dates (read as UTC), then unix
/// seconds or milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    if raw.chars().all(|c| c.is_ascii_digit()) {
        let n: i64 = raw.parse().ok()?;
        return if n >= 1_000_000_000_000 {
            Utc.timestamp_millis_opt(n).single()
        } else {
            Utc.timestamp_opt(n, 0).single()
        };
    }
    None
}

pub struct Normalizer<'a> {
    config: &'a PipelineConfig,
    base: Option<Url>,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            base: Url::parse(config.base_url()).ok(),
        }
    }

    fn url(&self, raw: Option<&str>) -> Option<String> {
        canonical_url(raw?, self.base.as_ref())
    }

    /// Canonical record for one correlated post, or `None` when its
    /// permalink cannot be made absolute.
    pub fn normalize(&self, post: CorrelatedPost, ctx: &RunContext) -> Option<CanonicalPost> {
        let Some(post_url) = post
            .fields
            .post_url
            .as_deref()
            .and_then(|raw| canonical_post_url(raw, self.base.as_ref()))
        else {
            debug!(post_id = post.post_id.as_str(), "Permalink is not a usable URL");
            return None;
        };

        let caption = post.captions.first().cloned().unwrap_or_default();
        let (mut hashtags, mentions) = match post.captions.as_slice() {
            [] => (Vec::new(), Vec::new()),
            [only] => (extract_hashtags(only), extract_mentions(only)),
            many => (
                merge_tokens(many.iter().map(String::as_str), extract_hashtags),
                merge_tokens(many.iter().map(String::as_str), extract_mentions),
            ),
        };
        if hashtags.is_empty() {
            hashtags = dedup_strings(post.fields.hashtags.iter().cloned());
        }

        let hero_image_url = self.url(post.fields.hero_image_url.as_deref()).unwrap_or_default();
        let thumbnail_url = derive_thumbnail(&hero_image_url, self.config.thumbnail_width);
        let images = post
            .image_urls
            .iter()
            .filter_map(|raw| self.url(Some(raw)));
        let all_image_urls = dedup_strings(
            (!hero_image_url.is_empty())
                .then(|| hero_image_url.clone())
                .into_iter()
                .chain(images),
        );
        let media = Media::new(
            hero_image_url,
            thumbnail_url,
            all_image_urls,
            self.url(post.fields.video_url.as_deref()),
        );

        let creator = post.creator.as_ref().map_or_else(Creator::default, |c| {
            let profile = self
                .url(c.profile_url.as_deref())
                .or_else(|| c.username.as_deref().map(|u| profile_url(self.config.base_url(), u)));
            Creator {
                username: c.username.clone(),
                avatar_url: self.url(c.avatar_url.as_deref()),
                profile_url: profile,
            }
        });

        let products = post
            .products
            .iter()
            .filter_map(|p| self.product(p))
            .collect();

        Some(CanonicalPost {
            post_id: post.post_id,
            post_url,
            source_page: ctx.source_page.clone(),
            category: ctx.category.clone(),
            creator,
            caption,
            hashtags,
            mentions,
            media,
            products,
            scraped_at: ctx.scraped_at,
            published_at: post.fields.published_at.as_deref().and_then(parse_timestamp),
        })
    }

    /// Products need at least a title or a link to be worth keeping.
    fn product(&self, fields: &ProductFields) -> Option<Product> {
        let url = self.url(fields.url.as_deref());
        if fields.title.is_none() && url.is_none() {
            return None;
        }
        Some(Product {
            title: fields.title.clone().unwrap_or_default(),
            brand: fields.brand.clone().unwrap_or_default(),
            price: fields.price,
            url: url.unwrap_or_default(),
            image_url: self.url(fields.image_url.as_deref()).unwrap_or_default(),
        })
    }
}

fn dedup_strings(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|s| seen.insert(s.clone())).collect()
}

#[cfg(test)]
mod tests {
    use shopscout_common::{PostFields, ProfileFields, Strategy};

    use super::*;
    use crate::correlate::CreatorMatch;

    fn base() -> Url {
        Url::parse("https://www.shopltk.com").unwrap()
    }

    fn correlated(captions: &[&str]) -> CorrelatedPost {
        CorrelatedPost {
            post_id: "p1".into(),
            fields: PostFields {
                post_id: Some("p1".into()),
                post_url: Some("/explore/alice/posts/p1/?share=1#top".into()),
                hero_image_url: Some("//cdn.example/hero.jpg?w=450&h=600".into()),
                ..Default::default()
            },
            captions: captions.iter().map(|c| c.to_string()).collect(),
            image_urls: vec![
                "https://cdn.example/hero.jpg?w=450&h=600".into(),
                "https://cdn.example/two.jpg".into(),
                "https://cdn.example/two.jpg".into(),
            ],
            creator: Some(ProfileFields {
                username: Some("alice".into()),
                ..Default::default()
            }),
            creator_match: CreatorMatch::Reference,
            products: vec![],
            sources: vec![Strategy::EmbeddedState],
        }
    }

    // --- URLs ---

    #[test]
    fn canonical_url_handles_protocol_relative_and_relative() {
        assert_eq!(
            canonical_url("//cdn.example/a.jpg", None).as_deref(),
            Some("https://cdn.example/a.jpg")
        );
        assert_eq!(
            canonical_url(" /explore/bob#x ", Some(&base())).as_deref(),
            Some("https://www.shopltk.com/explore/bob")
        );
        assert_eq!(canonical_url("/relative", None), None);
        assert_eq!(canonical_url("", Some(&base())), None);
    }

    #[test]
    fn post_urls_lose_query_and_trailing_slash() {
        let a = canonical_post_url("https://www.shopltk.com/explore/a/posts/p1/?utm=1", None);
        let b = canonical_post_url("/explore/a/posts/p1", Some(&base()));
        assert_eq!(a.as_deref(), Some("https://www.shopltk.com/explore/a/posts/p1"));
        assert_eq!(a, b);
    }

    // --- Thumbnails ---

    #[test]
    fn thumbnail_is_idempotent() {
        let hero = "https://cdn/x.jpg?w=450";
        let once = derive_thumbnail(hero, 150);
        assert_eq!(once, "https://cdn/x.jpg?w=150");
        assert_eq!(derive_thumbnail(&once, 150), once);
        assert_eq!(derive_thumbnail("", 150), "");
        assert_eq!(derive_thumbnail("https://cdn/plain.jpg", 150), "https://cdn/plain.jpg");
    }

    // --- Timestamps ---

    #[test]
    fn timestamps_parse_in_several_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T10:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("1714557600"), Some(expected));
        assert_eq!(parse_timestamp("1714557600000"), Some(expected));
        assert!(parse_timestamp("2024-05-01").is_some());
        assert_eq!(parse_timestamp("last tuesday"), None);
    }

    // --- Records ---

    #[test]
    fn normalizes_a_correlated_post() {
        let config = PipelineConfig::default();
        let ctx = RunContext::new("https://www.shopltk.com/categories/ltkhome", "ltkhome");
        let post = Normalizer::new(&config)
            .normalize(correlated(&["Hi #Tag with @Brand.co"]), &ctx)
            .unwrap();

        assert_eq!(post.post_url, "https://www.shopltk.com/explore/alice/posts/p1");
        assert_eq!(post.caption, "Hi #Tag with @Brand.co");
        assert_eq!(post.hashtags, vec!["#tag"]);
        assert_eq!(post.mentions, vec!["@brand.co"]);
        assert_eq!(post.media.hero_image_url, "https://cdn.example/hero.jpg?w=450&h=600");
        assert_eq!(post.media.thumbnail_url, "https://cdn.example/hero.jpg?w=150&h=600");
        assert_eq!(
            post.media.all_image_urls,
            vec!["https://cdn.example/hero.jpg?w=450&h=600", "https://cdn.example/two.jpg"]
        );
        assert!(!post.media.has_video);
        assert_eq!(
            post.creator.profile_url.as_deref(),
            Some("https://www.shopltk.com/explore/alice")
        );
        assert_eq!(post.category, "ltkhome");
    }

    #[test]
    fn several_captions_concatenate_tags_without_repeats() {
        let config = PipelineConfig::default();
        let ctx = RunContext::new("src", "cat");
        let post = Normalizer::new(&config)
            .normalize(correlated(&["#a #b #a", "#b #c"]), &ctx)
            .unwrap();
        assert_eq!(post.caption, "#a #b #a");
        assert_eq!(post.hashtags, vec!["#a", "#b", "#c"]);
    }

    #[test]
    fn structured_tags_fill_in_when_caption_has_none() {
        let config = PipelineConfig::default();
        let ctx = RunContext::new("src", "cat");
        let mut input = correlated(&["no tags here"]);
        input.fields.hashtags = vec!["#fall".into(), "#fall".into()];
        let post = Normalizer::new(&config).normalize(input, &ctx).unwrap();
        assert_eq!(post.hashtags, vec!["#fall"]);
    }

    #[test]
    fn products_without_title_or_link_are_dropped() {
        let config = PipelineConfig::default();
        let ctx = RunContext::new("src", "cat");
        let mut input = correlated(&[]);
        input.products = vec![
            ProductFields {
                title: Some("Boots".into()),
                url: Some("//shop.example/boots".into()),
                ..Default::default()
            },
            ProductFields {
                brand: Some("Nameless".into()),
                ..Default::default()
            },
        ];
        let post = Normalizer::new(&config).normalize(input, &ctx).unwrap();
        assert_eq!(post.products.len(), 1);
        assert_eq!(post.products[0].url, "https://shop.example/boots");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The unified, de-duplicated output unit. One per distinct `post_id` per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalPost {
    pub post_id: String,
    pub post_url: String,
    pub source_page: String,
    pub category: String,
    pub creator: Creator,
    pub caption: String,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
    pub media: Media,
    pub products: Vec<Product>,
    pub scraped_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub profile_url: Option<String>,
}

impl Creator {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.avatar_url.is_none() && self.profile_url.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub hero_image_url: String,
    pub thumbnail_url: String,
    pub all_image_urls: Vec<String>,
    pub video_url: Option<String>,
    pub has_video: bool,
}

impl Media {
    /// `has_video` is derived here so it can never disagree with `video_url`.
    pub fn new(
        hero_image_url: String,
        thumbnail_url: String,
        all_image_urls: Vec<String>,
        video_url: Option<String>,
    ) -> Self {
        let has_video = video_url.is_some();
        Self {
            hero_image_url,
            thumbnail_url,
            all_image_urls,
            video_url,
            has_video,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub title: String,
    pub brand: String,
    pub price: Option<f64>,
    pub url: String,
    pub image_url: String,
}

impl CanonicalPost {
    /// Number of populated fields. Used to pick a winner between two records
    /// for the same post.
    pub fn filled_field_count(&self) -> usize {
        let strings = [
            &self.post_id,
            &self.post_url,
            &self.source_page,
            &self.category,
            &self.caption,
            &self.media.hero_image_url,
            &self.media.thumbnail_url,
        ];
        let options = [
            &self.creator.username,
            &self.creator.avatar_url,
            &self.creator.profile_url,
            &self.media.video_url,
        ];

        strings.iter().filter(|s| !s.is_empty()).count()
            + options.iter().filter(|o| o.is_some()).count()
            + usize::from(!self.hashtags.is_empty())
            + usize::from(!self.mentions.is_empty())
            + usize::from(!self.media.all_image_urls.is_empty())
            + usize::from(!self.products.is_empty())
            + usize::from(self.published_at.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_video_tracks_video_url() {
        let with = Media::new(String::new(), String::new(), vec![], Some("v.mp4".into()));
        let without = Media::new(String::new(), String::new(), vec![], None);
        assert!(with.has_video);
        assert!(!without.has_video);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let post = CanonicalPost {
            post_id: "p1".into(),
            post_url: "https://site/explore/alice/posts/p1".into(),
            source_page: String::new(),
            category: String::new(),
            creator: Creator::default(),
            caption: String::new(),
            hashtags: vec![],
            mentions: vec![],
            media: Media::default(),
            products: vec![],
            scraped_at: Utc::now(),
            published_at: None,
        };
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["postId"], "p1");
        assert!(json["media"].get("heroImageUrl").is_some());
        assert!(json["media"].get("hasVideo").is_some());
    }
}

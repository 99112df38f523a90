use std::collections::HashMap;

use shopscout_common::CanonicalPost;

/// Collapse records sharing a `post_id`. The record with more populated
/// fields wins; on a tie the later `scraped_at` wins. Each surviving record
/// keeps the slot where its `post_id` first appeared.
pub fn dedup_posts(posts: impl IntoIterator<Item = CanonicalPost>) -> Vec<CanonicalPost> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<CanonicalPost> = Vec::new();

    for post in posts {
        match slots.get(&post.post_id) {
            Some(&i) => {
                if prefer(&post, &out[i]) {
                    out[i] = post;
                }
            }
            None => {
                slots.insert(post.post_id.clone(), out.len());
                out.push(post);
            }
        }
    }
    out
}

fn prefer(candidate: &CanonicalPost, current: &CanonicalPost) -> bool {
    let (a, b) = (candidate.filled_field_count(), current.filled_field_count());
    a > b || (a == b && candidate.scraped_at > current.scraped_at)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use shopscout_common::{Creator, Media};

    use super::*;

    fn post(id: &str, caption: &str, age_minutes: i64) -> CanonicalPost {
        CanonicalPost {
            post_id: id.into(),
            post_url: format!("https://site/explore/a/posts/{id}"),
            source_page: "https://site/categories/x".into(),
            category: "x".into(),
            creator: Creator::default(),
            caption: caption.into(),
            hashtags: vec![],
            mentions: vec![],
            media: Media::default(),
            products: vec![],
            scraped_at: Utc::now() - Duration::minutes(age_minutes),
            published_at: None,
        }
    }

    #[test]
    fn richer_record_wins() {
        let sparse = post("p1", "", 0);
        let rich = post("p1", "has caption", 60);
        let out = dedup_posts([sparse, rich]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].caption, "has caption");
    }

    #[test]
    fn tie_goes_to_latest_scrape() {
        let older = post("p1", "old", 60);
        let newer = post("p1", "new", 0);
        assert_eq!(dedup_posts([newer.clone(), older.clone()])[0].caption, "new");
        assert_eq!(dedup_posts([older, newer])[0].caption, "new");
    }

    #[test]
    fn first_appearance_order_is_kept() {
        let out = dedup_posts([
            post("b", "", 0),
            post("a", "", 0),
            post("b", "later but richer", 0),
        ]);
        let ids: Vec<&str> = out.iter().map(|p| p.post_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(out[0].caption, "later but richer");
    }
}

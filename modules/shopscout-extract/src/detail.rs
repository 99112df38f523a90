// Detail pass: listing pages rarely carry captions or product links, so a
// bounded number of posts are revisited on their own permalink and the
// single-post record fills in what the listing left empty.

use std::collections::HashSet;

use shopscout_common::{CanonicalPost, Creator, Media, Product};

/// Counters for one detail pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailStats {
    pub attempted: usize,
    /// Post pages that added at least one field.
    pub enriched: usize,
    /// Captures that failed, or post pages that did not contain the post.
    pub failed: usize,
}

impl DetailStats {
    pub fn absorb(&mut self, other: &DetailStats) {
        self.attempted += other.attempted;
        self.enriched += other.enriched;
        self.failed += other.failed;
    }
}

/// A listing record worth a second look: no caption or no products.
pub fn needs_detail(post: &CanonicalPost) -> bool {
    post.caption.is_empty() || post.products.is_empty()
}

/// Indices of the first `limit` posts that need a detail visit, in output
/// order.
pub fn detail_candidates(posts: &[CanonicalPost], limit: usize) -> Vec<usize> {
    posts
        .iter()
        .enumerate()
        .filter(|(_, p)| needs_detail(p))
        .map(|(i, _)| i)
        .take(limit)
        .collect()
}

/// Fill empty fields of `post` from the post page's own record. Values the
/// listing already had are never replaced. Returns whether anything changed.
pub fn merge_detail(post: &mut CanonicalPost, detail: CanonicalPost) -> bool {
    let before = post.clone();

    if post.caption.is_empty() && !detail.caption.is_empty() {
        post.caption = detail.caption;
        post.hashtags = detail.hashtags;
        post.mentions = detail.mentions;
    }

    if post.creator.is_empty() {
        post.creator = detail.creator;
    } else {
        fill_creator(&mut post.creator, detail.creator);
    }

    post.media = merge_media(&post.media, detail.media);
    merge_products(&mut post.products, detail.products);

    if post.published_at.is_none() {
        post.published_at = detail.published_at;
    }

    *post != before
}

fn fill_creator(creator: &mut Creator, other: Creator) {
    if creator.username.is_none() {
        creator.username = other.username;
    }
    if creator.avatar_url.is_none() {
        creator.avatar_url = other.avatar_url;
    }
    if creator.profile_url.is_none() {
        creator.profile_url = other.profile_url;
    }
}

fn merge_media(listing: &Media, detail: Media) -> Media {
    let (hero, thumbnail) = if listing.hero_image_url.is_empty() {
        (detail.hero_image_url, detail.thumbnail_url)
    } else {
        (listing.hero_image_url.clone(), listing.thumbnail_url.clone())
    };

    let mut seen = HashSet::new();
    let images = std::iter::once(hero.clone())
        .filter(|h| !h.is_empty())
        .chain(listing.all_image_urls.iter().cloned())
        .chain(detail.all_image_urls)
        .filter(|url| seen.insert(url.clone()))
        .collect();

    Media::new(
        hero,
        thumbnail,
        images,
        listing.video_url.clone().or(detail.video_url),
    )
}

/// Same product if the link matches, or, when either side has no link, the
/// title does (case-insensitive).
fn same_product(a: &Product, b: &Product) -> bool {
    if !a.url.is_empty() && !b.url.is_empty() {
        return a.url == b.url;
    }
    !a.title.is_empty() && a.title.eq_ignore_ascii_case(&b.title)
}

fn merge_products(listing: &mut Vec<Product>, detail: Vec<Product>) {
    for product in detail {
        match listing.iter_mut().find(|p| same_product(p, &product)) {
            Some(existing) => {
                if existing.title.is_empty() {
                    existing.title = product.title;
                }
                if existing.brand.is_empty() {
                    existing.brand = product.brand;
                }
                if existing.price.is_none() {
                    existing.price = product.price;
                }
                if existing.url.is_empty() {
                    existing.url = product.url;
                }
                if existing.image_url.is_empty() {
                    existing.image_url = product.image_url;
                }
            }
            None => listing.push(product),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn listing(id: &str) -> CanonicalPost {
        CanonicalPost {
            post_id: id.into(),
            post_url: format!("https://site/explore/amy/posts/{id}"),
            source_page: "https://site/categories/ltkhome".into(),
            category: "ltkhome".into(),
            creator: Creator {
                username: Some("amy".into()),
                ..Default::default()
            },
            caption: String::new(),
            hashtags: vec![],
            mentions: vec![],
            media: Media::new(
                "https://img/hero.jpg?w=450".into(),
                "https://img/hero.jpg?w=150".into(),
                vec!["https://img/hero.jpg?w=450".into()],
                None,
            ),
            products: vec![],
            scraped_at: Utc::now(),
            published_at: None,
        }
    }

    #[test]
    fn detail_fills_caption_video_and_products_without_overwriting() {
        let mut post = listing("p1");
        let mut detail = listing("p1");
        detail.caption = "Patio refresh #outdoor".into();
        detail.hashtags = vec!["#outdoor".into()];
        detail.creator = Creator {
            username: Some("someone-else".into()),
            avatar_url: Some("https://avatar/amy.jpg".into()),
            profile_url: None,
        };
        detail.media = Media::new(
            "https://img/other.jpg".into(),
            String::new(),
            vec!["https://img/other.jpg".into(), "https://img/side.jpg".into()],
            Some("https://v/p1.mp4".into()),
        );
        detail.products = vec![Product {
            title: "Planter".into(),
            url: "https://rstyle.me/+pl".into(),
            ..Default::default()
        }];

        assert!(merge_detail(&mut post, detail));
        assert_eq!(post.caption, "Patio refresh #outdoor");
        assert_eq!(post.hashtags, vec!["#outdoor"]);
        assert_eq!(post.creator.username.as_deref(), Some("amy"));
        assert_eq!(post.creator.avatar_url.as_deref(), Some("https://avatar/amy.jpg"));
        assert_eq!(post.media.hero_image_url, "https://img/hero.jpg?w=450");
        assert_eq!(
            post.media.all_image_urls,
            vec!["https://img/hero.jpg?w=450", "https://img/other.jpg", "https://img/side.jpg"]
        );
        assert!(post.media.has_video);
        assert_eq!(post.products.len(), 1);
    }

    #[test]
    fn empty_creator_is_taken_whole() {
        let mut post = listing("p1");
        post.creator = Creator::default();
        let mut detail = listing("p1");
        detail.creator.profile_url = Some("https://site/explore/amy".into());

        merge_detail(&mut post, detail);
        assert_eq!(post.creator.username.as_deref(), Some("amy"));
        assert_eq!(post.creator.profile_url.as_deref(), Some("https://site/explore/amy"));
    }

    #[test]
    fn matching_products_are_completed_not_duplicated() {
        let mut post = listing("p1");
        post.products = vec![Product {
            url: "https://rstyle.me/+x1".into(),
            ..Default::default()
        }];
        let mut detail = listing("p1");
        detail.products = vec![Product {
            title: "Throw".into(),
            price: Some(40.0),
            url: "https://rstyle.me/+x1".into(),
            ..Default::default()
        }];

        merge_detail(&mut post, detail);
        assert_eq!(post.products.len(), 1);
        assert_eq!(post.products[0].title, "Throw");
        assert_eq!(post.products[0].price, Some(40.0));
    }

    #[test]
    fn identical_detail_changes_nothing() {
        let mut post = listing("p1");
        let detail = post.clone();
        assert!(!merge_detail(&mut post, detail));
    }

    #[test]
    fn candidates_skip_complete_posts_and_respect_limit() {
        let mut complete = listing("p2");
        complete.caption = "done".into();
        complete.products = vec![Product::default()];
        let posts = vec![listing("p1"), complete, listing("p3"), listing("p4")];

        assert_eq!(detail_candidates(&posts, 2), vec![0, 2]);
        assert!(detail_candidates(&posts, 0).is_empty());
    }
}

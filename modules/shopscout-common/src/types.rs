use std::fmt;

use serde::{Deserialize, Serialize};

// --- Strategies ---

/// One independent extraction method, each reading one kind of raw capture feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Serialized page state embedded in the document (`__NEXT_DATA__`).
    EmbeddedState,
    /// JSON bodies of intercepted network responses.
    NetworkInterception,
    /// Pattern matching over the raw DOM snapshot.
    DomRegex,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::EmbeddedState,
        Strategy::NetworkInterception,
        Strategy::DomRegex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::EmbeddedState => "embedded_state",
            Strategy::NetworkInterception => "network_interception",
            Strategy::DomRegex => "dom_regex",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Fragment positions and references ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionBasis {
    /// Character offset into the raw document text.
    ByteOffset,
    /// Index within the list the fragment was read from.
    ArrayIndex,
}

/// Where a fragment sat in its source feed. Drives proximity correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub basis: PositionBasis,
    pub value: usize,
}

impl Position {
    pub fn byte_offset(value: usize) -> Self {
        Self {
            basis: PositionBasis::ByteOffset,
            value,
        }
    }

    pub fn array_index(value: usize) -> Self {
        Self {
            basis: PositionBasis::ArrayIndex,
            value,
        }
    }

    /// Distance to another position. Positions measured on different bases
    /// are not comparable and yield `None`.
    pub fn distance(&self, other: &Position) -> Option<usize> {
        (self.basis == other.basis).then(|| self.value.abs_diff(other.value))
    }
}

/// A loose pointer from one fragment to another entity. No foreign keys
/// upstream, so these are the only explicit links the correlator gets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LooseRef {
    ProfileId(String),
    Username(String),
    ProductId(String),
}

// --- Partial records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    Post,
    Profile,
    Product,
    Media,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostFields {
    pub post_id: Option<String>,
    pub post_url: Option<String>,
    pub caption: Option<String>,
    /// Tags the upstream supplied as structured data, separate from the caption.
    pub hashtags: Vec<String>,
    pub creator_username: Option<String>,
    pub creator_avatar_url: Option<String>,
    pub hero_image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub video_url: Option<String>,
    /// Products embedded directly in the post object.
    pub products: Vec<ProductFields>,
    pub published_at: Option<String>,
}

impl PostFields {
    /// Fill every empty scalar field from `other`. Fields already set are kept.
    pub fn fill_from(&mut self, other: &PostFields) {
        fill(&mut self.post_id, &other.post_id);
        fill(&mut self.post_url, &other.post_url);
        fill(&mut self.caption, &other.caption);
        fill(&mut self.creator_username, &other.creator_username);
        fill(&mut self.creator_avatar_url, &other.creator_avatar_url);
        fill(&mut self.hero_image_url, &other.hero_image_url);
        fill(&mut self.video_url, &other.video_url);
        fill(&mut self.published_at, &other.published_at);
        if self.hashtags.is_empty() {
            self.hashtags = other.hashtags.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileFields {
    pub id: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub profile_url: Option<String>,
}

impl ProfileFields {
    pub fn fill_from(&mut self, other: &ProfileFields) {
        fill(&mut self.id, &other.id);
        fill(&mut self.username, &other.username);
        fill(&mut self.display_name, &other.display_name);
        fill(&mut self.avatar_url, &other.avatar_url);
        fill(&mut self.profile_url, &other.profile_url);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFields {
    pub id: Option<String>,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub url: Option<String>,
    pub image_url: Option<String>,
}

impl ProductFields {
    pub fn fill_from(&mut self, other: &ProductFields) {
        fill(&mut self.id, &other.id);
        fill(&mut self.title, &other.title);
        fill(&mut self.brand, &other.brand);
        fill(&mut self.url, &other.url);
        fill(&mut self.image_url, &other.image_url);
        if self.price.is_none() {
            self.price = other.price;
        }
    }

    /// Identity used to collapse the same product seen twice for one post.
    pub fn identity(&self) -> Option<&str> {
        self.id.as_deref().or(self.url.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaRole {
    Avatar,
    Image,
    Video,
}

/// A bare media URL found in markup with no structural owner.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFields {
    pub role: MediaRole,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartialRecord {
    Post(PostFields),
    Profile(ProfileFields),
    Product(ProductFields),
    Media(MediaFields),
}

impl PartialRecord {
    pub fn kind(&self) -> FragmentKind {
        match self {
            PartialRecord::Post(_) => FragmentKind::Post,
            PartialRecord::Profile(_) => FragmentKind::Profile,
            PartialRecord::Product(_) => FragmentKind::Product,
            PartialRecord::Media(_) => FragmentKind::Media,
        }
    }
}

// --- Candidate fragments ---

/// A partial record produced by one strategy. Built once, then only read.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFragment {
    strategy: Strategy,
    record: PartialRecord,
    refs: Vec<LooseRef>,
    position: Option<Position>,
}

impl CandidateFragment {
    pub fn new(strategy: Strategy, record: PartialRecord) -> Self {
        Self {
            strategy,
            record,
            refs: Vec::new(),
            position: None,
        }
    }

    pub fn post(strategy: Strategy, fields: PostFields) -> Self {
        Self::new(strategy, PartialRecord::Post(fields))
    }

    pub fn profile(strategy: Strategy, fields: ProfileFields) -> Self {
        Self::new(strategy, PartialRecord::Profile(fields))
    }

    pub fn product(strategy: Strategy, fields: ProductFields) -> Self {
        Self::new(strategy, PartialRecord::Product(fields))
    }

    pub fn media(strategy: Strategy, role: MediaRole, url: impl Into<String>) -> Self {
        Self::new(
            strategy,
            PartialRecord::Media(MediaFields {
                role,
                url: url.into(),
            }),
        )
    }

    pub fn with_ref(mut self, r: LooseRef) -> Self {
        if !self.refs.contains(&r) {
            self.refs.push(r);
        }
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn kind(&self) -> FragmentKind {
        self.record.kind()
    }

    pub fn refs(&self) -> &[LooseRef] {
        &self.refs
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn as_post(&self) -> Option<&PostFields> {
        match &self.record {
            PartialRecord::Post(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_profile(&self) -> Option<&ProfileFields> {
        match &self.record {
            PartialRecord::Profile(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_product(&self) -> Option<&ProductFields> {
        match &self.record {
            PartialRecord::Product(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_media(&self) -> Option<&MediaFields> {
        match &self.record {
            PartialRecord::Media(m) => Some(m),
            _ => None,
        }
    }

    pub fn profile_id_ref(&self) -> Option<&str> {
        self.refs.iter().find_map(|r| match r {
            LooseRef::ProfileId(id) => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn username_ref(&self) -> Option<&str> {
        self.refs.iter().find_map(|r| match r {
            LooseRef::Username(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Product IDs this fragment references, in reference order.
    pub fn product_id_refs(&self) -> impl Iterator<Item = &str> {
        self.refs.iter().filter_map(|r| match r {
            LooseRef::ProductId(id) => Some(id.as_str()),
            _ => None,
        })
    }
}

// --- Field helpers ---

/// Trim a raw upstream string, treating blank values as absent.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn fill(slot: &mut Option<String>, other: &Option<String>) {
    if slot.as_deref().map_or(true, str::is_empty) {
        if let Some(v) = other.as_deref().filter(|v| !v.is_empty()) {
            *slot = Some(v.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_requires_matching_basis() {
        let a = Position::byte_offset(100);
        let b = Position::byte_offset(40);
        let c = Position::array_index(100);
        assert_eq!(a.distance(&b), Some(60));
        assert_eq!(a.distance(&c), None);
    }

    #[test]
    fn fill_from_keeps_existing_values() {
        let mut high = PostFields {
            caption: Some("A".into()),
            ..Default::default()
        };
        let low = PostFields {
            caption: Some("B".into()),
            video_url: Some("https://x/video.mp4".into()),
            ..Default::default()
        };
        high.fill_from(&low);
        assert_eq!(high.caption.as_deref(), Some("A"));
        assert_eq!(high.video_url.as_deref(), Some("https://x/video.mp4"));
    }

    #[test]
    fn fill_from_treats_empty_string_as_missing() {
        let mut high = PostFields {
            caption: Some(String::new()),
            ..Default::default()
        };
        let low = PostFields {
            caption: Some("from below".into()),
            ..Default::default()
        };
        high.fill_from(&low);
        assert_eq!(high.caption.as_deref(), Some("from below"));
    }

    #[test]
    fn refs_are_not_duplicated() {
        let fragment = CandidateFragment::post(Strategy::DomRegex, PostFields::default())
            .with_ref(LooseRef::Username("alice".into()))
            .with_ref(LooseRef::Username("alice".into()))
            .with_ref(LooseRef::ProductId("p1".into()))
            .with_ref(LooseRef::ProductId("p2".into()));
        assert_eq!(fragment.refs().len(), 3);
        assert_eq!(fragment.username_ref(), Some("alice"));
        assert_eq!(fragment.product_id_refs().collect::<Vec<_>>(), vec!["p1", "p2"]);
        assert_eq!(fragment.kind(), FragmentKind::Post);
    }

    #[test]
    fn non_empty_trims_and_drops_blanks() {
        assert_eq!(non_empty(Some("  hi ")), Some("hi".to_string()));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(None), None);
    }
}

// Record correlation: folds the closed fragment set of one run into one
// merged record per post id.
//
// Explicit references (profile id, username, product id) are tried first.
// Where none resolve, a fragment is tied to its nearest neighbour from the
// same strategy and the same position basis, bounded by the configured
// distance. Nothing outside the bound is ever attached.

use std::collections::{HashMap, HashSet};

use shopscout_common::{
    CandidateFragment, MediaRole, PipelineConfig, Position, PositionBasis, PostFields,
    ProductFields, ProfileFields, Strategy,
};
use tracing::{debug, info};

use crate::patterns::{permalink, post_id_from_url};

/// How a post's creator was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatorMatch {
    /// A profile id or username reference resolved to a profile fragment.
    Reference,
    /// The post object named its creator inline; no profile fragment needed.
    Inline,
    /// Nearest profile fragment within the distance bound.
    Proximity { distance: usize },
    Unmatched,
}

impl CreatorMatch {
    pub fn is_proximity(&self) -> bool {
        matches!(self, CreatorMatch::Proximity { .. })
    }
}

/// All fragments for one post id, merged.
#[derive(Debug, Clone)]
pub struct CorrelatedPost {
    pub post_id: String,
    /// Scalar fields merged in priority order, first non-empty wins.
    pub fields: PostFields,
    /// Distinct non-empty captions, priority order.
    pub captions: Vec<String>,
    /// Image URLs in discovery order, repeats included.
    pub image_urls: Vec<String>,
    pub creator: Option<ProfileFields>,
    pub creator_match: CreatorMatch,
    pub products: Vec<ProductFields>,
    /// Strategies that contributed a post fragment, priority order.
    pub sources: Vec<Strategy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationStats {
    /// Post fragments with no recoverable identity, plus posts dropped for
    /// lack of a usable permalink.
    pub dropped_records: usize,
    /// Posts that could not be paired with a creator or given a permalink.
    pub correlation_failures: usize,
    pub creator_unmatched: usize,
    pub proximity_creator_matches: usize,
    pub unresolved_product_refs: usize,
    /// Fallback-only posts turned away because `admit_fallback_posts` is off.
    pub fallback_posts_rejected: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pub posts: Vec<CorrelatedPost>,
    pub stats: CorrelationStats,
}

struct PostGroup<'a> {
    post_id: String,
    fragments: Vec<&'a CandidateFragment>,
}

/// A positioned fragment that proximity can match against.
#[derive(Clone, Copy)]
struct Anchor {
    owner: usize,
    strategy: Strategy,
    position: Position,
}

pub struct Correlator<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Correlator<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Distance between two positions if proximity may link them.
    /// Index-based proximity is off while `max_index_distance` is zero.
    fn within_bound(&self, a: Position, b: Position) -> Option<usize> {
        let distance = a.distance(&b)?;
        let limit = match a.basis {
            PositionBasis::ByteOffset => self.config.proximity.max_offset_distance,
            PositionBasis::ArrayIndex if self.config.proximity.max_index_distance == 0 => {
                return None;
            }
            PositionBasis::ArrayIndex => self.config.proximity.max_index_distance,
        };
        (distance <= limit).then_some(distance)
    }

    /// Nearest anchor from the same strategy within bound. Ties go to the
    /// anchor discovered first.
    fn nearest(
        &self,
        strategy: Strategy,
        position: Position,
        anchors: &[Anchor],
    ) -> Option<(usize, usize)> {
        anchors
            .iter()
            .filter(|a| a.strategy == strategy)
            .filter_map(|a| self.within_bound(position, a.position).map(|d| (a.owner, d)))
            .min_by_key(|&(_, d)| d)
    }

    pub fn correlate(&self, fragments: &[CandidateFragment]) -> Correlation {
        let mut stats = CorrelationStats::default();

        let mut post_fragments: Vec<&CandidateFragment> =
            fragments.iter().filter(|f| f.as_post().is_some()).collect();
        post_fragments.sort_by_key(|f| self.config.rank(f.strategy()));

        let profiles: Vec<&CandidateFragment> =
            fragments.iter().filter(|f| f.as_profile().is_some()).collect();
        let products: Vec<&CandidateFragment> =
            fragments.iter().filter(|f| f.as_product().is_some()).collect();
        let media: Vec<&CandidateFragment> =
            fragments.iter().filter(|f| f.as_media().is_some()).collect();

        let groups = self.group_posts(&post_fragments, &mut stats);
        let enriched_profiles = self.enrich_profiles(&profiles, &media);

        let post_anchors: Vec<Anchor> = groups
            .iter()
            .enumerate()
            .flat_map(|(owner, group)| {
                group.fragments.iter().filter_map(move |f| {
                    Some(Anchor {
                        owner,
                        strategy: f.strategy(),
                        position: f.position()?,
                    })
                })
            })
            .collect();

        let attached = self.attach_media(&media, &post_anchors, groups.len());
        let referenced: HashSet<&str> = groups
            .iter()
            .flat_map(|g| g.fragments.iter().flat_map(|f| f.product_id_refs()))
            .collect();
        let nearby_products = self.attach_products(&products, &referenced, &post_anchors, groups.len());
        let products_by_id = self.products_by_id(&products);

        let mut posts = Vec::with_capacity(groups.len());
        for (index, group) in groups.iter().enumerate() {
            let mut post = self.merge_group(group);

            let (creator, creator_match) =
                self.resolve_creator(group, &post.fields, &profiles, &enriched_profiles);

            if post.fields.post_url.is_none() {
                let username = creator
                    .as_ref()
                    .and_then(|c| c.username.clone())
                    .or_else(|| post.fields.creator_username.clone());
                let Some(name) = username else {
                    debug!(post_id = post.post_id.as_str(), "Dropping post without a permalink");
                    stats.dropped_records += 1;
                    stats.correlation_failures += 1;
                    continue;
                };
                post.fields.post_url = Some(permalink(self.config.base_url(), &name, &post.post_id));
            }

            match creator_match {
                CreatorMatch::Unmatched => {
                    stats.creator_unmatched += 1;
                    stats.correlation_failures += 1;
                }
                CreatorMatch::Proximity { distance } => {
                    stats.proximity_creator_matches += 1;
                    debug!(post_id = post.post_id.as_str(), distance, "Creator matched by proximity");
                }
                CreatorMatch::Reference | CreatorMatch::Inline => {}
            }
            post.creator = creator;
            post.creator_match = creator_match;

            post.image_urls.extend(attached[index].images.iter().cloned());
            if post.fields.video_url.is_none() {
                post.fields.video_url = attached[index].videos.first().cloned();
            }
            if post.fields.hero_image_url.is_none() {
                post.fields.hero_image_url = post.image_urls.first().cloned();
            }

            post.products =
                self.collect_products(group, &products_by_id, &nearby_products[index], &mut stats);

            posts.push(post);
        }

        info!(
            posts = posts.len(),
            dropped = stats.dropped_records,
            unmatched_creators = stats.creator_unmatched,
            proximity_creators = stats.proximity_creator_matches,
            "Correlation complete"
        );

        Correlation { posts, stats }
    }

    /// Group post fragments (already in priority order) by post id. Group
    /// order is first-encounter order.
    fn group_posts<'f>(
        &self,
        post_fragments: &[&'f CandidateFragment],
        stats: &mut CorrelationStats,
    ) -> Vec<PostGroup<'f>> {
        let top_rank = post_fragments.iter().map(|f| self.config.rank(f.strategy())).min();

        let mut groups: Vec<PostGroup<'f>> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for &fragment in post_fragments {
            let Some(fields) = fragment.as_post() else {
                continue;
            };
            let Some(post_id) = fields
                .post_id
                .clone()
                .or_else(|| fields.post_url.as_deref().and_then(post_id_from_url))
            else {
                stats.dropped_records += 1;
                continue;
            };

            match index.get(&post_id) {
                Some(&i) => groups[i].fragments.push(fragment),
                None => {
                    let rank = self.config.rank(fragment.strategy());
                    if !self.config.admit_fallback_posts && Some(rank) != top_rank {
                        stats.fallback_posts_rejected += 1;
                        continue;
                    }
                    index.insert(post_id.clone(), groups.len());
                    groups.push(PostGroup {
                        post_id,
                        fragments: vec![fragment],
                    });
                }
            }
        }
        groups
    }

    fn merge_group(&self, group: &PostGroup<'_>) -> CorrelatedPost {
        let mut fields = PostFields::default();
        let mut captions: Vec<String> = Vec::new();
        let mut image_urls = Vec::new();
        let mut sources = Vec::new();

        for fragment in &group.fragments {
            let Some(part) = fragment.as_post() else {
                continue;
            };
            fields.fill_from(part);
            if let Some(caption) = part.caption.as_deref().filter(|c| !c.trim().is_empty()) {
                if !captions.iter().any(|c| c == caption) {
                    captions.push(caption.to_string());
                }
            }
            image_urls.extend(part.image_urls.iter().cloned());
            if !sources.contains(&fragment.strategy()) {
                sources.push(fragment.strategy());
            }
        }
        fields.post_id = Some(group.post_id.clone());

        CorrelatedPost {
            post_id: group.post_id.clone(),
            fields,
            captions,
            image_urls,
            creator: None,
            creator_match: CreatorMatch::Unmatched,
            products: Vec::new(),
            sources,
        }
    }

    /// Profiles with avatars filled from the nearest avatar image.
    fn enrich_profiles(
        &self,
        profiles: &[&CandidateFragment],
        media: &[&CandidateFragment],
    ) -> Vec<ProfileFields> {
        let avatars: Vec<(Anchor, &str)> = media
            .iter()
            .enumerate()
            .filter_map(|(owner, f)| {
                let m = f.as_media().filter(|m| m.role == MediaRole::Avatar)?;
                let anchor = Anchor {
                    owner,
                    strategy: f.strategy(),
                    position: f.position()?,
                };
                Some((anchor, m.url.as_str()))
            })
            .collect();
        let anchors: Vec<Anchor> = avatars.iter().map(|(a, _)| *a).collect();

        profiles
            .iter()
            .map(|fragment| {
                let mut fields = fragment.as_profile().cloned().unwrap_or_default();
                if fields.avatar_url.is_none() {
                    if let Some(position) = fragment.position() {
                        if let Some((owner, _)) =
                            self.nearest(fragment.strategy(), position, &anchors)
                        {
                            fields.avatar_url = avatars
                                .iter()
                                .find(|(a, _)| a.owner == owner)
                                .map(|(_, url)| url.to_string());
                        }
                    }
                }
                fields
            })
            .collect()
    }

    fn resolve_creator(
        &self,
        group: &PostGroup<'_>,
        merged: &PostFields,
        profiles: &[&CandidateFragment],
        enriched: &[ProfileFields],
    ) -> (Option<ProfileFields>, CreatorMatch) {
        if let Some(mut creator) = self.creator_by_reference(group, profiles, enriched) {
            fill_creator_from_post(&mut creator, merged);
            return (Some(creator), CreatorMatch::Reference);
        }

        let anchors: Vec<Anchor> = profiles
            .iter()
            .enumerate()
            .filter_map(|(owner, f)| {
                Some(Anchor {
                    owner,
                    strategy: f.strategy(),
                    position: f.position()?,
                })
            })
            .collect();

        for fragment in &group.fragments {
            let Some(position) = fragment.position() else {
                continue;
            };
            if let Some((owner, distance)) = self.nearest(fragment.strategy(), position, &anchors) {
                let mut creator = enriched[owner].clone();
                fill_creator_from_post(&mut creator, merged);
                return (Some(creator), CreatorMatch::Proximity { distance });
            }
        }

        if merged.creator_username.is_some() {
            let creator = ProfileFields {
                username: merged.creator_username.clone(),
                avatar_url: merged.creator_avatar_url.clone(),
                ..Default::default()
            };
            return (Some(creator), CreatorMatch::Inline);
        }

        (None, CreatorMatch::Unmatched)
    }

    /// Profile fragments matching the group's references, merged in priority
    /// order. Profile ids are tried first; their username then pulls in any
    /// other fragments for the same creator.
    fn creator_by_reference(
        &self,
        group: &PostGroup<'_>,
        profiles: &[&CandidateFragment],
        enriched: &[ProfileFields],
    ) -> Option<ProfileFields> {
        let profile_ids: Vec<&str> = group.fragments.iter().filter_map(|f| f.profile_id_ref()).collect();
        let mut matched: Vec<usize> = enriched
            .iter()
            .enumerate()
            .filter(|(_, p)| p.id.as_deref().is_some_and(|id| profile_ids.contains(&id)))
            .map(|(i, _)| i)
            .collect();

        let mut usernames: Vec<String> = group
            .fragments
            .iter()
            .filter_map(|f| f.username_ref())
            .map(str::to_lowercase)
            .collect();
        if let Some(&first) = matched.first() {
            if let Some(name) = enriched[first].username.as_deref() {
                usernames.insert(0, name.to_lowercase());
            }
        }
        let Some(username) = usernames.first() else {
            return self.merge_profiles(&matched, profiles, enriched);
        };

        for (i, profile) in enriched.iter().enumerate() {
            let same_name = profile
                .username
                .as_deref()
                .is_some_and(|u| u.eq_ignore_ascii_case(username));
            if same_name && !matched.contains(&i) {
                matched.push(i);
            }
        }
        self.merge_profiles(&matched, profiles, enriched)
    }

    fn merge_profiles(
        &self,
        matched: &[usize],
        profiles: &[&CandidateFragment],
        enriched: &[ProfileFields],
    ) -> Option<ProfileFields> {
        let mut order = matched.to_vec();
        order.sort_by_key(|&i| self.config.rank(profiles[i].strategy()));
        let mut iter = order.into_iter();
        let mut merged = enriched[iter.next()?].clone();
        for i in iter {
            merged.fill_from(&enriched[i]);
        }
        Some(merged)
    }

    /// Route each loose image or video to the nearest post.
    fn attach_media(
        &self,
        media: &[&CandidateFragment],
        post_anchors: &[Anchor],
        group_count: usize,
    ) -> Vec<AttachedMedia> {
        let mut attached = vec![AttachedMedia::default(); group_count];
        for fragment in media {
            let (Some(m), Some(position)) = (fragment.as_media(), fragment.position()) else {
                continue;
            };
            if m.role == MediaRole::Avatar {
                continue;
            }
            if let Some((owner, _)) = self.nearest(fragment.strategy(), position, post_anchors) {
                match m.role {
                    MediaRole::Image => attached[owner].images.push(m.url.clone()),
                    MediaRole::Video => attached[owner].videos.push(m.url.clone()),
                    MediaRole::Avatar => {}
                }
            }
        }
        attached
    }

    /// Route each product no post references to the nearest post.
    fn attach_products(
        &self,
        products: &[&CandidateFragment],
        referenced: &HashSet<&str>,
        post_anchors: &[Anchor],
        group_count: usize,
    ) -> Vec<Vec<ProductFields>> {
        let mut attached = vec![Vec::new(); group_count];
        for fragment in products {
            let (Some(product), Some(position)) = (fragment.as_product(), fragment.position()) else {
                continue;
            };
            if product.id.as_deref().is_some_and(|id| referenced.contains(id)) {
                continue;
            }
            if let Some((owner, _)) = self.nearest(fragment.strategy(), position, post_anchors) {
                attached[owner].push(product.clone());
            }
        }
        attached
    }

    /// Product fragments by id, merged in priority order.
    fn products_by_id(&self, products: &[&CandidateFragment]) -> HashMap<String, ProductFields> {
        let mut ordered: Vec<&&CandidateFragment> = products.iter().collect();
        ordered.sort_by_key(|f| self.config.rank(f.strategy()));

        let mut by_id: HashMap<String, ProductFields> = HashMap::new();
        for fragment in ordered {
            let Some(product) = fragment.as_product() else {
                continue;
            };
            let Some(id) = product.id.clone() else {
                continue;
            };
            by_id
                .entry(id)
                .and_modify(|existing| existing.fill_from(product))
                .or_insert_with(|| product.clone());
        }
        by_id
    }

    /// Referenced products in reference order, then inline products, then
    /// nearby unreferenced ones. Repeats of one product are merged.
    fn collect_products(
        &self,
        group: &PostGroup<'_>,
        by_id: &HashMap<String, ProductFields>,
        nearby: &[ProductFields],
        stats: &mut CorrelationStats,
    ) -> Vec<ProductFields> {
        let mut out: Vec<ProductFields> = Vec::new();

        for id in group.fragments.iter().flat_map(|f| f.product_id_refs()) {
            match by_id.get(id) {
                Some(product) => push_product(&mut out, product),
                None => stats.unresolved_product_refs += 1,
            }
        }
        for fragment in &group.fragments {
            for product in fragment.as_post().map(|p| p.products.as_slice()).unwrap_or_default() {
                push_product(&mut out, product);
            }
        }
        for product in nearby {
            push_product(&mut out, product);
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
struct AttachedMedia {
    images: Vec<String>,
    videos: Vec<String>,
}

fn fill_creator_from_post(creator: &mut ProfileFields, post: &PostFields) {
    if creator.username.is_none() {
        creator.username = post.creator_username.clone();
    }
    if creator.avatar_url.is_none() {
        creator.avatar_url = post.creator_avatar_url.clone();
    }
}

fn push_product(out: &mut Vec<ProductFields>, product: &ProductFields) {
    let existing = product
        .identity()
        .and_then(|key| out.iter_mut().find(|p| p.identity() == Some(key)));
    match existing {
        Some(slot) => slot.fill_from(product),
        None => out.push(product.clone()),
    }
}

/// Correlate with the given configuration.
pub fn correlate(fragments: &[CandidateFragment], config: &PipelineConfig) -> Correlation {
    Correlator::new(config).correlate(fragments)
}

use std::collections::HashMap;

use shopscout_common::{CanonicalPost, Strategy};

use crate::correlate::CorrelationStats;
use crate::detail::DetailStats;
use crate::strategies::{StrategyOutcome, StrategyOutput};

/// Per-strategy line of the run summary.
#[derive(Debug, Clone)]
pub struct StrategyReport {
    pub strategy: Strategy,
    pub outcome: StrategyOutcome,
    pub fragments: usize,
    pub skipped: usize,
}

impl From<&StrategyOutput> for StrategyReport {
    fn from(output: &StrategyOutput) -> Self {
        Self {
            strategy: output.strategy,
            outcome: output.outcome.clone(),
            fragments: output.fragments.len(),
            skipped: output.skipped,
        }
    }
}

/// Stats from one extraction run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub source_page: String,
    pub capture_timed_out: bool,
    pub responses_captured: usize,
    pub scroll_cycles: u32,
    pub strategies: Vec<StrategyReport>,
    pub correlation: CorrelationStats,
    /// Correlated posts whose permalink could not be made absolute.
    pub normalize_dropped: usize,
    pub details: DetailStats,
    pub posts_emitted: usize,
    pub posts_new: usize,
    pub with_video: usize,
    pub with_products: usize,
    /// Most frequent creators in the emitted posts, highest count first.
    pub top_creators: Vec<(String, usize)>,
}

const TOP_CREATORS: usize = 5;

impl RunSummary {
    /// Fill the output-derived counters from the emitted posts.
    pub fn record_posts(&mut self, posts: &[CanonicalPost]) {
        self.posts_emitted = posts.len();
        self.with_video = posts.iter().filter(|p| p.media.has_video).count();
        self.with_products = posts.iter().filter(|p| !p.products.is_empty()).count();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for name in posts.iter().filter_map(|p| p.creator.username.as_deref()) {
            *counts.entry(name).or_default() += 1;
        }
        let mut top: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(name, n)| (name.to_string(), n))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(TOP_CREATORS);
        self.top_creators = top;
    }

    /// Records lost anywhere between fragment and output.
    pub fn dropped_records(&self) -> usize {
        self.correlation.dropped_records + self.normalize_dropped
    }

    pub fn unavailable_strategies(&self) -> impl Iterator<Item = &StrategyReport> {
        self.strategies
            .iter()
            .filter(|r| matches!(r.outcome, StrategyOutcome::Unavailable(_)))
    }

    /// Merge another run's counters (multi-category runs).
    pub fn absorb(&mut self, other: &RunSummary) {
        self.capture_timed_out |= other.capture_timed_out;
        self.responses_captured += other.responses_captured;
        self.correlation.dropped_records += other.correlation.dropped_records;
        self.correlation.correlation_failures += other.correlation.correlation_failures;
        self.correlation.creator_unmatched += other.correlation.creator_unmatched;
        self.correlation.proximity_creator_matches += other.correlation.proximity_creator_matches;
        self.correlation.unresolved_product_refs += other.correlation.unresolved_product_refs;
        self.correlation.fallback_posts_rejected += other.correlation.fallback_posts_rejected;
        self.normalize_dropped += other.normalize_dropped;
        self.details.absorb(&other.details);
        self.posts_emitted += other.posts_emitted;
        self.posts_new += other.posts_new;
        self.with_video += other.with_video;
        self.with_products += other.with_products;

        let mut counts: HashMap<String, usize> = self.top_creators.drain(..).collect();
        for (name, n) in &other.top_creators {
            *counts.entry(name.clone()).or_default() += n;
        }
        let mut top: Vec<(String, usize)> = counts.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(TOP_CREATORS);
        self.top_creators = top;
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Extraction Run Complete ===")?;
        if !self.source_page.is_empty() {
            writeln!(f, "Source page:        {}", self.source_page)?;
        }
        writeln!(f, "Responses captured: {}", self.responses_captured)?;
        writeln!(f, "Scroll cycles:      {}", self.scroll_cycles)?;
        if self.capture_timed_out {
            writeln!(f, "Capture:            hit deadline (partial)")?;
        }
        if !self.strategies.is_empty() {
            writeln!(f, "\nStrategies:")?;
            for report in &self.strategies {
                match &report.outcome {
                    StrategyOutcome::Applied => writeln!(
                        f,
                        "  {:<21} {} fragments, {} skipped",
                        report.strategy.as_str(),
                        report.fragments,
                        report.skipped
                    )?,
                    StrategyOutcome::Unavailable(reason) => writeln!(
                        f,
                        "  {:<21} unavailable ({reason})",
                        report.strategy.as_str()
                    )?,
                }
            }
        }
        writeln!(f, "\nCorrelation:")?;
        writeln!(f, "  Dropped records:      {}", self.dropped_records())?;
        writeln!(f, "  Correlation failures: {}", self.correlation.correlation_failures)?;
        writeln!(f, "  Creators unmatched:   {}", self.correlation.creator_unmatched)?;
        writeln!(f, "  Proximity creators:   {}", self.correlation.proximity_creator_matches)?;
        if self.correlation.unresolved_product_refs > 0 {
            writeln!(f, "  Unresolved products:  {}", self.correlation.unresolved_product_refs)?;
        }
        if self.correlation.fallback_posts_rejected > 0 {
            writeln!(f, "  Fallback rejected:    {}", self.correlation.fallback_posts_rejected)?;
        }
        if self.details.attempted > 0 {
            writeln!(f, "\nPost pages visited: {}", self.details.attempted)?;
            writeln!(f, "  Enriched:         {}", self.details.enriched)?;
            writeln!(f, "  Failed:           {}", self.details.failed)?;
        }
        writeln!(f, "\nPosts emitted:      {}", self.posts_emitted)?;
        writeln!(f, "Posts new to sink:  {}", self.posts_new)?;
        writeln!(f, "With video:         {}", self.with_video)?;
        writeln!(f, "With products:      {}", self.with_products)?;
        if !self.top_creators.is_empty() {
            writeln!(f, "\nTop creators:")?;
            for (name, n) in &self.top_creators {
                writeln!(f, "  @{name}: {n}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use shopscout_common::{Creator, Media, Product};

    use super::*;

    fn post(id: &str, creator: Option<&str>, video: bool, products: usize) -> CanonicalPost {
        CanonicalPost {
            post_id: id.into(),
            post_url: format!("https://site/explore/a/posts/{id}"),
            source_page: String::new(),
            category: String::new(),
            creator: Creator {
                username: creator.map(String::from),
                ..Default::default()
            },
            caption: String::new(),
            hashtags: vec![],
            mentions: vec![],
            media: Media::new(
                String::new(),
                String::new(),
                vec![],
                video.then(|| "https://v/1.mp4".to_string()),
            ),
            products: vec![Product::default(); products],
            scraped_at: Utc::now(),
            published_at: None,
        }
    }

    #[test]
    fn record_posts_counts_video_products_and_creators() {
        let mut summary = RunSummary::default();
        summary.record_posts(&[
            post("1", Some("alice"), true, 0),
            post("2", Some("bob"), false, 2),
            post("3", Some("alice"), false, 1),
            post("4", None, false, 0),
        ]);
        assert_eq!(summary.posts_emitted, 4);
        assert_eq!(summary.with_video, 1);
        assert_eq!(summary.with_products, 2);
        assert_eq!(
            summary.top_creators,
            vec![("alice".to_string(), 2), ("bob".to_string(), 1)]
        );
    }

    #[test]
    fn absorb_sums_counters_and_reranks_creators() {
        let mut total = RunSummary::default();
        total.record_posts(&[post("1", Some("bob"), false, 0)]);

        let mut other = RunSummary::default();
        other.record_posts(&[post("2", Some("alice"), true, 0), post("3", Some("alice"), false, 0)]);
        other.correlation.dropped_records = 2;
        other.details = DetailStats {
            attempted: 2,
            enriched: 1,
            failed: 1,
        };

        total.absorb(&other);
        assert_eq!(total.posts_emitted, 3);
        assert_eq!(total.details.enriched, 1);
        assert!(total.to_string().contains("Post pages visited: 2"));
        assert_eq!(total.with_video, 1);
        assert_eq!(total.dropped_records(), 2);
        assert_eq!(total.top_creators[0], ("alice".to_string(), 2));
    }

    #[test]
    fn display_lists_unavailable_strategies() {
        let summary = RunSummary {
            strategies: vec![StrategyReport {
                strategy: Strategy::EmbeddedState,
                outcome: StrategyOutcome::Unavailable("no embedded state blob".into()),
                fragments: 0,
                skipped: 0,
            }],
            ..Default::default()
        };
        let text = summary.to_string();
        assert!(text.contains("embedded_state"));
        assert!(text.contains("unavailable (no embedded state blob)"));
        assert_eq!(summary.unavailable_strategies().count(), 1);
    }
}

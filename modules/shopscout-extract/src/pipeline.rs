// Extraction pipeline: capture -> strategies -> barrier -> correlation ->
// normalization/dedup -> optional post-page detail pass -> sink.

use std::sync::Arc;

use shopscout_common::{CanonicalPost, CandidateFragment, PipelineConfig};
use tracing::{debug, info, warn};

use crate::capture::{CaptureDriver, CaptureSession, CaptureTarget, RawCapture};
use crate::correlate::correlate;
use crate::dedup::dedup_posts;
use crate::detail::{detail_candidates, merge_detail, DetailStats};
use crate::error::Result;
use crate::normalize::{Normalizer, RunContext};
use crate::sink::OutputSink;
use crate::stats::{RunSummary, StrategyReport};
use crate::strategies::{build_extractors, Extractor, StrategyOutput};

pub struct PipelineOutput {
    pub posts: Vec<CanonicalPost>,
    pub summary: RunSummary,
}

pub struct Pipeline {
    config: PipelineConfig,
    extractors: Vec<Arc<dyn Extractor>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let extractors = build_extractors(&config);
        Self { config, extractors }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every enabled strategy against the closed capture, each on its own
    /// blocking task, and wait for all of them. Outputs come back in priority
    /// order.
    pub async fn extract(&self, capture: Arc<RawCapture>) -> Vec<StrategyOutput> {
        let handles: Vec<_> = self
            .extractors
            .iter()
            .map(|extractor| {
                let extractor = Arc::clone(extractor);
                let capture = Arc::clone(&capture);
                let strategy = extractor.strategy();
                (strategy, tokio::task::spawn_blocking(move || extractor.extract(&capture)))
            })
            .collect();

        let mut outputs = Vec::with_capacity(handles.len());
        for (strategy, handle) in handles {
            match handle.await {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    warn!(%strategy, error = %e, "Extractor task failed");
                    outputs.push(StrategyOutput::unavailable(
                        strategy,
                        format!("extractor task failed: {e}"),
                    ));
                }
            }
        }
        outputs
    }

    /// Correlate, normalize and dedup the strategies' combined output.
    pub fn process(&self, outputs: &[StrategyOutput], ctx: &RunContext) -> PipelineOutput {
        let fragments: Vec<CandidateFragment> = outputs
            .iter()
            .flat_map(|o| o.fragments.iter().cloned())
            .collect();

        let correlation = correlate(&fragments, &self.config);
        let correlated = correlation.posts.len();

        let normalizer = Normalizer::new(&self.config);
        let normalized: Vec<CanonicalPost> = correlation
            .posts
            .into_iter()
            .filter_map(|post| normalizer.normalize(post, ctx))
            .collect();
        let normalize_dropped = correlated - normalized.len();
        let posts = dedup_posts(normalized);

        let mut summary = RunSummary {
            source_page: ctx.source_page.clone(),
            strategies: outputs.iter().map(StrategyReport::from).collect(),
            correlation: correlation.stats,
            normalize_dropped,
            ..Default::default()
        };
        summary.record_posts(&posts);

        for report in summary.unavailable_strategies() {
            info!(strategy = %report.strategy, outcome = ?report.outcome, "Strategy unavailable");
        }

        PipelineOutput { posts, summary }
    }

    /// Everything after capture, for a capture already in hand.
    pub async fn run_capture(&self, capture: RawCapture, target: &CaptureTarget) -> PipelineOutput {
        let ctx = RunContext::new(target.url.clone(), target.category.clone());
        info!(run_id = %ctx.run_id, url = target.url.as_str(), "Extraction run started");

        let timed_out = capture.timed_out;
        let responses = capture.responses.len();
        let cycles = capture.cycles_completed;

        let outputs = self.extract(Arc::new(capture)).await;
        let mut output = self.process(&outputs, &ctx);
        output.summary.capture_timed_out = timed_out;
        output.summary.responses_captured = responses;
        output.summary.scroll_cycles = cycles;

        info!(
            run_id = %ctx.run_id,
            posts = output.posts.len(),
            dropped = output.summary.dropped_records(),
            timed_out,
            "Extraction run finished"
        );
        output
    }

    /// Revisit up to `details.limit` posts on their own permalink and fill
    /// what the listing left empty. A failed post page is counted and
    /// skipped; it never fails the run.
    pub async fn enrich_details(
        &self,
        driver: Arc<dyn CaptureDriver>,
        posts: &mut [CanonicalPost],
    ) -> DetailStats {
        let mut stats = DetailStats::default();
        if !self.config.details.is_enabled() {
            return stats;
        }

        let capture_config = self
            .config
            .capture
            .with_scroll_cycles(self.config.details.scroll_cycles);

        for (n, index) in detail_candidates(posts, self.config.details.limit)
            .into_iter()
            .enumerate()
        {
            if n > 0 && self.config.details.delay_ms > 0 {
                tokio::time::sleep(self.config.details.delay()).await;
            }
            stats.attempted += 1;

            let post = &mut posts[index];
            let target = CaptureTarget::builder()
                .url(post.post_url.as_str())
                .category(post.category.as_str())
                .build();

            let capture =
                match CaptureSession::run(Arc::clone(&driver), target, &capture_config).await {
                    Ok(capture) => capture,
                    Err(e) => {
                        warn!(post_id = post.post_id.as_str(), error = %e, "Post page capture failed");
                        stats.failed += 1;
                        continue;
                    }
                };

            let ctx = RunContext::new(post.post_url.clone(), post.category.clone());
            let outputs = self.extract(Arc::new(capture)).await;
            let detail = self
                .process(&outputs, &ctx)
                .posts
                .into_iter()
                .find(|d| d.post_id == post.post_id);

            match detail {
                Some(detail) => {
                    if merge_detail(post, detail) {
                        stats.enriched += 1;
                    }
                }
                None => {
                    debug!(post_id = post.post_id.as_str(), "Post page did not contain the post");
                    stats.failed += 1;
                }
            }
        }

        info!(
            attempted = stats.attempted,
            enriched = stats.enriched,
            failed = stats.failed,
            "Detail pass finished"
        );
        stats
    }

    /// Capture `target` through `driver`, extract, optionally revisit post
    /// pages, and write to `sink`.
    pub async fn run(
        &self,
        driver: Arc<dyn CaptureDriver>,
        target: CaptureTarget,
        sink: &dyn OutputSink,
    ) -> Result<PipelineOutput> {
        let capture =
            CaptureSession::run(Arc::clone(&driver), target.clone(), &self.config.capture).await?;
        let mut output = self.run_capture(capture, &target).await;

        if self.config.details.is_enabled() {
            output.summary.details = self.enrich_details(driver, &mut output.posts).await;
            output.summary.record_posts(&output.posts);
        }

        output.summary.posts_new = sink.write(&output.posts).await?;
        Ok(output)
    }
}

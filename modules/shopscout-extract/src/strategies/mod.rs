// Strategy extractors: each reads one raw feed of a closed capture and emits
// candidate fragments in discovery order. None of them fail; a feed that is
// missing or unusable yields an `Unavailable` outcome and zero fragments.

mod dom;
mod embedded_state;
pub(crate) mod json;
mod network;

pub use dom::DomRegexExtractor;
pub use embedded_state::EmbeddedStateExtractor;
pub use network::NetworkExtractor;

use std::sync::Arc;

use shopscout_common::{CandidateFragment, PipelineConfig, Strategy};

use crate::capture::RawCapture;

pub trait Extractor: Send + Sync {
    fn strategy(&self) -> Strategy;

    fn extract(&self, capture: &RawCapture) -> StrategyOutput;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Applied,
    /// The strategy's input was absent or unreadable.
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct StrategyOutput {
    pub strategy: Strategy,
    pub fragments: Vec<CandidateFragment>,
    pub outcome: StrategyOutcome,
    /// Items or responses that failed to parse and were skipped.
    pub skipped: usize,
}

impl StrategyOutput {
    pub fn applied(strategy: Strategy, fragments: Vec<CandidateFragment>, skipped: usize) -> Self {
        Self {
            strategy,
            fragments,
            outcome: StrategyOutcome::Applied,
            skipped,
        }
    }

    pub fn unavailable(strategy: Strategy, reason: impl Into<String>) -> Self {
        Self {
            strategy,
            fragments: Vec::new(),
            outcome: StrategyOutcome::Unavailable(reason.into()),
            skipped: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.outcome == StrategyOutcome::Applied
    }
}

/// Build the enabled extractors, highest priority first.
pub fn build_extractors(config: &PipelineConfig) -> Vec<Arc<dyn Extractor>> {
    config
        .strategy_priority
        .iter()
        .map(|strategy| -> Arc<dyn Extractor> {
            match strategy {
                Strategy::EmbeddedState => Arc::new(EmbeddedStateExtractor),
                Strategy::NetworkInterception => {
                    Arc::new(NetworkExtractor::new(config.api_host_filter.clone()))
                }
                Strategy::DomRegex => Arc::new(DomRegexExtractor),
            }
        })
        .collect()
}

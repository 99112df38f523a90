pub mod capture;
pub mod correlate;
pub mod dedup;
pub mod detail;
pub mod drivers;
pub mod error;
pub mod media;
pub mod normalize;
pub mod patterns;
pub mod pipeline;
pub mod sink;
pub mod stats;
pub mod strategies;
pub mod text;

pub use capture::{CaptureDriver, CaptureEvent, CaptureSession, CaptureTarget, CapturedResponse, RawCapture};
pub use correlate::{correlate, CorrelatedPost, Correlation, CorrelationStats, CreatorMatch};
pub use dedup::dedup_posts;
pub use detail::{merge_detail, DetailStats};
pub use drivers::{BrowserlessDriver, RemoteBrowser, ReplayDriver, ReplayFile, ReplayResponse};
pub use error::{CaptureError, MediaError, PipelineError, Result, SinkError};
pub use media::{DownloadStats, MediaDownloader};
pub use normalize::{Normalizer, RunContext};
pub use pipeline::{Pipeline, PipelineOutput};
pub use sink::{JsonFileSink, MemorySink, OutputSink};
pub use stats::RunSummary;
pub use strategies::{Extractor, StrategyOutcome, StrategyOutput};

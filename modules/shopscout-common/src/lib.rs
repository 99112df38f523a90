pub mod categories;
pub mod config;
pub mod error;
pub mod post;
pub mod types;

pub use categories::{category_name, category_url, CATEGORIES, DEFAULT_CATEGORY};
pub use config::{CaptureConfig, DetailConfig, PipelineConfig, ProximityConfig};
pub use error::ConfigError;
pub use post::{CanonicalPost, Creator, Media, Product};
pub use types::*;

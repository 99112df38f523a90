// Output sinks. The records a sink already holds are its "seen post id" set:
// every write merges into them through the same dedup rule used within a run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use shopscout_common::CanonicalPost;
use tracing::info;

use crate::dedup::dedup_posts;
use crate::error::SinkError;

#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Merge `posts` into the sink. Returns how many post ids were new.
    async fn write(&self, posts: &[CanonicalPost]) -> Result<usize, SinkError>;

    fn name(&self) -> &str;
}

fn count_new(existing: &[CanonicalPost], incoming: &[CanonicalPost]) -> usize {
    let seen: HashSet<&str> = existing.iter().map(|p| p.post_id.as_str()).collect();
    incoming
        .iter()
        .map(|p| p.post_id.as_str())
        .filter(|id| !seen.contains(id))
        .collect::<HashSet<_>>()
        .len()
}

/// JSON array file. Writes go to a sibling temp file first and are renamed
/// into place, so a crash never leaves a half-written array.
pub struct JsonFileSink {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_existing(&self) -> Result<Vec<CanonicalPost>, SinkError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                SinkError::Rejected(format!(
                    "{} is not a JSON array of posts: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl OutputSink for JsonFileSink {
    async fn write(&self, posts: &[CanonicalPost]) -> Result<usize, SinkError> {
        let _guard = self.lock.lock().await;

        let existing = self.read_existing().await?;
        let added = count_new(&existing, posts);
        let merged = dedup_posts(existing.into_iter().chain(posts.iter().cloned()));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&merged)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        info!(
            path = %self.path.display(),
            added,
            total = merged.len(),
            "Wrote posts"
        );
        Ok(added)
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

/// In-process sink, mainly for tests and embedding.
#[derive(Default)]
pub struct MemorySink {
    posts: Mutex<Vec<CanonicalPost>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posts(&self) -> Vec<CanonicalPost> {
        match self.posts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn write(&self, posts: &[CanonicalPost]) -> Result<usize, SinkError> {
        let mut guard = self
            .posts
            .lock()
            .map_err(|_| SinkError::Rejected("memory sink lock poisoned".into()))?;
        let added = count_new(&guard, posts);
        let existing = std::mem::take(&mut *guard);
        *guard = dedup_posts(existing.into_iter().chain(posts.iter().cloned()));
        Ok(added)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

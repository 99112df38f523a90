// Media download: saves each post's hero image and video next to the JSON
// output. Files already on disk are left alone, so repeated runs only fetch
// what is new. A failed download is counted and logged, never fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use shopscout_common::CanonicalPost;
use tracing::{debug, info, warn};

use crate::error::MediaError;

/// Pause after this many posts.
const BATCH: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl std::fmt::Display for DownloadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Media Download ===")?;
        writeln!(f, "Downloaded: {}", self.downloaded)?;
        writeln!(f, "Already on disk: {}", self.skipped)?;
        writeln!(f, "Failed: {}", self.failed)
    }
}

/// One file to fetch for a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub url: String,
    pub file_name: String,
}

/// `{post_id}_hero.{webp|jpg}` and `{post_id}_video.{m3u8|mp4}`.
pub fn media_files(post: &CanonicalPost) -> Vec<MediaFile> {
    let stem = file_stem(&post.post_id);
    let mut files = Vec::new();

    let hero = post.media.hero_image_url.as_str();
    if !hero.is_empty() {
        let ext = if hero.contains(".webp") { "webp" } else { "jpg" };
        files.push(MediaFile {
            url: hero.to_string(),
            file_name: format!("{stem}_hero.{ext}"),
        });
    }
    if let Some(video) = post.media.video_url.as_deref() {
        let ext = if video.contains(".m3u8") { "m3u8" } else { "mp4" };
        files.push(MediaFile {
            url: video.to_string(),
            file_name: format!("{stem}_video.{ext}"),
        });
    }
    files
}

/// Post ids come from URLs; keep file names to a safe alphabet.
fn file_stem(post_id: &str) -> String {
    post_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

pub struct MediaDownloader {
    client: reqwest::Client,
    dir: PathBuf,
    pause: Duration,
}

impl MediaDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            dir: dir.into(),
            pause: Duration::from_millis(500),
        })
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download media for every post. Only creating the target directory
    /// can fail the call.
    pub async fn download_all(&self, posts: &[CanonicalPost]) -> Result<DownloadStats, MediaError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut stats = DownloadStats::default();

        for (i, post) in posts.iter().enumerate() {
            if i > 0 && i % BATCH == 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            for file in media_files(post) {
                let path = self.dir.join(&file.file_name);
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    debug!(file = file.file_name.as_str(), "Media already on disk");
                    stats.skipped += 1;
                    continue;
                }
                match self.fetch(&file.url, &path).await {
                    Ok(bytes) => {
                        debug!(file = file.file_name.as_str(), bytes, "Downloaded media");
                        stats.downloaded += 1;
                    }
                    Err(e) => {
                        warn!(url = file.url.as_str(), error = %e, "Media download failed");
                        stats.failed += 1;
                    }
                }
            }
        }

        info!(
            dir = %self.dir.display(),
            downloaded = stats.downloaded,
            skipped = stats.skipped,
            failed = stats.failed,
            "Media download complete"
        );
        Ok(stats)
    }

    async fn fetch(&self, url: &str, path: &Path) -> Result<usize, MediaError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(MediaError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await?;
        tokio::fs::write(path, &body).await?;
        Ok(body.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use shopscout_common::{Creator, Media};

    use super::*;

    fn post(id: &str, hero: &str, video: Option<&str>) -> CanonicalPost {
        CanonicalPost {
            post_id: id.into(),
            post_url: format!("https://site/explore/a/posts/{id}"),
            source_page: String::new(),
            category: String::new(),
            creator: Creator::default(),
            caption: String::new(),
            hashtags: vec![],
            mentions: vec![],
            media: Media::new(hero.into(), String::new(), vec![], video.map(String::from)),
            products: vec![],
            scraped_at: Utc::now(),
            published_at: None,
        }
    }

    #[test]
    fn file_names_follow_media_type() {
        let files = media_files(&post(
            "p1",
            "https://cdn/p1.webp?w=450",
            Some("https://v/p1/index.m3u8"),
        ));
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["p1_hero.webp", "p1_video.m3u8"]);

        let files = media_files(&post("p2", "https://cdn/p2.png", Some("https://v/p2.mp4")));
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["p2_hero.jpg", "p2_video.mp4"]);

        assert!(media_files(&post("p3", "", None)).is_empty());
    }

    #[test]
    fn unsafe_characters_in_ids_are_replaced() {
        let files = media_files(&post("../p1?x", "https://cdn/a.jpg", None));
        assert_eq!(files[0].file_name, "___p1_x_hero.jpg");
    }

    #[tokio::test]
    async fn existing_files_are_not_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p1_hero.jpg"), b"cached").unwrap();

        let downloader = MediaDownloader::new(dir.path())
            .unwrap()
            .with_pause(Duration::ZERO);
        let stats = downloader
            .download_all(&[post("p1", "http://127.0.0.1:1/p1.jpg", None)])
            .await
            .unwrap();

        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.downloaded, 0);
        assert_eq!(std::fs::read(dir.path().join("p1_hero.jpg")).unwrap(), b"cached");
    }

    #[tokio::test]
    async fn unreachable_media_is_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = MediaDownloader::new(dir.path().join("media"))
            .unwrap()
            .with_pause(Duration::ZERO);

        let stats = downloader
            .download_all(&[post("p1", "http://127.0.0.1:1/p1.jpg", None)])
            .await
            .unwrap();

        assert_eq!(stats.failed, 1);
        assert!(downloader.dir().is_dir());
        assert!(!dir.path().join("media/p1_hero.jpg").exists());
    }
}

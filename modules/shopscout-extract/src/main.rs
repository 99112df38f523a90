use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use browserless_client::BrowserlessClient;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shopscout_common::{category_name, category_url, PipelineConfig, CATEGORIES, DEFAULT_CATEGORY};
use shopscout_extract::{
    BrowserlessDriver, CaptureDriver, CaptureTarget, JsonFileSink, MediaDownloader, Pipeline,
    ReplayDriver, RunSummary,
};

#[derive(Parser)]
#[command(name = "shopscout", about = "Extract creator posts from category and feed pages")]
struct Cli {
    /// Category slug to capture (e.g. ltkhome)
    #[arg(long, conflicts_with = "all_categories")]
    category: Option<String>,

    /// Capture an arbitrary page instead of a category listing
    #[arg(long, conflicts_with = "all_categories")]
    url: Option<String>,

    /// Capture every known category in turn
    #[arg(long)]
    all_categories: bool,

    /// Replay a saved capture file instead of driving a browser
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Path to config TOML file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "data/scraped")]
    output_dir: PathBuf,

    /// Pause between categories
    #[arg(long, default_value_t = 3000)]
    delay_ms: u64,

    /// Revisit up to N posts per page on their own permalink (overrides config)
    #[arg(long)]
    details: Option<usize>,

    /// Download hero images and videos of the emitted posts
    #[arg(long)]
    download_media: bool,

    #[arg(long, default_value = "data/media")]
    media_dir: PathBuf,
}

fn targets(cli: &Cli, config: &PipelineConfig) -> Result<Vec<CaptureTarget>> {
    if let Some(url) = &cli.url {
        let category = cli.category.clone().unwrap_or_else(|| "custom".to_string());
        return Ok(vec![CaptureTarget::builder().url(url.as_str()).category(category).build()]);
    }

    let slugs: Vec<&str> = if cli.all_categories {
        CATEGORIES.iter().map(|(slug, _)| *slug).collect()
    } else {
        vec![cli.category.as_deref().unwrap_or(DEFAULT_CATEGORY)]
    };

    slugs
        .into_iter()
        .map(|slug| {
            if category_name(slug).is_none() {
                bail!("Unknown category '{slug}'");
            }
            let slug = slug.to_lowercase();
            Ok(CaptureTarget::builder()
                .url(category_url(config.base_url(), &slug))
                .category(slug)
                .build())
        })
        .collect()
}

async fn driver(cli: &Cli, config: &PipelineConfig) -> Result<Arc<dyn CaptureDriver>> {
    if let Some(path) = &cli.replay {
        let driver = ReplayDriver::load(path)
            .await
            .with_context(|| format!("Failed to load replay file {}", path.display()))?;
        return Ok(Arc::new(driver));
    }

    let base = std::env::var("BROWSERLESS_URL")
        .context("BROWSERLESS_URL must be set (or pass --replay)")?;
    let token = std::env::var("BROWSERLESS_TOKEN").ok();
    let client = BrowserlessClient::new(&base, token.as_deref())?;
    Ok(Arc::new(BrowserlessDriver::new(
        client,
        config.capture.clone(),
        config.api_host_filter.clone(),
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("shopscout=info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(limit) = cli.details {
        config.details.limit = limit;
    }
    config.log_summary();

    let targets = targets(&cli, &config)?;
    let driver = driver(&cli, &config).await?;

    let file_name = format!("ltk-posts-{}.json", chrono::Utc::now().format("%Y-%m-%d"));
    let sink = JsonFileSink::new(cli.output_dir.join(file_name));
    info!(path = %sink.path().display(), targets = targets.len(), "shopscout starting");

    let pipeline = Pipeline::new(config);
    let mut total = RunSummary::default();
    let mut emitted = Vec::new();
    let single = targets.len() == 1;

    for (i, target) in targets.into_iter().enumerate() {
        if i > 0 && cli.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(cli.delay_ms)).await;
        }
        let url = target.url.clone();
        match pipeline.run(Arc::clone(&driver), target, &sink).await {
            Ok(output) => {
                if single {
                    total = output.summary;
                } else {
                    total.absorb(&output.summary);
                }
                emitted.extend(output.posts);
            }
            Err(e) if single => return Err(e).with_context(|| format!("Extraction failed for {url}")),
            Err(e) => error!(url = url.as_str(), error = %e, "Extraction failed, continuing"),
        }
    }

    println!("{total}");

    if cli.download_media {
        let downloader = MediaDownloader::new(&cli.media_dir)?;
        let stats = downloader
            .download_all(&emitted)
            .await
            .with_context(|| format!("Failed to prepare {}", cli.media_dir.display()))?;
        println!("{stats}");
    }
    Ok(())
}

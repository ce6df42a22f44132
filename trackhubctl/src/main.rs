use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::{Context, Result, bail};
use futures_util::StreamExt;
use libtrackhub_downloader::settings::DownloadSettings;
use libtrackhub_downloader::{DownloadEvent, DownloadManager, DownloadRequest, JobStatus};
use libtrackhub_player::settings::PlayerSettings;
use libtrackhub_player::{
    NoPreload, PlaybackController, PlaybackTrack, queue_from_era, queue_from_tracker,
};
use libtrackhub_resolver::cache::{FileStore, ResolutionCache};
use libtrackhub_resolver::identity::{decode_share_token, encode_share_token, track_id};
use libtrackhub_resolver::provider::{classify, normalize_url};
use libtrackhub_resolver::settings::ResolverSettings;
use libtrackhub_resolver::tracker::{LoadedTracker, TrackerClient, TrackerId, TrackerLoader};
use libtrackhub_resolver::{BatchResolver, UrlResolver};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "trackhubctl", version, about = "Resolve, play and download tracker music")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which provider a URL belongs to
    Classify { url: String },
    /// Resolve a URL to something directly playable
    Resolve { url: String },
    /// Fetch a tracker and resolve every track in it
    Load {
        /// Sheet id or Google Sheets URL
        tracker: String,
        #[arg(long)]
        tab: Option<String>,
        /// Print the resolved map as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build the playback queue for a tracker or one of its eras
    Queue {
        tracker: String,
        #[arg(long)]
        tab: Option<String>,
        #[arg(long)]
        era: Option<String>,
    },
    /// Download a tracker (or one era) into a ZIP archive
    Download {
        tracker: String,
        #[arg(long)]
        tab: Option<String>,
        #[arg(long)]
        era: Option<String>,
    },
    /// Share link tokens
    Share {
        #[command(subcommand)]
        command: ShareCommand,
    },
    /// Maintain the resolution cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
enum ShareCommand {
    Encode { url: String },
    Decode { token: String },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Remove every cached tracker
    Clear,
    /// Remove expired entries only
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::from_path("./.env").ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = ResolverSettings::from_env().wrap_err("Error loading resolver settings")?;

    match cli.command {
        Commands::Classify { url } => {
            let provider = classify(&url);
            println!("{} ({})", provider.display_name(), normalize_url(&url));
        }
        Commands::Resolve { url } => {
            let resolver = UrlResolver::new(&settings).wrap_err("Error creating resolver")?;
            match resolver.resolve(&url).await {
                Some(playable) => println!("{playable}"),
                None => bail!("{url} could not be resolved"),
            }
        }
        Commands::Load { tracker, tab, json } => {
            let loaded = load(&settings, &tracker, tab.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&loaded.resolved)?);
            } else {
                let playable = loaded.resolved.values().filter(|v| v.is_some()).count();
                println!(
                    "{}: {} eras, {playable}/{} playable{}",
                    loaded.data.name,
                    loaded.data.eras.len(),
                    loaded.resolved.len(),
                    if loaded.from_cache { " (cached)" } else { "" }
                );
            }
        }
        Commands::Queue { tracker, tab, era } => {
            let loaded = load(&settings, &tracker, tab.as_deref()).await?;
            let tracks = playback_queue(&loaded, era.as_deref());
            let mut controller =
                PlaybackController::new(PlayerSettings::default(), Arc::new(NoPreload));
            for track in tracks {
                controller.add_to_queue(track, false)?;
            }
            for (i, track) in controller.upcoming().enumerate() {
                println!("{:>3}. {} [{}] {}", i + 1, track.name, track.era_name, track.source.display_name());
            }
        }
        Commands::Download { tracker, tab, era } => {
            let loaded = load(&settings, &tracker, tab.as_deref()).await?;
            download(&loaded, era).await?;
        }
        Commands::Share { command } => match command {
            ShareCommand::Encode { url } => {
                println!("{} {}", track_id(url.trim()), encode_share_token(&url));
            }
            ShareCommand::Decode { token } => match decode_share_token(&token) {
                Some(url) => println!("{url}"),
                None => bail!("{token} is not a valid share token"),
            },
        },
        Commands::Cache { command } => {
            let cache = open_cache(&settings)?;
            let removed = match command {
                CacheCommand::Clear => cache.clear(),
                CacheCommand::Purge => cache.purge_expired(),
            };
            println!("removed {removed} entries");
        }
    }
    Ok(())
}

fn open_cache(settings: &ResolverSettings) -> Result<ResolutionCache> {
    let store = FileStore::try_new().wrap_err("Error opening cache directory")?;
    Ok(ResolutionCache::new(Arc::new(store), settings))
}

async fn load(settings: &ResolverSettings, tracker: &str, tab: Option<&str>) -> Result<LoadedTracker> {
    let id = TrackerId::parse(tracker)?;
    let resolver = Arc::new(UrlResolver::new(settings).wrap_err("Error creating resolver")?);
    let batch = Arc::new(
        BatchResolver::new(resolver, open_cache(settings)?).batch_size(settings.batch_size),
    );
    let client = TrackerClient::new(settings).wrap_err("Error creating tracker client")?;
    let loader = TrackerLoader::new(Arc::new(client), batch);

    match loader
        .load(&id, tab, |done, total| info!("resolved {done}/{total}"))
        .await
    {
        Ok(loaded) => Ok(loaded),
        Err(e) if e.is_fallback() => {
            bail!("{e}. The tracker service is unavailable, try the sheet directly")
        }
        Err(e) => Err(e).wrap_err_with(|| format!("Error loading tracker {id}")),
    }
}

fn playback_queue(loaded: &LoadedTracker, era: Option<&str>) -> Vec<PlaybackTrack> {
    match era {
        Some(era) => queue_from_era(&loaded.data, era, &loaded.resolved),
        None => queue_from_tracker(&loaded.data, &loaded.resolved),
    }
}

async fn download(loaded: &LoadedTracker, era: Option<String>) -> Result<()> {
    let tracks = playback_queue(loaded, era.as_deref());
    if tracks.is_empty() {
        bail!("nothing to download");
    }
    let requests: Vec<_> = tracks
        .iter()
        .filter_map(|t| {
            let url = t.playable_url.as_deref()?;
            Some(DownloadRequest::new(&t.name, Some(t.era_name.as_str()), url))
        })
        .collect();

    let settings = DownloadSettings::from_env().wrap_err("Error loading download settings")?;
    let manager = DownloadManager::new(settings).wrap_err("Error creating download manager")?;
    let mut events = manager.events();

    let job_name = match &era {
        Some(era) => format!("{} - {era}", loaded.data.name),
        None => loaded.data.name.clone(),
    };
    let id = manager.start_job(job_name, loaded.data.name.clone(), era, requests)?;

    let progress = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if event.job() != id {
                continue;
            }
            match event {
                DownloadEvent::ItemCompleted { item, .. } => info!("item {item} done"),
                DownloadEvent::ItemRetrying { item, retry_count, .. } => {
                    info!("retrying item {item} (attempt {})", retry_count + 1)
                }
                DownloadEvent::ItemFailed { item, error, .. } => info!("item {item} failed: {error}"),
                DownloadEvent::JobFinished { .. } => break,
                _ => {}
            }
        }
    });

    let job = manager.wait_for_job(id).await;
    progress.abort();
    let Some(job) = job else {
        bail!("download job disappeared");
    };
    match (job.status, job.archive) {
        (JobStatus::Completed, Some(archive)) => {
            println!(
                "saved {} files ({} bytes) to {}",
                archive.file_count,
                archive.size,
                archive
                    .path
                    .map(|p| p.display().to_string())
                    .unwrap_or(archive.object_url)
            );
            Ok(())
        }
        (status, _) => bail!("download {status}: {}", job.error.unwrap_or_default()),
    }
}

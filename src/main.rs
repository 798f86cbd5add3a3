use anyhow::Result;
use clap::Parser;
use podcast_compositor::core::config::Config;
use podcast_compositor::core::events::LogSink;
use podcast_compositor::core::io::NativeStorage;
use podcast_compositor::services::fetch::HttpFetcher;
use podcast_compositor::services::video::VideoOutcome;
use podcast_compositor::services::workflow::PodcastWorkflow;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "podcast-compositor", version, about = "Mix a podcast project into a finished episode")]
struct Cli {
    /// Project document produced by the script and speech stages.
    project: String,

    /// Settings file (defaults to ./config.yml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also render a slideshow video with burned-in subtitles.
    #[arg(long)]
    video: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .inspect_err(|e| eprintln!("Error loading config: {:#}", e))?;
    if cli.video {
        config.video.enabled = true;
    }
    config.ensure_directories()?;

    let fetcher = Arc::new(HttpFetcher::new(&config.proxy)?);
    let workflow = PodcastWorkflow::new(
        config,
        Arc::new(NativeStorage::new()),
        fetcher,
        Arc::new(LogSink),
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Stopping as requested.");
            ctrl_c.cancel();
        }
    });

    let report = workflow.run(&cli.project, cancel).await?;
    println!(
        "Episode complete: {} ({:.1}s)",
        report.audio_path.display(),
        report.duration_sec
    );
    println!("Subtitles: {}", report.subtitles_path.display());
    match report.video {
        Some(VideoOutcome::Completed(path)) => println!("Video: {}", path.display()),
        Some(VideoOutcome::Cancelled) => println!("Video export cancelled."),
        None => {}
    }

    Ok(())
}

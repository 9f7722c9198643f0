//! Narrated short video generator.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_pipeline::{Pipeline, PipelineConfig, RunOutcome, RunRequest, VideoSource};

/// Generate a narrated vertical video about a topic.
#[derive(Debug, Parser)]
#[command(name = "reel", version, about)]
struct Cli {
    /// What the video is about
    topic: String,

    /// Content niche used to flavour the script
    #[arg(long, default_value = "general")]
    niche: String,

    /// TTS voice name
    #[arg(long)]
    voice: Option<String>,

    /// Target narration length in seconds
    #[arg(long)]
    duration: Option<u32>,

    /// Background music file, looped under the narration
    #[arg(long)]
    music: Option<PathBuf>,

    /// Output directory
    #[arg(long)]
    output: Option<PathBuf>,

    /// Footage source: pexels, pixabay or both
    #[arg(long)]
    source: Option<VideoSource>,

    /// Skip hardware encoding
    #[arg(long)]
    no_gpu: bool,
}

impl Cli {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(voice) = &self.voice {
            config.voice = voice.clone();
        }
        if let Some(duration) = self.duration {
            config.target_duration = duration;
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(source) = self.source {
            config.video_source = source;
        }
        if self.no_gpu {
            config.use_nvenc = false;
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("reel=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<RunOutcome> {
    let mut config = PipelineConfig::from_env();
    cli.apply(&mut config);
    info!(
        source = %config.video_source,
        duration = config.target_duration,
        nvenc = config.use_nvenc,
        "Pipeline config loaded"
    );

    println!("Generating video: {}", cli.topic);
    let pipeline = Pipeline::from_config(config)
        .await?
        .with_stage_callback(Arc::new(|stage, summary| {
            println!("  \u{2713} {}: {}", stage.label(), summary);
        }));

    let request = RunRequest::new(cli.topic)
        .with_niche(cli.niche)
        .with_music(cli.music);
    Ok(pipeline.run(&request).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();

    tokio::select! {
        result = run(cli) => match result {
            Ok(outcome) => {
                println!("\nDone! \"{}\" ({:.1}s)", outcome.title, outcome.narration_secs);
                println!("  {}", outcome.output.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Run failed: {:#}", e);
                eprintln!("\nError: {e:#}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            eprintln!("\nCancelled.");
            ExitCode::FAILURE
        }
    }
}

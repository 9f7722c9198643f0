use std::path::Path;
use std::process::Command;

use reel_media::{check_ffmpeg, check_ffprobe};
use reel_models::ProviderId;
use reel_pipeline::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = PipelineConfig::from_env();

    println!(
        "reel-selfcheck: starting with cache_dir={} output_dir={} source={}",
        config.cache_dir.display(),
        config.output_dir.display(),
        config.video_source
    );
    ensure_dir(&config.cache_dir).await?;
    ensure_dir(&config.output_dir).await?;
    ensure_tool("ffmpeg", check_ffmpeg().is_ok())?;
    ensure_tool("ffprobe", check_ffprobe().is_ok())?;
    ensure_ffmpeg_runs()?;
    ensure_tool(&config.tts_command, which::which(&config.tts_command).is_ok())?;
    ensure_tool(&config.stt_command, which::which(&config.stt_command).is_ok())?;

    let vars: Vec<&str> = config
        .video_source
        .providers()
        .into_iter()
        .map(|provider| match provider {
            ProviderId::Pexels => "PEXELS_API_KEY",
            ProviderId::Pixabay => "PIXABAY_API_KEY",
        })
        .collect();
    ensure_env_present(&vars)?;

    println!("reel-selfcheck: ok");
    Ok(())
}

async fn ensure_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

fn ensure_tool(name: &str, found: bool) -> anyhow::Result<()> {
    if !found {
        return Err(anyhow::anyhow!("{} not found on PATH", name));
    }
    Ok(())
}

fn ensure_ffmpeg_runs() -> anyhow::Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "ffmpeg -version failed: {:?}",
            output.status
        ));
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).map_or(true, |v| v.trim().is_empty()) {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}

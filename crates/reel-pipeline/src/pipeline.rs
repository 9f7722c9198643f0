//! End-to-end generation: script, voice, transcription, sourcing, assembly.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use reel_models::{ProviderId, TranscriptSegment};
use reel_sourcing::{
    ClipCache, FootageProvider, LlmKeywordExtractor, OllamaClient, PexelsProvider,
    PixabayProvider, SourcingError, VisualSourcer,
};

use crate::assembler::Assembler;
use crate::collaborators::{
    CommandTranscriber, CommandVoiceSynthesizer, OllamaScriptWriter, ScriptWriter, Transcriber,
    VoiceSynthesizer,
};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::RunLogger;
use crate::metrics::{record_run, record_stage_failure};
use crate::output::output_path;

const VOICE_FILE: &str = "voiceover.wav";

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Script,
    Voice,
    Transcription,
    Sourcing,
    Assembly,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Script => "script",
            Stage::Voice => "voice",
            Stage::Transcription => "transcription",
            Stage::Sourcing => "sourcing",
            Stage::Assembly => "assembly",
        }
    }

    /// Human label used in progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Script => "Script",
            Stage::Voice => "Voice",
            Stage::Transcription => "Captions",
            Stage::Sourcing => "Visuals",
            Stage::Assembly => "Output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called once per completed stage with a short summary.
pub type StageCallback = Arc<dyn Fn(Stage, &str) + Send + Sync>;

/// One video to generate.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub topic: String,
    pub niche: String,
    /// Optional music bed, looped under the narration
    pub music: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            niche: "general".to_string(),
            music: None,
        }
    }

    pub fn with_niche(mut self, niche: impl Into<String>) -> Self {
        self.niche = niche.into();
        self
    }

    pub fn with_music(mut self, music: Option<PathBuf>) -> Self {
        self.music = music;
        self
    }
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub title: String,
    pub output: PathBuf,
    pub narration_secs: f64,
    pub clips: usize,
    pub words: usize,
    pub elapsed_secs: f64,
}

/// Build the footage providers the configured source asks for.
pub fn build_providers(config: &PipelineConfig) -> PipelineResult<Vec<Arc<dyn FootageProvider>>> {
    let mut providers: Vec<Arc<dyn FootageProvider>> = Vec::new();
    for id in config.video_source.providers() {
        let key = config
            .api_key(id)
            .ok_or(SourcingError::MissingApiKey(id))?;
        let provider: Arc<dyn FootageProvider> = match id {
            ProviderId::Pexels => Arc::new(PexelsProvider::new(key)?),
            ProviderId::Pixabay => Arc::new(PixabayProvider::new(key)?),
        };
        providers.push(provider);
    }
    Ok(providers)
}

/// Runs every stage for a topic and writes the final video.
pub struct Pipeline {
    config: PipelineConfig,
    writer: Arc<dyn ScriptWriter>,
    voice: Arc<dyn VoiceSynthesizer>,
    transcriber: Arc<dyn Transcriber>,
    sourcer: VisualSourcer,
    assembler: Assembler,
    on_stage: Option<StageCallback>,
}

impl Pipeline {
    /// Wire the default collaborators from configuration.
    pub async fn from_config(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;

        let ollama = OllamaClient::new(config.ollama.clone())?;
        let cache = ClipCache::open(&config.cache_dir).await?;
        let sourcer = VisualSourcer::new(
            build_providers(&config)?,
            cache,
            Arc::new(LlmKeywordExtractor::new(ollama.clone())),
        )?
        .with_orientation(config.format.orientation());

        let writer = Arc::new(OllamaScriptWriter::new(ollama));
        let voice = Arc::new(CommandVoiceSynthesizer::new(config.tts_command.clone()));
        let transcriber = Arc::new(
            CommandTranscriber::new(config.stt_command.clone(), config.stt_model.clone())
                .with_language(config.stt_language.clone()),
        );

        Ok(Self::new(config, writer, voice, transcriber, sourcer))
    }

    pub fn new(
        config: PipelineConfig,
        writer: Arc<dyn ScriptWriter>,
        voice: Arc<dyn VoiceSynthesizer>,
        transcriber: Arc<dyn Transcriber>,
        sourcer: VisualSourcer,
    ) -> Self {
        let assembler = Assembler::new(config.format, config.captions.clone(), config.encoding())
            .with_music_volume(config.music_volume)
            .with_transition(config.transition_secs);
        Self {
            config,
            writer,
            voice,
            transcriber,
            sourcer,
            assembler,
            on_stage: None,
        }
    }

    pub fn with_stage_callback(mut self, callback: StageCallback) -> Self {
        self.on_stage = Some(callback);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Generate one video. Intermediate files live in a per-run directory
    /// under the cache dir and are removed when the run ends.
    pub async fn run(&self, request: &RunRequest) -> PipelineResult<RunOutcome> {
        let logger = RunLogger::new(&request.topic);
        let span = logger.create_span();

        let result = self.execute(&logger, request).instrument(span).await;
        match &result {
            Ok(outcome) => {
                record_run("success");
                logger.log_completion(&format!(
                    "{} in {:.1}s",
                    outcome.output.display(),
                    outcome.elapsed_secs
                ));
            }
            Err(_) => record_run("failure"),
        }
        result
    }

    async fn execute(&self, logger: &RunLogger, request: &RunRequest) -> PipelineResult<RunOutcome> {
        let started = Instant::now();
        logger.log_start(&format!(
            "niche={} duration={}s source={}",
            request.niche, self.config.target_duration, self.config.video_source
        ));

        tokio::fs::create_dir_all(&self.config.cache_dir).await?;
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let work = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(&self.config.cache_dir)?;

        // Script
        let timer = logger.stage(Stage::Script.as_str());
        let script = self
            .writer
            .write(&request.topic, &request.niche, self.config.target_duration)
            .await
            .map_err(|e| stage_failed(logger, Stage::Script, e))?;
        let summary = format!("{} words", script.word_count());
        timer.finish(&summary);
        self.report(Stage::Script, &summary);

        // Voice
        let timer = logger.stage(Stage::Voice.as_str());
        let voice = self
            .voice
            .synthesize(
                &script.text,
                &self.config.voice,
                &self.config.speech_rate,
                &work.path().join(VOICE_FILE),
            )
            .await
            .map_err(|e| stage_failed(logger, Stage::Voice, e))?;
        let summary = format!("{:.1}s", voice.duration);
        timer.finish(&summary);
        self.report(Stage::Voice, &summary);

        // Transcription
        let timer = logger.stage(Stage::Transcription.as_str());
        let segments = self
            .transcriber
            .transcribe(&voice.path)
            .await
            .map_err(|e| stage_failed(logger, Stage::Transcription, e))?;
        let words = TranscriptSegment::flatten(&segments);
        if words.is_empty() {
            logger.log_warning("transcript has no words, rendering without captions");
        }
        let summary = format!("{} words", words.len());
        timer.finish(&summary);
        self.report(Stage::Transcription, &summary);

        // Sourcing
        let timer = logger.stage(Stage::Sourcing.as_str());
        let clips = self
            .sourcer
            .source(&script.text, voice.duration)
            .await
            .map_err(|e| stage_failed(logger, Stage::Sourcing, e.into()))?;
        let summary = format!("{} clips", clips.len());
        timer.finish(&summary);
        self.report(Stage::Sourcing, &summary);

        // Assembly
        let timer = logger.stage(Stage::Assembly.as_str());
        let output = output_path(&self.config.output_dir, &request.topic);
        let output = self
            .assembler
            .assemble(
                &clips,
                &voice,
                &words,
                request.music.as_deref(),
                work.path(),
                &output,
            )
            .await
            .map_err(|e| stage_failed(logger, Stage::Assembly, e))?;
        let summary = output.display().to_string();
        timer.finish(&summary);
        self.report(Stage::Assembly, &summary);

        Ok(RunOutcome {
            run_id: logger.run_id().to_string(),
            title: script.title,
            output,
            narration_secs: voice.duration,
            clips: clips.len(),
            words: words.len(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    fn report(&self, stage: Stage, summary: &str) {
        if let Some(callback) = &self.on_stage {
            callback(stage, summary);
        }
    }
}

fn stage_failed(logger: &RunLogger, stage: Stage, err: PipelineError) -> PipelineError {
    record_stage_failure(stage.as_str());
    logger.log_error(stage.as_str(), &err.to_string());
    err
}

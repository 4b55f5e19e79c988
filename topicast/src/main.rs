//! Topicast command line.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use topicast::prelude::*;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_TOPIC: &str = "DeepSeek R1";
const DEFAULT_BGM: &str = "assets/bgm.mp3";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Style {
    /// Host and Guest take strict turns
    Alternating,
    /// Guest answers in runs, Host comments in between
    Interview,
}

#[derive(Debug, Parser)]
#[command(name = "topicast")]
#[command(about = "Turn a topic into an article, a two-voice podcast and a cover image", long_about = None)]
#[command(version)]
struct Cli {
    /// Topic to research (prompted for when omitted)
    topic: Option<String>,

    /// Directory that receives one sub-directory per run
    #[arg(long, short, default_value = "output", env = "TOPICAST_OUTPUT")]
    output: PathBuf,

    /// Background music (MP3 or WAV); defaults to assets/bgm.mp3 if present
    #[arg(long, env = "TOPICAST_BGM")]
    bgm: Option<PathBuf>,

    /// Mix speech without background music
    #[arg(long, conflicts_with = "bgm")]
    no_bgm: bool,

    /// Turns synthesized in parallel
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Attempts per external call
    #[arg(long, default_value_t = 3)]
    attempts: usize,

    /// Abort the run after this many seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Write podcast.wav instead of podcast.mp3
    #[arg(long)]
    wav: bool,

    /// Dialogue style of the heuristic script
    #[arg(long, value_enum, default_value = "interview")]
    style: Style,

    /// Compose the script without the language model
    #[arg(long)]
    no_llm_script: bool,

    /// Chat completions base URL
    #[arg(long, env = "DEEPSEEK_BASE_URL")]
    llm_base_url: Option<String>,

    /// Speech synthesis base URL
    #[arg(long, env = "TTS_BASE_URL")]
    speech_base_url: Option<String>,
}

impl Cli {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new()
            .with_output_root(&self.output)
            .with_credentials(Credentials::from_env())
            .with_retry(RetryConfig::new().with_max_attempts(self.attempts));

        if let Some(url) = &self.llm_base_url {
            config.endpoints.llm_base_url.clone_from(url);
        }
        if let Some(url) = &self.speech_base_url {
            config.endpoints.speech_base_url.clone_from(url);
        }

        config.synthesis.concurrency = self.concurrency.max(1);
        config.script.use_llm = !self.no_llm_script;
        config.script.style = match self.style {
            Style::Alternating => StylePolicy::Alternating,
            Style::Interview => StylePolicy::default(),
        };
        config.mix.format = if self.wav { AudioFormat::Wav } else { AudioFormat::Mp3 };
        config.mix.background_path = if self.no_bgm {
            None
        } else {
            self.bgm.clone().or_else(|| {
                let default = PathBuf::from(DEFAULT_BGM);
                default.is_file().then_some(default)
            })
        };
        config.run_timeout_seconds = self.timeout;
        config
    }
}

fn prompt_topic() -> Result<String> {
    print!("Topic [{DEFAULT_TOPIC}]: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading topic from stdin")?;
    let topic = line.trim();
    Ok(if topic.is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        topic.to_string()
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let topic = match &cli.topic {
        Some(topic) => topic.clone(),
        None => prompt_topic()?,
    };

    let config = cli.config();
    debug!(credentials = ?config.credentials, "Loaded credentials");
    let collaborators = Collaborators::from_config(&config).context("building service clients")?;

    let token = CancellationToken::new();
    let watcher = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel("interrupted");
        }
    });

    info!(topic = %topic, "Starting run");
    let result = PipelineOrchestrator::new(config, collaborators)
        .with_cancellation(token)
        .run(&topic)
        .await
        .context("creating the run directory")?;

    println!("{}", result.summary());
    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

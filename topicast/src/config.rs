//! Configuration for a pipeline run.
//!
//! All settings are carried by one [`PipelineConfig`] value that is threaded
//! through the orchestrator and its collaborators. Nothing in the library
//! reads ambient process state except [`Credentials::from_env`], which the
//! binary calls once at startup.

use crate::pipeline::RetryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the text-generation credential.
pub const LLM_API_KEY_VAR: &str = "DEEPSEEK_API_KEY";
/// Environment variable holding the search credential.
pub const SEARCH_API_KEY_VAR: &str = "TAVILY_API_KEY";
/// Environment variable holding the image credential.
pub const IMAGE_API_KEY_VAR: &str = "SILICONFLOW_API_KEY";
/// Environment variable holding the speech credential.
pub const SPEECH_API_KEY_VAR: &str = "TTS_API_KEY";

/// API credentials for the external services.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Text generation (article, script, image prompt).
    #[serde(default)]
    pub llm_api_key: Option<String>,
    /// Search.
    #[serde(default)]
    pub search_api_key: Option<String>,
    /// Image rendering.
    #[serde(default)]
    pub image_api_key: Option<String>,
    /// Speech synthesis.
    #[serde(default)]
    pub speech_api_key: Option<String>,
}

impl Credentials {
    /// Reads credentials from the process environment.
    ///
    /// The speech credential falls back to the image credential, since both
    /// services are commonly served by the same provider.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads credentials through an arbitrary lookup function.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let image_api_key = read(IMAGE_API_KEY_VAR);

        Self {
            llm_api_key: read(LLM_API_KEY_VAR),
            search_api_key: read(SEARCH_API_KEY_VAR),
            speech_api_key: read(SPEECH_API_KEY_VAR).or_else(|| image_api_key.clone()),
            image_api_key,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("llm_api_key", &mask(&self.llm_api_key))
            .field("search_api_key", &mask(&self.search_api_key))
            .field("image_api_key", &mask(&self.image_api_key))
            .field("speech_api_key", &mask(&self.speech_api_key))
            .finish()
    }
}

/// Negative and NaN become zero, values too large for a `Duration` saturate.
fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX)
}

/// Service endpoints and model names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoints {
    /// OpenAI-compatible chat completion base URL.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    /// Chat model name.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    /// Search endpoint.
    #[serde(default = "default_search_url")]
    pub search_url: String,
    /// OpenAI-compatible speech base URL.
    #[serde(default = "default_speech_base_url")]
    pub speech_base_url: String,
    /// Speech model name.
    #[serde(default = "default_speech_model")]
    pub speech_model: String,
    /// Image generation endpoint.
    #[serde(default = "default_image_url")]
    pub image_url: String,
    /// Image model name.
    #[serde(default = "default_image_model")]
    pub image_model: String,
    /// Per-request timeout in seconds for text, search and image calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: f64,
}

fn default_llm_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_llm_model() -> String {
    "deepseek-chat".to_string()
}

fn default_search_url() -> String {
    "https://api.tavily.com/search".to_string()
}

fn default_speech_base_url() -> String {
    "https://api.siliconflow.cn/v1".to_string()
}

fn default_speech_model() -> String {
    "FunAudioLLM/CosyVoice2-0.5B".to_string()
}

fn default_image_url() -> String {
    "https://api.siliconflow.cn/v1/images/generations".to_string()
}

fn default_image_model() -> String {
    "black-forest-labs/FLUX.1-schnell".to_string()
}

fn default_request_timeout() -> f64 {
    60.0
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            llm_base_url: default_llm_base_url(),
            llm_model: default_llm_model(),
            search_url: default_search_url(),
            speech_base_url: default_speech_base_url(),
            speech_model: default_speech_model(),
            image_url: default_image_url(),
            image_model: default_image_model(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Endpoints {
    /// Gets the request timeout as Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        seconds_to_duration(self.request_timeout_seconds)
    }
}

/// Search stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of results requested.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Longest snippet kept per result, in characters.
    #[serde(default = "default_snippet_chars")]
    pub max_snippet_chars: usize,
}

fn default_max_results() -> usize {
    5
}

fn default_snippet_chars() -> usize {
    800
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            max_snippet_chars: default_snippet_chars(),
        }
    }
}

/// Article stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleConfig {
    /// Shortest acceptable article, in characters.
    #[serde(default = "default_article_min_chars")]
    pub min_chars: usize,
    /// Whether to refine the outline before writing.
    #[serde(default = "default_true")]
    pub refine_outline: bool,
}

fn default_article_min_chars() -> usize {
    100
}

fn default_true() -> bool {
    true
}

impl Default for ArticleConfig {
    fn default() -> Self {
        Self {
            min_chars: default_article_min_chars(),
            refine_outline: true,
        }
    }
}

/// How turns are distributed between the two roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum StylePolicy {
    /// Host and Guest strictly alternate.
    Alternating,
    /// Host opens, then each Host turn is followed by `guest_run` Guest
    /// turns; the Host closes the show.
    Interview {
        /// Consecutive Guest turns after each Host turn.
        guest_run: usize,
    },
}

impl Default for StylePolicy {
    fn default() -> Self {
        Self::Interview { guest_run: 2 }
    }
}

/// Script composition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Role distribution policy.
    #[serde(default)]
    pub style: StylePolicy,
    /// Shortest usable source text, in characters.
    #[serde(default = "default_min_source_chars")]
    pub min_source_chars: usize,
    /// Upper bound on the number of turns.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Longest text of a composed turn, in characters.
    #[serde(default = "default_max_turn_chars")]
    pub max_turn_chars: usize,
    /// Speech units (CJK characters or latin words) spoken per second.
    #[serde(default = "default_units_per_second")]
    pub speech_units_per_second: f64,
    /// Ask the text generator for the dialogue before falling back to the
    /// built-in composer.
    #[serde(default = "default_true")]
    pub use_llm: bool,
}

fn default_min_source_chars() -> usize {
    80
}

fn default_max_turns() -> usize {
    15
}

fn default_max_turn_chars() -> usize {
    600
}

fn default_units_per_second() -> f64 {
    3.5
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            style: StylePolicy::default(),
            min_source_chars: default_min_source_chars(),
            max_turns: default_max_turns(),
            max_turn_chars: default_max_turn_chars(),
            speech_units_per_second: default_units_per_second(),
            use_llm: true,
        }
    }
}

/// A named voice on the speech service plus a playback gain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Voice identifier understood by the speech service.
    pub name: String,
    /// Gain applied to every segment of this voice, in dB.
    #[serde(default)]
    pub gain_db: f32,
}

impl VoiceProfile {
    /// Creates a voice profile.
    #[must_use]
    pub fn new(name: impl Into<String>, gain_db: f32) -> Self {
        Self {
            name: name.into(),
            gain_db,
        }
    }
}

/// Speech synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Maximum synthesis calls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-call timeout in seconds.
    #[serde(default = "default_synthesis_timeout")]
    pub timeout_seconds: f64,
    /// Longest text accepted per call, in characters.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    /// Voice of the Host role.
    #[serde(default = "default_host_voice")]
    pub host_voice: VoiceProfile,
    /// Voice of the Guest role.
    #[serde(default = "default_guest_voice")]
    pub guest_voice: VoiceProfile,
}

fn default_concurrency() -> usize {
    4
}

fn default_synthesis_timeout() -> f64 {
    60.0
}

fn default_max_text_chars() -> usize {
    1000
}

fn default_host_voice() -> VoiceProfile {
    VoiceProfile::new("FunAudioLLM/CosyVoice2-0.5B:alex", 0.0)
}

fn default_guest_voice() -> VoiceProfile {
    VoiceProfile::new("FunAudioLLM/CosyVoice2-0.5B:claire", 2.0)
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_seconds: default_synthesis_timeout(),
            max_text_chars: default_max_text_chars(),
            host_voice: default_host_voice(),
            guest_voice: default_guest_voice(),
        }
    }
}

impl SynthesisConfig {
    /// Gets the per-call timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        seconds_to_duration(self.timeout_seconds)
    }
}

/// Container format of the mixed podcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// MPEG layer III (`podcast.mp3`).
    #[default]
    Mp3,
    /// 16-bit PCM WAV (`podcast.wav`).
    Wav,
}

impl AudioFormat {
    /// File name of the podcast artifact in this format.
    #[must_use]
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Mp3 => "podcast.mp3",
            Self::Wav => "podcast.wav",
        }
    }
}

/// Audio timeline and mixing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixConfig {
    /// Sample rate of the mixed track.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Silence between consecutive turns, in milliseconds.
    #[serde(default = "default_gap_ms")]
    pub gap_ms: u64,
    /// Background-only intro before the first turn, in milliseconds.
    #[serde(default = "default_pad_ms")]
    pub lead_in_ms: u64,
    /// Background-only outro after the last turn, in milliseconds.
    #[serde(default = "default_pad_ms")]
    pub tail_ms: u64,
    /// How far the background peak sits below the speech peak, in dB.
    #[serde(default = "default_attenuation_db")]
    pub background_attenuation_db: f32,
    /// Background fade-in length, in milliseconds.
    #[serde(default = "default_fade_in_ms")]
    pub fade_in_ms: u64,
    /// Background fade-out length, in milliseconds.
    #[serde(default = "default_fade_out_ms")]
    pub fade_out_ms: u64,
    /// Background music file (MP3 or WAV).
    #[serde(default)]
    pub background_path: Option<PathBuf>,
    /// Output container.
    #[serde(default)]
    pub format: AudioFormat,
    /// MP3 bitrate in kbps.
    #[serde(default = "default_bitrate")]
    pub mp3_bitrate_kbps: u32,
}

fn default_sample_rate() -> u32 {
    24_000
}

fn default_gap_ms() -> u64 {
    400
}

fn default_pad_ms() -> u64 {
    1000
}

fn default_attenuation_db() -> f32 {
    15.0
}

fn default_fade_in_ms() -> u64 {
    2000
}

fn default_fade_out_ms() -> u64 {
    3000
}

fn default_bitrate() -> u32 {
    128
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            gap_ms: default_gap_ms(),
            lead_in_ms: default_pad_ms(),
            tail_ms: default_pad_ms(),
            background_attenuation_db: default_attenuation_db(),
            fade_in_ms: default_fade_in_ms(),
            fade_out_ms: default_fade_out_ms(),
            background_path: None,
            format: AudioFormat::Mp3,
            mp3_bitrate_kbps: default_bitrate(),
        }
    }
}

impl MixConfig {
    /// Linear background ceiling relative to the speech peak.
    #[must_use]
    pub fn attenuation_factor(&self) -> f32 {
        10f32.powf(-self.background_attenuation_db.abs() / 20.0)
    }

    /// Converts milliseconds to a sample count at the mix rate.
    #[must_use]
    pub fn samples_for_ms(&self, ms: u64) -> usize {
        usize::try_from(ms.saturating_mul(u64::from(self.sample_rate)) / 1000).unwrap_or(usize::MAX)
    }
}

/// Cover image settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Width in pixels.
    #[serde(default = "default_image_width")]
    pub width: u32,
    /// Height in pixels.
    #[serde(default = "default_image_height")]
    pub height: u32,
}

fn default_image_width() -> u32 {
    1024
}

fn default_image_height() -> u32 {
    576
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: default_image_width(),
            height: default_image_height(),
        }
    }
}

/// Everything a pipeline run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory under which run directories are created.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Service credentials.
    #[serde(default)]
    pub credentials: Credentials,
    /// Service endpoints.
    #[serde(default)]
    pub endpoints: Endpoints,
    /// Retry policy for every external call.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Search settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Article settings.
    #[serde(default)]
    pub article: ArticleConfig,
    /// Script settings.
    #[serde(default)]
    pub script: ScriptConfig,
    /// Synthesis settings.
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    /// Mixing settings.
    #[serde(default)]
    pub mix: MixConfig,
    /// Cover image settings.
    #[serde(default)]
    pub image: ImageConfig,
    /// Whole-run deadline in seconds. `None` means no deadline.
    #[serde(default)]
    pub run_timeout_seconds: Option<f64>,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            credentials: Credentials::default(),
            endpoints: Endpoints::default(),
            retry: RetryConfig::default(),
            search: SearchConfig::default(),
            article: ArticleConfig::default(),
            script: ScriptConfig::default(),
            synthesis: SynthesisConfig::default(),
            mix: MixConfig::default(),
            image: ImageConfig::default(),
            run_timeout_seconds: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output root.
    #[must_use]
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the mixing settings.
    #[must_use]
    pub fn with_mix(mut self, mix: MixConfig) -> Self {
        self.mix = mix;
        self
    }

    /// Sets the script settings.
    #[must_use]
    pub fn with_script(mut self, script: ScriptConfig) -> Self {
        self.script = script;
        self
    }

    /// Script settings with turns capped to what one synthesis call accepts.
    #[must_use]
    pub fn script_config(&self) -> ScriptConfig {
        let mut script = self.script.clone();
        script.max_turn_chars = script.max_turn_chars.min(self.synthesis.max_text_chars);
        script
    }

    /// Sets the whole-run deadline.
    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_seconds = Some(timeout.as_secs_f64());
        self
    }

    /// Gets the whole-run deadline as Duration.
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_seconds
            .filter(|s| *s > 0.0)
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
    }
}

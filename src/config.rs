use crate::conversation::engine::DEFAULT_MAX_HISTORY_LENGTH;
use crate::llm::LlmSettings;
use crate::mcp::config::McpSettings;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;

pub const DEFAULT_SYSTEM_MESSAGE: &str =
    "You are a helpful AI assistant. You can access tools using MCP servers.";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (YAML, TOML or JSON)
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Stream backend replies by default
    #[arg(long, env = "LLM_STREAM")]
    pub stream: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub llm: LlmConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub mcp: McpSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    /// Default turn mode when a request does not say.
    pub stream: bool,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_p", &self.top_p)
            .field("stream", &self.stream)
            .finish()
    }
}

impl LlmConfig {
    /// Driver settings; `OPENAI_API_KEY` fills in a missing key.
    pub fn settings(&self) -> LlmSettings {
        let api_key = self
            .api_key
            .clone()
            .or_else(|| env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty());

        if api_key.is_none() {
            tracing::warn!("LLM API key not found in config or OPENAI_API_KEY env var");
        }

        LlmSettings {
            base_url: self.base_url.clone(),
            api_key,
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub system_message: String,
    pub max_history_length: usize,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("log.format", "compact")?
            .set_default("llm.base_url", "http://localhost:1234/v1")?
            .set_default("llm.model", "local-model")?
            .set_default("llm.temperature", 0.3)?
            .set_default("llm.stream", false)?
            .set_default("chat.system_message", DEFAULT_SYSTEM_MESSAGE)?
            .set_default("chat.max_history_length", DEFAULT_MAX_HISTORY_LENGTH as u64)?;

        // 2. Config file: explicit path, else ./config.{yaml,toml,json} when present
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables, e.g. RELAY_LLM__MODEL=qwen2.5
        builder = builder.add_source(
            Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their env fallbacks handled by clap)
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(stream) = cli.stream {
            builder = builder.set_override("llm.stream", stream)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

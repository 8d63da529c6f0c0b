//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or the path given with `-f`), then applies environment overrides.
//! Secrets (`LLM_API_KEY`, `TELEGRAM_TOKEN`) are only ever read from the
//! environment, never from TOML.

use std::{
    env,
    fs,
    path::Path,
};

use serde::Deserialize;

use crate::error::AppError;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// PTY (console) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Whether the PTY channel is explicitly enabled.
    pub enabled: bool,
}

/// Telegram channel configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Whether the Telegram channel is explicitly enabled.
    pub enabled: bool,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub telegram: TelegramConfig,
}

/// OpenAI / OpenAI-compatible backend configuration (`[agent.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature (ignored for models that forbid it).
    pub temperature: f32,
    /// Connect timeout, and the deadline for a non-streamed completion.
    pub timeout_seconds: u64,
    /// Expose the streaming `run_async` method.
    pub stream: bool,
}

/// External command backend configuration (`[agent.command]`).
#[derive(Debug, Clone)]
pub struct CommandConfig {
    pub program: String,
    pub args: Vec<String>,
}

/// Agent configuration (`[agent]`).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Which backend is active (`"echo"`, `"openai"`, `"command"`).
    pub backend: String,
    /// Upper bound on one request, resolution and draining included.
    pub timeout_seconds: u64,
    /// System instruction for backends that accept one.
    pub instruction: Option<String>,
    pub openai: OpenAiConfig,
    pub command: CommandConfig,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub log_level: String,
    pub agent: AgentConfig,
    pub comms: CommsConfig,
    /// API key from `LLM_API_KEY`; `None` for keyless local models.
    pub llm_api_key: Option<String>,
    /// Bot token from `TELEGRAM_TOKEN`.
    pub telegram_token: Option<String>,
}

impl Config {
    /// Returns `true` if the PTY channel should be loaded.
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    /// Returns `true` if the Telegram channel should be loaded.
    pub fn comms_telegram_should_load(&self) -> bool {
        self.comms.telegram.enabled
    }

    /// The Telegram bot token. Missing or blank is a fatal startup error
    /// whenever the Telegram channel is going to run.
    pub fn require_telegram_token(&self) -> Result<&str, AppError> {
        match self.telegram_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(AppError::Config(
                "TELEGRAM_TOKEN not found in the environment or .env file".into(),
            )),
        }
    }
}

/// Environment inputs to [`load_from`]. Tests build this directly instead of
/// mutating process env vars.
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub telegram_token: Option<String>,
}

impl EnvVars {
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("RELAY_LOG_LEVEL").ok(),
            llm_api_key: env::var("LLM_API_KEY").ok(),
            telegram_token: env::var("TELEGRAM_TOKEN").ok(),
        }
    }
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    bot: RawBot,
    #[serde(default)]
    agent: RawAgent,
    #[serde(default)]
    comms: RawComms,
}

#[derive(Deserialize)]
struct RawBot {
    name: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawAgent {
    #[serde(default = "default_backend")]
    backend: String,
    #[serde(default = "default_agent_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    openai: RawOpenAiConfig,
    #[serde(default)]
    command: RawCommandConfig,
}

impl Default for RawAgent {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            timeout_seconds: default_agent_timeout_seconds(),
            instruction: None,
            openai: RawOpenAiConfig::default(),
            command: RawCommandConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_temperature")]
    temperature: f32,
    #[serde(default = "default_openai_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default = "default_true")]
    stream: bool,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            timeout_seconds: default_openai_timeout_seconds(),
            stream: true,
        }
    }
}

#[derive(Deserialize, Default)]
struct RawCommandConfig {
    #[serde(default)]
    program: String,
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
    #[serde(default)]
    telegram: RawTelegram,
}

#[derive(Deserialize)]
struct RawPty {
    /// Defaults to `false`: the console is opt-in (`-i`).
    #[serde(default = "default_false")]
    enabled: bool,
}

#[derive(Deserialize)]
struct RawTelegram {
    /// Defaults to `true`: Telegram is the primary front end.
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawPty {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl Default for RawTelegram {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_backend() -> String { "echo".to_string() }
fn default_agent_timeout_seconds() -> u64 { 120 }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_temperature() -> f32 { 0.2 }
fn default_openai_timeout_seconds() -> u64 { 60 }

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

/// Load config from `path` (or [`DEFAULT_CONFIG_PATH`]), then apply env
/// overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let path = Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH));
    load_from(path, EnvVars::from_env())
}

/// Internal loader — accepts an explicit path and environment inputs.
pub fn load_from(path: &Path, env: EnvVars) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let a = parsed.agent;
    if a.timeout_seconds == 0 {
        return Err(AppError::Config("agent.timeout_seconds must be greater than zero".into()));
    }

    Ok(Config {
        bot_name: parsed.bot.name,
        log_level: env.log_level.unwrap_or(parsed.bot.log_level),
        agent: AgentConfig {
            backend: a.backend,
            timeout_seconds: a.timeout_seconds,
            instruction: a.instruction.filter(|s| !s.trim().is_empty()),
            openai: OpenAiConfig {
                api_base_url: a.openai.api_base_url,
                model: a.openai.model,
                temperature: a.openai.temperature,
                timeout_seconds: a.openai.timeout_seconds,
                stream: a.openai.stream,
            },
            command: CommandConfig {
                program: a.command.program,
                args: a.command.args,
            },
        },
        comms: CommsConfig {
            pty: PtyConfig { enabled: parsed.comms.pty.enabled },
            telegram: TelegramConfig { enabled: parsed.comms.telegram.enabled },
        },
        llm_api_key: env.llm_api_key,
        telegram_token: env.telegram_token,
    })
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `AgentConfig` for unit tests: echo backend, no external calls.
#[cfg(test)]
impl AgentConfig {
    pub fn test_default() -> Self {
        Self {
            backend: "echo".into(),
            timeout_seconds: 5,
            instruction: None,
            openai: OpenAiConfig {
                api_base_url: "http://localhost:0/v1/chat/completions".into(),
                model: "test-model".into(),
                temperature: 0.0,
                timeout_seconds: 1,
                stream: true,
            },
            command: CommandConfig { program: String::new(), args: vec![] },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[bot]
name = "test-relay"
"#;

    const FULL_TOML: &str = r#"
[bot]
name = "fondo-bot"
log_level = "debug"

[agent]
backend = "openai"
timeout_seconds = 30
instruction = "Answer clearly and professionally."

[agent.openai]
api_base_url = "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
model = "gemini-2.0-flash"
stream = false

[agent.command]
program = "python3"
args = ["agent_cli.py"]

[comms.pty]
enabled = true

[comms.telegram]
enabled = false
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), EnvVars::default()).unwrap();
        assert_eq!(cfg.bot_name, "test-relay");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.agent.backend, "echo");
        assert_eq!(cfg.agent.timeout_seconds, 120);
        assert!(cfg.agent.openai.stream);
        assert!(cfg.comms_telegram_should_load());
        assert!(!cfg.comms_pty_should_load());
    }

    #[test]
    fn full_config_parses() {
        let f = write_toml(FULL_TOML);
        let cfg = load_from(f.path(), EnvVars::default()).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.agent.backend, "openai");
        assert_eq!(cfg.agent.timeout_seconds, 30);
        assert_eq!(cfg.agent.instruction.as_deref(), Some("Answer clearly and professionally."));
        assert_eq!(cfg.agent.openai.model, "gemini-2.0-flash");
        assert!(!cfg.agent.openai.stream);
        assert_eq!(cfg.agent.openai.timeout_seconds, 60);
        assert_eq!(cfg.agent.command.args, ["agent_cli.py"]);
        assert!(cfg.comms_pty_should_load());
        assert!(!cfg.comms_telegram_should_load());
    }

    #[test]
    fn env_overrides_apply() {
        let f = write_toml(MINIMAL_TOML);
        let env = EnvVars {
            log_level: Some("trace".into()),
            llm_api_key: Some("sk-1".into()),
            telegram_token: Some("123:abc".into()),
        };
        let cfg = load_from(f.path(), env).unwrap();
        assert_eq!(cfg.log_level, "trace");
        assert_eq!(cfg.llm_api_key.as_deref(), Some("sk-1"));
        assert_eq!(cfg.require_telegram_token().unwrap(), "123:abc");
    }

    #[test]
    fn missing_token_is_descriptive() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), EnvVars::default()).unwrap();
        let msg = cfg.require_telegram_token().unwrap_err().to_string();
        assert!(msg.contains("TELEGRAM_TOKEN"));
    }

    #[test]
    fn blank_token_is_missing() {
        let f = write_toml(MINIMAL_TOML);
        let env = EnvVars { telegram_token: Some("  ".into()), ..EnvVars::default() };
        let cfg = load_from(f.path(), env).unwrap();
        assert!(cfg.require_telegram_token().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let f = write_toml("[bot]\nname = \"x\"\n[agent]\ntimeout_seconds = 0\n");
        assert!(load_from(f.path(), EnvVars::default()).is_err());
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), EnvVars::default());
        assert!(result.is_err());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn missing_bot_section_errors() {
        let f = write_toml("[agent]\nbackend = \"echo\"\n");
        let msg = load_from(f.path(), EnvVars::default()).unwrap_err().to_string();
        assert!(msg.contains("parse error"));
    }
}

//! The shipped config/default.toml must load and describe a runnable relay.

use std::path::Path;

use agent_relay::agent::Agent;
use agent_relay::agent::backends;
use agent_relay::config::{self, EnvVars};

#[test]
fn default_config_loads() {
    let config = config::load_from(Path::new(config::DEFAULT_CONFIG_PATH), EnvVars::default())
        .expect("config/default.toml should parse");
    assert_eq!(config.bot_name, "agent-relay");
    assert_eq!(config.agent.backend, "echo");
    assert!(config.agent.timeout_seconds > 0);
    assert!(config.comms_telegram_should_load());
    assert!(!config.comms_pty_should_load());
}

#[test]
fn default_config_builds_its_backend() {
    let config = config::load_from(Path::new(config::DEFAULT_CONFIG_PATH), EnvVars::default()).unwrap();
    let backend = backends::build(&config.agent, None).unwrap();
    assert_eq!(backend.name(), "echo");
}

#[test]
fn telegram_without_token_is_fatal() {
    let config = config::load_from(Path::new(config::DEFAULT_CONFIG_PATH), EnvVars::default()).unwrap();
    let err = config.require_telegram_token().unwrap_err();
    assert!(err.to_string().contains("TELEGRAM_TOKEN"));
}

use crate::watch::{PollSettings, DEFAULT_POLL_INTERVAL};
use anyhow::{anyhow, Context, Result};
use config::{Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

static CONFIG_FILE_NAME: &str = ".jenkins_trigger.toml";
static ENV_PREFIX: &str = "JENKINS";

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_queue_poll_limit() -> u32 {
    1
}

/// Runtime configuration, built once at startup
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the Jenkins server. Required.
    #[serde(default)]
    pub host_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub api_token: String,
    /// Seconds between polls of a running build
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Seconds to wait for the build before giving up
    #[serde(default)]
    pub timeout: Option<u64>,
    /// How many times to ask the queue for a build number before giving up
    #[serde(default = "default_queue_poll_limit")]
    pub queue_poll_limit: u32,
}

impl Config {
    /// Load from `$HOME/.jenkins_trigger.toml`, if present, overridden by `JENKINS_*` environment
    /// variables
    pub fn load_from_default_file() -> Result<Self> {
        let path = dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME));
        Self::load(path.as_deref(), Environment::with_prefix(ENV_PREFIX))
    }

    fn load(file: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config: Self = builder
            .add_source(env)
            .build()?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.host_url.trim().is_empty() {
            return Err(anyhow!(
                "No Jenkins server configured. Set {}_HOST_URL or host_url in ~/{}",
                ENV_PREFIX,
                CONFIG_FILE_NAME
            ));
        }
        Ok(())
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.poll_interval),
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

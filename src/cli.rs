use crate::params::{BuildParameters, Parameter};
use crate::Config;
use clap::Parser;
use std::ffi::OsString;

/// Trigger a parameterized Jenkins build and follow it to completion
#[derive(Debug, Parser)]
#[command(name = "jenkins-trigger", version)]
pub struct Cli {
    /// Name of the Jenkins job
    #[arg(short, long)]
    pub job: String,

    /// Seconds between polls of the running build
    #[arg(long, value_name = "SECONDS")]
    pub poll_interval: Option<u64>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Build parameters
    #[arg(value_name = "KEY=VALUE")]
    pub params: Vec<Parameter>,
}

impl Cli {
    /// Parse arguments, also accepting the single-dash `-job` spelling
    pub fn parse_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::parse_from(normalize_args(args))
    }

    pub fn parameters(&self) -> BuildParameters {
        self.params.iter().cloned().collect()
    }

    /// Apply command line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(poll_interval) = self.poll_interval {
            config.poll_interval = poll_interval;
        }
        if self.timeout.is_some() {
            config.timeout = self.timeout;
        }
    }
}

/// Rewrite `-job` and `-job=<name>` to their `--job` forms
fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut past_separator = false;
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if past_separator {
                return arg;
            }
            let rewritten = match arg.to_str() {
                Some("--") => {
                    past_separator = true;
                    None
                }
                Some(s) if s == "-job" || s.starts_with("-job=") => Some(format!("-{}", s)),
                _ => None,
            };
            rewritten.map(OsString::from).unwrap_or(arg)
        })
        .collect()
}

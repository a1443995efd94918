//! # jenkins-trigger
//!
//! Triggers a parameterized Jenkins build, streams its console log to stdout while it runs and
//! exits with a status reflecting the build result.
//!
//! ## Usage
//!
//! ```sh
//! jenkins-trigger -job deploy-service ENVIRONMENT=staging VERSION=1.4.2
//! ```
//!
//! Everything after the job name is a `key=value` build parameter. The process exits with status
//! 0 only if the build finishes with result `SUCCESS`.
//!
//! ## Configuration
//!
//! ### Environment variables
//!
//! * `JENKINS_HOST_URL`: base URL of the Jenkins server. Required.
//! * `JENKINS_USERNAME`: user to authenticate as
//! * `JENKINS_API_TOKEN`: API token for that user
//! * `JENKINS_POLL_INTERVAL`: seconds between polls. Defaults to 2.
//! * `JENKINS_TIMEOUT`: seconds to wait for the build before giving up. Unset by default.
//! * `JENKINS_QUEUE_POLL_LIMIT`: how many times to ask the queue for a build number. Defaults
//!   to 1.
//!
//! ### TOML
//!
//! The same keys, lowercase and without the `JENKINS_` prefix, can be set in
//! `$HOME/.jenkins_trigger.toml`:
//!
//! ```toml
//! host_url = "https://jenkins.example.com"
//! username = "me"
//! api_token = "your token goes here"
//! poll_interval = 2
//! ```
//!
//! Environment variables take precedence over the file. `--poll-interval` and `--timeout` on
//! the command line take precedence over both.

use jenkins_trigger::cli::Cli;
use jenkins_trigger::Config;

use anyhow::Result;
use log::*;
use simple_logger::SimpleLogger;

#[tokio::main(flavor = "current_thread")]
#[doc(hidden)]
async fn main() -> Result<()> {
    let cli = Cli::parse_args(std::env::args_os());
    // Console text owns stdout, so log lines go to stderr
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .with_module_level(
            "jenkins_trigger",
            if cli.verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
        )
        .init()?;

    let mut config = Config::load_from_default_file()?;
    cli.apply(&mut config);

    let params = cli.parameters();
    let outcome = jenkins_trigger::run(&config, &cli.job, &params, &mut std::io::stdout()).await;
    if let Err(e) = &outcome {
        error!("{}", e);
    }
    std::process::exit(jenkins_trigger::exit_code(&outcome))
}

use crate::error::Result;
use crate::jenkins::{Auth, Client};
use crate::params::BuildParameters;
use crate::watch;
use crate::Config;
use log::*;
use std::io::Write;

/// Trigger `job` with `params`, stream its console log to `out` and wait for it to finish.
///
/// Succeeds only if the build result is `SUCCESS`.
pub async fn run<W: Write>(
    config: &Config,
    job: &str,
    params: &BuildParameters,
    out: &mut W,
) -> Result<()> {
    let auth = Auth::new(config.username.clone(), config.api_token.clone());
    let mut client = Client::new(&config.host_url, auth)?;
    client.fetch_crumb().await?;

    let settings = config.poll_settings();
    let location = client.trigger(job, params).await?;
    let number = client
        .wait_for_build_number(&location, config.queue_poll_limit, settings.interval)
        .await?;
    info!("Following {} #{}", job, number);

    let info = watch::follow(&client.build(job, number), out, &settings).await?;
    watch::check_result(&info)?;
    info!("{} #{} finished: SUCCESS", job, number);
    Ok(())
}

/// Process exit status for the outcome of [`run`]: 0 only for a successful build
pub fn exit_code(outcome: &Result<()>) -> i32 {
    match outcome {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

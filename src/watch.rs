use crate::error::{Error, Result};
use crate::jenkins::BuildInfo;
use async_trait::async_trait;
use log::*;
use std::io::Write;
use std::time::{Duration, Instant};

/// Default delay between two polls of a running build
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One slice of a progressive console log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogChunk {
    /// Raw log bytes, not necessarily split on character boundaries
    pub text: Vec<u8>,
    /// Cumulative log size reported by the server, i.e. where the next fetch starts
    pub text_size: u64,
    /// Whether the server has more text beyond `text_size`
    pub more_data: bool,
}

/// Something that reports a build's status and console log
#[async_trait]
pub trait BuildSource {
    async fn build_info(&self) -> Result<BuildInfo>;

    /// Console text from byte offset `start` onward
    async fn log_since(&self, start: u64) -> Result<LogChunk>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Build still executing
    Running,
    /// Build finished but the server still has log text for us
    LogDraining,
    Done,
}

impl State {
    fn after_poll(info: &BuildInfo, more_data: bool) -> Self {
        match (info.building, more_data) {
            (true, _) => State::Running,
            (false, true) => State::LogDraining,
            (false, false) => State::Done,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Give up once this much time has passed. `None` waits forever.
    pub timeout: Option<Duration>,
}

/// Poll `source` until the build has finished and its log is drained, copying console text to
/// `out` as it arrives. Returns the last build info seen.
pub async fn follow<S, W>(source: &S, out: &mut W, settings: &PollSettings) -> Result<BuildInfo>
where
    S: BuildSource + ?Sized,
    W: Write,
{
    let started = Instant::now();
    let mut cursor = 0;
    loop {
        let info = source.build_info().await?;
        let chunk = source.log_since(cursor).await?;
        if !chunk.text.is_empty() {
            out.write_all(&chunk.text)?;
            out.flush()?;
        }
        if chunk.text_size < cursor {
            warn!(
                "Server reported log size {} behind offset {}",
                chunk.text_size, cursor
            );
        }
        cursor = cursor.max(chunk.text_size);

        let state = State::after_poll(&info, chunk.more_data);
        trace!("{:?} at log offset {}", state, cursor);
        if state == State::Done {
            return Ok(info);
        }
        if let Some(timeout) = settings.timeout {
            if started.elapsed() >= timeout {
                return Err(Error::TimedOut(timeout));
            }
        }
        tokio::time::sleep(settings.interval).await;
    }
}

/// Map the final build result to success or [`Error::BuildFailed`]
pub fn check_result(info: &BuildInfo) -> Result<()> {
    if info.is_success() {
        Ok(())
    } else {
        Err(Error::BuildFailed(
            info.result.clone().unwrap_or_else(|| "(none)".to_string()),
        ))
    }
}

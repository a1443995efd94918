pub mod cli;
mod config;
pub mod error;
pub mod jenkins;
pub mod params;
mod run;
pub mod watch;

pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::run::{exit_code, run};

pub mod config;
pub mod detect;
mod duration;
pub mod error;
pub mod file;
pub mod flac;
pub mod libflac_wrapper;
pub mod smpl;
pub mod utils;
pub mod wave;

use std::num::NonZeroU32;

pub use duration::samples_from_duration;
pub use error::Error;
use tracing_subscriber::EnvFilter;

/// What to cut from the start of a file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimRequest {
    pub delay_ms: f64,
    /// Sample rate used instead of the one stored in the file.
    pub forced_rate: Option<NonZeroU32>,
}

impl TrimRequest {
    /// A `forced_rate` of 0 keeps the file's own sample rate.
    pub fn new(delay_ms: f64, forced_rate: u32) -> Result<Self, Error> {
        if !delay_ms.is_finite() || delay_ms < 0.0 {
            return error::Kind::InvalidRequest(delay_ms).into();
        }
        Ok(Self { delay_ms, forced_rate: NonZeroU32::new(forced_rate) })
    }
}

pub fn init_tracing(config: &config::Log) -> Result<(), Error> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| error::Kind::Tracing(e.to_string()))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

    let result = if config.time { builder.try_init() } else { builder.without_time().try_init() };
    result.map_err(|e| error::Kind::Tracing(e.to_string()).into())
}

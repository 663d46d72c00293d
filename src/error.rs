//! Error kinds surfaced by the bridge.
//!
//! Only [`Error::Decode`] is recovered locally (the packet is dropped and the
//! controller keeps listening). Everything else is fatal: at startup it keeps
//! the bridge out of the listening loop, during a session it ends the process.

use thiserror::Error;

use crate::config::ConfigError;
use crate::protocol::DecodeError;

/// Boxed driver error, for hardware backends living outside this crate
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("target class `{label}` is not among the detector's {known} classes")]
    ClassConfig { label: String, known: usize },

    #[error("{device} initialization failed: {source}")]
    HardwareInit {
        device: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("radio: {0}")]
    Radio(#[source] BoxError),

    #[error("capture: {0}")]
    Capture(#[source] BoxError),

    #[error("detector: {0}")]
    Detector(#[source] BoxError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("recorder I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encode: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub fn hardware_init(device: &'static str, source: impl Into<BoxError>) -> Self {
        Error::HardwareInit {
            device,
            source: source.into(),
        }
    }

    pub fn radio(source: impl Into<BoxError>) -> Self {
        Error::Radio(source.into())
    }

    pub fn capture(source: impl Into<BoxError>) -> Self {
        Error::Capture(source.into())
    }

    pub fn detector(source: impl Into<BoxError>) -> Self {
        Error::Detector(source.into())
    }
}

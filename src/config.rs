/// Bridge configuration.
///
/// Supplied once at startup (JSON file, then command-line overrides in the
/// binary) and immutable for the rest of the process lifetime. Every string
/// is a fixed-capacity `heapless::String` so a config always fits the radio
/// and the log format.
use std::path::{Path, PathBuf};
use std::time::Duration;

use heapless::String;
use serde::Deserialize;

use crate::capture::CaptureSettings;
use crate::defaults;
use crate::protocol::{Token, MAX_PAYLOAD_LEN};

/// Filesystem path string
pub type PathString = String<128>;

/// Detector class label / filename prefix
pub type LabelString = String<32>;

/// Frequency range covered by the RFM95/96/98 family (MHz)
const FREQ_RANGE_MHZ: (f32, f32) = (137.0, 1020.0);

/// PA_BOOST output power range (dBm)
const TX_POWER_RANGE: (i8, i8) = (5, 23);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: std::string::String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(serde_json_core::de::Error),

    #[error("config `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },

    #[error("config `{field}` is longer than {max} bytes")]
    TooLong { field: &'static str, max: usize },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Directory for annotated images and the detection log
    pub save_dir: PathString,
    /// ONNX detection model
    pub model_path: PathString,
    /// Minimum confidence for a detection to count
    pub confidence: f32,
    pub width: u32,
    pub height: u32,
    /// Capture/classify cycles per trigger
    pub cycles: u32,
    pub trigger: Token,
    pub reply: Token,
    pub frequency_mhz: f32,
    pub tx_power: i8,
    pub target_class: LabelString,
    pub image_prefix: LabelString,
    /// Sleep between empty radio polls
    pub idle_wait_ms: u64,
    /// Text sent by the status ping utility
    pub status_text: Token,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            save_dir: fixed(defaults::SAVE_DIR),
            model_path: fixed(defaults::MODEL_PATH),
            confidence: defaults::CONFIDENCE,
            width: defaults::FRAME_WIDTH,
            height: defaults::FRAME_HEIGHT,
            cycles: defaults::CYCLES,
            trigger: fixed(defaults::TRIGGER),
            reply: fixed(defaults::REPLY),
            frequency_mhz: defaults::FREQUENCY_MHZ,
            tx_power: defaults::TX_POWER_DBM,
            target_class: fixed(defaults::TARGET_CLASS),
            image_prefix: fixed(defaults::IMAGE_PREFIX),
            idle_wait_ms: defaults::IDLE_WAIT_MS,
            status_text: fixed(defaults::STATUS_TEXT),
        }
    }
}

impl BridgeConfig {
    /// Parse a JSON config. Keys that are absent keep their defaults.
    pub fn from_json(data: &[u8]) -> Result<Self, ConfigError> {
        serde_json_core::from_slice::<BridgeConfig>(data)
            .map(|(config, _)| config)
            .map_err(ConfigError::Parse)
    }

    /// Load and parse a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&data)
    }

    /// Check the config before any hardware is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(invalid("confidence", "must be within 0.0..=1.0"));
        }
        if self.cycles == 0 {
            return Err(invalid("cycles", "must be at least 1"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(invalid("width/height", "must be non-zero"));
        }
        check_token("trigger", &self.trigger)?;
        check_token("reply", &self.reply)?;
        if self.trigger == self.reply {
            return Err(invalid("reply", "must differ from trigger"));
        }
        if self.status_text.is_empty() {
            return Err(invalid("status_text", "must not be empty"));
        }
        let (lo, hi) = FREQ_RANGE_MHZ;
        if !(lo..=hi).contains(&self.frequency_mhz) {
            return Err(invalid("frequency_mhz", "outside 137..=1020 MHz"));
        }
        let (lo, hi) = TX_POWER_RANGE;
        if !(lo..=hi).contains(&self.tx_power) {
            return Err(invalid("tx_power", "outside 5..=23 dBm"));
        }
        if self.target_class.trim().is_empty() {
            return Err(invalid("target_class", "must not be empty"));
        }
        if self.image_prefix.is_empty() || self.image_prefix.contains(['/', '\\']) {
            return Err(invalid("image_prefix", "must be a non-empty filename part"));
        }
        if self.save_dir.is_empty() {
            return Err(invalid("save_dir", "must not be empty"));
        }
        Ok(())
    }

    pub fn save_dir(&self) -> &Path {
        Path::new(self.save_dir.as_str())
    }

    pub fn log_path(&self) -> PathBuf {
        self.save_dir().join(defaults::LOG_FILENAME)
    }

    pub fn model_path(&self) -> &Path {
        Path::new(self.model_path.as_str())
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            width: self.width,
            height: self.height,
            gain: defaults::CAMERA_GAIN,
            auto_exposure: true,
        }
    }
}

/// Overwrite a fixed-capacity config string, rejecting values that don't fit.
pub fn assign<const N: usize>(
    field: &'static str,
    slot: &mut String<N>,
    value: &str,
) -> Result<(), ConfigError> {
    let mut next = String::new();
    next.push_str(value)
        .map_err(|_| ConfigError::TooLong { field, max: N })?;
    *slot = next;
    Ok(())
}

fn check_token(field: &'static str, token: &str) -> Result<(), ConfigError> {
    if token.is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    // Inbound text is trimmed before comparison
    if token.trim() != token {
        return Err(invalid(field, "must not start or end with whitespace"));
    }
    if token.len() > MAX_PAYLOAD_LEN {
        return Err(ConfigError::TooLong {
            field,
            max: MAX_PAYLOAD_LEN,
        });
    }
    Ok(())
}

fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

/// Compile-time defaults always fit their fields.
fn fixed<const N: usize>(value: &str) -> String<N> {
    let mut s = String::new();
    let _ = s.push_str(value);
    s
}

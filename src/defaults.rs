/// Default settings for a field deployment.
///
/// These are the values the bridge runs with when no config file or
/// command-line override is given. Paths match the field Pi image.

/// Directory that receives annotated JPEGs and the detection log
pub const SAVE_DIR: &str = "/home/a/JumboShoo/logging/ElephantHits";

/// YOLO model exported to ONNX (Elephants2n/s/m/l/x variants)
pub const MODEL_PATH: &str = "/home/a/JumboShoo/scripts/models/Elephants2m.onnx";

/// Minimum detection confidence
pub const CONFIDENCE: f32 = 0.50;

pub const FRAME_WIDTH: u32 = 1280;
pub const FRAME_HEIGHT: u32 = 720;

/// Capture/classify cycles per trigger
pub const CYCLES: u32 = 3;

/// Listen word
pub const TRIGGER: &str = "0.2";

/// Reply word, sent only when the target was seen
pub const REPLY: &str = "2.0";

/// Radio carrier frequency (MHz)
pub const FREQUENCY_MHZ: f32 = 433.0;

/// Radio transmit power (dBm)
pub const TX_POWER_DBM: i8 = 23;

/// Detector class label the bridge reports on
pub const TARGET_CLASS: &str = "elephant";

/// Leading part of every saved image filename
pub const IMAGE_PREFIX: &str = "ele";

/// Sleep between empty radio polls (ms)
pub const IDLE_WAIT_MS: u64 = 50;

/// Text sent by the status ping utility
pub const STATUS_TEXT: &str = "CamPi Status 1";

/// Camera analogue gain
pub const CAMERA_GAIN: i64 = 8;

/// Name of the append-only detection log inside the save directory
pub const LOG_FILENAME: &str = "detections_log.txt";

//! Evidence persistence for positive cycles.
//!
//! Each cycle with at least one detection produces an annotated JPEG named
//! `<prefix>_<session>_<NNN>.jpg` and exactly one line appended to
//! `detections_log.txt`:
//!
//! ```text
//! <session_id>,<cycle_detections>,<best_confidence:.3>,<image_filename>
//! ```
//!
//! The log is append-only. Readers must only trust complete lines; a trailing
//! fragment left by a crash mid-write is discarded.

use core::fmt;
use core::str::FromStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::defaults::LOG_FILENAME;
use crate::error::Result;
use crate::session::SessionId;

/// Deterministic, per-session unique image filename.
pub fn image_filename(prefix: &str, session: &SessionId, cycle: u32) -> String {
    format!("{prefix}_{session}_{cycle:03}.jpg")
}

/// One line of the detection log. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct HitRecord {
    pub session_id: SessionId,
    /// Detections in this cycle
    pub detection_count: usize,
    /// Session best confidence as of this line
    pub best_confidence: f32,
    pub image_filename: String,
}

impl fmt::Display for HitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{:.3},{}",
            self.session_id, self.detection_count, self.best_confidence, self.image_filename
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed log line: {0}")]
pub struct ParseRecordError(&'static str);

impl FromStr for HitRecord {
    type Err = ParseRecordError;

    fn from_str(line: &str) -> core::result::Result<Self, Self::Err> {
        let mut fields = line.splitn(4, ',');
        let mut next = |what| fields.next().ok_or(ParseRecordError(what));

        let session_id = SessionId::parse(next("session id")?)
            .ok_or(ParseRecordError("session id"))?;
        let detection_count = next("detection count")?
            .parse()
            .map_err(|_| ParseRecordError("detection count"))?;
        let best_confidence = next("confidence")?
            .parse()
            .map_err(|_| ParseRecordError("confidence"))?;
        let image_filename = next("image filename")?;
        if image_filename.is_empty() || image_filename.contains(',') {
            return Err(ParseRecordError("image filename"));
        }

        Ok(HitRecord {
            session_id,
            detection_count,
            best_confidence,
            image_filename: image_filename.to_string(),
        })
    }
}

/// Writes annotated images and log lines into one directory.
#[derive(Debug, Clone)]
pub struct HitRecorder {
    dir: PathBuf,
    prefix: String,
}

impl HitRecorder {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILENAME)
    }

    /// Create the target directory if it is missing. Idempotent.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn image_filename(&self, session: &SessionId, cycle: u32) -> String {
        image_filename(&self.prefix, session, cycle)
    }

    /// Whether an earlier session already left images under this id.
    ///
    /// An unreadable directory counts as free; `record` reports the real
    /// failure when it tries to write.
    pub fn session_in_use(&self, session: &SessionId) -> bool {
        let stem = format!("{}_{}_", self.prefix, session);
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return false;
        };
        entries
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_string_lossy().starts_with(&stem))
    }

    /// Persist one positive cycle: image first, then the log line.
    pub fn record(&self, record: &HitRecord, annotated: &RgbImage) -> Result<()> {
        let image_path = self.dir.join(&record.image_filename);
        annotated.save(&image_path)?;
        self.append(record)?;
        log::info!(
            "[{}] DETECTED {} target(s) → saved {}",
            record.session_id,
            record.detection_count,
            record.image_filename
        );
        Ok(())
    }

    fn append(&self, record: &HitRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.log_path())?;
        // A fragment from an earlier crash keeps its own line
        let mut line = String::new();
        if ends_mid_line(&mut file)? {
            log::warn!("Log ends in a partial line, terminating it");
            line.push('\n');
        }
        // One write per line so a crash can only leave a trailing fragment
        line.push_str(&format!("{record}\n"));
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read back every complete log line.
    ///
    /// A trailing fragment without a newline is discarded. Complete lines
    /// that don't parse are skipped with a warning. A missing log reads as
    /// empty.
    pub fn read_log(path: &Path) -> Result<Vec<HitRecord>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_log(&data))
    }
}

fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Parse complete lines of a log buffer.
pub fn parse_log(data: &[u8]) -> Vec<HitRecord> {
    let complete = match data.iter().rposition(|&b| b == b'\n') {
        Some(end) => &data[..end],
        None => return Vec::new(),
    };

    let mut records = Vec::new();
    for (n, line) in complete.split(|&b| b == b'\n').enumerate() {
        let line = match core::str::from_utf8(line) {
            Ok(s) => s.trim_end_matches('\r'),
            Err(_) => {
                log::warn!("Log line {} is not UTF-8, skipped", n + 1);
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match line.parse::<HitRecord>() {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Log line {}: {}, skipped", n + 1, e),
        }
    }
    records
}

/// Trigger sessions and their identifiers.
///
/// A session is one trigger-to-reply lifecycle. It lives only as long as the
/// controller is ACTIVE/REPORTING; what survives it is the log lines and
/// images it produced.
use core::fmt;

use heapless::String;
use uuid::Uuid;

/// Number of hex digits in a session id
pub const SESSION_ID_LEN: usize = 8;

/// Short unique token naming a session in filenames and log lines
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String<SESSION_ID_LEN>);

impl SessionId {
    /// Fresh id from the leading digits of a random v4 UUID.
    pub fn random() -> Self {
        Self::from_uuid(&Uuid::new_v4())
    }

    pub fn from_uuid(uuid: &Uuid) -> Self {
        let mut buf = Uuid::encode_buffer();
        let hex = uuid.simple().encode_lower(&mut buf);
        let mut id = String::new();
        let _ = id.push_str(&hex[..SESSION_ID_LEN]);
        SessionId(id)
    }

    /// Accepts only non-empty ids that are safe inside a filename or CSV field.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        String::try_from(s).ok().map(SessionId)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Id generator that never hands out the same id twice in a row, and skips
/// ids the caller reports as already used.
#[derive(Debug, Default)]
pub struct SessionIds {
    last: Option<SessionId>,
}

impl SessionIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> SessionId {
        self.next_unused(|_| false)
    }

    /// Draw ids until one is neither the previous id nor `taken`.
    pub fn next_unused<F>(&mut self, mut taken: F) -> SessionId
    where
        F: FnMut(&SessionId) -> bool,
    {
        loop {
            let id = SessionId::random();
            if self.last.as_ref() != Some(&id) && !taken(&id) {
                self.last = Some(id.clone());
                return id;
            }
        }
    }
}

/// Live state of a triggered session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    /// Fixed when the session starts
    pub cycle_count: u32,
    pub detection_count: usize,
    /// Never decreases over the session
    pub best_confidence: f32,
}

impl Session {
    pub fn new(id: SessionId, cycle_count: u32) -> Self {
        Self {
            id,
            cycle_count,
            detection_count: 0,
            best_confidence: 0.0,
        }
    }

    /// Fold one positive cycle into the running totals.
    pub fn record_cycle(&mut self, count: usize, cycle_best: f32) {
        self.detection_count += count;
        self.best_confidence = self.best_confidence.max(cycle_best);
    }

    pub fn hit(&self) -> bool {
        self.detection_count > 0
    }
}

/// What a finished session looked like, for the caller and the logs
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub cycles_run: u32,
    /// Cycles with at least one detection (= log lines written)
    pub positive_cycles: u32,
    pub detection_count: usize,
    pub best_confidence: f32,
    pub replied: bool,
}

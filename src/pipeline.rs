//! Trigger → capture → classify → record → reply state machine.
//!
//! ```text
//!            trigger token
//!   IDLE ─────────────────────▶ ACTIVE ──(all cycles)──▶ REPORTING
//!    ▲                                                       │
//!    └──────────────(reply sent if anything was seen)────────┘
//! ```
//!
//! The controller owns the radio, camera and detector for the whole process
//! and runs strictly serially. The radio is polled only in IDLE, so at most
//! one session is ever active. A session always runs every configured cycle;
//! an early detection never shortens it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::capture::CaptureSource;
use crate::comm::{self, Radio};
use crate::config::BridgeConfig;
use crate::detector::{resolve_class, ClassId, Detector, FrameResult};
use crate::error::Result;
use crate::protocol::{self, RadioMessage, Token};
use crate::recorder::{HitRecord, HitRecorder};
use crate::session::{Session, SessionIds, SessionSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Listening for a trigger
    Idle,
    /// Running the fixed cycle sequence
    Active,
    /// Possibly sending a reply
    Reporting,
}

/// Outcome of one IDLE poll
#[derive(Debug, Clone, PartialEq)]
pub enum Poll {
    /// Nothing pending on the radio
    Empty,
    /// Payload was not text and was dropped
    Discarded,
    /// Text that was not the trigger
    Ignored,
    /// Trigger matched and a full session ran
    Session(SessionSummary),
}

/// Per-session parameters, fixed at startup
#[derive(Debug, Clone)]
struct SessionPlan {
    cycles: u32,
    threshold: f32,
    trigger: Token,
    reply: Token,
}

pub struct Controller<R, C, D> {
    radio: R,
    camera: C,
    detector: D,
    recorder: HitRecorder,
    target: ClassId,
    plan: SessionPlan,
    idle_wait: Duration,
    ids: SessionIds,
    state: State,
}

impl<R: Radio, C: CaptureSource, D: Detector> Controller<R, C, D> {
    /// Wire up the controller. Fails before any packet is read if the target
    /// class is unknown to the detector or the save directory can't be made.
    pub fn new(config: &BridgeConfig, radio: R, camera: C, detector: D) -> Result<Self> {
        config.validate()?;
        let target = resolve_class(&detector, &config.target_class)?;
        log::info!(
            "Target class '{}' resolved to index {}",
            config.target_class,
            target
        );

        let recorder = HitRecorder::new(config.save_dir(), config.image_prefix.as_str());
        recorder.ensure_dir()?;

        Ok(Self {
            radio,
            camera,
            detector,
            recorder,
            target,
            plan: SessionPlan {
                cycles: config.cycles,
                threshold: config.confidence,
                trigger: config.trigger.clone(),
                reply: config.reply.clone(),
            },
            idle_wait: config.idle_wait(),
            ids: SessionIds::new(),
            state: State::Idle,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn target(&self) -> ClassId {
        self.target
    }

    pub fn recorder(&self) -> &HitRecorder {
        &self.recorder
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Poll until `shutdown` is set. The flag is checked once per iteration,
    /// so a session in progress always finishes first.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        log::info!(
            "LoRa-camera bridge ready (trigger='{}', reply='{}')",
            self.plan.trigger,
            self.plan.reply
        );
        while !shutdown.load(Ordering::Relaxed) {
            if self.poll_once()? == Poll::Empty {
                thread::sleep(self.idle_wait);
            }
        }
        log::info!("Shutdown requested, leaving listen loop");
        Ok(())
    }

    /// One IDLE step: read at most one packet and act on it.
    pub fn poll_once(&mut self) -> Result<Poll> {
        let Some(packet) = self.radio.receive()? else {
            return Ok(Poll::Empty);
        };

        let message = match protocol::decode(&packet) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Alert - {}, ignored", e);
                return Ok(Poll::Discarded);
            }
        };
        log::info!("{}", RadioMessage::inbound(message));

        if !protocol::is_trigger(message, &self.plan.trigger) {
            return Ok(Poll::Ignored);
        }

        let summary = self.run_session()?;
        Ok(Poll::Session(summary))
    }

    /// Run ACTIVE and REPORTING for one trigger, then return to IDLE.
    pub fn run_session(&mut self) -> Result<SessionSummary> {
        let recorder = &self.recorder;
        let id = self.ids.next_unused(|id| recorder.session_in_use(id));
        let mut session = Session::new(id, self.plan.cycles);
        self.transition(State::Active);
        log::info!("[{}] Starting detector ({} cycles)", session.id, session.cycle_count);

        self.recorder.ensure_dir()?;

        let mut positive_cycles = 0;
        for cycle in 0..session.cycle_count {
            if self.run_cycle(&mut session, cycle)? {
                positive_cycles += 1;
            }
        }

        self.transition(State::Reporting);
        let replied = if session.hit() {
            comm::send_token(&mut self.radio, &self.plan.reply)?;
            log::info!(
                "[{}] count={}, best={:.2}",
                session.id,
                session.detection_count,
                session.best_confidence
            );
            true
        } else {
            log::info!("[{}] No target detected → no reply", session.id);
            false
        };

        self.transition(State::Idle);
        // Triggers that arrived mid-session are stale
        comm::drain(&mut self.radio)?;
        log::info!("Waiting for next trigger …");

        Ok(SessionSummary {
            id: session.id,
            cycles_run: session.cycle_count,
            positive_cycles,
            detection_count: session.detection_count,
            best_confidence: session.best_confidence,
            replied,
        })
    }

    /// Capture, classify and, if anything was seen, record. Returns whether
    /// the cycle was positive.
    fn run_cycle(&mut self, session: &mut Session, cycle: u32) -> Result<bool> {
        let frame = self.camera.capture_frame()?;
        log::debug!("[{}] Captured frame {}", session.id, cycle);

        let raw = self
            .detector
            .classify(&frame, self.target, self.plan.threshold)?;
        let result = FrameResult::new(cycle, raw, self.target, self.plan.threshold);

        let Some(cycle_best) = result.best_confidence() else {
            log::info!("[{}] cycle {}: no target", session.id, cycle);
            return Ok(false);
        };

        session.record_cycle(result.count(), cycle_best);

        let annotated = self.detector.render(&frame, &result.detections)?;
        let record = HitRecord {
            session_id: session.id.clone(),
            detection_count: result.count(),
            best_confidence: session.best_confidence,
            image_filename: self.recorder.image_filename(&session.id, cycle),
        };
        self.recorder.record(&record, &annotated)?;
        Ok(true)
    }

    fn transition(&mut self, next: State) {
        log::debug!("{:?} → {:?}", self.state, next);
        self.state = next;
    }
}

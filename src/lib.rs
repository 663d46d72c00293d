//! loracam library — portable core of the LoRa-triggered camera bridge.
//!
//! The bridge idles on a LoRa link. When the trigger token arrives it
//! captures a fixed number of frames, runs each through a single-class
//! detector, saves annotated evidence for positive frames, and radios the
//! reply token back if the target was seen.
//!
//! This crate holds all protocol, session, recording and state-machine logic
//! behind the [`comm::Radio`], [`capture::CaptureSource`] and
//! [`detector::Detector`] traits, so it is testable on any host with
//! `cargo test`. The `firmware-std` binary is a thin consumer that provides
//! the RFM9x radio, V4L2 camera and ONNX detector.

pub mod board;
pub mod capture;
pub mod comm;
pub mod config;
pub mod defaults;
pub mod detector;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod recorder;
pub mod session;

pub use error::{Error, Result};

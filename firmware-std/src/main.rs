//! loracam — Raspberry Pi bridge binary
//!
//! Brings up the RFM9x radio, the V4L2 camera and the YOLO model once, then
//! hands them to the library controller and listens for triggers until
//! Ctrl-C. A session that is already running always completes before the
//! process exits.

mod camera;
mod radio;
mod yolo;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use loracam::board;
use loracam::config::{assign, BridgeConfig};
use loracam::pipeline::Controller;
use loracam::protocol::VERSION;

use camera::V4l2Camera;
use radio::Rfm9x;
use yolo::YoloDetector;

/// LoRa-triggered elephant camera
#[derive(Debug, Parser)]
#[command(name = "loracam-std", version)]
struct Cli {
    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    save_dir: Option<String>,
    #[arg(long)]
    model_path: Option<String>,
    /// Detection confidence threshold
    #[arg(long)]
    conf: Option<f32>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Capture cycles per trigger
    #[arg(long)]
    cycles: Option<u32>,
    /// Listen word
    #[arg(long)]
    trigger: Option<String>,
    /// Reply word
    #[arg(long)]
    hit_reply: Option<String>,
    /// Radio frequency (MHz)
    #[arg(long)]
    freq: Option<f32>,
    /// V4L2 device index (/dev/videoN)
    #[arg(long, default_value_t = 0)]
    camera: usize,
}

impl Cli {
    fn resolve(&self) -> anyhow::Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)?,
            None => BridgeConfig::default(),
        };

        if let Some(v) = &self.save_dir {
            assign("save_dir", &mut config.save_dir, v)?;
        }
        if let Some(v) = &self.model_path {
            assign("model_path", &mut config.model_path, v)?;
        }
        if let Some(v) = &self.trigger {
            assign("trigger", &mut config.trigger, v)?;
        }
        if let Some(v) = &self.hit_reply {
            assign("reply", &mut config.reply, v)?;
        }
        if let Some(v) = self.conf {
            config.confidence = v;
        }
        if let Some(v) = self.width {
            config.width = v;
        }
        if let Some(v) = self.height {
            config.height = v;
        }
        if let Some(v) = self.cycles {
            config.cycles = v;
        }
        if let Some(v) = self.freq {
            config.frequency_mhz = v;
        }

        config.validate()?;
        Ok(config)
    }
}

fn banner() -> String {
    format!("loracam v{} starting on {}", VERSION, board::BOARD_NAME)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.resolve().context("invalid configuration")?;

    log::info!("{}", banner());

    // ── Hardware bring-up ────────────────────────────────────────────

    let radio = Rfm9x::new(config.frequency_mhz, config.tx_power)
        .context("LoRa radio bring-up failed")?;
    let detector = YoloDetector::load(config.model_path()).context("model load failed")?;
    let camera = V4l2Camera::open(cli.camera, &config.capture_settings())
        .context("camera bring-up failed")?;

    let mut controller =
        Controller::new(&config, radio, camera, detector).context("controller setup failed")?;

    // ── Interrupt handling ───────────────────────────────────────────

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed))
            .context("installing Ctrl-C handler")?;
    }

    controller.run(&shutdown)?;
    log::info!("User aborted.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "loracam-std",
            "--cycles",
            "5",
            "--trigger",
            "go",
            "--hit-reply",
            "seen",
            "--conf",
            "0.7",
        ]);
        let config = cli.resolve().unwrap();
        assert_eq!(config.cycles, 5);
        assert_eq!(config.trigger.as_str(), "go");
        assert_eq!(config.reply.as_str(), "seen");
        assert!((config.confidence - 0.7).abs() < 1e-6);
        assert_eq!(config.width, 1280);
    }

    #[test]
    fn banner_names_version_and_board() {
        let banner = banner();
        assert!(banner.contains(&format!("v{VERSION}")));
        assert!(banner.ends_with(board::BOARD_NAME));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli = Cli::parse_from(["loracam-std", "--trigger", "2.0"]);
        assert!(cli.resolve().is_err());
    }
}

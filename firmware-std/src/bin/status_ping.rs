//! One-shot status ping over LoRa.
//!
//! Independent of the bridge loop: brings up the radio, transmits the status
//! text once and exits.

#[path = "../radio.rs"]
mod radio;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use loracam::comm;
use loracam::config::{assign, BridgeConfig};

use radio::Rfm9x;

/// Send a status string over LoRa
#[derive(Debug, Parser)]
#[command(name = "status-ping", version)]
struct Cli {
    /// JSON config file (radio frequency, power, status text)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Radio frequency (MHz)
    #[arg(long)]
    freq: Option<f32>,
    /// Text to send instead of the configured status text
    #[arg(long)]
    text: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(freq) = cli.freq {
        config.frequency_mhz = freq;
    }
    if let Some(text) = &cli.text {
        assign("status_text", &mut config.status_text, text)?;
    }
    config.validate().context("invalid configuration")?;

    let mut radio = Rfm9x::new(config.frequency_mhz, config.tx_power)
        .context("LoRa radio bring-up failed")?;
    comm::send_status(&mut radio, &config.status_text)?;
    Ok(())
}

/// Hardware description for supported radio wirings.
///
/// Each board module defines the RFM9x chip-select, reset pin and SPI
/// clock selected at compile time via feature flags. Pin numbers are BCM.

#[cfg(feature = "bonnet")]
mod hw {
    /// SPI0 chip select index (CE1)
    pub const RADIO_CS: u8 = 1;
    pub const RADIO_RESET_PIN: u8 = 25;
    pub const SPI_CLOCK_HZ: u32 = 5_000_000;
    pub const BOARD_NAME: &str = "rpi_lora_bonnet";
}

#[cfg(all(feature = "breakout", not(feature = "bonnet")))]
mod hw {
    /// SPI0 chip select index (CE0)
    pub const RADIO_CS: u8 = 0;
    pub const RADIO_RESET_PIN: u8 = 17;
    pub const SPI_CLOCK_HZ: u32 = 1_000_000;
    pub const BOARD_NAME: &str = "rpi_rfm9x_breakout";
}

#[cfg(not(any(feature = "bonnet", feature = "breakout")))]
mod hw {
    pub const RADIO_CS: u8 = 1;
    pub const RADIO_RESET_PIN: u8 = 25;
    pub const SPI_CLOCK_HZ: u32 = 1_000_000;
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

/// Crystal oscillator frequency of the SX127x (Hz)
pub const RADIO_FXOSC_HZ: f64 = 32_000_000.0;

/// Largest packet, header included (RegPayloadLength is 8 bits)
pub const RADIO_FIFO_LEN: usize = 255;

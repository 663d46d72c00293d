//! RFM9x (SX127x LoRa) driver over the Pi's SPI bus.
//!
//! Minimal register-level driver: continuous RX with a non-blocking poll of
//! the RxDone flag, and blocking TX that returns once TxDone is raised.
//! Modem settings match the RadioHead/Adafruit defaults (125 kHz BW, CR 4/5,
//! SF7, CRC on, 8-symbol preamble) so stock peers can talk to us.

use std::thread;
use std::time::{Duration, Instant};

use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use loracam::board;
use loracam::comm::Radio;
use loracam::protocol::{self, Packet, BROADCAST_ADDRESS};
use loracam::{Error, Result};

// ── Registers ────────────────────────────────────────────────────────

const REG_FIFO: u8 = 0x00;
const REG_OP_MODE: u8 = 0x01;
const REG_FRF_MSB: u8 = 0x06;
const REG_FRF_MID: u8 = 0x07;
const REG_FRF_LSB: u8 = 0x08;
const REG_PA_CONFIG: u8 = 0x09;
const REG_FIFO_ADDR_PTR: u8 = 0x0D;
const REG_FIFO_TX_BASE_ADDR: u8 = 0x0E;
const REG_FIFO_RX_BASE_ADDR: u8 = 0x0F;
const REG_FIFO_RX_CURRENT_ADDR: u8 = 0x10;
const REG_IRQ_FLAGS: u8 = 0x12;
const REG_RX_NB_BYTES: u8 = 0x13;
const REG_MODEM_CONFIG_1: u8 = 0x1D;
const REG_MODEM_CONFIG_2: u8 = 0x1E;
const REG_PREAMBLE_MSB: u8 = 0x20;
const REG_PREAMBLE_LSB: u8 = 0x21;
const REG_PAYLOAD_LENGTH: u8 = 0x22;
const REG_MODEM_CONFIG_3: u8 = 0x26;
const REG_VERSION: u8 = 0x42;
const REG_PA_DAC: u8 = 0x4D;

const MODE_LONG_RANGE: u8 = 0x80;
const MODE_SLEEP: u8 = 0x00;
const MODE_STDBY: u8 = 0x01;
const MODE_TX: u8 = 0x03;
const MODE_RX_CONTINUOUS: u8 = 0x05;

const IRQ_RX_DONE: u8 = 0x40;
const IRQ_PAYLOAD_CRC_ERROR: u8 = 0x20;
const IRQ_TX_DONE: u8 = 0x08;

const SX127X_VERSION: u8 = 0x12;
const PA_DAC_HIGH_POWER: u8 = 0x87;
const PA_DAC_DEFAULT: u8 = 0x84;

/// Frequency synthesizer step (Hz)
const FSTEP_HZ: f64 = board::RADIO_FXOSC_HZ / 524_288.0;

const TX_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Rfm9x {
    spi: Spi,
    _reset: OutputPin,
    node: u8,
}

impl Rfm9x {
    /// Reset the module, verify the chip, and configure the LoRa modem.
    /// Leaves the radio in continuous receive.
    pub fn new(frequency_mhz: f32, tx_power: i8) -> Result<Self> {
        let ss = match board::RADIO_CS {
            0 => SlaveSelect::Ss0,
            _ => SlaveSelect::Ss1,
        };
        let spi = Spi::new(Bus::Spi0, ss, board::SPI_CLOCK_HZ, Mode::Mode0)
            .map_err(|e| Error::hardware_init("radio SPI", e))?;
        let mut reset = Gpio::new()
            .and_then(|gpio| gpio.get(board::RADIO_RESET_PIN))
            .map_err(|e| Error::hardware_init("radio reset GPIO", e))?
            .into_output();

        reset.set_low();
        thread::sleep(Duration::from_micros(100));
        reset.set_high();
        thread::sleep(Duration::from_millis(5));

        let mut radio = Rfm9x {
            spi,
            _reset: reset,
            node: BROADCAST_ADDRESS,
        };

        let version = radio
            .read_reg(REG_VERSION)
            .map_err(|e| Error::hardware_init("radio", e))?;
        if version != SX127X_VERSION {
            return Err(Error::hardware_init(
                "radio",
                format!("unexpected chip version {version:#04x}, wiring or module fault"),
            ));
        }

        radio
            .configure(frequency_mhz, tx_power)
            .map_err(|e| Error::hardware_init("radio", e))?;
        log::info!(
            "RFM9x ready on {} at {:.1} MHz, {} dBm",
            board::BOARD_NAME,
            frequency_mhz,
            tx_power
        );
        Ok(radio)
    }

    fn configure(&mut self, frequency_mhz: f32, tx_power: i8) -> rppal::spi::Result<()> {
        // LoRa mode can only be selected from sleep
        self.write_reg(REG_OP_MODE, MODE_SLEEP)?;
        thread::sleep(Duration::from_millis(10));
        self.write_reg(REG_OP_MODE, MODE_LONG_RANGE | MODE_SLEEP)?;
        thread::sleep(Duration::from_millis(10));

        let frf = ((frequency_mhz as f64 * 1_000_000.0) / FSTEP_HZ) as u32;
        self.write_reg(REG_FRF_MSB, (frf >> 16) as u8)?;
        self.write_reg(REG_FRF_MID, (frf >> 8) as u8)?;
        self.write_reg(REG_FRF_LSB, frf as u8)?;

        self.write_reg(REG_FIFO_TX_BASE_ADDR, 0)?;
        self.write_reg(REG_FIFO_RX_BASE_ADDR, 0)?;
        self.set_mode(MODE_STDBY)?;

        // 125 kHz, CR 4/5, explicit header
        self.write_reg(REG_MODEM_CONFIG_1, 0x72)?;
        // SF7, CRC on
        self.write_reg(REG_MODEM_CONFIG_2, 0x74)?;
        // AGC auto
        self.write_reg(REG_MODEM_CONFIG_3, 0x04)?;
        self.write_reg(REG_PREAMBLE_MSB, 0)?;
        self.write_reg(REG_PREAMBLE_LSB, 8)?;

        // PA_BOOST; above 20 dBm needs the high-power DAC and loses 3 dB of headroom
        let mut power = tx_power.clamp(5, 23);
        if power > 20 {
            self.write_reg(REG_PA_DAC, PA_DAC_HIGH_POWER)?;
            power -= 3;
        } else {
            self.write_reg(REG_PA_DAC, PA_DAC_DEFAULT)?;
        }
        self.write_reg(REG_PA_CONFIG, 0x80 | ((power - 5) as u8 & 0x0F))?;

        self.set_mode(MODE_RX_CONTINUOUS)
    }

    fn set_mode(&mut self, mode: u8) -> rppal::spi::Result<()> {
        self.write_reg(REG_OP_MODE, MODE_LONG_RANGE | mode)
    }

    fn read_reg(&mut self, reg: u8) -> rppal::spi::Result<u8> {
        let mut rx = [0u8; 2];
        self.spi.transfer(&mut rx, &[reg & 0x7F, 0])?;
        Ok(rx[1])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> rppal::spi::Result<()> {
        self.spi.write(&[reg | 0x80, value])?;
        Ok(())
    }

    fn read_fifo(&mut self, buf: &mut [u8]) -> rppal::spi::Result<()> {
        let mut tx = vec![0u8; buf.len() + 1];
        tx[0] = REG_FIFO;
        let mut rx = vec![0u8; buf.len() + 1];
        self.spi.transfer(&mut rx, &tx)?;
        buf.copy_from_slice(&rx[1..]);
        Ok(())
    }

    fn write_fifo(&mut self, data: &[u8]) -> rppal::spi::Result<()> {
        let mut tx = Vec::with_capacity(data.len() + 1);
        tx.push(REG_FIFO | 0x80);
        tx.extend_from_slice(data);
        self.spi.write(&tx)?;
        Ok(())
    }

    fn poll_rx(&mut self) -> rppal::spi::Result<Option<Packet>> {
        let flags = self.read_reg(REG_IRQ_FLAGS)?;
        if flags & IRQ_RX_DONE == 0 {
            return Ok(None);
        }
        self.write_reg(REG_IRQ_FLAGS, 0xFF)?;

        if flags & IRQ_PAYLOAD_CRC_ERROR != 0 {
            log::debug!("RFM9x: CRC error, packet dropped");
            return Ok(None);
        }

        let len = self.read_reg(REG_RX_NB_BYTES)? as usize;
        let addr = self.read_reg(REG_FIFO_RX_CURRENT_ADDR)?;
        self.write_reg(REG_FIFO_ADDR_PTR, addr)?;
        let mut raw = vec![0u8; len];
        self.read_fifo(&mut raw)?;

        Ok(protocol::unframe(&raw, self.node).and_then(|payload| Packet::from_slice(payload).ok()))
    }
}

impl Radio for Rfm9x {
    fn receive(&mut self) -> Result<Option<Packet>> {
        self.poll_rx().map_err(Error::radio)
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        let raw = protocol::frame(payload)
            .ok_or_else(|| Error::radio(format!("payload of {} bytes too long", payload.len())))?;

        let io = |radio: &mut Rfm9x| -> rppal::spi::Result<bool> {
            radio.set_mode(MODE_STDBY)?;
            radio.write_reg(REG_FIFO_ADDR_PTR, 0)?;
            radio.write_fifo(&raw)?;
            radio.write_reg(REG_PAYLOAD_LENGTH, raw.len() as u8)?;
            radio.set_mode(MODE_TX)?;

            let start = Instant::now();
            let mut done = false;
            while start.elapsed() < TX_TIMEOUT {
                if radio.read_reg(REG_IRQ_FLAGS)? & IRQ_TX_DONE != 0 {
                    done = true;
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
            radio.write_reg(REG_IRQ_FLAGS, 0xFF)?;
            radio.set_mode(MODE_RX_CONTINUOUS)?;
            Ok(done)
        };

        match io(self) {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::radio("TX done not signalled within 2 s")),
            Err(e) => Err(Error::radio(e)),
        }
    }
}

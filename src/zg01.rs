//! Serial driver for ZyAura ZG01-family CO2/temperature monitors.
//!
//! The device continuously emits 5-byte frames, one measurement item per
//! frame: `[item, value-high, value-low, checksum, 0x0D]`. The checksum is
//! the low byte of the sum of the first three bytes. A complete sample
//! needs both a CO2 frame and a temperature frame, so a read collects
//! frames until it has seen one of each.

use crate::error::{AirsenseError, Result};
use crate::sensor::{Co2Sample, Co2Sensor};
use byteorder::{BigEndian, ByteOrder};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use uom::si::f64::ThermodynamicTemperature;
use uom::si::thermodynamic_temperature::{degree_celsius, kelvin};

/// Default baud rate for ZG01 serial adapters
pub const DEFAULT_BAUD_RATE: u32 = 9600;

const FRAME_LEN: usize = 5;
const FRAME_END: u8 = 0x0D;

const ITEM_CO2: u8 = 0x50;
const ITEM_TEMPERATURE: u8 = 0x42;
const ITEM_HUMIDITY: u8 = 0x41;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// One decoded measurement frame.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Reading {
    /// CO2 concentration in ppm
    Co2(u16),
    /// Temperature in celsius (the wire carries 1/16 K units)
    Temperature(f64),
    /// Relative humidity in percent (1/100 % units; 0 on devices without
    /// a humidity sensor)
    Humidity(f64),
    /// A valid frame for an item we do not track
    Other { item: u8, value: u16 },
}

fn decode_frame(frame: &[u8]) -> Result<Reading> {
    if frame.len() != FRAME_LEN || frame[FRAME_LEN - 1] != FRAME_END {
        return Err(AirsenseError::InvalidFrame);
    }

    let checksum = frame[0].wrapping_add(frame[1]).wrapping_add(frame[2]);
    if checksum != frame[3] {
        return Err(AirsenseError::ChecksumMismatch);
    }

    let value = BigEndian::read_u16(&frame[1..3]);
    Ok(match frame[0] {
        ITEM_CO2 => Reading::Co2(value),
        ITEM_TEMPERATURE => Reading::Temperature(
            ThermodynamicTemperature::new::<kelvin>(f64::from(value) / 16.0)
                .get::<degree_celsius>(),
        ),
        ITEM_HUMIDITY => Reading::Humidity(f64::from(value) / 100.0),
        item => Reading::Other { item, value },
    })
}

/// CO2 monitor attached through a serial port.
pub struct Zg01Sensor {
    port: SerialStream,
    buf: Vec<u8>,
    timeout: Duration,
}

impl std::fmt::Debug for Zg01Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zg01Sensor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Zg01Sensor {
    /// Open the sensor on the given serial port path.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = tokio_serial::new(path, baud_rate).open_native_async()?;
        Ok(Self {
            port,
            buf: Vec::with_capacity(4 * FRAME_LEN),
            timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Bound on how long one `read_sample` may wait for a complete sample.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    async fn read_frame(&mut self) -> Result<Reading> {
        loop {
            while self.buf.len() >= FRAME_LEN {
                match decode_frame(&self.buf[..FRAME_LEN]) {
                    Ok(reading) => {
                        self.buf.drain(..FRAME_LEN);
                        return Ok(reading);
                    }
                    Err(_) => {
                        // Resync one byte at a time until frames line up
                        self.buf.remove(0);
                    }
                }
            }

            let mut chunk = [0u8; 32];
            let n = self.port.read(&mut chunk).await?;
            if n == 0 {
                return Err(AirsenseError::SensorGone);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn collect_sample(&mut self) -> Result<Co2Sample> {
        let mut co2 = None;
        let mut temperature = None;

        loop {
            match self.read_frame().await? {
                Reading::Co2(v) => co2 = Some(v),
                Reading::Temperature(t) => temperature = Some(t),
                Reading::Humidity(_) | Reading::Other { .. } => {}
            }

            if let (Some(co2_ppm), Some(temperature_c)) = (co2, temperature) {
                return Ok(Co2Sample {
                    co2_ppm,
                    temperature_c,
                });
            }
        }
    }
}

impl Co2Sensor for Zg01Sensor {
    async fn read_sample(&mut self) -> Result<Co2Sample> {
        match tokio::time::timeout(self.timeout, self.collect_sample()).await {
            Ok(sample) => sample,
            Err(_) => Err(AirsenseError::SensorTimeout),
        }
    }
}

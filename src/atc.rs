//! Decoder for ATC_MI thermometer advertisements.
//!
//! Xiaomi LYWSD03MMC sensors running the ATC1441/pvvx custom firmware
//! broadcast their readings as Environmental Sensing (0x181A) service data.
//! The two firmware variants use different layouts, told apart by length:
//! 13 bytes for atc1441 (big-endian, MAC stored in network order) and
//! 15 bytes for the pvvx custom format (little-endian, MAC reversed).

use byteorder::{BigEndian, ByteOrder, LittleEndian};

pub const ATC1441_LEN: usize = 13;
pub const PVVX_LEN: usize = 15;

/// One decoded beacon broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct AtcReading {
    /// Sensor MAC as reported inside the payload, `AA:BB:CC:DD:EE:FF`
    pub mac: String,
    pub temperature_c: f64,
    /// Relative humidity in whole percent
    pub humidity: u8,
    pub battery_percent: u8,
    pub battery_mv: u16,
}

/// Decode a service-data payload, returning `None` for anything that is
/// not a recognized ATC_MI broadcast.
pub fn decode_service_data(data: &[u8]) -> Option<AtcReading> {
    match data.len() {
        ATC1441_LEN => decode_atc1441(data),
        PVVX_LEN => decode_pvvx(data),
        _ => None,
    }
}

fn decode_atc1441(data: &[u8]) -> Option<AtcReading> {
    let mac = format_mac(&data[..6], false);
    let temperature_c = f64::from(BigEndian::read_i16(&data[6..8])) / 10.0;
    let humidity = data[8];
    if humidity > 100 {
        return None;
    }
    Some(AtcReading {
        mac,
        temperature_c,
        humidity,
        battery_percent: data[9],
        battery_mv: BigEndian::read_u16(&data[10..12]),
    })
}

fn decode_pvvx(data: &[u8]) -> Option<AtcReading> {
    let mac = format_mac(&data[..6], true);
    let temperature_c = f64::from(LittleEndian::read_i16(&data[6..8])) / 100.0;
    let humidity_centi = LittleEndian::read_u16(&data[8..10]);
    if humidity_centi > 100_00 {
        return None;
    }
    Some(AtcReading {
        mac,
        temperature_c,
        humidity: (humidity_centi / 100) as u8,
        battery_mv: LittleEndian::read_u16(&data[10..12]),
        battery_percent: data[12],
    })
}

fn format_mac(bytes: &[u8], reversed: bool) -> String {
    let mut s = String::with_capacity(bytes.len() * 3);
    let mut push = |b: u8| {
        if !s.is_empty() {
            s.push(':');
        }
        s.push_str(&format!("{b:02X}"));
    };
    if reversed {
        bytes.iter().rev().copied().for_each(&mut push);
    } else {
        bytes.iter().copied().for_each(&mut push);
    }
    s
}

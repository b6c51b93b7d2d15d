pub mod atc;
pub mod ble;
pub mod collector;
pub mod error;
pub mod sensor;
pub mod zg01;

pub use atc::AtcReading;
pub use ble::BlueZScanner;
pub use error::{AirsenseError, Result};
pub use sensor::{Co2Sample, Co2Sensor};
pub use zg01::Zg01Sensor;

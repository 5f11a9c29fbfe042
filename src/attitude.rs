//! Compass/roll/pitch sensing.

use async_trait::async_trait;
use rppal::i2c::I2c;

use crate::error::{HelmError, Result};

const CMPS12_ADDRESS: u16 = 0x60;
const REG_COMPASS_HI: u8 = 0x02;
const REG_COMPASS_LO: u8 = 0x03;
const REG_PITCH: u8 = 0x04;
const REG_ROLL: u8 = 0x05;
const REG_CALIBRATION: u8 = 0x1e;

/// Consecutive transient faults before a sensor is considered dead for
/// the tick (default; see `Cmps12Sensor::with_fault_threshold`).
const DEFAULT_FAULT_THRESHOLD: u32 = 5;

#[async_trait]
pub trait AttitudeSensor: Send + Sync {
    /// Heading in deci-degrees, already wrapped into `0..3600`.
    async fn read_compass(&self) -> Result<u16>;
    async fn read_roll(&self) -> Result<i8>;
    async fn read_pitch(&self) -> Result<i8>;
    /// Calibration status, `0..=3` (CMPS12 convention: 3 = fully calibrated).
    async fn calibration(&self) -> Result<u8>;
}

/// CMPS12-style compass/IMU over I²C, register layout matching the
/// original board driver.
pub struct Cmps12Sensor {
    i2c: std::sync::Mutex<I2c>,
    fault_threshold: u32,
    consecutive_faults: std::sync::atomic::AtomicU32,
    last_compass: std::sync::atomic::AtomicU16,
}

impl Cmps12Sensor {
    pub fn open() -> Result<Self> {
        let mut i2c = I2c::new().map_err(|e| HelmError::SensorFault(e.to_string()))?;
        i2c.set_slave_address(CMPS12_ADDRESS)
            .map_err(|e| HelmError::SensorFault(e.to_string()))?;
        Ok(Self {
            i2c: std::sync::Mutex::new(i2c),
            fault_threshold: DEFAULT_FAULT_THRESHOLD,
            consecutive_faults: std::sync::atomic::AtomicU32::new(0),
            last_compass: std::sync::atomic::AtomicU16::new(0),
        })
    }

    pub fn with_fault_threshold(mut self, threshold: u32) -> Self {
        self.fault_threshold = threshold;
        self
    }

    fn read_signed_word(i2c: &mut I2c, hi_reg: u8, lo_reg: u8) -> std::result::Result<i16, rppal::i2c::Error> {
        let hi = i2c.smbus_read_byte(hi_reg)?;
        let lo = i2c.smbus_read_byte(lo_reg)?;
        Ok(i16::from_be_bytes([hi, lo]))
    }

    /// A bus read failed. Returns the previous reading while the fault is
    /// transient; past `fault_threshold` consecutive faults, surfaces
    /// `SensorFault` instead.
    fn handle_fault(&self, source: impl std::fmt::Display) -> Result<u16> {
        let faults = self.consecutive_faults.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        if faults >= self.fault_threshold {
            return Err(HelmError::SensorFault(format!("compass: {faults} consecutive faults ({source})")));
        }
        Ok(self.last_compass.load(std::sync::atomic::Ordering::SeqCst))
    }
}

#[async_trait]
impl AttitudeSensor for Cmps12Sensor {
    async fn read_compass(&self) -> Result<u16> {
        let mut i2c = self.i2c.lock().unwrap();
        match Self::read_signed_word(&mut i2c, REG_COMPASS_HI, REG_COMPASS_LO) {
            Ok(raw) => {
                let mut compass = raw;
                if compass >= 3600 {
                    compass -= 3600;
                }
                if compass < 0 {
                    compass += 3600;
                }
                self.consecutive_faults.store(0, std::sync::atomic::Ordering::SeqCst);
                let compass = compass as u16;
                self.last_compass.store(compass, std::sync::atomic::Ordering::SeqCst);
                Ok(compass)
            }
            Err(e) => self.handle_fault(e),
        }
    }

    async fn read_roll(&self) -> Result<i8> {
        let mut i2c = self.i2c.lock().unwrap();
        let byte = i2c.smbus_read_byte(REG_ROLL).map_err(|e| HelmError::SensorFault(e.to_string()))?;
        Ok(byte as i8)
    }

    async fn read_pitch(&self) -> Result<i8> {
        let mut i2c = self.i2c.lock().unwrap();
        let byte = i2c.smbus_read_byte(REG_PITCH).map_err(|e| HelmError::SensorFault(e.to_string()))?;
        Ok(byte as i8)
    }

    async fn calibration(&self) -> Result<u8> {
        let mut i2c = self.i2c.lock().unwrap();
        i2c.smbus_read_byte(REG_CALIBRATION).map_err(|e| HelmError::SensorFault(e.to_string()))
    }
}

/// Test double: returns queued or constant readings, with optional
/// injected faults.
pub struct NullAttitudeSensor {
    compass: std::sync::Mutex<std::collections::VecDeque<Result<u16>>>,
    roll: i8,
    pitch: i8,
    calibration: u8,
}

impl NullAttitudeSensor {
    pub fn constant(compass: u16) -> Self {
        Self {
            compass: std::sync::Mutex::new(std::collections::VecDeque::from([Ok(compass)])),
            roll: 0,
            pitch: 0,
            calibration: 3,
        }
    }

    pub fn with_queue(readings: Vec<Result<u16>>) -> Self {
        Self {
            compass: std::sync::Mutex::new(readings.into()),
            roll: 0,
            pitch: 0,
            calibration: 3,
        }
    }
}

#[async_trait]
impl AttitudeSensor for NullAttitudeSensor {
    async fn read_compass(&self) -> Result<u16> {
        let mut q = self.compass.lock().unwrap();
        if q.len() > 1 {
            q.pop_front().unwrap()
        } else {
            q.front().map(|r| match r {
                Ok(v) => Ok(*v),
                Err(e) => Err(HelmError::SensorFault(e.to_string())),
            }).unwrap_or(Ok(0))
        }
    }

    async fn read_roll(&self) -> Result<i8> {
        Ok(self.roll)
    }

    async fn read_pitch(&self) -> Result<i8> {
        Ok(self.pitch)
    }

    async fn calibration(&self) -> Result<u8> {
        Ok(self.calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_sensor_repeats_last_reading_once_queue_drains() {
        let sensor = NullAttitudeSensor::with_queue(vec![Ok(100), Ok(200)]);
        assert_eq!(sensor.read_compass().await.unwrap(), 100);
        assert_eq!(sensor.read_compass().await.unwrap(), 200);
        assert_eq!(sensor.read_compass().await.unwrap(), 200);
    }

    #[tokio::test]
    async fn null_sensor_reports_fixed_roll_pitch_calibration() {
        let sensor = NullAttitudeSensor::constant(1800);
        assert_eq!(sensor.read_roll().await.unwrap(), 0);
        assert_eq!(sensor.read_pitch().await.unwrap(), 0);
        assert_eq!(sensor.calibration().await.unwrap(), 3);
    }
}

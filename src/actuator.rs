//! Reversible DC helm motor control: direction GPIOs + a single hardware
//! PWM channel, matching the original board driver's `_port`/`_starboard`/
//! `helm_drive` shape.

use std::time::Instant;

use log::warn;
use rppal::gpio::{Gpio, OutputPin};
use rppal::pwm::{Channel, Polarity, Pwm};

use crate::error::{HelmError, Result};

const PORT_PIN: u8 = 23;
const STARBOARD_PIN: u8 = 24;
const ALARM_PIN: u8 = 25;
const PWM_CHANNEL: Channel = Channel::Pwm0;
const PWM_FREQUENCY_HZ: f64 = 5000.0;
const DUTY_DEAD_ZONE: i32 = 2000;
const DUTY_SATURATION: i32 = 998_000;
const DUTY_FULL: i32 = 1_000_000;
const FAULT_LIMIT: u32 = 5;

pub trait HelmActuator: Send + Sync {
    fn arm(&mut self);
    fn disarm(&mut self);
    fn set_base_duty(&mut self, duty: i32);
    /// Drives the motor for `correction` this tick; also advances
    /// `rudder_estimate` regardless of arm state (see step 1 of the
    /// algorithm).
    fn apply(&mut self, correction: i32) -> Result<()>;
    fn alarm_on(&mut self);
    fn alarm_off(&mut self);
    fn applied_power(&self) -> i32;
    fn rudder_estimate(&self) -> f64;
    /// Zeroes the integrated rudder estimate — called on every `auto_mode` transition.
    fn reset_rudder_estimate(&mut self);
}

/// `rppal`-backed implementation: GPIO direction pair + hardware PWM.
pub struct RppalActuator {
    port: OutputPin,
    starboard: OutputPin,
    alarm: OutputPin,
    pwm: Pwm,
    armed: bool,
    base_duty: i32,
    applied_power: i32,
    rudder_estimate: f64,
    last_power_at: Instant,
    consecutive_faults: u32,
}

impl RppalActuator {
    pub fn open() -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HelmError::ActuatorFault(e.to_string()))?;
        let port = gpio.get(PORT_PIN).map_err(|e| HelmError::ActuatorFault(e.to_string()))?.into_output();
        let starboard = gpio.get(STARBOARD_PIN).map_err(|e| HelmError::ActuatorFault(e.to_string()))?.into_output();
        let alarm = gpio.get(ALARM_PIN).map_err(|e| HelmError::ActuatorFault(e.to_string()))?.into_output_low();
        let pwm = Pwm::with_frequency(PWM_CHANNEL, PWM_FREQUENCY_HZ, 0.0, Polarity::Normal, true)
            .map_err(|e| HelmError::ActuatorFault(e.to_string()))?;
        Ok(Self {
            port,
            starboard,
            alarm,
            pwm,
            armed: false,
            base_duty: 0,
            applied_power: 0,
            rudder_estimate: 0.0,
            last_power_at: Instant::now(),
            consecutive_faults: 0,
        })
    }

    fn drive_port(&mut self) {
        self.starboard.set_low();
        if self.armed {
            self.port.set_high();
        } else {
            self.port.set_low();
        }
    }

    fn drive_starboard(&mut self) {
        self.port.set_low();
        if self.armed {
            self.starboard.set_high();
        } else {
            self.starboard.set_low();
        }
    }

    fn write_duty(&mut self, duty: i32) -> std::result::Result<(), rppal::pwm::Error> {
        self.pwm.set_duty_cycle(duty as f64 / DUTY_FULL as f64)
    }
}

impl HelmActuator for RppalActuator {
    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
        self.applied_power = 0;
        // Standby ticks never call `apply`, so without this the next
        // `apply` after re-arming would integrate the whole idle standby
        // span at the newly-applied power instead of contributing zero.
        self.last_power_at = Instant::now();
        if let Err(e) = self.write_duty(0) {
            warn!("failed to zero PWM duty on disarm: {e}");
        }
    }

    fn set_base_duty(&mut self, duty: i32) {
        self.base_duty = duty;
    }

    fn apply(&mut self, correction: i32) -> Result<()> {
        let (duty, direction) = if self.armed {
            let direction = if correction < 0 { -1 } else { 1 };
            if direction > 0 {
                self.drive_starboard();
            } else {
                self.drive_port();
            }
            let mut duty = correction.abs();
            if duty < DUTY_DEAD_ZONE {
                duty = 0;
            } else if duty > DUTY_SATURATION {
                duty = DUTY_FULL;
            }
            (duty, direction)
        } else {
            (0, 1)
        };

        let applied_power = duty * direction;
        self.applied_power = applied_power;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_power_at).as_secs_f64();
        self.rudder_estimate += applied_power as f64 * elapsed / DUTY_FULL as f64;
        self.last_power_at = now;

        match self.write_duty(duty) {
            Ok(()) => {
                self.consecutive_faults = 0;
                Ok(())
            }
            Err(e) => match self.write_duty(duty) {
                Ok(()) => {
                    self.consecutive_faults = 0;
                    Ok(())
                }
                Err(e2) => {
                    self.consecutive_faults += 1;
                    warn!("PWM write failed twice this tick: {e} / {e2}");
                    if self.consecutive_faults >= FAULT_LIMIT {
                        self.disarm();
                        Err(HelmError::ActuatorFault(format!(
                            "{FAULT_LIMIT} consecutive PWM write failures: {e2}"
                        )))
                    } else {
                        Ok(())
                    }
                }
            },
        }
    }

    fn alarm_on(&mut self) {
        self.alarm.set_high();
    }

    fn alarm_off(&mut self) {
        self.alarm.set_low();
    }

    fn applied_power(&self) -> i32 {
        self.applied_power
    }

    fn rudder_estimate(&self) -> f64 {
        self.rudder_estimate
    }

    fn reset_rudder_estimate(&mut self) {
        self.rudder_estimate = 0.0;
    }
}

impl Drop for RppalActuator {
    fn drop(&mut self) {
        self.disarm();
        let _ = self.write_duty(0);
        self.alarm.set_low();
    }
}

/// Test double recording every call, for autopilot unit tests.
#[derive(Default)]
pub struct NullActuator {
    pub armed: bool,
    pub base_duty: i32,
    pub applied_power: i32,
    pub rudder_estimate: f64,
    pub last_power_at: Option<Instant>,
    pub alarm: bool,
    pub apply_calls: Vec<i32>,
}

impl NullActuator {
    pub fn new() -> Self {
        Self {
            last_power_at: Some(Instant::now()),
            ..Default::default()
        }
    }
}

impl HelmActuator for NullActuator {
    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
        self.applied_power = 0;
        self.last_power_at = Some(Instant::now());
    }

    fn set_base_duty(&mut self, duty: i32) {
        self.base_duty = duty;
    }

    fn apply(&mut self, correction: i32) -> Result<()> {
        self.apply_calls.push(correction);

        let (duty, direction) = if self.armed {
            let direction = if correction < 0 { -1 } else { 1 };
            let mut duty = correction.abs();
            if duty < DUTY_DEAD_ZONE {
                duty = 0;
            } else if duty > DUTY_SATURATION {
                duty = DUTY_FULL;
            }
            (duty, direction)
        } else {
            (0, 1)
        };

        let applied_power = duty * direction;
        self.applied_power = applied_power;

        let now = Instant::now();
        let last = self.last_power_at.unwrap_or(now);
        let elapsed = now.duration_since(last).as_secs_f64();
        self.rudder_estimate += applied_power as f64 * elapsed / DUTY_FULL as f64;
        self.last_power_at = Some(now);
        Ok(())
    }

    fn alarm_on(&mut self) {
        self.alarm = true;
    }

    fn alarm_off(&mut self) {
        self.alarm = false;
    }

    fn applied_power(&self) -> i32 {
        self.applied_power
    }

    fn rudder_estimate(&self) -> f64 {
        self.rudder_estimate
    }

    fn reset_rudder_estimate(&mut self) {
        self.rudder_estimate = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_dead_zone_and_saturation_boundaries() {
        let mut a = NullActuator::new();
        a.arm();

        a.apply(1999).unwrap();
        assert_eq!(a.applied_power(), 0);

        a.apply(2000).unwrap();
        assert_eq!(a.applied_power(), 2000);

        a.apply(998_000).unwrap();
        assert_eq!(a.applied_power(), 998_000);

        a.apply(998_001).unwrap();
        assert_eq!(a.applied_power(), 1_000_000);
    }

    #[test]
    fn negative_correction_drives_the_opposite_direction() {
        let mut a = NullActuator::new();
        a.arm();
        a.apply(-5000).unwrap();
        assert_eq!(a.applied_power(), -5000);
    }

    #[test]
    fn disarmed_actuator_applies_zero_power_but_still_advances_time() {
        let mut a = NullActuator::new();
        a.apply(50_000).unwrap();
        assert_eq!(a.applied_power(), 0);
        assert_eq!(a.rudder_estimate(), 0.0);
    }
}

//! The control loop: turns compass + command-channel intent into motor
//! drive, once every 500 ms.

use std::time::Duration;

use log::{error, warn};

use crate::actuator::HelmActuator;
use crate::attitude::AttitudeSensor;
use crate::command::{CommandStore, HelmCommand};
use crate::error::Result;
use crate::state::{BoatKey, BoatState, Scalar};
use crate::util::relative_direction;

const WARMUP: Duration = Duration::from_secs(15);
const TICK_INTERVAL: Duration = Duration::from_millis(500);
const RUDDER_STOPS_LIMIT: f64 = 15.0;
const DEFAULT_GAIN: i64 = 325;
const DEFAULT_TSF: i64 = 1454;
const DEFAULT_BASE_DUTY: i32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Standby,
    Auto,
    Manual,
}

impl Mode {
    fn from_command(value: i64) -> Self {
        match value {
            2 => Mode::Auto,
            3 => Mode::Manual,
            _ => Mode::Standby,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Mode::Standby => "stand-by",
            Mode::Auto => "auto",
            Mode::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompassMode {
    Internal,
    External,
}

impl CompassMode {
    fn label(self) -> &'static str {
        match self {
            CompassMode::Internal => "int",
            CompassMode::External => "ext",
        }
    }
}

pub struct Autopilot<S, A, C> {
    sensor: S,
    actuator: A,
    command_store: C,
    state: BoatState,
    mode: Mode,
    last_published_mode: Mode,
    compass_mode: CompassMode,
    last_heading: Option<i32>,
    last_helm: HelmCommand,
    alarm_active: bool,
    warmup: Duration,
    tick_interval: Duration,
}

impl<S: AttitudeSensor, A: HelmActuator, C: CommandStore> Autopilot<S, A, C> {
    pub fn new(sensor: S, actuator: A, command_store: C, state: BoatState) -> Self {
        Self {
            sensor,
            actuator,
            command_store,
            state,
            mode: Mode::Standby,
            last_published_mode: Mode::Standby,
            compass_mode: CompassMode::Internal,
            last_heading: None,
            last_helm: HelmCommand::default(),
            alarm_active: false,
            warmup: WARMUP,
            tick_interval: TICK_INTERVAL,
        }
    }

    /// Overrides the default 15s warm-up / 500ms tick interval (from
    /// configuration); values of zero are accepted for tests.
    pub fn with_timing(mut self, warmup: Duration, tick_interval: Duration) -> Self {
        self.warmup = warmup;
        self.tick_interval = tick_interval;
        self
    }

    /// Sleeps out the sensor warm-up period, then ticks every
    /// `tick_interval` until cancelled.
    pub async fn run(mut self) {
        tokio::time::sleep(self.warmup).await;
        let mut interval = tokio::time::interval(self.tick_interval.max(Duration::from_millis(1)));
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                error!("autopilot tick failed: {e}");
            }
        }
    }

    /// One control-loop iteration. Public for unit tests.
    pub async fn tick(&mut self) -> Result<()> {
        let helm = match self.command_store.read_helm().await {
            Ok(h) => {
                self.last_helm = h;
                h
            }
            Err(e) => {
                warn!("command store unreachable, freezing last command: {e}");
                self.last_helm
            }
        };

        let mut alarm_event = false;

        if helm.auto_mode != 0 {
            self.mode = if helm.auto_mode == 1 {
                Mode::Standby
            } else {
                Mode::from_command(helm.auto_mode)
            };
            self.actuator.reset_rudder_estimate();
            if let Err(e) = self.command_store.write_helm_field("auto_mode", 0).await {
                warn!("failed to clear one-shot auto_mode: {e}");
            }
        }

        if self.actuator.rudder_estimate().abs() > RUDDER_STOPS_LIMIT {
            self.mode = Mode::Standby;
            alarm_event = true;
        }

        if self.mode != self.last_published_mode {
            self.state.set(BoatKey::AutoHelm, Scalar::Text(self.mode.label().to_string()));
            alarm_event = true;
            self.last_published_mode = self.mode;
        }

        let sensor_heading = match self.sensor.read_compass().await {
            Ok(h) => h as i32,
            Err(e) => {
                warn!("compass read failed: {e}");
                self.actuator.alarm_on();
                self.alarm_active = true;
                return Ok(());
            }
        };
        let compass_cal = self.sensor.calibration().await.unwrap_or(0);
        let roll = self.sensor.read_roll().await.unwrap_or(0) as i64;
        let pitch = self.sensor.read_pitch().await.unwrap_or(0) as i64;
        self.update_extreme(BoatKey::MaxHeal, roll, true);
        self.update_extreme(BoatKey::MinHeal, roll, false);
        self.update_extreme(BoatKey::MaxPitch, pitch, true);
        self.update_extreme(BoatKey::MinPitch, pitch, false);

        let mut heading_int = sensor_heading;
        if let Some(hdm) = self.state.get(BoatKey::Hdm).and_then(|v| v.as_f64()) {
            let hdm10 = (hdm * 10.0).round() as i32;
            self.state.set(BoatKey::HeadDiff, Scalar::Int((relative_direction(heading_int - hdm10)) as i64));
            let resolved = if helm.compass_mode == 2 { CompassMode::External } else { CompassMode::Internal };
            if resolved == CompassMode::External {
                heading_int = hdm10;
            }
            if resolved != self.compass_mode {
                self.state.set(BoatKey::CompassMode, Scalar::Text(resolved.label().to_string()));
                alarm_event = true;
            }
            self.compass_mode = resolved;
        } else if self.compass_mode != CompassMode::Internal {
            self.state.set(BoatKey::CompassMode, Scalar::Text(CompassMode::Internal.label().to_string()));
            self.compass_mode = CompassMode::Internal;
            alarm_event = true;
        }

        // `BoatKey::Hts` is the command-channel/decoder-facing value, in
        // float degrees (§3 data model) — never written by this loop, so
        // the fallback below never re-reads its own previous-tick output.
        // The deci-degree value actually steered to this tick is mirrored
        // separately under `BoatKey::HtsTarget` for telemetry.
        let hts_int = match helm.hts {
            Some(v) => v as i32,
            None => {
                let hts_deg = self.state.get(BoatKey::Hts).and_then(|v| v.as_f64()).unwrap_or(0.0);
                let mag_var = self.state.get(BoatKey::MagVar).and_then(|v| v.as_f64()).unwrap_or(0.0);
                ((hts_deg + mag_var) * 10.0) as i32
            }
        };
        let gain = helm.gain.map(|g| g + 1).unwrap_or(DEFAULT_GAIN) as i32;
        let tsf = helm.tsf.map(|t| t + 1).unwrap_or(DEFAULT_TSF) as i32;

        let last_heading = self.last_heading.unwrap_or(heading_int);
        let error_correct = relative_direction(hts_int - heading_int);
        let turn_rate = relative_direction(heading_int - last_heading);
        let correction = (error_correct - turn_rate * tsf / 100) * gain;

        let base_duty = helm.base_duty.filter(|&v| v != 0).unwrap_or(DEFAULT_BASE_DUTY as i64) as i32;
        match self.mode {
            Mode::Auto => {
                self.actuator.set_base_duty(base_duty);
                self.actuator.arm();
                self.actuator.apply(correction)?;
            }
            Mode::Manual => {
                self.actuator.set_base_duty(0);
                self.actuator.arm();
                self.actuator.apply(helm.drive.unwrap_or(0) as i32 * 10000)?;
            }
            Mode::Standby => {
                self.actuator.set_base_duty(0);
                self.actuator.disarm();
            }
        }

        if alarm_event {
            self.actuator.alarm_on();
            self.alarm_active = true;
        } else if self.alarm_active {
            self.actuator.alarm_off();
            self.alarm_active = false;
        }

        self.state.set(BoatKey::Compass, Scalar::Float(sensor_heading as f64 / 10.0));
        self.state.set(BoatKey::CompassCal, Scalar::Int(compass_cal as i64));
        self.state.set(BoatKey::Gain, Scalar::Int(gain as i64));
        self.state.set(BoatKey::Tsf, Scalar::Int(tsf as i64));
        self.state.set(BoatKey::BaseDuty, Scalar::Int(base_duty as i64));
        self.state.set(BoatKey::Power, Scalar::Int(self.actuator.applied_power() as i64));
        self.state.set(BoatKey::Rudder, Scalar::Float(self.actuator.rudder_estimate()));
        self.state.set(BoatKey::HtsTarget, Scalar::Int(hts_int as i64));

        self.last_heading = Some(heading_int);
        Ok(())
    }

    fn update_extreme(&self, key: BoatKey, value: i64, is_max: bool) {
        let current = self.state.get(key).and_then(|v| v.as_i64()).unwrap_or(value);
        let next = if is_max { current.max(value) } else { current.min(value) };
        self.state.set(key, Scalar::Int(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attitude::NullAttitudeSensor;
    use crate::actuator::NullActuator;
    use crate::command::NullCommandStore;

    #[tokio::test]
    async fn first_auto_tick_computes_the_documented_correction() {
        let state = BoatState::new();
        let cmds = NullCommandStore::default();
        cmds.write_helm_field("auto_mode", 2).await.unwrap();
        cmds.write_helm_field("hts", 900).await.unwrap();
        cmds.write_helm_field("gain", 324).await.unwrap();
        cmds.write_helm_field("tsf", 1453).await.unwrap();
        cmds.write_helm_field("base_duty", 100_000).await.unwrap();

        let sensor = NullAttitudeSensor::constant(800);
        let actuator = NullActuator::new();
        let mut ap = Autopilot::new(sensor, actuator, cmds, state.clone());

        ap.tick().await.unwrap();

        assert_eq!(ap.mode, Mode::Auto);
        assert_eq!(state.get(BoatKey::AutoHelm).unwrap().as_text().unwrap(), "auto");
        assert_eq!(state.get(BoatKey::Power).unwrap().as_i64(), Some(32_500));
        assert!(ap.actuator.rudder_estimate >= 0.0);
    }

    #[tokio::test]
    async fn rudder_against_the_stops_trips_to_standby_same_tick() {
        let state = BoatState::new();
        let cmds = NullCommandStore::default();
        let sensor = NullAttitudeSensor::constant(800);
        let mut actuator = NullActuator::new();
        actuator.armed = true;
        actuator.rudder_estimate = 15.1;
        let mut ap = Autopilot::new(sensor, actuator, cmds, state.clone());
        ap.mode = Mode::Auto;
        ap.last_published_mode = Mode::Auto;

        ap.tick().await.unwrap();

        assert_eq!(ap.mode, Mode::Standby);
        assert_eq!(state.get(BoatKey::AutoHelm).unwrap().as_text().unwrap(), "stand-by");
        assert_eq!(state.get(BoatKey::Power).unwrap().as_i64(), Some(0));
        assert!(ap.actuator.apply_calls.is_empty());
    }

    #[tokio::test]
    async fn standby_tick_never_calls_apply() {
        let state = BoatState::new();
        let cmds = NullCommandStore::default();
        let sensor = NullAttitudeSensor::constant(800);
        let actuator = NullActuator::new();
        let mut ap = Autopilot::new(sensor, actuator, cmds, state.clone());

        ap.tick().await.unwrap();

        assert_eq!(ap.mode, Mode::Standby);
        assert!(ap.actuator.apply_calls.is_empty());
        assert_eq!(state.get(BoatKey::Power).unwrap().as_i64(), Some(0));
    }

    #[tokio::test]
    async fn hts_fallback_does_not_diverge_across_ticks_with_nonzero_mag_var() {
        // Regression test: BoatKey::Hts must never be fed by this loop's
        // own BoatKey::HtsTarget output, or the `(hts_deg + mag_var) * 10`
        // fallback compounds mag_var every tick and runs away.
        let state = BoatState::new();
        state.set(BoatKey::MagVar, Scalar::Float(-0.24));
        let cmds = NullCommandStore::default();
        let sensor = NullAttitudeSensor::constant(800);
        let actuator = NullActuator::new();
        let mut ap = Autopilot::new(sensor, actuator, cmds, state.clone());

        for _ in 0..5 {
            ap.tick().await.unwrap();
        }

        assert_eq!(state.get(BoatKey::Hts), None);
        let hts_target = state.get(BoatKey::HtsTarget).unwrap().as_i64().unwrap();
        assert!(hts_target.abs() <= 10, "hts_target drifted to {hts_target}");
    }

    #[tokio::test]
    async fn compass_sensor_fault_skips_actuation_without_moving_last_heading() {
        let state = BoatState::new();
        let cmds = NullCommandStore::default();
        let sensor = NullAttitudeSensor::with_queue(vec![Err(crate::error::HelmError::SensorFault("bus".into()))]);
        let actuator = NullActuator::new();
        let mut ap = Autopilot::new(sensor, actuator, cmds, state.clone());
        ap.last_heading = Some(123);

        ap.tick().await.unwrap();

        assert_eq!(ap.last_heading, Some(123));
        assert!(ap.actuator.alarm);
    }
}

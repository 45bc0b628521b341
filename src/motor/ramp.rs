// Motor mode/duty state and the linear step ramp
//
// Ramps use a fixed number of steps rather than wall-clock interpolation, and
// always finish by writing the exact endpoint to absorb integer truncation.

use std::time::Duration;

use tracing::{debug, warn};

use super::channel::{Mode, MotorChannel};
use crate::config::RAMP_STEPS;

/// Full-scale 16-bit duty cycle
pub const DUTY_MAX: u16 = u16::MAX;

/// Convert a percentage to a 16-bit duty cycle
///
/// Values outside `(0, 100]` (zero included) map to 0 rather than failing.
pub fn pc_to_duty(pc: i32) -> u16 {
    if pc > 0 && pc <= 100 {
        (DUTY_MAX as u32 * pc as u32 / 100) as u16
    } else {
        0
    }
}

/// One track motor behind an H-bridge channel
pub struct Motor {
    name: String,
    channel: Box<dyn MotorChannel>,
    mode: Mode,
    duty: u16,
    min_start_duty: u16,
}

impl Motor {
    pub fn new(channel: Box<dyn MotorChannel>, name: impl Into<String>, min_start_pc: u8) -> Self {
        Self {
            name: name.into(),
            channel,
            mode: Mode::Stop,
            duty: 0,
            min_start_duty: pc_to_duty(min_start_pc as i32),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn duty(&self) -> u16 {
        self.duty
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.channel.set_mode(mode);
        self.mode = mode;
    }

    fn rotate(&mut self, duty: u16) {
        self.channel.set_duty(duty);
        self.duty = duty;
    }

    /// Ramp from the minimum start duty to `target` over `period_ms`
    pub async fn accel(&mut self, target: u16, period_ms: u64) {
        let pause = Duration::from_millis(period_ms / RAMP_STEPS as u64);
        let step = (target as i32 - self.min_start_duty as i32).div_euclid(RAMP_STEPS as i32);
        debug!(
            "Motor {} accel to {} (step {}, pause {:?})",
            self.name, target, step, pause
        );

        let mut speed = self.min_start_duty as i32;
        for _ in 0..RAMP_STEPS {
            speed += step;
            self.rotate(speed.clamp(0, DUTY_MAX as i32) as u16);
            tokio::time::sleep(pause).await;
        }
        self.rotate(target);
    }

    /// Ramp to a percentage target; only acts in a running mode, otherwise stops
    pub async fn accel_by_percentage(&mut self, target_pc: u8, period_ms: u64) {
        if self.mode.is_running() {
            self.accel(pc_to_duty(target_pc as i32), period_ms).await;
        } else {
            warn!("Motor {} accel requested in mode {:?}; stopping", self.name, self.mode);
            self.stop();
        }
    }

    /// Ramp from the current duty down to 0; only acts in a running mode, otherwise stops
    pub async fn decel(&mut self, period_ms: u64) {
        if !self.mode.is_running() {
            warn!("Motor {} decel requested in mode {:?}; stopping", self.name, self.mode);
            self.stop();
            return;
        }

        let pause = Duration::from_millis(period_ms / RAMP_STEPS as u64);
        let mut speed = self.duty as i32;
        let step = speed / RAMP_STEPS as i32;
        debug!("Motor {} decel from {} (step {})", self.name, speed, step);

        for _ in 0..RAMP_STEPS {
            speed -= step;
            self.rotate(speed.max(0) as u16);
            tokio::time::sleep(pause).await;
        }
        self.rotate(0);
    }

    /// Duty to 0 immediately; direction stays latched
    pub fn halt(&mut self) {
        self.rotate(0);
    }

    pub fn stop(&mut self) {
        self.set_mode(Mode::Stop);
        self.halt();
    }

    pub fn set_logic_off(&mut self) {
        self.channel.set_logic_off();
        self.duty = 0;
    }
}

//! Two-input H-bridge wheel (L9110S style) over `embedded-hal` PWM channels.
//!
//! One input carries the duty cycle while the other is held low; swapping
//! them reverses the wheel. Closed-loop mode keeps a target speed and trims
//! the duty with a PID step on every control loop iteration, measuring speed
//! as encoder ticks per second since the previous step.

use embedded_hal::pwm::SetDutyCycle;

use super::{motor::DriveWheel, speed::PidController};
use crate::utils::{
    command::{PidConfig, RoverError},
    config::MAX_PWM,
};

#[derive(Debug, Clone, Copy, PartialEq)]
struct SpeedTarget {
    forward: bool,
    speed: f32,
}

pub struct HBridgeWheel<P> {
    forward_pin: P,
    reverse_pin: P,
    encoder_count: u32,
    last_count: u32,
    pid: PidController,
    target: Option<SpeedTarget>,
}

impl<P> HBridgeWheel<P>
where
    P: SetDutyCycle,
{
    /// `loop_period` is the interval, in seconds, between `regulate` calls;
    /// a non-positive period is refused.
    pub fn new(
        forward_pin: P,
        reverse_pin: P,
        loop_period: f32,
    ) -> Result<Self, RoverError> {
        Ok(Self {
            forward_pin,
            reverse_pin,
            encoder_count: 0,
            last_count: 0,
            pid: PidController::new(PidConfig::default(), loop_period)?,
            target: None,
        })
    }

    /// Accumulate pulses from the wheel encoder (wraps on overflow).
    pub fn add_encoder_ticks(
        &mut self,
        ticks: u32,
    ) {
        self.encoder_count = self.encoder_count.wrapping_add(ticks);
    }

    pub fn is_closed_loop(&self) -> bool {
        self.target.is_some()
    }

    /// One closed-loop step against an externally measured wheel speed.
    ///
    /// Does nothing in open-loop mode.
    pub fn regulate_to_measured(
        &mut self,
        measured_speed: f32,
    ) -> Result<(), P::Error> {
        let Some(target) = self.target else {
            return Ok(());
        };
        let correction = self.pid.update(target.speed - measured_speed);
        let duty = feed_forward(target.speed, &self.pid.gains()) + correction;
        self.apply(target.forward, duty.clamp(0.0, f32::from(MAX_PWM)) as u8)
    }

    /// Release both pins and return them.
    pub fn release(self) -> (P, P) {
        (self.forward_pin, self.reverse_pin)
    }

    fn apply(
        &mut self,
        forward: bool,
        power: u8,
    ) -> Result<(), P::Error> {
        let (driven, idle) = if forward {
            (&mut self.forward_pin, &mut self.reverse_pin)
        } else {
            (&mut self.reverse_pin, &mut self.forward_pin)
        };
        idle.set_duty_cycle(0)?;
        let max = driven.max_duty_cycle();
        driven.set_duty_cycle(scale(power, max))
    }
}

impl<P> DriveWheel for HBridgeWheel<P>
where
    P: SetDutyCycle,
{
    type Error = P::Error;

    fn set_power(
        &mut self,
        forward: bool,
        power: u8,
    ) -> Result<(), Self::Error> {
        self.target = None;
        self.pid.reset();
        self.apply(forward, power)
    }

    fn set_speed(
        &mut self,
        forward: bool,
        speed: f32,
        gains: &PidConfig,
    ) -> Result<(), Self::Error> {
        self.pid.set_gains(*gains);
        self.target = Some(SpeedTarget { forward, speed });
        self.last_count = self.encoder_count;
        let duty = feed_forward(speed, gains).clamp(0.0, f32::from(MAX_PWM));
        self.apply(forward, duty as u8)
    }

    fn read_encoder_count(&mut self) -> u32 {
        self.encoder_count
    }

    fn regulate(&mut self) -> Result<(), Self::Error> {
        let ticks = self.encoder_count.wrapping_sub(self.last_count);
        self.last_count = self.encoder_count;
        let measured = ticks as f32 / self.pid.period();
        self.regulate_to_measured(measured)
    }
}

/// Open-loop duty expected to reach `speed`, scaled by the configured maximum.
fn feed_forward(
    speed: f32,
    gains: &PidConfig,
) -> f32 {
    if gains.max_speed <= 0.0 {
        return 0.0;
    }
    speed / gains.max_speed * f32::from(MAX_PWM)
}

fn scale(
    power: u8,
    max_duty: u16,
) -> u16 {
    (u32::from(power) * u32::from(max_duty) / u32::from(MAX_PWM)) as u16
}

// Motor control module for the incline tracks
//
// Provides:
// - H-bridge channel abstraction (mode + 16-bit duty) and a simulated channel
// - Per-motor state with the fixed-step accel/decel ramp

mod channel;
mod ramp;

pub use channel::{ChannelProbe, ChannelState, Mode, MotorChannel, SimChannel};
pub use ramp::{pc_to_duty, Motor, DUTY_MAX};

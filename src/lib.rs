// Dual-track model-railway incline controller
//
// A state machine sequences button input, live ADC speed calibration and
// synchronised ramp control of the two track motors.

pub mod calibration;
pub mod config;
pub mod io;
pub mod messages;
pub mod motor;
pub mod params;
pub mod runtime;
pub mod state;
pub mod system;

// Timings, topics, parameter file names
use std::time::Duration;

// Ramp: fixed step count, window for both accel and decel
pub const RAMP_STEPS: u32 = 25;
pub const RAMP_PERIOD_MS: u64 = 1000;

// Minimum start-up speed applied when a motor parameter file omits it
pub const DEFAULT_MIN_START_PC: u8 = 25;

// Grace period on state exit so looping tasks can observe `remain == false`
pub const EXIT_GRACE: Duration = Duration::from_millis(20);

// Stopped state idle tick
pub const STOPPED_TICK: Duration = Duration::from_millis(20);

// Calibration ADC poll interval (also the pause after the poll loop ends)
pub const CAL_POLL: Duration = Duration::from_millis(200);

// Finish state settle time before the process-alive flag is observed
pub const FINISH_SETTLE: Duration = Duration::from_millis(200);

// Main loop: how often `run` is checked
pub const SYSTEM_TICK: Duration = Duration::from_millis(20);

// Upper bound on joining detached tasks at shutdown
pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

// Status/actuation publish frequency
pub const PUBLISH_HZ: u64 = 50;

// Zenoh topics
pub const TOPIC_CMD_BUTTON: &str = "incline/cmd/button"; // button panel events
pub const TOPIC_CMD_ADC: &str = "incline/cmd/adc"; // simulated potentiometers
pub const TOPIC_RT_MOTORS: &str = "incline/rt/motors"; // actuation
pub const TOPIC_STATUS: &str = "incline/state/status"; // state machine status

// Parameter files
pub const MOTOR_PARAMS_FILE: &str = "motor_p.json";
pub const IO_PARAMS_FILE: &str = "io_p.json";

// Display geometry (1602 LCD)
pub const DISPLAY_COLS: usize = 16;

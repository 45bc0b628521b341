// H-bridge channel abstraction
//
// One channel per track motor: a direction (switch pair) and a PWM duty.
// The kernel clamps duty before calling, so implementations do no range checks.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Channel direction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    #[serde(rename = "S")]
    Stop,
    #[serde(rename = "F")]
    Forward,
    #[serde(rename = "R")]
    Reverse,
}

impl Mode {
    /// True for the modes that may carry a non-zero duty
    pub fn is_running(self) -> bool {
        matches!(self, Mode::Forward | Mode::Reverse)
    }

    /// Single-letter label used on the display
    pub fn label(self) -> char {
        match self {
            Mode::Stop => 'S',
            Mode::Forward => 'F',
            Mode::Reverse => 'R',
        }
    }
}

/// Driver side of one H-bridge channel
pub trait MotorChannel: Send {
    fn set_mode(&mut self, mode: Mode);

    fn set_duty(&mut self, duty: u16);

    /// All channel inputs off (duty 0, both switches low)
    fn set_logic_off(&mut self);
}

/// Latched output of a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    pub mode: Mode,
    pub duty: u16,
    pub logic_off: bool,
}

/// Simulated channel; the latched state is readable through a [`ChannelProbe`]
pub struct SimChannel {
    name: String,
    state: Arc<Mutex<ChannelState>>,
}

impl SimChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(ChannelState::default())),
        }
    }

    pub fn probe(&self) -> ChannelProbe {
        ChannelProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn update(&self, f: impl FnOnce(&mut ChannelState)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }
}

impl MotorChannel for SimChannel {
    fn set_mode(&mut self, mode: Mode) {
        debug!("Channel {} mode -> {:?}", self.name, mode);
        self.update(|s| {
            s.mode = mode;
            s.logic_off = false;
        });
    }

    fn set_duty(&mut self, duty: u16) {
        self.update(|s| s.duty = duty);
    }

    fn set_logic_off(&mut self) {
        debug!("Channel {} logic off", self.name);
        self.update(|s| {
            s.duty = 0;
            s.logic_off = true;
        });
    }
}

/// Read-only handle on a [`SimChannel`]'s latched output
#[derive(Clone)]
pub struct ChannelProbe {
    state: Arc<Mutex<ChannelState>>,
}

impl ChannelProbe {
    pub fn get(&self) -> ChannelState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

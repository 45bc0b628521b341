// Message types exchanged with the button panel and the hardware side

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationTable;
use crate::motor::ChannelState;
use crate::system::Position;

/// How a button was pressed; the digit is the second character of an event code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Press {
    Click,
    Hold,
}

impl Press {
    pub fn digit(self) -> u8 {
        match self {
            Press::Click => b'1',
            Press::Hold => b'2',
        }
    }
}

// Button event from panel -> mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonEvent {
    pub button: char,
    pub press: Press,
}

impl ButtonEvent {
    pub fn new(button: char, press: Press) -> Self {
        Self { button, press }
    }

    pub fn click(button: char) -> Self {
        Self::new(button, Press::Click)
    }

    pub fn hold(button: char) -> Self {
        Self::new(button, Press::Hold)
    }

    /// Two-character transition key, e.g. `R1`
    pub fn code(&self) -> EventCode {
        let id = if self.button.is_ascii() {
            self.button.to_ascii_uppercase() as u8
        } else {
            b'?'
        };
        EventCode([id, self.press.digit()])
    }
}

/// Button identifier + press digit, used as a transition-table key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventCode([u8; 2]);

impl EventCode {
    pub const RUN_CLICK: EventCode = EventCode(*b"R1");
    pub const CAL_CLICK: EventCode = EventCode(*b"C1");
    pub const CAL_HOLD: EventCode = EventCode(*b"C2");
    pub const STOP_CLICK: EventCode = EventCode(*b"S1");
    pub const STOP_HOLD: EventCode = EventCode(*b"S2");

    pub fn as_str(&self) -> &str {
        // Both bytes are ASCII by construction
        std::str::from_utf8(&self.0).unwrap_or("??")
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventCode({})", self.as_str())
    }
}

// Simulated potentiometer settings from panel -> runtime (percent)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdcCommand {
    pub forward: u8,
    pub reverse: u8,
}

// Actuation output from runtime -> H-bridge process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct MotorActuation {
    pub a: ChannelState,
    pub b: ChannelState,
}

/// Status published by the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: String,
    pub previous: String,
    pub position: Position,
    pub parameter_changed: bool,
    pub calibration: CalibrationTable,
    pub display: [String; 2],
}

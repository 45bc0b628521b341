// Collaborators around the state machine: button mailbox, ADC inputs, display

pub mod adc;
pub mod display;
mod mailbox;

pub use adc::{AdcSource, SimAdc};
pub use display::{Display, LcdBuffer, LogDisplay};
pub use mailbox::{ButtonPort, EventMailbox};

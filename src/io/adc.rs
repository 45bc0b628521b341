// Potentiometer inputs used to calibrate track speeds

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

/// Raw 16-bit reading per percent
const PC_FACTOR: u16 = 655;

/// Highest percentage an ADC source reports
pub const ADC_MAX_PC: u8 = 99;

/// Synchronous, non-blocking percentage input
pub trait AdcSource: Send + Sync {
    /// Current setting in `0..=99`
    fn get_percentage(&self) -> u8;
}

/// Simulated potentiometer; clones share the same reading
#[derive(Clone, Default)]
pub struct SimAdc {
    raw: Arc<AtomicU16>,
}

impl SimAdc {
    pub fn new(raw: u16) -> Self {
        Self {
            raw: Arc::new(AtomicU16::new(raw)),
        }
    }

    pub fn set_raw(&self, raw: u16) {
        self.raw.store(raw, Ordering::Relaxed);
    }

    /// Position the simulated wiper at a percentage
    pub fn set_percentage(&self, pc: u8) {
        let pc = pc.min(ADC_MAX_PC) as u16;
        self.set_raw(pc * PC_FACTOR);
    }
}

impl AdcSource for SimAdc {
    fn get_percentage(&self) -> u8 {
        let pc = self.raw.load(Ordering::Relaxed) / PC_FACTOR;
        pc.min(ADC_MAX_PC as u16) as u8
    }
}

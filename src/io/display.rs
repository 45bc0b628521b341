// Two-row character display sink
//
// When no display is present the kernel still renders through `LogDisplay`,
// which only emits log lines.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::config::DISPLAY_COLS;

pub trait Display: Send + Sync {
    fn write_line(&self, row: usize, text: &str);

    fn write_display(&self, line0: &str, line1: &str) {
        self.write_line(0, line0);
        self.write_line(1, line1);
    }

    fn clear(&self);

    /// Current contents, if the sink keeps any
    fn rows(&self) -> [String; 2] {
        Default::default()
    }
}

/// Pad or cut a line to the display width
pub fn fit(text: &str) -> String {
    format!("{:<width$.width$}", text, width = DISPLAY_COLS)
}

/// 16x2 LCD contents held in memory (mirrored into the status report)
#[derive(Default)]
pub struct LcdBuffer {
    rows: Mutex<[String; 2]>,
}

impl LcdBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Display for LcdBuffer {
    fn write_line(&self, row: usize, text: &str) {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        match rows.get_mut(row) {
            Some(line) => {
                *line = fit(text);
                debug!("LCD[{}] {:?}", row, line);
            }
            None => warn!("LCD row {} out of range", row),
        }
    }

    fn clear(&self) {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        *rows = [fit(""), fit("")];
    }

    fn rows(&self) -> [String; 2] {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Display stand-in that logs what would have been shown
pub struct LogDisplay;

impl Display for LogDisplay {
    fn write_line(&self, row: usize, text: &str) {
        let text = text.trim_end();
        if !text.is_empty() {
            info!("[display {}] {}", row, text);
        }
    }

    fn clear(&self) {}
}

/// Pick the display sink once at boot
pub fn detect(enabled: bool) -> Box<dyn Display> {
    if enabled {
        let lcd = LcdBuffer::new();
        lcd.clear();
        Box::new(lcd)
    } else {
        warn!("Display not found, console output only");
        Box::new(LogDisplay)
    }
}

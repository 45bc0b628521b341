// Durable parameters: motor calibration/timing and I/O options
//
// Files keep the layout of the board's JSON parameter files:
//   motor_p.json: {"a_speed":{"F":30,"R":50},"b_speed":{"F":35,"R":55},"hold_ms":3000}
//   io_p.json:    {"display":true}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calibration::CalibrationTable;
use crate::config::{DEFAULT_MIN_START_PC, IO_PARAMS_FILE, MOTOR_PARAMS_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorParams {
    #[serde(flatten)]
    pub speeds: CalibrationTable,
    /// Dwell at full speed between accel and decel
    pub hold_ms: u64,
    #[serde(default = "default_min_start_pc")]
    pub min_start_pc: u8,
}

fn default_min_start_pc() -> u8 {
    DEFAULT_MIN_START_PC
}

impl MotorParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        if let Some((field, value)) = self.speeds.out_of_range() {
            return Err(ParamError::OutOfRange { field, value });
        }
        if self.min_start_pc > 100 {
            return Err(ParamError::OutOfRange {
                field: "min_start_pc",
                value: self.min_start_pc,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IoParams {
    #[serde(default = "display_default")]
    pub display: bool,
}

fn display_default() -> bool {
    true
}

impl Default for IoParams {
    fn default() -> Self {
        Self { display: true }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error("Cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Cannot encode parameters for {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Parameter {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: u8 },
}

/// Durable home of the motor parameter set
pub trait ParamStore: Send + Sync {
    fn load_motor_params(&self) -> Result<MotorParams, ParamError>;

    fn save_motor_params(&self, params: &MotorParams) -> Result<(), ParamError>;
}

/// JSON parameter files in one directory
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// I/O options; a missing file means defaults
    pub fn load_io_params(&self) -> Result<IoParams, ParamError> {
        let path = self.dir.join(IO_PARAMS_FILE);
        if !path.exists() {
            debug!("{} not found, using defaults", path.display());
            return Ok(IoParams::default());
        }
        read_json(&path)
    }

    fn motor_path(&self) -> PathBuf {
        self.dir.join(MOTOR_PARAMS_FILE)
    }
}

impl ParamStore for JsonFileStore {
    fn load_motor_params(&self) -> Result<MotorParams, ParamError> {
        let params: MotorParams = read_json(&self.motor_path())?;
        params.validate()?;
        Ok(params)
    }

    fn save_motor_params(&self, params: &MotorParams) -> Result<(), ParamError> {
        let path = self.motor_path();
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(params).map_err(|source| ParamError::Serialize {
            path: path.clone(),
            source,
        })?;

        // Replace atomically via rename
        fs::write(&tmp, text).map_err(|source| ParamError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| ParamError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Motor parameters written to {}", path.display());
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ParamError> {
    let text = fs::read_to_string(path).map_err(|source| ParamError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ParamError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// In-process store; nothing reaches the disk
pub struct MemoryStore {
    params: Mutex<MotorParams>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new(params: MotorParams) -> Self {
        Self {
            params: Mutex::new(params),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ParamStore for MemoryStore {
    fn load_motor_params(&self) -> Result<MotorParams, ParamError> {
        Ok(*self.params.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn save_motor_params(&self, params: &MotorParams) -> Result<(), ParamError> {
        params.validate()?;
        *self.params.lock().unwrap_or_else(PoisonError::into_inner) = *params;
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

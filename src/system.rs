// System context shared by every state
//
// Owns the current-state pointer, the coordination locks, the live calibration
// table and the motors. `transition()` is the only writer of the current state.
//
// Lock order wherever more than one is held: button lock, then state lock.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::calibration::CalibrationTable;
use crate::config::{RAMP_PERIOD_MS, SHUTDOWN_JOIN_TIMEOUT, SYSTEM_TICK};
use crate::io::display::fit;
use crate::io::{AdcSource, ButtonPort, Display};
use crate::messages::StatusReport;
use crate::motor::{Mode, Motor, MotorChannel};
use crate::params::{MotorParams, ParamError, ParamStore};
use crate::state::{State, StateId, States};

/// Boxed task handed to the detached-task set
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Where the incline last ran to; a best guess, not sensed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Up,
    Down,
}

impl Position {
    pub fn opposite(self) -> Self {
        match self {
            Position::Up => Position::Down,
            Position::Down => Position::Up,
        }
    }

    /// Channel modes for (track A, track B) when running toward this position
    pub fn modes(self) -> (Mode, Mode) {
        match self {
            Position::Up => (Mode::Forward, Mode::Reverse),
            Position::Down => (Mode::Reverse, Mode::Forward),
        }
    }
}

/// Everything the controller drives or reads
pub struct Hardware {
    pub motor_a: Box<dyn MotorChannel>,
    pub motor_b: Box<dyn MotorChannel>,
    pub adc_forward: Box<dyn AdcSource>,
    pub adc_reverse: Box<dyn AdcSource>,
    pub display: Box<dyn Display>,
    pub buttons: ButtonPort,
}

pub struct InclineSystem {
    pub(crate) states: States,
    /// Current state; the sender doubles as the state pointer
    current: watch::Sender<StateId>,
    previous: Mutex<&'static str>,

    pub(crate) state_lock: tokio::sync::Mutex<()>,
    pub(crate) transition_lock: tokio::sync::Mutex<()>,
    pub(crate) buttons: ButtonPort,

    motor_a: tokio::sync::Mutex<Motor>,
    motor_b: tokio::sync::Mutex<Motor>,
    pub(crate) adc_forward: Box<dyn AdcSource>,
    pub(crate) adc_reverse: Box<dyn AdcSource>,
    pub(crate) display: Box<dyn Display>,

    store: Arc<dyn ParamStore>,
    /// Last durably-saved parameter set
    params: Mutex<MotorParams>,
    calibration: Mutex<CalibrationTable>,
    position: Mutex<Position>,
    parameter_changed: AtomicBool,
    run: AtomicBool,

    tasks: Mutex<JoinSet<()>>,
}

impl InclineSystem {
    /// Build the states, seed calibration from the store and enter `Start`
    ///
    /// Must be called inside a tokio runtime; the first state is entered on a
    /// detached task, so this returns without waiting for it.
    pub fn start(
        hardware: Hardware,
        store: Arc<dyn ParamStore>,
        position: Position,
    ) -> Result<Arc<Self>, ParamError> {
        let params = store.load_motor_params()?;
        params.validate()?;
        info!(
            "Motor parameters: A {:?}, B {:?}, hold {}ms, min start {}%",
            params.speeds.track_a, params.speeds.track_b, params.hold_ms, params.min_start_pc
        );

        let system = Arc::new(Self {
            states: States::new(),
            current: watch::Sender::new(StateId::Start),
            previous: Mutex::new(""),
            state_lock: tokio::sync::Mutex::new(()),
            transition_lock: tokio::sync::Mutex::new(()),
            buttons: hardware.buttons,
            motor_a: tokio::sync::Mutex::new(Motor::new(hardware.motor_a, "A", params.min_start_pc)),
            motor_b: tokio::sync::Mutex::new(Motor::new(hardware.motor_b, "B", params.min_start_pc)),
            adc_forward: hardware.adc_forward,
            adc_reverse: hardware.adc_reverse,
            display: hardware.display,
            store,
            params: Mutex::new(params),
            calibration: Mutex::new(CalibrationTable::default()),
            position: Mutex::new(position),
            parameter_changed: AtomicBool::new(false),
            run: AtomicBool::new(true),
            tasks: Mutex::new(JoinSet::new()),
        });
        system.load_speed_dict(&params.speeds);
        system.display.clear();

        system.spawn_detached(system.enter(StateId::Start));
        Ok(system)
    }

    pub fn current(&self) -> StateId {
        *self.current.borrow()
    }

    /// Watch current-state changes
    pub fn subscribe(&self) -> watch::Receiver<StateId> {
        self.current.subscribe()
    }

    pub fn previous_state_name(&self) -> &'static str {
        *self.previous.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_previous_state_name(&self, name: &'static str) {
        *self.previous.lock().unwrap_or_else(PoisonError::into_inner) = name;
    }

    pub(crate) fn state(&self, id: StateId) -> &State {
        self.states.get(id)
    }

    pub fn buttons(&self) -> ButtonPort {
        self.buttons.clone()
    }

    pub fn position(&self) -> Position {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_position(&self, position: Position) {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner) = position;
    }

    pub fn parameter_changed(&self) -> bool {
        self.parameter_changed.load(Ordering::Acquire)
    }

    pub(crate) fn set_parameter_changed(&self, changed: bool) {
        self.parameter_changed.store(changed, Ordering::Release);
    }

    /// Process-alive flag; cleared once by `Finish`
    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::Acquire)
    }

    pub(crate) fn clear_run(&self) {
        self.run.store(false, Ordering::Release);
    }

    /// Copy of the live calibration table
    pub fn calibration(&self) -> CalibrationTable {
        *self.calibration.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Edit the live calibration table in place
    pub(crate) fn with_calibration<R>(&self, f: impl FnOnce(&mut CalibrationTable) -> R) -> R {
        let mut table = self.calibration.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut table)
    }

    /// Copy forward/reverse percentages for both tracks into the live table
    pub fn load_speed_dict(&self, source: &CalibrationTable) {
        self.with_calibration(|table| table.load_from(source));
    }

    /// Durable parameters as last loaded or saved
    pub fn saved_params(&self) -> MotorParams {
        *self.params.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Undo live calibration edits: reload both tracks from the saved parameters
    pub(crate) fn restore_calibration(&self) {
        let saved = self.saved_params();
        self.with_calibration(|table| {
            table.load_from(&saved.speeds);
            self.set_parameter_changed(false);
        });
    }

    /// Merge the live calibration into the durable parameters and write them out
    pub(crate) fn persist_calibration(&self) {
        let mut params = self.saved_params();
        params.speeds.load_from(&self.calibration());
        match self.store.save_motor_params(&params) {
            Ok(()) => {
                *self.params.lock().unwrap_or_else(PoisonError::into_inner) = params;
                self.set_parameter_changed(false);
                info!("Calibrated speeds saved");
            }
            Err(e) => error!("Failed to save calibrated speeds: {}", e),
        }
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            state: self.current().name().to_string(),
            previous: self.previous_state_name().to_string(),
            position: self.position(),
            parameter_changed: self.parameter_changed(),
            calibration: self.calibration(),
            display: self.display.rows(),
        }
    }

    /// Run a task without awaiting it; failures are logged, never propagated
    pub(crate) fn spawn_detached(&self, task: BoxFuture) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(finished) = tasks.try_join_next() {
            log_detached(finished);
        }
        tasks.spawn(task);
    }

    /// Leave the current state and enter `next`
    ///
    /// Returned boxed so it can be spawned from inside a state's own tasks.
    pub fn transition(self: &Arc<Self>, next: StateId) -> BoxFuture {
        let system = Arc::clone(self);
        Box::pin(async move {
            let outgoing = system.current();
            system.exit(outgoing).await;
            {
                let _transition = system.transition_lock.lock().await;
                system.set_previous_state_name(outgoing.name());
                system.current.send_replace(next);
                info!("Transition: {} -> {}", outgoing.name(), next.name());
            }
            system.spawn_detached(system.enter(next));
        })
    }

    /// Run both tracks toward `direction`: ramp up, hold, ramp down
    pub async fn run_motors(&self, direction: Position) {
        let (mode_a, mode_b) = direction.modes();
        let table = self.calibration();
        let target_a = table.track_a.for_mode(mode_a);
        let target_b = table.track_b.for_mode(mode_b);
        let hold = Duration::from_millis(self.saved_params().hold_ms);
        let label = mode_a.label();
        info!(
            "Running {:?}: A {:?} {}%, B {:?} {}%",
            direction, mode_a, target_a, mode_b, target_b
        );

        self.display.write_display(
            &format!("{} Accel", label),
            &format!("A: {:02}  B: {:02}", target_a, target_b),
        );
        let mut motor_a = self.motor_a.lock().await;
        let mut motor_b = self.motor_b.lock().await;
        motor_a.set_mode(mode_a);
        motor_b.set_mode(mode_b);
        tokio::join!(
            motor_a.accel_by_percentage(target_a, RAMP_PERIOD_MS),
            motor_b.accel_by_percentage(target_b, RAMP_PERIOD_MS),
        );

        self.display
            .write_line(0, &format!("{} Hold: {}ms", label, hold.as_millis()));
        tokio::time::sleep(hold).await;

        self.display
            .write_display(&format!("{} Decel", label), &format!("A: {:02}  B: {:02}", 0, 0));
        tokio::join!(motor_a.decel(RAMP_PERIOD_MS), motor_b.decel(RAMP_PERIOD_MS));
        self.display
            .write_display(&format!("{} Stationary", label), &fit(""));

        self.set_position(direction);
        debug!("Run {:?} complete", direction);
    }

    /// Keep the process alive until `Finish` clears the run flag
    pub async fn run_system(&self) {
        while self.is_running() {
            tokio::time::sleep(SYSTEM_TICK).await;
        }
    }

    /// Join outstanding detached tasks, then leave both motors stopped with logic off
    pub async fn shutdown(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, drain(&mut tasks))
            .await
            .is_err()
        {
            warn!("Aborting {} detached task(s) still running", tasks.len());
            tasks.shutdown().await;
        }

        for motor in [&self.motor_a, &self.motor_b] {
            let mut motor = motor.lock().await;
            debug!("Motor {} was {:?} at duty {}", motor.name(), motor.mode(), motor.duty());
            motor.stop();
            motor.set_logic_off();
            debug!("Motor {} off", motor.name());
        }
        self.display.clear();
        info!("System shut down");
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(finished) = tasks.join_next().await {
        log_detached(finished);
    }
}

fn log_detached(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            warn!("Detached task panicked: {}", e);
        } else {
            warn!("Detached task cancelled: {}", e);
        }
    }
}

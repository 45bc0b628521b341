// Incline control states
//
// Eight state instances are built once at boot and live for the whole run;
// transitions swap which one is current. Each variant shares the default
// lifecycle (enter -> run_task || wait_for_transition -> exit) and overrides
// the pieces it needs, see `lifecycle`.

mod lifecycle;
mod transitions;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::calibration::{Track, TrackSpeeds};

pub use transitions::TransitionTable;

/// Identity of every state in the incline controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateId {
    /// Pass-through boot state, leaves for `Stopped` immediately
    Start,
    Stopped,
    RunForward,
    RunReverse,
    CalibrateA,
    CalibrateB,
    SaveCalibration,
    Finish,
}

/// How a state's run task and transition wait are scheduled on entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduling {
    /// Neither task is started
    Skip,
    /// `run_task` and `wait_for_transition` are live together
    Concurrent,
    /// `run_task` completes before any event is accepted
    Sequential,
    /// Clears the process-alive flag instead of starting tasks
    Shutdown,
}

impl StateId {
    pub const ALL: [StateId; 8] = [
        StateId::Start,
        StateId::Stopped,
        StateId::RunForward,
        StateId::RunReverse,
        StateId::CalibrateA,
        StateId::CalibrateB,
        StateId::SaveCalibration,
        StateId::Finish,
    ];

    /// Name shown on the display and in logs
    pub fn name(self) -> &'static str {
        match self {
            StateId::Start => "Start",
            StateId::Stopped => "Stopped",
            StateId::RunForward => "Run Fwd",
            StateId::RunReverse => "Run Rev",
            StateId::CalibrateA => "Cal A",
            StateId::CalibrateB => "Cal B",
            StateId::SaveCalibration => "Save Cal",
            StateId::Finish => "Finish",
        }
    }

    pub fn scheduling(self) -> Scheduling {
        match self {
            StateId::Start => Scheduling::Skip,
            StateId::RunForward | StateId::RunReverse => Scheduling::Sequential,
            StateId::Finish => Scheduling::Shutdown,
            StateId::Stopped
            | StateId::CalibrateA
            | StateId::CalibrateB
            | StateId::SaveCalibration => Scheduling::Concurrent,
        }
    }

    /// Track edited by a calibration state
    pub fn track(self) -> Option<Track> {
        match self {
            StateId::CalibrateA => Some(Track::A),
            StateId::CalibrateB => Some(Track::B),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Per-instance data of one state
pub struct State {
    id: StateId,
    transitions: TransitionTable,
    /// Loops in this state's tasks run while set
    remain: AtomicBool,
    /// Last ADC demand read while calibrating
    demand: Mutex<TrackSpeeds>,
}

impl State {
    fn new(id: StateId) -> Self {
        Self {
            id,
            transitions: TransitionTable::for_state(id),
            remain: AtomicBool::new(false),
            demand: Mutex::new(TrackSpeeds::default()),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn transitions(&self) -> &TransitionTable {
        &self.transitions
    }

    pub fn remains(&self) -> bool {
        self.remain.load(Ordering::Acquire)
    }

    fn set_remain(&self, remain: bool) {
        self.remain.store(remain, Ordering::Release);
    }

    fn demand(&self) -> TrackSpeeds {
        *self.demand.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_demand(&self, demand: TrackSpeeds) {
        *self.demand.lock().unwrap_or_else(PoisonError::into_inner) = demand;
    }
}

/// All state instances, indexed by [`StateId`]
pub struct States([State; 8]);

impl States {
    pub fn new() -> Self {
        Self(StateId::ALL.map(State::new))
    }

    pub fn get(&self, id: StateId) -> &State {
        &self.0[id.index()]
    }
}

impl Default for States {
    fn default() -> Self {
        Self::new()
    }
}

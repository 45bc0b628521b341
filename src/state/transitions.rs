// Event code -> next state, per state

use std::collections::HashMap;

use super::StateId;
use crate::messages::EventCode;

#[derive(Debug, Default, Clone)]
pub struct TransitionTable {
    /// Unconditional transition taken on entry (boot only)
    auto: Option<StateId>,
    on_event: HashMap<EventCode, StateId>,
}

impl TransitionTable {
    fn auto(next: StateId) -> Self {
        Self {
            auto: Some(next),
            on_event: HashMap::new(),
        }
    }

    fn on(mut self, code: EventCode, next: StateId) -> Self {
        self.on_event.insert(code, next);
        self
    }

    /// The incline's transition wiring
    pub fn for_state(id: StateId) -> Self {
        use StateId::*;
        let table = Self::default();
        match id {
            Start => Self::auto(Stopped),
            Stopped => table
                .on(EventCode::RUN_CLICK, RunForward)
                .on(EventCode::CAL_CLICK, CalibrateA)
                .on(EventCode::STOP_HOLD, Finish),
            RunForward => table
                .on(EventCode::RUN_CLICK, RunReverse)
                .on(EventCode::STOP_CLICK, Stopped),
            RunReverse => table
                .on(EventCode::RUN_CLICK, RunForward)
                .on(EventCode::STOP_CLICK, Stopped),
            CalibrateA => table
                .on(EventCode::CAL_CLICK, CalibrateB)
                .on(EventCode::STOP_CLICK, Stopped),
            CalibrateB => table
                .on(EventCode::CAL_CLICK, SaveCalibration)
                .on(EventCode::STOP_CLICK, Stopped),
            SaveCalibration => table
                .on(EventCode::CAL_CLICK, Stopped)
                .on(EventCode::CAL_HOLD, CalibrateA),
            Finish => table,
        }
    }

    pub fn next_for(&self, code: EventCode) -> Option<StateId> {
        self.on_event.get(&code).copied()
    }

    pub fn auto_target(&self) -> Option<StateId> {
        self.auto
    }
}

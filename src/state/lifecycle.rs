// State lifecycle: default hooks and per-variant overrides
//
// enter() -> schedule_tasks() -> { run_task(), wait_for_transition() } ... exit()
//
// Dispatch is a match on `StateId`; a variant without its own arm gets the
// default behaviour.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Scheduling, State, StateId};
use crate::calibration::{Track, TrackSpeeds};
use crate::config::{CAL_POLL, EXIT_GRACE, FINISH_SETTLE, STOPPED_TICK};
use crate::io::display::fit;
use crate::messages::EventCode;
use crate::system::{BoxFuture, InclineSystem, Position};

impl InclineSystem {
    /// Enter a state; boxed so transitions can spawn it
    pub(crate) fn enter(self: &Arc<Self>, id: StateId) -> BoxFuture {
        let system = Arc::clone(self);
        Box::pin(async move {
            match id {
                StateId::Start => system.enter_pass_through(id),
                _ => system.enter_default(id).await,
            }
        })
    }

    async fn enter_default(self: &Arc<Self>, id: StateId) {
        info!("Enter state: {}", id.name());
        self.display.write_display(&fit(id.name()), &fit(""));
        self.state(id).set_remain(true);
        self.schedule_tasks(id).await;
    }

    /// Nothing to render or run: take the unconditional transition straight away
    fn enter_pass_through(self: &Arc<Self>, id: StateId) {
        info!("Enter state: {}", id.name());
        match self.state(id).transitions().auto_target() {
            Some(next) => self.spawn_detached(self.transition(next)),
            None => warn!("State {} has no automatic transition", id.name()),
        }
    }

    async fn schedule_tasks(self: &Arc<Self>, id: StateId) {
        match id.scheduling() {
            Scheduling::Skip => {}
            Scheduling::Concurrent => {
                tokio::join!(self.run_task(id), self.wait_for_transition(id));
            }
            Scheduling::Sequential => {
                self.run_task(id).await;
                self.wait_for_transition(id).await;
            }
            Scheduling::Shutdown => {
                info!("Finishing: run flag cleared");
                self.clear_run();
                tokio::time::sleep(FINISH_SETTLE).await;
            }
        }
    }

    async fn run_task(self: &Arc<Self>, id: StateId) {
        let state = self.state(id);
        match id {
            StateId::Stopped => self.idle(state).await,
            StateId::RunForward => self.run_incline(Position::Up).await,
            StateId::RunReverse => self.run_incline(Position::Down).await,
            StateId::CalibrateA => self.calibrate(state, Track::A).await,
            StateId::CalibrateB => self.calibrate(state, Track::B).await,
            StateId::SaveCalibration => {
                self.display
                    .write_display("Save cal?", "Clk: Y  Hld: N");
            }
            // Pass-through and shutdown states never run a task
            StateId::Start | StateId::Finish => {}
        }
    }

    /// Hold the state lock in short slices while the state is current
    async fn idle(&self, state: &State) {
        while state.remains() {
            let _state = self.state_lock.lock().await;
            tokio::time::sleep(STOPPED_TICK).await;
        }
    }

    /// Single motor run; buttons stay locked out until it completes
    async fn run_incline(&self, direction: Position) {
        let _buttons = self.buttons.lock().lock().await;
        let _state = self.state_lock.lock().await;
        self.run_motors(direction).await;
    }

    /// Poll the ADC inputs and write them straight into the live table
    async fn calibrate(&self, state: &State, track: Track) {
        let demand = self.read_demand();
        state.set_demand(demand);
        self.show_calibration(track, demand);

        while state.remains() {
            let demand = self.read_demand();
            state.set_demand(demand);
            // Edits only land while the state is still current
            let changed = self.with_calibration(|table| {
                let stored = table.track_mut(track);
                if !state.remains() || *stored == demand {
                    return false;
                }
                *stored = demand;
                self.set_parameter_changed(true);
                true
            });
            if changed {
                debug!(
                    "Track {} calibration F {} R {}",
                    track.label(),
                    demand.forward,
                    demand.reverse
                );
                self.display.write_line(1, &adc_line(demand));
            }
            tokio::time::sleep(CAL_POLL).await;
        }

        self.display.write_line(1, &fit(""));
        tokio::time::sleep(CAL_POLL).await;
    }

    fn read_demand(&self) -> TrackSpeeds {
        TrackSpeeds::new(
            self.adc_forward.get_percentage(),
            self.adc_reverse.get_percentage(),
        )
    }

    fn show_calibration(&self, track: Track, demand: TrackSpeeds) {
        let stored = *self.calibration().track(track);
        self.display.write_display(
            &format!(
                "{} F: {:02}  R: {:02}",
                track.label(),
                stored.forward,
                stored.reverse
            ),
            &adc_line(demand),
        );
    }

    /// Consume button events until one maps to a transition
    ///
    /// Holds the transition lock for the whole wait so transitions never
    /// interleave with a live state.
    async fn wait_for_transition(self: &Arc<Self>, id: StateId) {
        let state = self.state(id);
        let _transition = self.transition_lock.lock().await;
        loop {
            self.buttons.mailbox().ready().await;
            let _buttons = self.buttons.lock().lock().await;
            let Some(event) = self.buttons.mailbox().take() else {
                continue;
            };
            let code = event.code();
            debug!("{}: event {}", id.name(), code);

            let next = state.transitions().next_for(code);
            if next.is_some() {
                state.set_remain(false);
            }
            let handled = self.react(id, code).await;
            match next {
                Some(next) => {
                    self.spawn_detached(self.transition(next));
                    break;
                }
                None if !handled => info!("Event {} ignored", code),
                None => {}
            }
        }
    }

    /// Per-state handling of an event before the transition lookup
    ///
    /// Returns true when the event was fully handled without a transition.
    async fn react(&self, id: StateId, code: EventCode) -> bool {
        match (id, code) {
            (StateId::CalibrateA | StateId::CalibrateB, EventCode::RUN_CLICK) => {
                let direction = self.position().opposite();
                info!("Calibration test run {:?}", direction);
                self.run_motors(direction).await;
                if let Some(track) = id.track() {
                    self.show_calibration(track, self.state(id).demand());
                }
                true
            }
            (StateId::CalibrateA | StateId::CalibrateB, EventCode::STOP_CLICK) => {
                info!("Calibration discarded, speeds restored from parameters");
                self.restore_calibration();
                false
            }
            (StateId::SaveCalibration, EventCode::CAL_CLICK) => {
                if self.parameter_changed() {
                    self.persist_calibration();
                } else {
                    info!("No calibration changes to save");
                }
                false
            }
            (StateId::SaveCalibration, EventCode::CAL_HOLD) => {
                info!("Calibration changes discarded, not saved");
                self.restore_calibration();
                false
            }
            _ => false,
        }
    }

    pub(crate) async fn exit(&self, id: StateId) {
        self.state(id).set_remain(false);
        tokio::time::sleep(EXIT_GRACE).await;
        self.set_previous_state_name(id.name());
        debug!("Exit state: {}", id.name());
    }
}

fn adc_line(demand: TrackSpeeds) -> String {
    format!("ADC  {:02}     {:02}", demand.forward, demand.reverse)
}

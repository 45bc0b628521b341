// End-to-end state machine runs on simulated hardware (paused tokio clock)

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use incline_runtime::calibration::{CalibrationTable, TrackSpeeds};
use incline_runtime::io::{ButtonPort, LcdBuffer, SimAdc};
use incline_runtime::messages::ButtonEvent;
use incline_runtime::motor::{pc_to_duty, ChannelProbe, Mode, SimChannel};
use incline_runtime::params::{MemoryStore, MotorParams, ParamError, ParamStore};
use incline_runtime::state::StateId;
use incline_runtime::system::{Hardware, InclineSystem, Position};

const STORED: CalibrationTable = CalibrationTable {
    track_a: TrackSpeeds { forward: 30, reverse: 50 },
    track_b: TrackSpeeds { forward: 35, reverse: 55 },
};

struct Rig<S = MemoryStore> {
    system: Arc<InclineSystem>,
    store: Arc<S>,
    adc_forward: SimAdc,
    adc_reverse: SimAdc,
    probe_a: ChannelProbe,
    probe_b: ChannelProbe,
    states: watch::Receiver<StateId>,
}

fn stored_params() -> MotorParams {
    MotorParams {
        speeds: STORED,
        hold_ms: 500,
        min_start_pc: 25,
    }
}

impl Rig<MemoryStore> {
    async fn booted(position: Position) -> Self {
        Rig::booted_with(position, MemoryStore::new(stored_params())).await
    }
}

impl<S: ParamStore + 'static> Rig<S> {
    fn start(position: Position, store: S) -> Self {
        let store = Arc::new(store);
        let channel_a = SimChannel::new("A");
        let channel_b = SimChannel::new("B");
        let probe_a = channel_a.probe();
        let probe_b = channel_b.probe();
        let adc_forward = SimAdc::default();
        let adc_reverse = SimAdc::default();
        // Knobs start on the stored track A values
        adc_forward.set_percentage(30);
        adc_reverse.set_percentage(50);

        let hardware = Hardware {
            motor_a: Box::new(channel_a),
            motor_b: Box::new(channel_b),
            adc_forward: Box::new(adc_forward.clone()),
            adc_reverse: Box::new(adc_reverse.clone()),
            display: Box::new(LcdBuffer::new()),
            buttons: ButtonPort::new(),
        };
        let system =
            InclineSystem::start(hardware, store.clone() as Arc<dyn ParamStore>, position).unwrap();
        let states = system.subscribe();

        Self {
            system,
            store,
            adc_forward,
            adc_reverse,
            probe_a,
            probe_b,
            states,
        }
    }

    async fn booted_with(position: Position, store: S) -> Self {
        let mut rig = Self::start(position, store);
        rig.wait_for(StateId::Stopped).await;
        rig
    }

    fn set_adc(&self, forward: u8, reverse: u8) {
        self.adc_forward.set_percentage(forward);
        self.adc_reverse.set_percentage(reverse);
    }

    async fn press(&self, event: ButtonEvent) {
        self.system.buttons().deliver(event).await;
    }

    /// Deliver and wait until the active state has taken the event
    async fn press_taken(&self, event: ButtonEvent) {
        self.press(event).await;
        while self.system.buttons().mailbox().is_pending() {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_for(&mut self, id: StateId) {
        timeout(Duration::from_secs(10), self.states.wait_for(|s| *s == id))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {:?}", id))
            .unwrap();
    }

    fn display_row(&self, row: usize) -> String {
        self.system.status().display[row].trim_end().to_string()
    }
}

#[tokio::test(start_paused = true)]
async fn test_boot_passes_through_start_to_stopped() {
    let rig = Rig::booted(Position::Up).await;

    assert_eq!(rig.system.current(), StateId::Stopped);
    assert_eq!(rig.system.previous_state_name(), "Start");
    assert!(rig.system.is_running());
    assert!(!rig.system.parameter_changed());
    assert_eq!(rig.system.calibration(), STORED);

    sleep(Duration::from_millis(50)).await;
    assert_eq!(rig.display_row(0), "Stopped");
}

#[tokio::test(start_paused = true)]
async fn test_run_forward_completes_before_accepting_events() {
    let mut rig = Rig::booted(Position::Down).await;

    rig.press(ButtonEvent::click('R')).await;
    rig.wait_for(StateId::RunForward).await;
    sleep(Duration::from_millis(100)).await;

    // Stop pressed mid-run waits on the button lock
    let buttons = rig.system.buttons();
    let stop = tokio::spawn(async move { buttons.deliver(ButtonEvent::click('S')).await });

    // Accel takes 1000 ms; hold runs until 1500 ms
    sleep(Duration::from_millis(1200)).await;
    assert!(!stop.is_finished());
    assert_eq!(rig.system.current(), StateId::RunForward);

    let a = rig.probe_a.get();
    let b = rig.probe_b.get();
    assert_eq!((a.mode, a.duty), (Mode::Forward, pc_to_duty(30)));
    assert_eq!((b.mode, b.duty), (Mode::Reverse, pc_to_duty(55)));
    assert_eq!(rig.display_row(0), "F Hold: 500ms");
    assert_eq!(rig.system.position(), Position::Down);

    rig.wait_for(StateId::Stopped).await;
    stop.await.unwrap();

    assert_eq!(rig.system.position(), Position::Up);
    assert_eq!(rig.system.previous_state_name(), "Run Fwd");
    assert_eq!(rig.probe_a.get().duty, 0);
    assert_eq!(rig.probe_b.get().duty, 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_click_alternates_direction() {
    let mut rig = Rig::booted(Position::Down).await;

    rig.press(ButtonEvent::click('R')).await;
    rig.wait_for(StateId::RunForward).await;
    rig.press(ButtonEvent::click('R')).await;
    rig.wait_for(StateId::RunReverse).await;
    assert_eq!(rig.system.position(), Position::Up);

    sleep(Duration::from_millis(1200)).await;
    let a = rig.probe_a.get();
    let b = rig.probe_b.get();
    assert_eq!((a.mode, a.duty), (Mode::Reverse, pc_to_duty(50)));
    assert_eq!((b.mode, b.duty), (Mode::Forward, pc_to_duty(35)));

    rig.press(ButtonEvent::click('S')).await;
    rig.wait_for(StateId::Stopped).await;
    assert_eq!(rig.system.position(), Position::Down);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_events_are_ignored() {
    let rig = Rig::booted(Position::Up).await;

    for event in [ButtonEvent::click('X'), ButtonEvent::hold('R'), ButtonEvent::click('S')] {
        rig.press(event).await;
        sleep(Duration::from_millis(100)).await;
        assert_eq!(rig.system.current(), StateId::Stopped, "{}", event.code());
    }
    assert!(!rig.system.buttons().mailbox().is_pending());
}

#[tokio::test(start_paused = true)]
async fn test_transitions_run_one_at_a_time() {
    let mut rig = Rig::booted(Position::Up).await;
    let system = rig.system.clone();
    let mut seen = rig.system.subscribe();
    // Each swap must see the previous transition fully finished
    let recorder = tokio::spawn(async move {
        let mut order = Vec::new();
        while seen.changed().await.is_ok() {
            let state = *seen.borrow_and_update();
            order.push((state, system.previous_state_name()));
            if state == StateId::SaveCalibration {
                break;
            }
        }
        order
    });

    // Second click lands while the first transition is still in its exit grace
    rig.press_taken(ButtonEvent::click('C')).await;
    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::CalibrateB).await;
    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::SaveCalibration).await;

    let order = timeout(Duration::from_secs(1), recorder).await.unwrap().unwrap();
    assert_eq!(
        order,
        vec![
            (StateId::CalibrateA, "Stopped"),
            (StateId::CalibrateB, "Cal A"),
            (StateId::SaveCalibration, "Cal B"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_calibration_edits_live_table() {
    let mut rig = Rig::booted(Position::Up).await;

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::CalibrateA).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(rig.system.calibration(), STORED);
    assert!(!rig.system.parameter_changed());
    assert_eq!(rig.display_row(0), "A F: 30  R: 50");

    rig.set_adc(40, 60);
    sleep(Duration::from_millis(250)).await;

    assert_eq!(rig.system.calibration().track_a, TrackSpeeds::new(40, 60));
    assert_eq!(rig.system.calibration().track_b, STORED.track_b);
    assert!(rig.system.parameter_changed());
    assert_eq!(rig.display_row(1), "ADC  40     60");
    // Durable copy untouched until saved
    assert_eq!(rig.system.saved_params().speeds, STORED);
}

#[tokio::test(start_paused = true)]
async fn test_calibration_discard_restores_table() {
    let mut rig = Rig::booted(Position::Up).await;

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::CalibrateA).await;
    rig.set_adc(40, 60);
    sleep(Duration::from_millis(500)).await;
    assert!(rig.system.parameter_changed());

    rig.press(ButtonEvent::click('S')).await;
    rig.wait_for(StateId::Stopped).await;
    sleep(Duration::from_millis(500)).await;

    assert_eq!(rig.system.calibration(), STORED);
    assert!(!rig.system.parameter_changed());
    assert_eq!(rig.store.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_discard_from_track_b_restores_both_tracks() {
    let mut rig = Rig::booted(Position::Up).await;

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::CalibrateA).await;
    rig.set_adc(40, 60);
    sleep(Duration::from_millis(500)).await;

    rig.press_taken(ButtonEvent::click('C')).await;
    rig.set_adc(45, 65);
    rig.wait_for(StateId::CalibrateB).await;
    sleep(Duration::from_millis(500)).await;
    assert_eq!(
        rig.system.calibration(),
        CalibrationTable::new(TrackSpeeds::new(40, 60), TrackSpeeds::new(45, 65))
    );

    rig.press(ButtonEvent::click('S')).await;
    rig.wait_for(StateId::Stopped).await;
    sleep(Duration::from_millis(500)).await;

    assert_eq!(rig.system.calibration(), STORED);
    assert!(!rig.system.parameter_changed());
    assert_eq!(rig.store.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_save_confirm_persists_edits() {
    let mut rig = Rig::booted(Position::Up).await;

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::CalibrateA).await;
    rig.set_adc(40, 60);
    sleep(Duration::from_millis(500)).await;

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::CalibrateB).await;
    // Same knobs, so track B picks up the new readings too
    sleep(Duration::from_millis(500)).await;
    let edited = CalibrationTable::new(TrackSpeeds::new(40, 60), TrackSpeeds::new(40, 60));
    assert_eq!(rig.system.calibration(), edited);

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::SaveCalibration).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(rig.display_row(0), "Save cal?");
    assert_eq!(rig.display_row(1), "Clk: Y  Hld: N");

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::Stopped).await;

    assert_eq!(rig.store.save_count(), 1);
    assert_eq!(rig.store.load_motor_params().unwrap().speeds, edited);
    assert_eq!(rig.store.load_motor_params().unwrap().hold_ms, 500);
    assert_eq!(rig.system.saved_params().speeds, edited);
    assert!(!rig.system.parameter_changed());
}

#[tokio::test(start_paused = true)]
async fn test_save_without_changes_writes_nothing() {
    let mut rig = Rig::booted(Position::Up).await;

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::CalibrateA).await;
    sleep(Duration::from_millis(300)).await;
    assert!(!rig.system.parameter_changed());

    // Track A has stopped polling once the click is taken
    rig.press_taken(ButtonEvent::click('C')).await;
    rig.set_adc(35, 55);
    rig.wait_for(StateId::CalibrateB).await;
    sleep(Duration::from_millis(300)).await;
    assert!(!rig.system.parameter_changed());
    assert_eq!(rig.system.calibration(), STORED);

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::SaveCalibration).await;
    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::Stopped).await;
    assert_eq!(rig.store.save_count(), 0);
}

/// Store whose writes always fail
struct ReadOnlyStore(MotorParams);

impl ParamStore for ReadOnlyStore {
    fn load_motor_params(&self) -> Result<MotorParams, ParamError> {
        Ok(self.0)
    }

    fn save_motor_params(&self, _params: &MotorParams) -> Result<(), ParamError> {
        Err(ParamError::Io {
            path: "motor_p.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_save_keeps_edits_pending() {
    let mut rig = Rig::booted_with(Position::Up, ReadOnlyStore(stored_params())).await;

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::CalibrateA).await;
    rig.set_adc(40, 60);
    sleep(Duration::from_millis(500)).await;
    rig.press_taken(ButtonEvent::click('C')).await;
    rig.set_adc(35, 55);
    rig.wait_for(StateId::CalibrateB).await;
    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::SaveCalibration).await;

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::Stopped).await;

    // Live table keeps the edit; durable copy and flag say it is unsaved
    assert_eq!(rig.system.calibration().track_a, TrackSpeeds::new(40, 60));
    assert_eq!(rig.system.saved_params().speeds, STORED);
    assert_eq!(rig.store.load_motor_params().unwrap().speeds, STORED);
    assert!(rig.system.parameter_changed());
}

#[tokio::test(start_paused = true)]
async fn test_save_hold_discards_and_recalibrates() {
    let mut rig = Rig::booted(Position::Up).await;

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::CalibrateA).await;
    rig.set_adc(40, 60);
    sleep(Duration::from_millis(500)).await;
    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::CalibrateB).await;
    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::SaveCalibration).await;
    assert!(rig.system.parameter_changed());

    // Knobs back on track A's stored values so re-entry makes no edit
    rig.set_adc(30, 50);
    rig.press(ButtonEvent::hold('C')).await;
    rig.wait_for(StateId::CalibrateA).await;
    sleep(Duration::from_millis(300)).await;

    assert_eq!(rig.system.calibration(), STORED);
    assert!(!rig.system.parameter_changed());
    assert_eq!(rig.store.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_calibration_test_run_flips_position() {
    let mut rig = Rig::booted(Position::Up).await;

    rig.press(ButtonEvent::click('C')).await;
    rig.wait_for(StateId::CalibrateA).await;
    rig.set_adc(45, 65);
    sleep(Duration::from_millis(300)).await;

    rig.press(ButtonEvent::click('R')).await;
    sleep(Duration::from_millis(1200)).await;

    // Opposite of Up, using the live (unsaved) edit for track A
    let a = rig.probe_a.get();
    let b = rig.probe_b.get();
    assert_eq!((a.mode, a.duty), (Mode::Reverse, pc_to_duty(65)));
    assert_eq!((b.mode, b.duty), (Mode::Forward, pc_to_duty(35)));
    assert_eq!(rig.system.current(), StateId::CalibrateA);

    sleep(Duration::from_millis(2000)).await;
    assert_eq!(rig.system.position(), Position::Down);
    assert_eq!(rig.system.current(), StateId::CalibrateA);
    assert_eq!(rig.display_row(0), "A F: 45  R: 65");

    rig.press(ButtonEvent::click('S')).await;
    rig.wait_for(StateId::Stopped).await;
    assert_eq!(rig.system.position(), Position::Down);
}

#[tokio::test(start_paused = true)]
async fn test_stop_hold_finishes_and_shutdown_stops_motors() {
    let mut rig = Rig::booted(Position::Up).await;

    rig.press(ButtonEvent::hold('S')).await;
    rig.wait_for(StateId::Finish).await;

    timeout(Duration::from_secs(5), rig.system.run_system())
        .await
        .expect("run flag never cleared");
    assert!(!rig.system.is_running());

    rig.system.shutdown().await;
    for probe in [&rig.probe_a, &rig.probe_b] {
        let state = probe.get();
        assert_eq!(state.mode, Mode::Stop);
        assert_eq!(state.duty, 0);
        assert!(state.logic_off);
    }
}

// Incline runtime: parameter loading, zenoh bridge, main loop
//
// Button events and simulated potentiometer settings arrive over zenoh; motor
// actuation and controller status are published at PUBLISH_HZ. The state
// machine itself knows nothing about the transport.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::{Publisher, Subscriber};
use zenoh::sample::Sample;

use crate::config::{PUBLISH_HZ, TOPIC_CMD_ADC, TOPIC_CMD_BUTTON, TOPIC_RT_MOTORS, TOPIC_STATUS};
use crate::io::{ButtonPort, SimAdc, display};
use crate::messages::{AdcCommand, ButtonEvent, MotorActuation};
use crate::motor::{ChannelProbe, SimChannel};
use crate::params::{JsonFileStore, MemoryStore, ParamStore};
use crate::system::{Hardware, InclineSystem, Position};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Startup options (from the command line)
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub params_dir: PathBuf,
    pub no_display: bool,
    /// Keep saves in memory; parameter files are only read
    pub dry_run: bool,
    pub start_position: Position,
}

/// Simulated inputs/outputs exposed over zenoh
struct Bridge<'a> {
    adc_sub: Subscriber<FifoChannelHandler<Sample>>,
    pub_motors: Publisher<'a>,
    pub_status: Publisher<'a>,
    adc_forward: SimAdc,
    adc_reverse: SimAdc,
    probe_a: ChannelProbe,
    probe_b: ChannelProbe,
}

impl Bridge<'_> {
    fn actuation(&self) -> MotorActuation {
        MotorActuation {
            a: self.probe_a.get(),
            b: self.probe_b.get(),
        }
    }

    /// Apply pending ADC commands (non-blocking), keep the latest
    fn drain_adc(&self) {
        while let Ok(Some(sample)) = self.adc_sub.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<AdcCommand>(&payload) {
                Ok(cmd) => {
                    debug!("ADC command: {:?}", cmd);
                    self.adc_forward.set_percentage(cmd.forward);
                    self.adc_reverse.set_percentage(cmd.reverse);
                }
                Err(e) => warn!("Failed to parse ADC command: {}", e),
            }
        }
    }

    /// Publish actuation and status until a publish fails
    async fn publish_loop(&self, system: &InclineSystem) -> Result<(), BoxError> {
        let mut tick = interval(Duration::from_millis(1000 / PUBLISH_HZ));
        loop {
            tick.tick().await;
            self.drain_adc();
            self.publish_once(system).await?;
        }
    }

    async fn publish_once(&self, system: &InclineSystem) -> Result<(), BoxError> {
        let actuation_json = serde_json::to_string(&self.actuation())?;
        self.pub_motors.put(actuation_json).await?;

        let status_json = serde_json::to_string(&system.status())?;
        self.pub_status.put(status_json).await?;
        Ok(())
    }
}

/// Feed button events from the panel into the mailbox
async fn forward_buttons(subscriber: Subscriber<FifoChannelHandler<Sample>>, buttons: ButtonPort) {
    while let Ok(sample) = subscriber.recv_async().await {
        let payload = sample.payload().to_bytes();
        match serde_json::from_slice::<ButtonEvent>(&payload) {
            Ok(event) => buttons.deliver(event).await,
            Err(e) => warn!("Failed to parse button event: {}", e),
        }
    }
    debug!("Button subscriber closed");
}

pub async fn run(options: RunOptions) -> Result<(), BoxError> {
    info!("Incline runtime v{}", env!("CARGO_PKG_VERSION"));
    let files = JsonFileStore::new(&options.params_dir);
    info!("Loading system parameters from {}", files.dir().display());
    let io_params = files.load_io_params()?;
    let store: Arc<dyn ParamStore> = if options.dry_run {
        info!("Dry run: calibration saves stay in memory");
        Arc::new(MemoryStore::new(files.load_motor_params()?))
    } else {
        Arc::new(files)
    };

    let channel_a = SimChannel::new("A");
    let channel_b = SimChannel::new("B");
    let adc_forward = SimAdc::default();
    let adc_reverse = SimAdc::default();
    let buttons = ButtonPort::new();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let button_sub = session.declare_subscriber(TOPIC_CMD_BUTTON).await?;
    let bridge = Bridge {
        adc_sub: session.declare_subscriber(TOPIC_CMD_ADC).await?,
        pub_motors: session.declare_publisher(TOPIC_RT_MOTORS).await?,
        pub_status: session.declare_publisher(TOPIC_STATUS).await?,
        adc_forward: adc_forward.clone(),
        adc_reverse: adc_reverse.clone(),
        probe_a: channel_a.probe(),
        probe_b: channel_b.probe(),
    };
    info!("Subscribed to: {}, {}", TOPIC_CMD_BUTTON, TOPIC_CMD_ADC);
    info!("Publishing to: {}, {}", TOPIC_RT_MOTORS, TOPIC_STATUS);

    let hardware = Hardware {
        motor_a: Box::new(channel_a),
        motor_b: Box::new(channel_b),
        adc_forward: Box::new(adc_forward),
        adc_reverse: Box::new(adc_reverse),
        display: display::detect(io_params.display && !options.no_display),
        buttons: buttons.clone(),
    };
    let system = InclineSystem::start(hardware, store, options.start_position)?;
    let button_task = tokio::spawn(forward_buttons(button_sub, buttons));

    info!("Running the system");
    let outcome = tokio::select! {
        _ = system.run_system() => Ok(()),
        result = bridge.publish_loop(&system) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    };

    info!("Closing down the system");
    button_task.abort();
    system.shutdown().await;
    // Last actuation reflects the stopped motors
    if let Err(e) = bridge.publish_once(&system).await {
        warn!("Failed to publish final actuation: {}", e);
    }
    outcome
}

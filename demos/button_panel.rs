// Keyboard button panel: r/c/s click, R/C/S hold, [ ] forward knob, { } reverse knob, q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::info;

use incline_runtime::config::{TOPIC_CMD_ADC, TOPIC_CMD_BUTTON};
use incline_runtime::messages::{AdcCommand, ButtonEvent};

const KNOB_STEP: u8 = 5; // percent per key press
const KNOB_MAX: u8 = 99;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let buttons = session.declare_publisher(TOPIC_CMD_BUTTON).await?;
    let knobs = session.declare_publisher(TOPIC_CMD_ADC).await?;

    info!("Controls: r/c/s=click, R/C/S=hold, [ ]=forward knob, {{ }}=reverse knob, q=quit");

    enable_raw_mode()?;
    let result = run_panel(&buttons, &knobs).await;
    disable_raw_mode()?;

    result
}

async fn run_panel(
    buttons: &zenoh::pubsub::Publisher<'_>,
    knobs: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut knob = AdcCommand {
        forward: 0,
        reverse: 0,
    };

    loop {
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        // Buttons fire once per physical press, no auto-repeat
        if kind != KeyEventKind::Press {
            continue;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => break,

            // Lower case clicks, upper case holds
            KeyCode::Char(c @ ('r' | 'c' | 's')) => {
                send_button(buttons, ButtonEvent::click(c)).await?;
            }
            KeyCode::Char(c @ ('R' | 'C' | 'S')) => {
                send_button(buttons, ButtonEvent::hold(c)).await?;
            }

            // Potentiometers
            KeyCode::Char('[') => {
                knob.forward = knob.forward.saturating_sub(KNOB_STEP);
                send_knobs(knobs, knob).await?;
            }
            KeyCode::Char(']') => {
                knob.forward = (knob.forward + KNOB_STEP).min(KNOB_MAX);
                send_knobs(knobs, knob).await?;
            }
            KeyCode::Char('{') => {
                knob.reverse = knob.reverse.saturating_sub(KNOB_STEP);
                send_knobs(knobs, knob).await?;
            }
            KeyCode::Char('}') => {
                knob.reverse = (knob.reverse + KNOB_STEP).min(KNOB_MAX);
                send_knobs(knobs, knob).await?;
            }

            _ => {}
        }
    }

    Ok(())
}

async fn send_button(
    publisher: &zenoh::pubsub::Publisher<'_>,
    event: ButtonEvent,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Button {}", event.code());
    publisher.put(serde_json::to_string(&event)?).await
}

async fn send_knobs(
    publisher: &zenoh::pubsub::Publisher<'_>,
    knob: AdcCommand,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Knobs F: {}  R: {}", knob.forward, knob.reverse);
    publisher.put(serde_json::to_string(&knob)?).await
}

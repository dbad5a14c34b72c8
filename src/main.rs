//! PicoGo voice bridge — realtime voice-to-actuator core.
//!
//! Communicates with the mobile shell via JSON-line IPC on stdin/stdout.
//! The shell owns the screens, the Bluetooth socket, and the accelerometer;
//! this process owns the realtime AI session, the function-call dispatch,
//! and the motion sequencing.

mod config;
mod dispatch;
mod error;
mod ipc;
mod robot;
mod sensor;
mod session;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::{read_bridge_config, BridgeConfig};
use dispatch::Dispatcher;
use ipc::bridge::{emit_error, emit_event, spawn_stdin_reader};
use ipc::{ShellCommand, ShellEvent};
use robot::encoder;
use robot::sequencer::{MotionSequencer, Pattern};
use robot::ShellRobotLink;
use sensor::{SensorBridge, SensorSample, TriggerKind};
use session::events::{self, DecodedEvent};
use session::transport::WsTransport;
use session::{SessionManager, SessionSignal};

#[tokio::main]
async fn main() {
    // Initialize tracing (respects RUST_LOG env, defaults to info).
    // stderr only — stdout is the IPC channel.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    emit_event(&ShellEvent::Starting {});

    let bridge_config = read_bridge_config();
    info!(?bridge_config, "Configuration loaded");

    // Spawn stdin reader (blocking thread -> async channel)
    let mut cmd_rx = spawn_stdin_reader();

    let (signals_tx, mut signals_rx) = mpsc::unbounded_channel();
    let mut app = App::new(bridge_config, signals_tx);

    emit_event(&ShellEvent::Ready {});
    info!("Bridge core ready");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(command) => {
                        if !app.handle_command(command).await {
                            break; // Shutdown command received
                        }
                    }
                    None => {
                        // stdin closed — shell process gone
                        info!("stdin closed, shutting down");
                        break;
                    }
                }
            }
            signal = signals_rx.recv() => {
                if let Some(signal) = signal {
                    app.handle_signal(signal);
                }
            }
        }
    }

    app.teardown();
    info!("Bridge core shutting down");
}

/// All mutable state of the core, driven from the main loop only.
struct App {
    session: SessionManager,
    sequencer: MotionSequencer,
    /// Alive only while a session is. Dropped on teardown, which discards
    /// queued calls and lets the worker exit.
    dispatcher: Option<Dispatcher>,
    sensors: SensorBridge,
}

impl App {
    fn new(config: BridgeConfig, signals_tx: mpsc::UnboundedSender<SessionSignal>) -> Self {
        let sensors = SensorBridge::new(config.fall_detection, config.pickup_detection);
        Self {
            session: SessionManager::new(config, signals_tx),
            sequencer: MotionSequencer::new(Arc::new(ShellRobotLink)),
            dispatcher: None,
            sensors,
        }
    }

    /// Handle a single command from the shell.
    /// Returns `false` if the main loop should exit.
    async fn handle_command(&mut self, cmd: ShellCommand) -> bool {
        match cmd {
            ShellCommand::Connect {} => {
                match self.session.connect(WsTransport::new()).await {
                    Ok(()) => {
                        if let Some(outbound) = self.session.outbound() {
                            self.dispatcher = Some(Dispatcher::spawn(
                                self.sequencer.clone(),
                                outbound,
                                self.session.config(),
                            ));
                        }
                        let config = self.session.config();
                        self.sensors =
                            SensorBridge::new(config.fall_detection, config.pickup_detection);
                    }
                    Err(e) => {
                        warn!("Connect failed: {}", e);
                        emit_error(&e.to_string());
                    }
                }
                self.emit_session_state();
            }

            ShellCommand::Disconnect {} => {
                self.end_session();
            }

            ShellCommand::ManualMove {
                direction,
                speed,
                duration_ms,
            } => {
                let speed = speed.unwrap_or(self.session.config().default_speed);
                let duration_ms =
                    duration_ms.unwrap_or(self.session.config().default_duration_ms);
                let sequencer = self.sequencer.clone();
                // Runs on its own so held buttons don't stall the loop; the
                // sequencer serializes against anything else in control.
                tokio::spawn(async move {
                    if let Err(e) = sequencer.move_timed(direction, speed, duration_ms).await {
                        warn!("Manual move failed: {}", e);
                    }
                });
            }

            ShellCommand::Stop {} => {
                self.sequencer.stop();
            }

            ShellCommand::SetColor { color } => {
                self.sequencer.send_command(&encoder::encode_color(&color));
            }

            ShellCommand::SetSpeed { level } => {
                self.sequencer.set_speed(level);
            }

            ShellCommand::SetAccessory { kind, on } => {
                self.sequencer
                    .send_command(&encoder::encode_accessory(kind, on));
            }

            ShellCommand::PlayPattern { name } => {
                let pattern = Pattern::from_name(&name).unwrap_or(Pattern::DEFAULT);
                let sequencer = self.sequencer.clone();
                tokio::spawn(async move {
                    if let Err(e) = sequencer.run_pattern(pattern).await {
                        warn!("Pattern failed: {}", e);
                    }
                });
            }

            ShellCommand::Say { text } => {
                if let Err(e) = self.session.inject_user_turn(&text) {
                    warn!("Cannot inject user turn: {}", e);
                    emit_error(&e.to_string());
                }
            }

            ShellCommand::SensorSample { x, y, z } => {
                // Samples only matter while there is a session to talk to.
                if self.session.is_active() {
                    let sample = SensorSample { x, y, z };
                    if let Some(kind) = self.sensors.observe(&sample) {
                        self.handle_trigger(kind);
                    }
                }
            }

            ShellCommand::ConfigUpdate { config } => {
                match serde_json::from_value::<BridgeConfig>(config) {
                    Ok(new_config) => {
                        info!("Config updated; applies from the next session");
                        self.session.set_config(new_config);
                    }
                    Err(e) => {
                        warn!("Rejected config update: {}", e);
                        emit_error(&format!("invalid config: {}", e));
                    }
                }
            }

            ShellCommand::Ping {} => {
                emit_event(&ShellEvent::Pong {});
            }

            ShellCommand::Shutdown {} => {
                emit_event(&ShellEvent::Stopping {});
                return false;
            }
        }

        true
    }

    /// Handle one signal from the session's transport pump.
    fn handle_signal(&mut self, signal: SessionSignal) {
        match signal {
            SessionSignal::Message(raw) => match events::decode(&raw) {
                Ok(event) => self.handle_session_event(event),
                Err(e) => {
                    // Malformed payload: drop the one message, keep going.
                    warn!("Undecodable session message: {}", e);
                }
            },
            SessionSignal::TransportError(message) => {
                warn!("Transport error: {}", message);
                self.fail_session(&message);
            }
            SessionSignal::Closed => {
                if self.session.state() != session::SessionState::Idle {
                    self.fail_session("session closed by remote");
                }
            }
        }
    }

    fn handle_session_event(&mut self, event: DecodedEvent) {
        match event {
            DecodedEvent::SessionLifecycle { kind, session_id } => {
                debug!(?kind, "Session lifecycle event");
                self.session.set_session_id(session_id);
            }
            DecodedEvent::SpeechBoundary { started } => {
                self.session.set_listening(started);
                emit_event(&ShellEvent::Listening { active: started });
            }
            DecodedEvent::AudioBoundary { speaking } => {
                self.session.set_speaking(speaking);
                emit_event(&ShellEvent::Speaking { active: speaking });
            }
            DecodedEvent::TranscriptDelta { delta } => {
                emit_event(&ShellEvent::Transcript { delta });
            }
            DecodedEvent::ResponseComplete { calls } => {
                // Queued in array order; the dispatcher serializes
                // execution. No waiting here.
                for call in calls {
                    emit_event(&ShellEvent::FunctionCall {
                        name: call.name.clone(),
                    });
                    match &self.dispatcher {
                        Some(dispatcher) => dispatcher.submit(call),
                        None => warn!(name = %call.name, "No dispatcher for function call"),
                    }
                }
            }
            DecodedEvent::ServiceError { message } => {
                // Non-fatal: recorded for the activity log, session
                // continues until the transport itself gives up.
                warn!("Service error: {}", message);
                emit_error(&message);
            }
            DecodedEvent::Unknown { event_type } => {
                debug!(event_type, "Ignoring unknown event type");
            }
        }
    }

    fn handle_trigger(&mut self, kind: TriggerKind) {
        info!(
            kind = kind.name(),
            listening = self.session.listening(),
            speaking = self.session.speaking(),
            "Sensor trigger"
        );
        emit_event(&ShellEvent::SensorTrigger {
            kind: kind.name().to_string(),
        });
        if kind == TriggerKind::Fall {
            // Physical flourish alongside the conversational reaction.
            let sequencer = self.sequencer.clone();
            tokio::spawn(async move {
                if let Err(e) = sequencer.run_pattern(Pattern::Pulse).await {
                    warn!("Trigger flourish failed: {}", e);
                }
            });
        }
        if let Err(e) = self.session.inject_user_turn(kind.phrase()) {
            debug!("Discarding sensor trigger: {}", e);
        }
    }

    /// Orderly teardown requested by the shell.
    fn end_session(&mut self) {
        self.dispatcher = None;
        self.session.disconnect();
        // Never end a session with a motor engaged.
        self.sequencer.stop();
        emit_event(&ShellEvent::StopCapture {});
        self.emit_session_state();
    }

    /// Transport died under us: stop the robot, mark Failed, tell the
    /// shell once. Reconnecting is an explicit user action.
    fn fail_session(&mut self, message: &str) {
        self.dispatcher = None;
        self.sequencer.stop();
        self.session.mark_failed();
        emit_error(message);
        emit_event(&ShellEvent::StopCapture {});
        self.emit_session_state();
    }

    fn emit_session_state(&self) {
        emit_event(&ShellEvent::SessionState {
            state: self.session.state().to_string(),
        });
    }

    fn teardown(&mut self) {
        self.dispatcher = None;
        self.session.disconnect();
        self.sequencer.stop();
    }
}

//! Function-call dispatcher: serialized execution of tool calls.
//!
//! One worker task per session drains a FIFO queue, so calls never run
//! concurrently and actuator commands from two calls never interleave. The
//! contract per call is absolute: exactly one `function_call_output`
//! correlated by `call_id`, then a `response.create` — an unanswered call
//! stalls the remote side's turn-taking indefinitely, so the worker never
//! throws and never skips the response, whatever the arguments look like.
//!
//! Argument policy: missing optionals get the configured defaults; a
//! missing or unusable required parameter runs a safe fallback and reports
//! `success:false` only when genuinely unresolvable. Uniform across all
//! functions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::robot::encoder;
use crate::robot::sequencer::{MotionSequencer, Pattern, MAX_MOVE_MS, MIN_MOVE_MS};
use crate::robot::{Accessory, Direction, SpeedLevel};
use crate::session::client::{self, FunctionOutput};
use crate::session::events::FunctionCall;

/// Handle for queueing calls onto the session's worker. Dropping the
/// handle ends the session's dispatch: calls still in the queue are
/// discarded, not executed against a robot whose session is gone.
pub struct Dispatcher {
    queue: mpsc::UnboundedSender<FunctionCall>,
    shutdown: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Spawn the worker for one session. `outbound` is the session's
    /// client-event channel; results and turn requests go out on it.
    pub fn spawn(
        sequencer: MotionSequencer,
        outbound: mpsc::UnboundedSender<Value>,
        config: &BridgeConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            sequencer,
            outbound,
            default_speed: config.default_speed.min(100),
            default_duration_ms: config.default_duration_ms.clamp(MIN_MOVE_MS, MAX_MOVE_MS),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(worker.run(rx));
        Self {
            queue: tx,
            shutdown,
        }
    }

    /// Queue one call. FIFO; a call arriving while another executes waits
    /// its turn rather than running concurrently or being dropped.
    pub fn submit(&self, call: FunctionCall) {
        if self.queue.send(call).is_err() {
            warn!("Dispatcher worker gone; dropping call");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Teardown races the worker: anything still buffered must not
        // drive the robot after the session's final stop.
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

struct Worker {
    sequencer: MotionSequencer,
    outbound: mpsc::UnboundedSender<Value>,
    /// Session defaults, adjustable mid-session by `set_speed` /
    /// `set_movement_duration`.
    default_speed: u8,
    default_duration_ms: u64,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    async fn run(mut self, mut queue: mpsc::UnboundedReceiver<FunctionCall>) {
        while let Some(call) = queue.recv().await {
            if self.shutdown.load(Ordering::SeqCst) {
                debug!(name = %call.name, call_id = %call.call_id, "Session gone; discarding queued call");
                continue;
            }
            debug!(name = %call.name, call_id = %call.call_id, "Executing function call");
            let output = self.execute(&call).await;
            // Always respond: one result message per call_id, then ask for
            // the next turn.
            let _ = self
                .outbound
                .send(client::function_output(&call.call_id, &output));
            let _ = self.outbound.send(client::response_create());
        }
        debug!("Dispatcher worker exiting");
    }

    async fn execute(&mut self, call: &FunctionCall) -> FunctionOutput {
        let args: Value = match serde_json::from_str(&call.arguments) {
            Ok(v) => v,
            Err(e) => {
                // Unparseable arguments degrade to "no arguments"; the
                // per-function defaults take over from here.
                let e = crate::error::BridgeError::FunctionValidation(e.to_string());
                warn!(call_id = %call.call_id, "{}", e);
                json!({})
            }
        };

        match call.name.as_str() {
            "move_forward" => self.timed_move(Direction::Forward, &args).await,
            "move_backward" => self.timed_move(Direction::Backward, &args).await,
            "turn_left" => self.timed_move(Direction::Left, &args).await,
            "turn_right" => self.timed_move(Direction::Right, &args).await,
            "stop" => {
                self.sequencer.stop();
                FunctionOutput::ok("stopped")
            }
            "toggle_buzzer" => self.toggle(Accessory::Buzzer, &args),
            "toggle_led" => self.toggle(Accessory::Led, &args),
            "change_color" => {
                // Unknown or missing colors fall back to white, reported
                // as success.
                let color = args.get("color").and_then(Value::as_str).unwrap_or("white");
                self.sequencer.send_command(&encoder::encode_color(color));
                FunctionOutput::ok(format!("color set to {}", color))
            }
            "play_pattern" => {
                let (pattern, fell_back) = match args.get("pattern").and_then(Value::as_str) {
                    Some(name) => match Pattern::from_name(name) {
                        Some(p) => (p, false),
                        None => (Pattern::DEFAULT, true),
                    },
                    None => (Pattern::DEFAULT, true),
                };
                match self.sequencer.run_pattern(pattern).await {
                    Ok(()) if fell_back => FunctionOutput::ok(format!(
                        "no recognizable pattern requested, played {}",
                        pattern.name()
                    )),
                    Ok(()) => FunctionOutput::ok(format!("played {}", pattern.name())),
                    Err(e) => FunctionOutput::err(e.to_string()),
                }
            }
            "set_speed" => {
                let level = args
                    .get("level")
                    .or_else(|| args.get("speed"))
                    .and_then(Value::as_str)
                    .map(SpeedLevel::from_name)
                    .unwrap_or(SpeedLevel::Medium);
                self.sequencer.set_speed(level);
                self.default_speed = level.percent();
                FunctionOutput::ok(format!("speed set to {:?}", level).to_lowercase())
            }
            "set_movement_duration" => match args.get("milliseconds").and_then(Value::as_u64) {
                Some(ms) if (MIN_MOVE_MS..=MAX_MOVE_MS).contains(&ms) => {
                    self.default_duration_ms = ms;
                    FunctionOutput::ok(format!("movement duration set to {} ms", ms))
                }
                Some(ms) => FunctionOutput::err(format!(
                    "duration {} ms out of range ({}-{})",
                    ms, MIN_MOVE_MS, MAX_MOVE_MS
                )),
                None => FunctionOutput::err(format!(
                    "missing required parameter: milliseconds ({}-{})",
                    MIN_MOVE_MS, MAX_MOVE_MS
                )),
            },
            "toy_pulse" => {
                self.sequencer.send_command(&encoder::encode_toy_pulse());
                FunctionOutput::ok("toy pulse fired")
            }
            other => FunctionOutput::err(format!("unknown function: {}", other)),
        }
    }

    async fn timed_move(&self, direction: Direction, args: &Value) -> FunctionOutput {
        let speed = args
            .get("speed")
            .and_then(Value::as_u64)
            .map(|s| s.min(100) as u8)
            .unwrap_or(self.default_speed);
        let duration_ms = args
            .get("duration")
            .and_then(Value::as_u64)
            .unwrap_or(self.default_duration_ms)
            .clamp(MIN_MOVE_MS, MAX_MOVE_MS);

        match self.sequencer.move_timed(direction, speed, duration_ms).await {
            Ok(()) => FunctionOutput::ok(format!(
                "moved {} for {} ms at speed {}",
                direction, duration_ms, speed
            )),
            Err(e) => FunctionOutput::err(e.to_string()),
        }
    }

    fn toggle(&self, kind: Accessory, args: &Value) -> FunctionOutput {
        let state = args.get("state").and_then(|v| match v {
            // Only the two recognized states actuate; "maybe" is not off.
            Value::String(s) if s.eq_ignore_ascii_case("on") => Some(true),
            Value::String(s) if s.eq_ignore_ascii_case("off") => Some(false),
            Value::Bool(b) => Some(*b),
            _ => None,
        });
        match state {
            Some(on) => {
                self.sequencer
                    .send_command(&encoder::encode_accessory(kind, on));
                FunctionOutput::ok(format!(
                    "{:?} turned {}",
                    kind,
                    if on { "on" } else { "off" }
                )
                .to_lowercase())
            }
            // Required parameter, no safe guess between on and off: leave
            // the actuator alone and report it.
            None => FunctionOutput::err(
                "required parameter state must be \"on\" or \"off\"".to_string(),
            ),
        }
    }
}

/// The tool schema advertised in the session configuration message.
pub fn tool_schema() -> Vec<Value> {
    let motion_parameters = json!({
        "type": "object",
        "properties": {
            "speed": { "type": "number", "description": "Speed 0-100" },
            "duration": { "type": "number", "description": "Hold time in milliseconds (500-5000)" }
        },
        "required": []
    });
    let toggle_parameters = json!({
        "type": "object",
        "properties": {
            "state": { "type": "string", "enum": ["on", "off"] }
        },
        "required": ["state"]
    });

    vec![
        tool("move_forward", "Drive the robot forward.", motion_parameters.clone()),
        tool("move_backward", "Drive the robot backward.", motion_parameters.clone()),
        tool("turn_left", "Turn the robot left.", motion_parameters.clone()),
        tool("turn_right", "Turn the robot right.", motion_parameters),
        tool(
            "stop",
            "Stop all movement immediately.",
            json!({ "type": "object", "properties": {}, "required": [] }),
        ),
        tool("toggle_buzzer", "Turn the buzzer on or off.", toggle_parameters.clone()),
        tool("toggle_led", "Turn the onboard LED on or off.", toggle_parameters),
        tool(
            "change_color",
            "Change the RGB light strip color.",
            json!({
                "type": "object",
                "properties": {
                    "color": {
                        "type": "string",
                        "enum": ["red", "green", "blue", "yellow", "cyan", "magenta", "white", "off"]
                    }
                },
                "required": ["color"]
            }),
        ),
        tool(
            "play_pattern",
            "Perform a movement pattern.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "enum": ["dance", "spin", "zigzag", "square"] }
                },
                "required": ["pattern"]
            }),
        ),
        tool(
            "set_speed",
            "Set the default driving speed level.",
            json!({
                "type": "object",
                "properties": {
                    "level": { "type": "string", "enum": ["low", "medium", "high"] }
                },
                "required": ["level"]
            }),
        ),
        tool(
            "set_movement_duration",
            "Set the default hold time for moves.",
            json!({
                "type": "object",
                "properties": {
                    "milliseconds": { "type": "number", "minimum": 500, "maximum": 5000 }
                },
                "required": ["milliseconds"]
            }),
        ),
        tool(
            "toy_pulse",
            "Fire the attached toy's trigger once.",
            json!({ "type": "object", "properties": {}, "required": [] }),
        ),
    ]
}

fn tool(name: &str, description: &str, parameters: Value) -> Value {
    json!({
        "type": "function",
        "name": name,
        "description": description,
        "parameters": parameters
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::robot::{Command, RobotLink};
    use std::sync::{Arc, Mutex};

    struct RecordingLink {
        sent: Mutex<Vec<Command>>,
    }

    impl RecordingLink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl RobotLink for RecordingLink {
        fn send(&self, cmd: &Command) -> Result<()> {
            self.sent.lock().unwrap().push(*cmd);
            Ok(())
        }
    }

    fn call(name: &str, call_id: &str, arguments: &str) -> FunctionCall {
        FunctionCall {
            name: name.to_string(),
            call_id: call_id.to_string(),
            arguments: arguments.to_string(),
        }
    }

    fn setup() -> (
        Dispatcher,
        Arc<RecordingLink>,
        mpsc::UnboundedReceiver<Value>,
    ) {
        let link = RecordingLink::new();
        let sequencer = MotionSequencer::new(link.clone());
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::spawn(sequencer, out_tx, &BridgeConfig::default());
        (dispatcher, link, out_rx)
    }

    /// Read the result pair (function_call_output + response.create) for
    /// one call, returning the parsed output body.
    async fn next_result(rx: &mut mpsc::UnboundedReceiver<Value>) -> (String, Value) {
        let result = rx.recv().await.expect("result message");
        assert_eq!(result["type"], "conversation.item.create");
        assert_eq!(result["item"]["type"], "function_call_output");
        let call_id = result["item"]["call_id"].as_str().unwrap().to_string();
        let output: Value =
            serde_json::from_str(result["item"]["output"].as_str().unwrap()).unwrap();
        let turn = rx.recv().await.expect("turn request");
        assert_eq!(turn["type"], "response.create");
        (call_id, output)
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_call_gets_exactly_one_correlated_result() {
        let (dispatcher, _link, mut rx) = setup();

        dispatcher.submit(call("stop", "call_a", "{}"));
        dispatcher.submit(call("change_color", "call_b", r#"{"color":"red"}"#));

        let (id_a, out_a) = next_result(&mut rx).await;
        assert_eq!(id_a, "call_a");
        assert_eq!(out_a["success"], true);
        let (id_b, out_b) = next_result(&mut rx).await;
        assert_eq!(id_b, "call_b");
        assert_eq!(out_b["success"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_execute_serially_in_fifo_order() {
        let (dispatcher, link, mut rx) = setup();

        // Two timed moves: if these ran concurrently the command log would
        // interleave presses.
        dispatcher.submit(call("move_forward", "call_1", r#"{"duration":600}"#));
        dispatcher.submit(call("turn_left", "call_2", r#"{"duration":600}"#));

        let (id_1, _) = next_result(&mut rx).await;
        let (id_2, _) = next_result(&mut rx).await;
        assert_eq!(id_1, "call_1");
        assert_eq!(id_2, "call_2");

        let log = link.sent.lock().unwrap().clone();
        let fwd_up = log
            .iter()
            .position(|c| *c == Command::new("Forward", "Up"))
            .unwrap();
        let left_down = log
            .iter()
            .position(|c| *c == Command::new("Left", "Down"))
            .unwrap();
        assert!(fwd_up < left_down, "second call started before first released");
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_defaults_applied_when_arguments_missing() {
        let (dispatcher, link, mut rx) = setup();

        dispatcher.submit(call("move_forward", "call_1", "{}"));
        let (_, output) = next_result(&mut rx).await;

        assert_eq!(output["success"], true);
        // Default speed 50 -> Medium, default duration 1500 ms.
        let msg = output["message"].as_str().unwrap();
        assert!(msg.contains("1500 ms"), "got: {}", msg);
        let log = link.sent.lock().unwrap().clone();
        assert!(log.contains(&Command::new("Medium", "Down")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_pattern_without_pattern_falls_back() {
        let (dispatcher, link, mut rx) = setup();

        dispatcher.submit(call("play_pattern", "call_1", "{}"));
        let (_, output) = next_result(&mut rx).await;

        // Never hard-fails: the default pattern ran.
        assert_eq!(output["success"], true);
        assert!(output["message"].as_str().unwrap().contains("dance"));
        assert!(!link.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_without_state_reports_failure_without_actuating() {
        let (dispatcher, link, mut rx) = setup();

        dispatcher.submit(call("toggle_buzzer", "call_1", "{}"));
        let (_, output) = next_result(&mut rx).await;

        assert_eq!(output["success"], false);
        assert!(output["error"].as_str().unwrap().contains("state"));
        assert!(link.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_rejects_unrecognized_state_without_actuating() {
        let (dispatcher, link, mut rx) = setup();

        // Anything other than on/off must not be read as off.
        dispatcher.submit(call("toggle_led", "call_1", r#"{"state":"maybe"}"#));
        let (_, output) = next_result(&mut rx).await;

        assert_eq!(output["success"], false);
        assert!(output["error"].as_str().unwrap().contains("state"));
        assert!(link.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_queued_before_teardown_are_discarded() {
        let (dispatcher, link, mut rx) = setup();

        // The call is buffered but the session ends before the worker gets
        // to it; the final all-stop must be the last thing the robot sees.
        dispatcher.submit(call("move_forward", "call_1", "{}"));
        let sequencer = MotionSequencer::new(link.clone());
        drop(dispatcher);
        sequencer.stop();

        // Give the worker a chance to drain its queue.
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;

        let log = link.sent.lock().unwrap().clone();
        assert_eq!(&log[..], &encoder::ALL_STOP);
        assert!(rx.try_recv().is_err(), "discarded call must not be answered");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_movement_duration_range_checked() {
        let (dispatcher, _link, mut rx) = setup();

        dispatcher.submit(call(
            "set_movement_duration",
            "call_1",
            r#"{"milliseconds": 9000}"#,
        ));
        let (_, output) = next_result(&mut rx).await;
        assert_eq!(output["success"], false);
        assert!(output["error"].as_str().unwrap().contains("out of range"));

        dispatcher.submit(call(
            "set_movement_duration",
            "call_2",
            r#"{"milliseconds": 2000}"#,
        ));
        let (_, output) = next_result(&mut rx).await;
        assert_eq!(output["success"], true);

        // Subsequent moves pick up the new default.
        dispatcher.submit(call("move_backward", "call_3", "{}"));
        let (_, output) = next_result(&mut rx).await;
        assert!(output["message"].as_str().unwrap().contains("2000 ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_function_still_answers() {
        let (dispatcher, _link, mut rx) = setup();

        dispatcher.submit(call("fly", "call_1", "{}"));
        let (id, output) = next_result(&mut rx).await;

        assert_eq!(id, "call_1");
        assert_eq!(output["success"], false);
        assert!(output["error"].as_str().unwrap().contains("unknown function"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_arguments_degrade_to_defaults() {
        let (dispatcher, _link, mut rx) = setup();

        dispatcher.submit(call("move_forward", "call_1", "not json at all"));
        let (_, output) = next_result(&mut rx).await;
        assert_eq!(output["success"], true);
    }

    #[test]
    fn test_tool_schema_names_match_dispatch_arms() {
        let names: Vec<String> = tool_schema()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        for expected in [
            "move_forward",
            "move_backward",
            "turn_left",
            "turn_right",
            "stop",
            "toggle_buzzer",
            "toggle_led",
            "change_color",
            "play_pattern",
            "set_speed",
            "set_movement_duration",
            "toy_pulse",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }
    }
}

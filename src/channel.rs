//! Live update channel: one persistent WebSocket to the backend's push
//! endpoint, reconnecting on its own, fanning typed events out to whoever
//! subscribed. External code only signals intent (open, close, watch,
//! unwatch); the spawned task owns the socket and every timer.

use crate::model::{AgentStatus, LogEntry, RunResult};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_GROWTH: u32 = 2;
// Multiplier ceiling, so delays top out at BACKOFF_BASE * BACKOFF_CAP.
const BACKOFF_CAP: u32 = 30;
const BACKOFF_MAX_ATTEMPTS: u32 = 8;
// Past the attempt bound the channel keeps retrying at this fixed pace.
const LONG_RETRY: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

static VERSION_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v\d+$").unwrap());

/// Push endpoint for a REST base URL: trailing version segment dropped,
/// `ws` appended, scheme swapped to ws/wss. `http://host/api/v1` becomes
/// `ws://host/api/ws`.
pub fn websocket_url(base_url: &str) -> Result<Url> {
	let base = Url::parse(base_url.trim_end_matches('/'))
		.with_context(|| format!("invalid API base URL: {base_url}"))?;
	let mut segments: Vec<String> = base
		.path_segments()
		.map(|parts| {
			parts
				.filter(|p| !p.is_empty())
				.map(|p| p.to_string())
				.collect()
		})
		.unwrap_or_default();
	if let Some(last) = segments.last() {
		if VERSION_SEGMENT.is_match(last) {
			segments.pop();
		}
	}
	segments.push("ws".to_string());

	let mut url = base;
	let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
	url.set_scheme(scheme)
		.map_err(|_| anyhow::anyhow!("cannot derive a websocket scheme from {base_url}"))?;
	url.set_path(&segments.join("/"));
	url.set_query(None);
	Ok(url)
}

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
	Ping,
	SubscribeToAgent(String),
	UnsubscribeToAgent(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
	Pong,
	AgentStatusUpdate(StatusUpdate),
	AgentLogUpdate(LogEntry),
	AgentResultUpdate(ResultUpdate),
	AgentNavigationUpdate(NavigationUpdate),
	AgentScreenshotUpdate(ScreenshotUpdate),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
	pub agent_id: String,
	pub status: AgentStatus,
	#[serde(default)]
	pub current_step: Option<u32>,
	#[serde(default)]
	pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultUpdate {
	pub agent_id: String,
	pub result: RunResult,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NavigationUpdate {
	pub agent_id: String,
	pub url: String,
	#[serde(default)]
	pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotUpdate {
	pub agent_id: String,
	pub screenshot: String,
	#[serde(default)]
	pub timestamp: Option<DateTime<Utc>>,
}

/// What subscribers receive. Pong never fans out; it only feeds the
/// liveness accounting inside the channel task.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
	Status(StatusUpdate),
	Log(LogEntry),
	Result(ResultUpdate),
	Navigation(NavigationUpdate),
	Screenshot(ScreenshotUpdate),
}

impl ChannelEvent {
	fn from_server(msg: ServerMessage) -> Option<Self> {
		match msg {
			ServerMessage::Pong => None,
			ServerMessage::AgentStatusUpdate(update) => Some(ChannelEvent::Status(update)),
			ServerMessage::AgentLogUpdate(entry) => Some(ChannelEvent::Log(entry)),
			ServerMessage::AgentResultUpdate(update) => Some(ChannelEvent::Result(update)),
			ServerMessage::AgentNavigationUpdate(update) => {
				Some(ChannelEvent::Navigation(update))
			}
			ServerMessage::AgentScreenshotUpdate(update) => {
				Some(ChannelEvent::Screenshot(update))
			}
		}
	}

	/// Subscribers filter on this even though the server is supposed to
	/// scope pushes to subscribed agents already.
	pub fn agent_id(&self) -> &str {
		match self {
			ChannelEvent::Status(u) => &u.agent_id,
			ChannelEvent::Log(entry) => &entry.agent_id,
			ChannelEvent::Result(u) => &u.agent_id,
			ChannelEvent::Navigation(u) => &u.agent_id,
			ChannelEvent::Screenshot(u) => &u.agent_id,
		}
	}
}

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
	Closed,
	Connecting,
	Open,
	/// Closed with a retry scheduled; `attempt` counts consecutive failures.
	Reconnecting { attempt: u32 },
}

/// Delay schedule between reconnect attempts:
/// base × min(growth^(attempt−1), cap) for the bounded attempts, then a
/// fixed long interval forever. Retries never stop on their own.
#[derive(Debug)]
struct Backoff {
	attempt: u32,
}

impl Backoff {
	fn new() -> Self {
		Self { attempt: 0 }
	}

	fn next_delay(&mut self) -> Duration {
		self.attempt = self.attempt.saturating_add(1);
		if self.attempt > BACKOFF_MAX_ATTEMPTS {
			return LONG_RETRY;
		}
		let factor = BACKOFF_GROWTH
			.saturating_pow(self.attempt - 1)
			.min(BACKOFF_CAP);
		BACKOFF_BASE * factor
	}

	fn reset(&mut self) {
		self.attempt = 0;
	}

	fn attempt(&self) -> u32 {
		self.attempt
	}
}

enum Command {
	Watch(String),
	Unwatch(String),
	Close,
}

enum Outcome {
	/// Locally requested shutdown; never reconnects.
	Intentional,
	/// Server sent a normal close code; treated as expected, no reconnect.
	RemoteNormal,
	/// Transport died or the server closed abnormally; reconnect.
	Lost,
}

enum Wait {
	Retry,
	Shutdown,
}

fn close_is_normal(frame: Option<&CloseFrame<'_>>) -> bool {
	frame.map(|f| f.code == CloseCode::Normal).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Channel handle
// ---------------------------------------------------------------------------

pub struct LiveChannel {
	cmd_tx: mpsc::UnboundedSender<Command>,
	events: broadcast::Sender<ChannelEvent>,
	status_rx: watch::Receiver<ChannelStatus>,
	task: tokio::task::JoinHandle<()>,
}

impl LiveChannel {
	/// Start connecting to the push endpoint and keep the connection alive
	/// until [`close`](Self::close) is called or the handle is dropped.
	pub fn open(url: Url) -> Self {
		let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
		let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
		let (status_tx, status_rx) = watch::channel(ChannelStatus::Connecting);
		let events = event_tx.clone();
		let task = tokio::spawn(run_channel(url, cmd_rx, event_tx, status_tx));
		Self {
			cmd_tx,
			events,
			status_rx,
			task,
		}
	}

	/// Intentional shutdown; suppresses any reconnect.
	pub fn close(&self) {
		let _ = self.cmd_tx.send(Command::Close);
	}

	/// Ask the server to scope pushes to this agent. Replayed automatically
	/// after every reconnect.
	pub fn watch_agent(&self, id: &str) {
		let _ = self.cmd_tx.send(Command::Watch(id.to_string()));
	}

	pub fn unwatch_agent(&self, id: &str) {
		let _ = self.cmd_tx.send(Command::Unwatch(id.to_string()));
	}

	pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
		self.events.subscribe()
	}

	pub fn status(&self) -> watch::Receiver<ChannelStatus> {
		self.status_rx.clone()
	}
}

impl Drop for LiveChannel {
	fn drop(&mut self) {
		self.task.abort();
	}
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

async fn run_channel(
	url: Url,
	mut commands: mpsc::UnboundedReceiver<Command>,
	events: broadcast::Sender<ChannelEvent>,
	status: watch::Sender<ChannelStatus>,
) {
	let mut backoff = Backoff::new();
	let mut watched: HashSet<String> = HashSet::new();

	loop {
		let _ = status.send(ChannelStatus::Connecting);
		let mut ws = match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.clone())).await
		{
			Ok(Ok((ws, _))) => ws,
			Ok(Err(err)) => {
				warn!("push channel connect failed: {err}");
				match wait_retry(&mut backoff, &mut commands, &mut watched, &status).await {
					Wait::Retry => continue,
					Wait::Shutdown => return,
				}
			}
			Err(_) => {
				warn!("push channel connect timed out after {CONNECT_TIMEOUT:?}");
				match wait_retry(&mut backoff, &mut commands, &mut watched, &status).await {
					Wait::Retry => continue,
					Wait::Shutdown => return,
				}
			}
		};

		backoff.reset();
		let _ = status.send(ChannelStatus::Open);
		info!("push channel open");

		// Replay the watch set so the server scopes pushes after a reconnect.
		let mut replay_failed = false;
		for id in &watched {
			let msg = ClientMessage::SubscribeToAgent(id.clone());
			if send_message(&mut ws, &msg).await.is_err() {
				replay_failed = true;
				break;
			}
		}
		if replay_failed {
			warn!("subscription replay failed, reconnecting");
			let _ = ws.close(None).await;
			match wait_retry(&mut backoff, &mut commands, &mut watched, &status).await {
				Wait::Retry => continue,
				Wait::Shutdown => return,
			}
		}

		let outcome = drive_socket(
			&mut ws,
			&mut commands,
			&mut watched,
			&events,
			&mut backoff,
		)
		.await;
		let _ = ws.close(None).await;

		match outcome {
			Outcome::Intentional => {
				let _ = status.send(ChannelStatus::Closed);
				info!("push channel closed");
				return;
			}
			Outcome::RemoteNormal => {
				let _ = status.send(ChannelStatus::Closed);
				info!("push channel closed by server");
				return;
			}
			Outcome::Lost => {
				match wait_retry(&mut backoff, &mut commands, &mut watched, &status).await {
					Wait::Retry => continue,
					Wait::Shutdown => return,
				}
			}
		}
	}
}

/// Inner loop while the socket is open: incoming frames, outgoing commands,
/// and the heartbeat, all multiplexed.
async fn drive_socket(
	ws: &mut WsStream,
	commands: &mut mpsc::UnboundedReceiver<Command>,
	watched: &mut HashSet<String>,
	events: &broadcast::Sender<ChannelEvent>,
	backoff: &mut Backoff,
) -> Outcome {
	let mut heartbeat = tokio::time::interval(PING_INTERVAL);

	loop {
		tokio::select! {
			msg = ws.next() => {
				match msg {
					Some(Ok(Message::Text(text))) => {
						match serde_json::from_str::<ServerMessage>(&text) {
							Ok(ServerMessage::Pong) => {
								// Liveness proof: the next outage backs off
								// from the start again.
								backoff.reset();
							}
							Ok(parsed) => {
								if let Some(event) = ChannelEvent::from_server(parsed) {
									// No receivers is fine; nobody is looking.
									let _ = events.send(event);
								}
							}
							Err(err) => {
								warn!("ignoring unparseable push message: {err}");
							}
						}
					}
					Some(Ok(Message::Close(frame))) => {
						if close_is_normal(frame.as_ref()) {
							return Outcome::RemoteNormal;
						}
						warn!("push channel closed abnormally: {frame:?}");
						return Outcome::Lost;
					}
					Some(Ok(_)) => {}
					Some(Err(err)) => {
						warn!("push channel read error: {err}");
						return Outcome::Lost;
					}
					None => return Outcome::Lost,
				}
			}
			cmd = commands.recv() => {
				match cmd {
					Some(Command::Watch(id)) => {
						if watched.insert(id.clone())
							&& send_message(ws, &ClientMessage::SubscribeToAgent(id))
								.await
								.is_err()
						{
							return Outcome::Lost;
						}
					}
					Some(Command::Unwatch(id)) => {
						if watched.remove(&id)
							&& send_message(ws, &ClientMessage::UnsubscribeToAgent(id))
								.await
								.is_err()
						{
							return Outcome::Lost;
						}
					}
					Some(Command::Close) | None => return Outcome::Intentional,
				}
			}
			_ = heartbeat.tick() => {
				// A failed ping means the transport is gone; take the
				// reconnect path instead of waiting for a read error.
				if send_message(ws, &ClientMessage::Ping).await.is_err() {
					warn!("heartbeat send failed, reconnecting");
					return Outcome::Lost;
				}
				debug!("heartbeat ping sent");
			}
		}
	}
}

/// Sit out the backoff delay. Watch-set changes are still recorded so the
/// replay after the next successful connect reflects them, and an
/// intentional close cancels the retry outright.
async fn wait_retry(
	backoff: &mut Backoff,
	commands: &mut mpsc::UnboundedReceiver<Command>,
	watched: &mut HashSet<String>,
	status: &watch::Sender<ChannelStatus>,
) -> Wait {
	let delay = backoff.next_delay();
	let _ = status.send(ChannelStatus::Reconnecting {
		attempt: backoff.attempt(),
	});
	debug!("retrying push channel in {delay:?}");
	let deadline = tokio::time::sleep(delay);
	tokio::pin!(deadline);
	loop {
		tokio::select! {
			_ = &mut deadline => return Wait::Retry,
			cmd = commands.recv() => match cmd {
				Some(Command::Watch(id)) => { watched.insert(id); }
				Some(Command::Unwatch(id)) => { watched.remove(&id); }
				Some(Command::Close) | None => {
					let _ = status.send(ChannelStatus::Closed);
					return Wait::Shutdown;
				}
			},
		}
	}
}

async fn send_message(
	ws: &mut WsStream,
	msg: &ClientMessage,
) -> std::result::Result<(), tokio_tungstenite::tungstenite::Error> {
	let text = match serde_json::to_string(msg) {
		Ok(text) => text,
		Err(err) => {
			warn!("failed to encode control message: {err}");
			return Ok(());
		}
	};
	ws.send(Message::Text(text)).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::LogLevel;

	#[test]
	fn test_backoff_follows_capped_exponential() {
		let mut backoff = Backoff::new();
		let secs: Vec<u64> = (0..10).map(|_| backoff.next_delay().as_secs()).collect();
		// 2^(n-1) capped at 30, then the fixed long interval.
		assert_eq!(secs, vec![1, 2, 4, 8, 16, 30, 30, 30, 60, 60]);
	}

	#[test]
	fn test_backoff_reset_restarts_at_base() {
		let mut backoff = Backoff::new();
		backoff.next_delay();
		backoff.next_delay();
		backoff.next_delay();
		assert_eq!(backoff.attempt(), 3);
		backoff.reset();
		assert_eq!(backoff.next_delay(), Duration::from_secs(1));
	}

	#[test]
	fn test_client_message_wire_format() {
		let ping = serde_json::to_value(&ClientMessage::Ping).unwrap();
		assert_eq!(ping, serde_json::json!({"event": "ping"}));

		let sub = serde_json::to_value(&ClientMessage::SubscribeToAgent("a7".into())).unwrap();
		assert_eq!(
			sub,
			serde_json::json!({"event": "subscribe-to-agent", "data": "a7"})
		);

		let unsub =
			serde_json::to_value(&ClientMessage::UnsubscribeToAgent("a7".into())).unwrap();
		assert_eq!(
			unsub,
			serde_json::json!({"event": "unsubscribe-to-agent", "data": "a7"})
		);
	}

	#[test]
	fn test_server_status_update_parses() {
		let raw = r#"{
			"event": "agent-status-update",
			"data": {"agentId": "a1", "status": "RUNNING", "currentStep": 4}
		}"#;
		let msg: ServerMessage = serde_json::from_str(raw).unwrap();
		match msg {
			ServerMessage::AgentStatusUpdate(update) => {
				assert_eq!(update.agent_id, "a1");
				assert_eq!(update.status, AgentStatus::Running);
				assert_eq!(update.current_step, Some(4));
			}
			other => panic!("unexpected message: {other:?}"),
		}
	}

	#[test]
	fn test_server_log_update_parses_full_entry() {
		let raw = r#"{
			"event": "agent-log-update",
			"data": {
				"id": 42,
				"agentId": "a1",
				"step": 3,
				"timestamp": "2025-03-01T12:00:00Z",
				"level": "action",
				"message": "clicked the login button",
				"url": "https://example.com/login"
			}
		}"#;
		let msg: ServerMessage = serde_json::from_str(raw).unwrap();
		match msg {
			ServerMessage::AgentLogUpdate(entry) => {
				assert_eq!(entry.id, 42);
				assert_eq!(entry.level, LogLevel::Action);
				assert_eq!(entry.url.as_deref(), Some("https://example.com/login"));
			}
			other => panic!("unexpected message: {other:?}"),
		}
	}

	#[test]
	fn test_unknown_event_is_an_error_not_a_panic() {
		let raw = r#"{"event": "agent-telemetry-update", "data": {}}"#;
		assert!(serde_json::from_str::<ServerMessage>(raw).is_err());
	}

	#[test]
	fn test_pong_never_fans_out() {
		assert!(ChannelEvent::from_server(ServerMessage::Pong).is_none());
	}

	#[test]
	fn test_event_exposes_agent_id_for_filtering() {
		let raw = r#"{
			"event": "agent-navigation-update",
			"data": {"agentId": "a9", "url": "https://example.com"}
		}"#;
		let msg: ServerMessage = serde_json::from_str(raw).unwrap();
		let event = ChannelEvent::from_server(msg).unwrap();
		assert_eq!(event.agent_id(), "a9");
	}

	#[test]
	fn test_close_code_classification() {
		assert!(close_is_normal(Some(&CloseFrame {
			code: CloseCode::Normal,
			reason: "".into(),
		})));
		assert!(!close_is_normal(Some(&CloseFrame {
			code: CloseCode::Away,
			reason: "".into(),
		})));
		// A close without a frame is not an expected shutdown.
		assert!(!close_is_normal(None));
	}

	#[test]
	fn test_websocket_url_strips_version_and_swaps_scheme() {
		let url = websocket_url("http://localhost:8000/api/v1").unwrap();
		assert_eq!(url.as_str(), "ws://localhost:8000/api/ws");

		let url = websocket_url("https://agents.example.com/api/v2/").unwrap();
		assert_eq!(url.as_str(), "wss://agents.example.com/api/ws");

		let url = websocket_url("http://10.0.0.5:9090/api").unwrap();
		assert_eq!(url.as_str(), "ws://10.0.0.5:9090/api/ws");
	}

	#[tokio::test]
	async fn test_close_while_waiting_shuts_down_cleanly() {
		// Nothing listens on this port, so the first connect fails and the
		// channel parks in its retry wait; close() must end it from there.
		let url = Url::parse("ws://127.0.0.1:1/api/ws").unwrap();
		let channel = LiveChannel::open(url);
		let mut status = channel.status();

		let waiting = tokio::time::timeout(Duration::from_secs(15), async {
			loop {
				status.changed().await.unwrap();
				if matches!(*status.borrow(), ChannelStatus::Reconnecting { .. }) {
					break;
				}
			}
		})
		.await;
		assert!(waiting.is_ok(), "channel never reached the retry wait");

		channel.close();
		let closed = tokio::time::timeout(Duration::from_secs(5), async {
			loop {
				status.changed().await.unwrap();
				if *status.borrow() == ChannelStatus::Closed {
					break;
				}
			}
		})
		.await;
		assert!(closed.is_ok(), "close did not shut the channel down");
	}
}

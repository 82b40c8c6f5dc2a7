use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slug::slugify;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentStatus {
	Pending,
	Running,
	Completed,
	Failed,
	Paused,
	Stopped,
	Idle,
}

impl AgentStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			AgentStatus::Pending => "PENDING",
			AgentStatus::Running => "RUNNING",
			AgentStatus::Completed => "COMPLETED",
			AgentStatus::Failed => "FAILED",
			AgentStatus::Paused => "PAUSED",
			AgentStatus::Stopped => "STOPPED",
			AgentStatus::Idle => "IDLE",
		}
	}

	/// Running, pending, and paused agents still hold a browser session.
	pub fn is_active(&self) -> bool {
		matches!(
			self,
			AgentStatus::Running | AgentStatus::Pending | AgentStatus::Paused
		)
	}

	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			AgentStatus::Completed | AgentStatus::Failed | AgentStatus::Stopped
		)
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewportProfile {
	Mobile,
	Tablet,
	#[default]
	Pc,
}

impl ViewportProfile {
	pub fn as_str(&self) -> &'static str {
		match self {
			ViewportProfile::Mobile => "mobile",
			ViewportProfile::Tablet => "tablet",
			ViewportProfile::Pc => "pc",
		}
	}
}

impl std::str::FromStr for ViewportProfile {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"mobile" => Ok(ViewportProfile::Mobile),
			"tablet" => Ok(ViewportProfile::Tablet),
			"pc" | "desktop" => Ok(ViewportProfile::Pc),
			other => Err(format!("unknown viewport: {other} (mobile, tablet, pc)")),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
	pub id: String,
	pub task: String,
	pub status: AgentStatus,
	// The backend calls this field llmModel; inside roost it is just the model.
	#[serde(rename = "llmModel")]
	pub model: String,
	#[serde(default = "default_max_steps")]
	pub max_steps: u32,
	#[serde(default = "default_headless")]
	pub headless: bool,
	#[serde(default)]
	pub use_vision: bool,
	#[serde(default)]
	pub generate_gif: bool,
	#[serde(default)]
	pub browser_viewport: ViewportProfile,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub current_step: Option<u32>,
	// Summary metrics the list endpoint includes for finished runs.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub execution_time_ms: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tokens_used: Option<i64>,
}

fn default_max_steps() -> u32 {
	25
}

fn default_headless() -> bool {
	true
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
	pub task: String,
	#[serde(rename = "llmModel")]
	pub model: String,
	pub max_steps: u32,
	pub headless: bool,
	pub use_vision: bool,
	pub generate_gif: bool,
	pub browser_viewport: ViewportProfile,
}

impl CreateAgentRequest {
	pub fn new(task: impl Into<String>, model: impl Into<String>) -> Self {
		Self {
			task: task.into(),
			model: model.into(),
			max_steps: default_max_steps(),
			headless: default_headless(),
			use_vision: false,
			generate_gif: false,
			browser_viewport: ViewportProfile::default(),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentRequest {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub task: Option<String>,
	#[serde(rename = "llmModel", skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_steps: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub headless: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub use_vision: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub generate_gif: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub browser_viewport: Option<ViewportProfile>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Info,
	Action,
	Warning,
	Error,
	Debug,
}

impl LogLevel {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogLevel::Info => "info",
			LogLevel::Action => "action",
			LogLevel::Warning => "warning",
			LogLevel::Error => "error",
			LogLevel::Debug => "debug",
		}
	}
}

impl std::str::FromStr for LogLevel {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"info" => Ok(LogLevel::Info),
			"action" => Ok(LogLevel::Action),
			"warning" | "warn" => Ok(LogLevel::Warning),
			"error" => Ok(LogLevel::Error),
			"debug" => Ok(LogLevel::Debug),
			other => Err(format!(
				"unknown level: {other} (info, action, warning, error, debug)"
			)),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
	pub id: i64,
	pub agent_id: String,
	pub step: u32,
	pub timestamp: DateTime<Utc>,
	pub level: LogLevel,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	// Inline base64 image or a server-relative file path.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub screenshot: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
	pub summary: String,
	pub text: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub html: Option<String>,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
	Image,
	Video,
	Gif,
	Json,
	Text,
	Html,
	Screenshot,
	#[serde(other)]
	Other,
}

impl ArtifactKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ArtifactKind::Image => "image",
			ArtifactKind::Video => "video",
			ArtifactKind::Gif => "gif",
			ArtifactKind::Json => "json",
			ArtifactKind::Text => "text",
			ArtifactKind::Html => "html",
			ArtifactKind::Screenshot => "screenshot",
			ArtifactKind::Other => "other",
		}
	}
}

impl std::str::FromStr for ArtifactKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"image" => Ok(ArtifactKind::Image),
			"video" => Ok(ArtifactKind::Video),
			"gif" => Ok(ArtifactKind::Gif),
			"json" => Ok(ArtifactKind::Json),
			"text" => Ok(ArtifactKind::Text),
			"html" => Ok(ArtifactKind::Html),
			"screenshot" => Ok(ArtifactKind::Screenshot),
			other => Err(format!("unknown artifact type: {other}")),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
	#[serde(rename = "type")]
	pub kind: ArtifactKind,
	pub url: String,
	pub filename: String,
	pub content_type: String,
	pub size: u64,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
	#[serde(default)]
	pub duration: f64,
	#[serde(default)]
	pub duration_formatted: String,
	#[serde(default)]
	pub pages_visited: u32,
	#[serde(default)]
	pub steps_completed: u32,
	#[serde(default)]
	pub tokens_used: i64,
}

/// Shortest instruction the backend accepts; checked locally before any call.
pub const MIN_TASK_LEN: usize = 10;

pub fn task_too_short(task: &str) -> bool {
	task.trim().chars().count() < MIN_TASK_LEN
}

/// Placeholder id shown while a create call is in flight; the entry is
/// replaced wholesale once the server responds with its own id.
pub fn placeholder_id(task: &str) -> String {
	let stem: String = task.chars().take(24).collect();
	format!("local-{}-{}", slugify(stem), Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_wire_format_is_uppercase() {
		let json = serde_json::to_string(&AgentStatus::Running).unwrap();
		assert_eq!(json, "\"RUNNING\"");
		let back: AgentStatus = serde_json::from_str("\"STOPPED\"").unwrap();
		assert_eq!(back, AgentStatus::Stopped);
	}

	#[test]
	fn test_status_categories() {
		assert!(AgentStatus::Running.is_active());
		assert!(AgentStatus::Pending.is_active());
		assert!(AgentStatus::Paused.is_active());
		assert!(!AgentStatus::Idle.is_active());
		assert!(AgentStatus::Failed.is_terminal());
		assert!(AgentStatus::Stopped.is_terminal());
		assert!(!AgentStatus::Running.is_terminal());
	}

	#[test]
	fn test_create_request_uses_backend_model_field() {
		let req = CreateAgentRequest::new("Find the cheapest flight to Tokyo", "gpt-4o");
		let json = serde_json::to_string(&req).unwrap();
		assert!(json.contains("\"llmModel\":\"gpt-4o\""));
		assert!(!json.contains("\"model\""));
	}

	#[test]
	fn test_agent_tolerates_missing_optional_fields() {
		let json = r#"{
			"id": "a1",
			"task": "Check the weather in Berlin",
			"status": "PENDING",
			"llmModel": "gpt-4o",
			"createdAt": "2025-03-01T12:00:00Z"
		}"#;
		let agent: Agent = serde_json::from_str(json).unwrap();
		assert_eq!(agent.max_steps, 25);
		assert!(agent.headless);
		assert_eq!(agent.browser_viewport, ViewportProfile::Pc);
		assert!(agent.current_step.is_none());
	}

	#[test]
	fn test_unknown_artifact_kind_maps_to_other() {
		let kind: ArtifactKind = serde_json::from_str("\"har\"").unwrap();
		assert_eq!(kind, ArtifactKind::Other);
	}

	#[test]
	fn test_task_length_gate() {
		assert!(task_too_short("too short"));
		assert!(task_too_short("   spaces   "));
		assert!(!task_too_short("Search GitHub for trending Rust repos"));
	}

	#[test]
	fn test_placeholder_id_is_sluggy() {
		let id = placeholder_id("Search GitHub for trending Rust repos and list the top 5");
		assert!(id.starts_with("local-search-github-for"));
		assert!(!id.contains(' '));
	}
}

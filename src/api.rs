use crate::model::{
	Agent, AgentStats, AgentStatus, Artifact, ArtifactKind, CreateAgentRequest, LogEntry,
	LogLevel, RunResult, UpdateAgentRequest,
};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const API_KEY_HEADER: &str = "X-API-Key";

const USER_AGENT: &str = concat!("roost/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ApiError {
	#[error("backend unreachable: {0}")]
	Network(#[source] reqwest::Error),
	#[error("malformed response: {0}")]
	InvalidResponse(String),
	#[error("operation failed ({status}): {message}")]
	OperationFailed { status: u16, message: String },
	#[error("not found")]
	NotFound,
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Uniform wrapper every endpoint responds with.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
	status: String,
	#[serde(default)]
	code: Option<i64>,
	#[serde(default)]
	message: Option<String>,
	data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentPage {
	// Some backend builds nest the array under "items"; both decode to `agents`.
	#[serde(alias = "items")]
	pub agents: Vec<Agent>,
	#[serde(default)]
	pub total: u64,
	#[serde(default)]
	pub limit: u32,
	#[serde(default)]
	pub offset: u32,
}

impl AgentPage {
	pub fn empty() -> Self {
		Self {
			agents: Vec::new(),
			total: 0,
			limit: 0,
			offset: 0,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogPage {
	#[serde(alias = "items")]
	pub logs: Vec<LogEntry>,
	#[serde(default)]
	pub total: u64,
	#[serde(default)]
	pub limit: u32,
	#[serde(default)]
	pub offset: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
	pub limit: Option<u32>,
	pub offset: Option<u32>,
	pub status: Option<AgentStatus>,
	pub sort: Option<String>,
	pub order: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LogQuery {
	pub limit: Option<u32>,
	pub offset: Option<u32>,
	pub level: Option<LogLevel>,
	pub sort: Option<String>,
	pub order: Option<String>,
}

#[derive(Debug, Serialize)]
struct VerifyCredentialsRequest<'a> {
	service: &'a str,
	username: &'a str,
	password: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyCredentialsResponse {
	#[serde(default)]
	valid: bool,
}

#[derive(Clone)]
pub struct ApiClient {
	http: reqwest::Client,
	// e.g. http://localhost:8000/api/v1, stored without a trailing slash.
	base_url: String,
	// Scheme + authority only, for resolving server-relative artifact URLs.
	origin: String,
	api_key: String,
}

impl ApiClient {
	pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
		let base_url = base_url.trim_end_matches('/').to_string();
		let parsed = Url::parse(&base_url)
			.with_context(|| format!("invalid API base URL: {base_url}"))?;
		let origin = parsed.origin().ascii_serialization();
		let http = reqwest::Client::builder()
			.user_agent(USER_AGENT)
			.timeout(REQUEST_TIMEOUT)
			.build()
			.context("failed to build HTTP client")?;
		Ok(Self {
			http,
			base_url,
			origin,
			api_key: api_key.trim().to_string(),
		})
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	fn endpoint(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	async fn send(&self, req: reqwest::RequestBuilder) -> ApiResult<reqwest::Response> {
		req.header(API_KEY_HEADER, &self.api_key)
			.send()
			.await
			.map_err(ApiError::Network)
	}

	/// Decode the body into the uniform envelope and apply the error mapping:
	/// 404 becomes NotFound, other non-2xx becomes OperationFailed with the
	/// HTTP status, an envelope reporting "error" becomes OperationFailed, and
	/// anything that is not a recognizable envelope becomes InvalidResponse.
	async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> ApiResult<Option<T>> {
		let status = resp.status();
		if status == StatusCode::NOT_FOUND {
			return Err(ApiError::NotFound);
		}
		if !status.is_success() {
			let body = resp.text().await.unwrap_or_default();
			return Err(ApiError::OperationFailed {
				status: status.as_u16(),
				message: failure_message(status, &body),
			});
		}
		let envelope: Envelope<T> = resp
			.json()
			.await
			.map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
		check_envelope(status, envelope)
	}

	async fn request<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> ApiResult<T> {
		let resp = self.send(req).await?;
		Self::decode(resp).await?.ok_or_else(|| {
			ApiError::InvalidResponse("success envelope carried no data".to_string())
		})
	}

	async fn request_unit(&self, req: reqwest::RequestBuilder) -> ApiResult<()> {
		let resp = self.send(req).await?;
		Self::decode::<serde_json::Value>(resp).await.map(|_| ())
	}

	/// List agents, degrading to an empty page on any failure so the caller
	/// always has something renderable. The failure is logged, not swallowed
	/// silently; use [`try_list_agents`](Self::try_list_agents) to observe it.
	pub async fn list_agents(&self, filter: &ListFilter) -> AgentPage {
		match self.try_list_agents(filter).await {
			Ok(page) => page,
			Err(err) => {
				warn!("agent list fetch failed, rendering empty: {err}");
				AgentPage::empty()
			}
		}
	}

	pub async fn try_list_agents(&self, filter: &ListFilter) -> ApiResult<AgentPage> {
		debug!(?filter, "listing agents");
		let req = self
			.http
			.get(self.endpoint("/agents"))
			.query(&list_query(filter));
		self.request(req).await
	}

	pub async fn get_agent(&self, id: &str) -> ApiResult<Agent> {
		let req = self.http.get(self.endpoint(&format!("/agents/{id}")));
		self.request(req).await
	}

	pub async fn create_agent(&self, request: &CreateAgentRequest) -> ApiResult<Agent> {
		let req = self.http.post(self.endpoint("/agents")).json(request);
		self.request(req).await
	}

	pub async fn update_agent(&self, id: &str, patch: &UpdateAgentRequest) -> ApiResult<Agent> {
		let req = self
			.http
			.patch(self.endpoint(&format!("/agents/{id}")))
			.json(patch);
		self.request(req).await
	}

	pub async fn delete_agent(&self, id: &str) -> ApiResult<()> {
		let req = self.http.delete(self.endpoint(&format!("/agents/{id}")));
		self.request_unit(req).await
	}

	async fn agent_action(&self, id: &str, action: &str) -> ApiResult<Agent> {
		debug!(id, action, "issuing agent action");
		let req = self
			.http
			.post(self.endpoint(&format!("/agents/{id}/{action}")));
		self.request(req).await
	}

	pub async fn start_agent(&self, id: &str) -> ApiResult<Agent> {
		self.agent_action(id, "start").await
	}

	pub async fn stop_agent(&self, id: &str) -> ApiResult<Agent> {
		self.agent_action(id, "stop").await
	}

	pub async fn pause_agent(&self, id: &str) -> ApiResult<Agent> {
		self.agent_action(id, "pause").await
	}

	pub async fn resume_agent(&self, id: &str) -> ApiResult<Agent> {
		self.agent_action(id, "resume").await
	}

	pub async fn get_agent_logs(&self, id: &str, query: &LogQuery) -> ApiResult<LogPage> {
		let req = self
			.http
			.get(self.endpoint(&format!("/agents/{id}/logs")))
			.query(&log_query(query));
		self.request(req).await
	}

	/// A completed run has at most one result; absence is a valid state here,
	/// so a 404 resolves to `Ok(None)` rather than an error.
	pub async fn get_agent_results(&self, id: &str) -> ApiResult<Option<RunResult>> {
		let req = self.http.get(self.endpoint(&format!("/agents/{id}/results")));
		let resp = self.send(req).await?;
		absent_as_none(Self::decode(resp).await)
	}

	/// Absence (404 or empty data) is a valid state: an empty list comes back.
	pub async fn get_agent_artifacts(
		&self,
		id: &str,
		kind: Option<ArtifactKind>,
	) -> ApiResult<Vec<Artifact>> {
		let mut req = self.http.get(self.endpoint(&format!("/agents/{id}/artifacts")));
		if let Some(kind) = kind {
			req = req.query(&[("type", kind.as_str())]);
		}
		let resp = self.send(req).await?;
		Ok(absent_as_none(Self::decode(resp).await)?.unwrap_or_default())
	}

	pub async fn get_agent_stats(&self, id: &str) -> ApiResult<AgentStats> {
		let req = self.http.get(self.endpoint(&format!("/agents/{id}/stats")));
		self.request(req).await
	}

	/// Liveness probe. Never errors; any failure is just `false`.
	pub async fn test_connection(&self) -> bool {
		let filter = ListFilter {
			limit: Some(1),
			..Default::default()
		};
		self.try_list_agents(&filter).await.is_ok()
	}

	pub async fn verify_credentials(
		&self,
		service: &str,
		username: &str,
		password: &str,
	) -> ApiResult<bool> {
		let body = VerifyCredentialsRequest {
			service,
			username,
			password,
		};
		let req = self
			.http
			.post(self.endpoint("/credentials/verify"))
			.json(&body);
		let resp: VerifyCredentialsResponse = self.request(req).await?;
		Ok(resp.valid)
	}

	/// Fetch an artifact and write it under `dest_dir`, returning the path.
	pub async fn download_artifact(
		&self,
		artifact: &Artifact,
		dest_dir: &Path,
	) -> Result<PathBuf> {
		let target = resolve_artifact_url(&self.origin, &artifact.url);
		let resp = self
			.send(self.http.get(&target))
			.await
			.with_context(|| format!("failed to fetch artifact from {target}"))?;
		let status = resp.status();
		if !status.is_success() {
			anyhow::bail!("artifact download failed with status {status}");
		}
		let bytes = resp
			.bytes()
			.await
			.context("failed to read artifact body")?;

		fs::create_dir_all(dest_dir)
			.with_context(|| format!("failed to create {}", dest_dir.display()))?;
		let name = if artifact.filename.is_empty() {
			target
				.rsplit('/')
				.next()
				.filter(|s| !s.is_empty())
				.unwrap_or("artifact")
				.to_string()
		} else {
			artifact.filename.clone()
		};
		let safe_name = name.replace(['/', '\\'], "_").replace("..", "_");
		let path = dest_dir.join(safe_name);
		fs::write(&path, &bytes)
			.with_context(|| format!("failed to write {}", path.display()))?;
		Ok(path)
	}
}

/// Failure text for a non-2xx body: the envelope message when the body
/// parses as one, else the raw body clipped to 200 chars, else the status
/// line when the body is empty.
fn failure_message(status: StatusCode, body: &str) -> String {
	serde_json::from_str::<Envelope<serde_json::Value>>(body)
		.ok()
		.and_then(|env| env.message)
		.unwrap_or_else(|| {
			if body.is_empty() {
				status.to_string()
			} else {
				body.chars().take(200).collect()
			}
		})
}

fn check_envelope<T>(http_status: StatusCode, envelope: Envelope<T>) -> ApiResult<Option<T>> {
	match envelope.status.as_str() {
		"success" => Ok(envelope.data),
		"error" => {
			let mut message = envelope
				.message
				.unwrap_or_else(|| "backend reported an error".to_string());
			if let Some(code) = envelope.code {
				message = format!("{message} (code {code})");
			}
			Err(ApiError::OperationFailed {
				status: http_status.as_u16(),
				message,
			})
		}
		other => Err(ApiError::InvalidResponse(format!(
			"unexpected envelope status {other:?}"
		))),
	}
}

/// 404 means "nothing there yet" for results and artifacts, not a failure.
fn absent_as_none<T>(res: ApiResult<Option<T>>) -> ApiResult<Option<T>> {
	match res {
		Err(ApiError::NotFound) => Ok(None),
		other => other,
	}
}

fn list_query(filter: &ListFilter) -> Vec<(&'static str, String)> {
	let mut params = Vec::new();
	if let Some(limit) = filter.limit {
		params.push(("limit", limit.to_string()));
	}
	if let Some(offset) = filter.offset {
		params.push(("offset", offset.to_string()));
	}
	if let Some(status) = filter.status {
		params.push(("status", status.as_str().to_string()));
	}
	if let Some(sort) = &filter.sort {
		params.push(("sort", sort.clone()));
	}
	if let Some(order) = &filter.order {
		params.push(("order", order.clone()));
	}
	params
}

fn log_query(query: &LogQuery) -> Vec<(&'static str, String)> {
	let mut params = Vec::new();
	if let Some(limit) = query.limit {
		params.push(("limit", limit.to_string()));
	}
	if let Some(offset) = query.offset {
		params.push(("offset", offset.to_string()));
	}
	if let Some(level) = query.level {
		params.push(("level", level.as_str().to_string()));
	}
	if let Some(sort) = &query.sort {
		params.push(("sort", sort.clone()));
	}
	if let Some(order) = &query.order {
		params.push(("order", order.clone()));
	}
	params
}

fn resolve_artifact_url(origin: &str, raw: &str) -> String {
	if raw.starts_with("http://") || raw.starts_with("https://") {
		raw.to_string()
	} else if raw.starts_with('/') {
		format!("{origin}{raw}")
	} else {
		format!("{origin}/{raw}")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_client_construction_strips_trailing_slash() {
		let client = ApiClient::new("http://localhost:8000/api/v1/", "key").unwrap();
		assert_eq!(client.base_url(), "http://localhost:8000/api/v1");
		assert_eq!(client.origin, "http://localhost:8000");
	}

	#[test]
	fn test_client_construction_rejects_garbage() {
		assert!(ApiClient::new("not a url", "key").is_err());
	}

	#[test]
	fn test_page_accepts_items_alias() {
		let json = r#"{
			"status": "success",
			"data": {
				"items": [{
					"id": "a1",
					"task": "Collect all prices from the landing page",
					"status": "RUNNING",
					"llmModel": "gpt-4o",
					"createdAt": "2025-03-01T12:00:00Z"
				}],
				"total": 1,
				"limit": 20,
				"offset": 0
			}
		}"#;
		let env: Envelope<AgentPage> = serde_json::from_str(json).unwrap();
		let page = check_envelope(StatusCode::OK, env).unwrap().unwrap();
		assert_eq!(page.agents.len(), 1);
		assert_eq!(page.agents[0].id, "a1");
		assert_eq!(page.total, 1);
	}

	#[test]
	fn test_page_accepts_agents_key() {
		let json = r#"{"agents": [], "total": 0, "limit": 20, "offset": 0}"#;
		let page: AgentPage = serde_json::from_str(json).unwrap();
		assert!(page.agents.is_empty());
	}

	#[test]
	fn test_error_envelope_maps_to_operation_failed() {
		let json = r#"{"status": "error", "code": 422, "message": "task is required"}"#;
		let env: Envelope<AgentPage> = serde_json::from_str(json).unwrap();
		let err = check_envelope(StatusCode::OK, env).unwrap_err();
		match err {
			ApiError::OperationFailed { status, message } => {
				assert_eq!(status, 200);
				assert!(message.contains("task is required"));
				assert!(message.contains("422"));
			}
			other => panic!("expected OperationFailed, got {other:?}"),
		}
	}

	#[test]
	fn test_unknown_envelope_status_is_invalid_response() {
		let json = r#"{"status": "partial", "data": null}"#;
		let env: Envelope<serde_json::Value> = serde_json::from_str(json).unwrap();
		let err = check_envelope(StatusCode::OK, env).unwrap_err();
		assert!(matches!(err, ApiError::InvalidResponse(_)));
	}

	#[test]
	fn test_failure_message_prefers_envelope_message() {
		let body = r#"{"status": "error", "message": "agent limit reached"}"#;
		let msg = failure_message(StatusCode::UNPROCESSABLE_ENTITY, body);
		assert_eq!(msg, "agent limit reached");
	}

	#[test]
	fn test_failure_message_clips_raw_body() {
		let body = "<html>upstream gateway choked</html>".repeat(20);
		let msg = failure_message(StatusCode::BAD_GATEWAY, &body);
		assert_eq!(msg.chars().count(), 200);
		assert!(msg.starts_with("<html>"));
	}

	#[test]
	fn test_failure_message_falls_back_to_status_line() {
		let msg = failure_message(StatusCode::INTERNAL_SERVER_ERROR, "");
		assert_eq!(msg, "500 Internal Server Error");
	}

	#[test]
	fn test_absent_as_none_converts_not_found_only() {
		let absent: ApiResult<Option<RunResult>> = Err(ApiError::NotFound);
		assert!(matches!(absent_as_none(absent), Ok(None)));

		let hard: ApiResult<Option<RunResult>> = Err(ApiError::OperationFailed {
			status: 500,
			message: "boom".to_string(),
		});
		assert!(absent_as_none(hard).is_err());
	}

	#[test]
	fn test_list_query_includes_only_set_fields() {
		let filter = ListFilter {
			limit: Some(20),
			status: Some(AgentStatus::Running),
			..Default::default()
		};
		let params = list_query(&filter);
		assert_eq!(
			params,
			vec![
				("limit", "20".to_string()),
				("status", "RUNNING".to_string())
			]
		);
	}

	#[test]
	fn test_log_query_serializes_level_lowercase() {
		let query = LogQuery {
			level: Some(LogLevel::Warning),
			..Default::default()
		};
		let params = log_query(&query);
		assert_eq!(params, vec![("level", "warning".to_string())]);
	}

	#[test]
	fn test_resolve_artifact_url() {
		assert_eq!(
			resolve_artifact_url("http://api.test", "/files/run.gif"),
			"http://api.test/files/run.gif"
		);
		assert_eq!(
			resolve_artifact_url("http://api.test", "files/run.gif"),
			"http://api.test/files/run.gif"
		);
		assert_eq!(
			resolve_artifact_url("http://api.test", "https://cdn.test/run.gif"),
			"https://cdn.test/run.gif"
		);
	}
}

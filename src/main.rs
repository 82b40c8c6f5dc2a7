mod api;
mod channel;
mod config;
mod credentials;
mod detection;
mod model;
mod notify;
mod store;

use anyhow::{Context, Result};
use api::{AgentPage, ApiClient, ApiResult, ListFilter, LogPage, LogQuery};
use channel::{websocket_url, ChannelEvent, ChannelStatus, LiveChannel};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use config::Config;
use credentials::{Credential, CredentialStore};
use crossterm::{
	event::{self, Event, KeyCode, KeyEventKind},
	execute,
	terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use detection::{default_triage, triage_logs, Attention};
use model::{
	Agent, AgentStats, AgentStatus, ArtifactKind, CreateAgentRequest, LogLevel, RunResult,
	UpdateAgentRequest, ViewportProfile,
};
use ratatui::{
	prelude::*,
	text::{Line, Text},
	widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::collections::HashMap;
use std::io::stdout;
use std::path::Path;
use std::time::{Duration, Instant};
use store::{AgentStore, LogBuffer, SortOrder, StatusFilter, ViewOptions};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roost")]
#[command(about = "Terminal dashboard for remote browser-automation agents")]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
	/// Print the agent list
	Status {
		/// Emit JSON instead of a table
		#[arg(long, default_value_t = false)]
		json: bool,
	},
	/// Check that the backend answers
	Ping,
	/// Show or change the backend connection settings
	Config {
		/// New backend base URL
		#[arg(long)]
		url: Option<String>,
		/// New API key; use ROOST_API_KEY instead to keep it out of the file
		#[arg(long)]
		key: Option<String>,
	},
	/// Create a new agent
	New {
		/// What the agent should do (at least 10 characters)
		task: String,
		/// Model that drives the agent (defaults to config)
		#[arg(long)]
		model: Option<String>,
		/// Step budget for the run
		#[arg(long)]
		max_steps: Option<u32>,
		/// Run with a visible browser window
		#[arg(long, default_value_t = false)]
		headed: bool,
		/// Let the model see page screenshots
		#[arg(long, default_value_t = false)]
		vision: bool,
		/// Record an animated gif of the run
		#[arg(long, default_value_t = false)]
		gif: bool,
		/// Browser viewport: mobile, tablet or pc
		#[arg(long, default_value = "pc")]
		viewport: ViewportProfile,
		/// Start the agent right after creating it
		#[arg(long, default_value_t = false)]
		start: bool,
	},
	/// Change settings of an agent that has not finished
	Edit {
		id: String,
		/// Replace the task text
		#[arg(long)]
		task: Option<String>,
		/// Switch the model that drives the agent
		#[arg(long)]
		model: Option<String>,
		/// Change the step budget
		#[arg(long)]
		max_steps: Option<u32>,
	},
	/// Start an agent
	Start { id: String },
	/// Stop an agent
	Stop { id: String },
	/// Pause a running agent
	Pause { id: String },
	/// Resume a paused agent
	Resume { id: String },
	/// Delete an agent
	Delete { id: String },
	/// Print logs for an agent
	Logs {
		id: String,
		/// Only entries at this level (info, action, warning, error, debug)
		#[arg(long)]
		level: Option<LogLevel>,
		#[arg(long)]
		limit: Option<u32>,
	},
	/// Print the result of a finished run
	Results { id: String },
	/// List or download run artifacts
	Artifacts {
		id: String,
		/// Filter by artifact type
		#[arg(long)]
		kind: Option<ArtifactKind>,
		/// Download everything listed into the downloads directory
		#[arg(long, default_value_t = false)]
		download: bool,
	},
	/// Print run statistics
	Stats { id: String },
	/// Stream live events for an agent to stdout
	Watch { id: String },
	/// Verify a stored credential against the backend
	Verify {
		service: String,
		/// Defaults to the active credential for the service
		#[arg(long)]
		username: Option<String>,
	},
	/// Manage site credentials
	Credentials {
		#[command(subcommand)]
		action: CredentialsAction,
	},
}

#[derive(Subcommand)]
enum CredentialsAction {
	/// Store a credential and make it the active one for its service
	Add {
		service: String,
		username: String,
		password: String,
	},
	/// List stored credentials
	List,
	/// Remove a stored credential
	Remove { service: String, username: String },
	/// Make a stored credential the active one for its service
	Use { service: String, username: String },
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	init_logging(cli.command.is_none())?;
	let cfg = config::load_or_init().context("failed to load config")?;

	// Config and credential management only touch local files; they run
	// before the client exists so a broken base_url can still be fixed.
	let command = match cli.command {
		Some(Commands::Config { url, key }) => return handle_config(url, key),
		Some(Commands::Credentials { action }) => return handle_credentials(action),
		command => command,
	};

	let client = ApiClient::new(&cfg.api.base_url, &cfg.api.api_key)?;

	match command {
		Some(Commands::Status { json }) => handle_status(&client, &cfg, json).await,
		Some(Commands::Ping) => handle_ping(&client).await,
		Some(Commands::New {
			task,
			model,
			max_steps,
			headed,
			vision,
			gif,
			viewport,
			start,
		}) => {
			handle_new(
				&client, &cfg, task, model, max_steps, headed, vision, gif, viewport, start,
			)
			.await
		}
		Some(Commands::Edit {
			id,
			task,
			model,
			max_steps,
		}) => handle_edit(&client, &id, task, model, max_steps).await,
		Some(Commands::Start { id }) => report_action(client.start_agent(&id).await, "Started"),
		Some(Commands::Stop { id }) => report_action(client.stop_agent(&id).await, "Stopped"),
		Some(Commands::Pause { id }) => report_action(client.pause_agent(&id).await, "Paused"),
		Some(Commands::Resume { id }) => report_action(client.resume_agent(&id).await, "Resumed"),
		Some(Commands::Delete { id }) => {
			client.delete_agent(&id).await?;
			println!("Deleted agent {id}");
			Ok(())
		}
		Some(Commands::Logs { id, level, limit }) => {
			handle_logs(&client, &cfg, &id, level, limit).await
		}
		Some(Commands::Results { id }) => handle_results(&client, &id).await,
		Some(Commands::Artifacts { id, kind, download }) => {
			handle_artifacts(&client, &cfg, &id, kind, download).await
		}
		Some(Commands::Stats { id }) => handle_stats(&client, &id).await,
		Some(Commands::Watch { id }) => handle_watch(&client, &cfg, &id).await,
		Some(Commands::Verify { service, username }) => {
			handle_verify(&client, &service, username).await
		}
		None => run_tui(&cfg, &client).await,
		// Config and Credentials returned above.
		_ => Ok(()),
	}
}

/// CLI runs log to stderr; the dashboard logs to a file so the alternate
/// screen stays clean.
fn init_logging(to_file: bool) -> Result<()> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roost=info"));
	if to_file {
		let path = config::logs_dir()?.join("roost.log");
		let file = std::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(&path)
			.with_context(|| format!("failed to open log file {}", path.display()))?;
		tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_writer(std::sync::Mutex::new(file))
			.with_ansi(false)
			.init();
	} else {
		tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_writer(std::io::stderr)
			.init();
	}
	Ok(())
}

// ---------------------------------------------------------------------------
// CLI handlers
// ---------------------------------------------------------------------------

async fn handle_status(client: &ApiClient, cfg: &Config, json: bool) -> Result<()> {
	let filter = ListFilter {
		limit: Some(cfg.general.page_size),
		..Default::default()
	};
	let page = client.try_list_agents(&filter).await?;
	if json {
		println!("{}", serde_json::to_string_pretty(&page.agents)?);
		return Ok(());
	}
	if page.agents.is_empty() {
		println!("No agents.");
		return Ok(());
	}
	for (idx, agent) in page.agents.iter().enumerate() {
		println!(
			"{:>2}  {:<9}  {:<36}  {:<14}  {}",
			idx + 1,
			agent.status.as_str(),
			truncate_chars(&agent.task, 36),
			agent.model,
			format_age(agent.created_at)
		);
	}
	println!("{} of {} agents", page.agents.len(), page.total);
	Ok(())
}

async fn handle_ping(client: &ApiClient) -> Result<()> {
	if client.test_connection().await {
		println!("{} answers", client.base_url());
		Ok(())
	} else {
		anyhow::bail!("no answer from {}; check the url and api key", client.base_url())
	}
}

fn handle_config(url: Option<String>, key: Option<String>) -> Result<()> {
	let mut cfg = config::load_raw()?;
	if url.is_none() && key.is_none() {
		let path = config::base_dir()?.join("config.toml");
		println!("File:     {}", path.display());
		println!("Base URL: {}", cfg.api.base_url);
		println!("API key:  {}", describe_key(&cfg.api.api_key));
		if std::env::var("ROOST_API_KEY")
			.map(|k| !k.trim().is_empty())
			.unwrap_or(false)
		{
			println!("          ROOST_API_KEY is set and wins over the file");
		}
		return Ok(());
	}
	if let Some(url) = url {
		cfg.api.base_url = url.trim_end_matches('/').to_string();
	}
	if let Some(key) = key {
		cfg.api.api_key = key.trim().to_string();
	}
	// Reject a malformed URL before the file changes.
	ApiClient::new(&cfg.api.base_url, &cfg.api.api_key)?;
	let path = config::save(&cfg)?;
	println!(
		"Wrote {}. Run `roost ping` to check the connection.",
		path.display()
	);
	Ok(())
}

fn describe_key(key: &str) -> String {
	let key = key.trim();
	if key.is_empty() {
		return "(not set)".to_string();
	}
	let tail: String = key
		.chars()
		.skip(key.chars().count().saturating_sub(4))
		.collect();
	format!("****{tail}")
}

#[allow(clippy::too_many_arguments)]
async fn handle_new(
	client: &ApiClient,
	cfg: &Config,
	task: String,
	model: Option<String>,
	max_steps: Option<u32>,
	headed: bool,
	vision: bool,
	gif: bool,
	viewport: ViewportProfile,
	start: bool,
) -> Result<()> {
	if model::task_too_short(&task) {
		anyhow::bail!(
			"task must be at least {} characters; got {:?}",
			model::MIN_TASK_LEN,
			task.trim()
		);
	}
	let mut request = CreateAgentRequest::new(
		task,
		model.unwrap_or_else(|| cfg.general.default_model.clone()),
	);
	if let Some(max_steps) = max_steps {
		request.max_steps = max_steps;
	}
	request.headless = !headed;
	request.use_vision = vision;
	request.generate_gif = gif;
	request.browser_viewport = viewport;

	let agent = client.create_agent(&request).await?;
	println!("Created agent {} ({})", agent.id, agent.status.as_str());
	if start {
		let agent = client.start_agent(&agent.id).await?;
		println!("Started {} ({})", agent.id, agent.status.as_str());
	}
	Ok(())
}

async fn handle_edit(
	client: &ApiClient,
	id: &str,
	task: Option<String>,
	model: Option<String>,
	max_steps: Option<u32>,
) -> Result<()> {
	if task.is_none() && model.is_none() && max_steps.is_none() {
		anyhow::bail!("nothing to change; pass --task, --model or --max-steps");
	}
	if let Some(task) = &task {
		if model::task_too_short(task) {
			anyhow::bail!(
				"task must be at least {} characters; got {:?}",
				model::MIN_TASK_LEN,
				task.trim()
			);
		}
	}
	let patch = UpdateAgentRequest {
		task,
		model,
		max_steps,
		..Default::default()
	};
	let agent = client.update_agent(id, &patch).await?;
	println!("Updated agent {} ({})", agent.id, agent.status.as_str());
	Ok(())
}

fn report_action(result: ApiResult<Agent>, verb: &str) -> Result<()> {
	let agent = result?;
	println!("{} {} ({})", verb, agent.id, agent.status.as_str());
	Ok(())
}

async fn handle_logs(
	client: &ApiClient,
	cfg: &Config,
	id: &str,
	level: Option<LogLevel>,
	limit: Option<u32>,
) -> Result<()> {
	let query = LogQuery {
		limit: Some(limit.unwrap_or(cfg.general.page_size)),
		level,
		..Default::default()
	};
	let page = client.get_agent_logs(id, &query).await?;
	if page.logs.is_empty() {
		println!("No log entries.");
		return Ok(());
	}
	for entry in &page.logs {
		let url = entry
			.url
			.as_deref()
			.map(|u| format!("  ({u})"))
			.unwrap_or_default();
		println!(
			"{:>4}  {:<7}  {}{}",
			entry.step,
			entry.level.as_str(),
			entry.message,
			url
		);
	}
	println!("{} of {} entries", page.logs.len(), page.total);
	Ok(())
}

async fn handle_results(client: &ApiClient, id: &str) -> Result<()> {
	match client.get_agent_results(id).await? {
		Some(result) => {
			println!("{}", result.summary);
			if !result.text.is_empty() {
				println!("\n{}", result.text);
			}
			println!("\n(finished {})", result.created_at.format("%Y-%m-%d %H:%M UTC"));
		}
		None => println!("No results yet."),
	}
	Ok(())
}

async fn handle_artifacts(
	client: &ApiClient,
	cfg: &Config,
	id: &str,
	kind: Option<ArtifactKind>,
	download: bool,
) -> Result<()> {
	let artifacts = client.get_agent_artifacts(id, kind).await?;
	if artifacts.is_empty() {
		println!("No artifacts.");
		return Ok(());
	}
	for artifact in &artifacts {
		println!(
			"{:<11}  {:<32}  {:>9}  {}",
			artifact.kind.as_str(),
			truncate_chars(&artifact.filename, 32),
			format_size(artifact.size),
			artifact.url
		);
	}
	if download {
		let dest = Path::new(&cfg.general.downloads_dir);
		for artifact in &artifacts {
			let path = client.download_artifact(artifact, dest).await?;
			println!("saved {}", path.display());
		}
	}
	Ok(())
}

async fn handle_stats(client: &ApiClient, id: &str) -> Result<()> {
	let stats = client.get_agent_stats(id).await?;
	println!("Duration:        {}", stats.duration_formatted);
	println!("Pages visited:   {}", stats.pages_visited);
	println!("Steps completed: {}", stats.steps_completed);
	println!("Tokens used:     {}", stats.tokens_used);
	Ok(())
}

async fn handle_watch(client: &ApiClient, cfg: &Config, id: &str) -> Result<()> {
	// Confirm the agent exists before sitting on the channel forever.
	let agent = client.get_agent(id).await?;
	println!(
		"Watching {} ({}) - ctrl-c to stop",
		agent.id,
		agent.status.as_str()
	);

	let url = websocket_url(&cfg.api.base_url)?;
	let live = LiveChannel::open(url);
	live.watch_agent(id);
	let mut events = live.events();
	let mut status_rx = live.status();

	loop {
		tokio::select! {
			incoming = events.recv() => match incoming {
				Ok(event) => {
					if event.agent_id() == id {
						print_event(&event);
					}
				}
				Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
					eprintln!("(fell behind, skipped {n} events)");
				}
				Err(_) => break,
			},
			changed = status_rx.changed() => {
				if changed.is_err() {
					break;
				}
				let state = *status_rx.borrow();
				eprintln!("({})", channel_status_label(state));
				if state == ChannelStatus::Closed {
					break;
				}
			}
			_ = tokio::signal::ctrl_c() => {
				live.close();
				break;
			}
		}
	}
	Ok(())
}

fn print_event(event: &ChannelEvent) {
	match event {
		ChannelEvent::Status(update) => {
			let step = update
				.current_step
				.map(|s| format!(" (step {s})"))
				.unwrap_or_default();
			println!("status      {}{}", update.status.as_str(), step);
		}
		ChannelEvent::Log(entry) => {
			println!(
				"log         [{}] step {}: {}",
				entry.level.as_str(),
				entry.step,
				entry.message
			);
		}
		ChannelEvent::Result(update) => println!("result      {}", update.result.summary),
		ChannelEvent::Navigation(update) => println!("navigate    {}", update.url),
		ChannelEvent::Screenshot(_) => println!("screenshot  received"),
	}
}

async fn handle_verify(client: &ApiClient, service: &str, username: Option<String>) -> Result<()> {
	let store = CredentialStore::new(&config::base_dir()?)?;
	let credential = match username {
		Some(username) => store.load(service, &username)?,
		None => store
			.list_for_service(service)?
			.into_iter()
			.find(|c| c.active)
			.ok_or_else(|| {
				anyhow::anyhow!("no active credential for {service}; add one with `roost credentials add`")
			})?,
	};
	let valid = client
		.verify_credentials(
			&credential.service,
			&credential.username,
			&credential.password,
		)
		.await?;
	if valid {
		println!(
			"Credential for {} ({}) is valid.",
			credential.service, credential.username
		);
	} else {
		println!(
			"Credential for {} ({}) was rejected by the backend.",
			credential.service, credential.username
		);
	}
	Ok(())
}

fn handle_credentials(action: CredentialsAction) -> Result<()> {
	let store = CredentialStore::new(&config::base_dir()?)?;
	match action {
		CredentialsAction::Add {
			service,
			username,
			password,
		} => {
			store.save(&Credential::new(&service, &username, &password))?;
			store.set_active(&service, &username)?;
			println!("Stored credential for {service} ({username}) and made it active.");
		}
		CredentialsAction::List => {
			let records = store.list()?;
			if records.is_empty() {
				println!("No credentials stored.");
				return Ok(());
			}
			for record in records {
				let marker = if record.active { "*" } else { " " };
				println!(
					"{} {:<28}  {:<20}  added {}",
					marker,
					record.service,
					record.username,
					record.created_at.format("%Y-%m-%d")
				);
			}
		}
		CredentialsAction::Remove { service, username } => {
			store.delete(&service, &username)?;
			println!("Removed credential for {service} ({username}).");
		}
		CredentialsAction::Use { service, username } => {
			store.set_active(&service, &username)?;
			println!("Active credential for {service} is now {username}.");
		}
	}
	Ok(())
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentAction {
	Start,
	Stop,
	Pause,
	Resume,
	Delete,
}

impl AgentAction {
	fn verb(self) -> &'static str {
		match self {
			AgentAction::Start => "Start",
			AgentAction::Stop => "Stop",
			AgentAction::Pause => "Pause",
			AgentAction::Resume => "Resume",
			AgentAction::Delete => "Delete",
		}
	}

	/// Progressive form shown on the agent row while the call is in flight.
	fn marker(self) -> &'static str {
		match self {
			AgentAction::Start => "starting",
			AgentAction::Stop => "stopping",
			AgentAction::Pause => "pausing",
			AgentAction::Resume => "resuming",
			AgentAction::Delete => "deleting",
		}
	}
}

/// Results of backend calls issued from the dashboard. Every call runs on a
/// spawned task and reports back here, so the event loop only ever drains
/// this channel and a dead backend cannot freeze input handling.
enum UiOutcome {
	Listed {
		page: AgentPage,
	},
	Details {
		id: String,
		logs: ApiResult<LogPage>,
		result: ApiResult<Option<RunResult>>,
	},
	Stats {
		id: String,
		result: ApiResult<AgentStats>,
	},
	Created {
		placeholder: String,
		result: ApiResult<Agent>,
	},
	// Deletes carry no agent back; the other actions return the updated one.
	Action {
		id: String,
		action: AgentAction,
		result: ApiResult<Option<Agent>>,
	},
}

fn spawn_list(client: &ApiClient, tx: &mpsc::UnboundedSender<UiOutcome>, filter: &ListFilter) {
	let client = client.clone();
	let tx = tx.clone();
	let filter = filter.clone();
	tokio::spawn(async move {
		let page = client.list_agents(&filter).await;
		let _ = tx.send(UiOutcome::Listed { page });
	});
}

fn spawn_details(
	client: &ApiClient,
	tx: &mpsc::UnboundedSender<UiOutcome>,
	id: &str,
	page_size: u32,
) {
	let client = client.clone();
	let tx = tx.clone();
	let id = id.to_string();
	tokio::spawn(async move {
		let query = LogQuery {
			limit: Some(page_size),
			..Default::default()
		};
		let logs = client.get_agent_logs(&id, &query).await;
		let result = client.get_agent_results(&id).await;
		let _ = tx.send(UiOutcome::Details { id, logs, result });
	});
}

fn spawn_stats(client: &ApiClient, tx: &mpsc::UnboundedSender<UiOutcome>, id: &str) {
	let client = client.clone();
	let tx = tx.clone();
	let id = id.to_string();
	tokio::spawn(async move {
		let result = client.get_agent_stats(&id).await;
		let _ = tx.send(UiOutcome::Stats { id, result });
	});
}

fn spawn_create(
	client: &ApiClient,
	tx: &mpsc::UnboundedSender<UiOutcome>,
	request: CreateAgentRequest,
	placeholder: String,
) {
	let client = client.clone();
	let tx = tx.clone();
	tokio::spawn(async move {
		let result = client.create_agent(&request).await;
		let _ = tx.send(UiOutcome::Created { placeholder, result });
	});
}

fn spawn_agent_action(
	client: &ApiClient,
	tx: &mpsc::UnboundedSender<UiOutcome>,
	id: &str,
	action: AgentAction,
) {
	let client = client.clone();
	let tx = tx.clone();
	let id = id.to_string();
	tokio::spawn(async move {
		let result = match action {
			AgentAction::Start => client.start_agent(&id).await.map(Some),
			AgentAction::Stop => client.stop_agent(&id).await.map(Some),
			AgentAction::Pause => client.pause_agent(&id).await.map(Some),
			AgentAction::Resume => client.resume_agent(&id).await.map(Some),
			AgentAction::Delete => client.delete_agent(&id).await.map(|_| None),
		};
		let _ = tx.send(UiOutcome::Action { id, action, result });
	});
}

/// One in-flight action per agent; a second keypress for the same agent only
/// reports what is already running instead of stacking calls.
fn queue_action(
	client: &ApiClient,
	tx: &mpsc::UnboundedSender<UiOutcome>,
	pending: &mut HashMap<String, AgentAction>,
	status_message: &mut Option<(String, Instant)>,
	id: &str,
	action: AgentAction,
) {
	if let Some(already) = pending.get(id) {
		*status_message = Some((
			format!("{id} is already {}", already.marker()),
			Instant::now(),
		));
		return;
	}
	pending.insert(id.to_string(), action);
	spawn_agent_action(client, tx, id, action);
}

async fn run_tui(cfg: &Config, client: &ApiClient) -> Result<()> {
	enable_raw_mode()?;
	let mut stdout_handle = stdout();
	execute!(stdout_handle, EnterAlternateScreen)?;
	let backend = ratatui::backend::CrosstermBackend::new(stdout_handle);
	let mut terminal = ratatui::Terminal::new(backend)?;

	let list_filter = ListFilter {
		limit: Some(cfg.general.page_size),
		..Default::default()
	};

	let mut store = AgentStore::new();
	let mut prev_status: HashMap<String, AgentStatus> = HashMap::new();
	// The first page seeds prev_status instead of firing notifications.
	let mut seeded = false;

	let (api_tx, mut api_rx) = mpsc::unbounded_channel::<UiOutcome>();
	let mut pending_actions: HashMap<String, AgentAction> = HashMap::new();
	let mut refresh_in_flight = true;
	spawn_list(client, &api_tx, &list_filter);

	let live = LiveChannel::open(websocket_url(&cfg.api.base_url)?);
	let mut events_rx = live.events();
	let channel_status = live.status();

	let mut view = ViewOptions::default();
	let mut selected: usize = 0;
	let mut list_state = ListState::default();
	list_state.select(Some(0));

	let mut logs = LogBuffer::new();
	let mut last_result: Option<RunResult> = None;
	let mut last_nav: Option<String> = None;
	let mut last_screenshot_at: Option<Instant> = None;
	let mut stats: Option<AgentStats> = None;
	let mut watched_id: Option<String> = None;
	let mut detail_reload = false;

	let triage = default_triage();
	let mut last_attention: Option<Attention> = None;

	let mut status_message: Option<(String, Instant)> = None;
	let mut show_help = false;
	let mut search_mode = false;
	let mut search_buf = String::new();
	let mut new_agent_mode = false;
	let mut new_task_buf = String::new();
	let mut new_model_buf = cfg.general.default_model.clone();
	let mut new_agent_field = 0; // 0 = task, 1 = model
	let mut confirm_delete_mode = false;
	let mut pending_delete: Option<(String, String)> = None;

	let mut last_refresh = Instant::now();
	let mut refresh_now = false;

	// Status indicator style - can cycle with 'i' key
	let styles = ["unicode", "emoji", "text"];
	let mut style_idx = styles
		.iter()
		.position(|s| *s == cfg.general.status_style)
		.unwrap_or(0);

	loop {
		let active_status = status_message
			.as_ref()
			.and_then(|(msg, ts)| (ts.elapsed() < Duration::from_secs(5)).then(|| msg.clone()));
		if status_message
			.as_ref()
			.map(|(_, ts)| ts.elapsed() >= Duration::from_secs(5))
			.unwrap_or(false)
		{
			status_message = None;
		}

		// Apply everything the push channel delivered since the last frame.
		let mut logs_changed = false;
		loop {
			match events_rx.try_recv() {
				Ok(ChannelEvent::Status(update)) => {
					let task = store
						.get(&update.agent_id)
						.map(|a| a.task.clone())
						.unwrap_or_default();
					if store.apply_status(&update) {
						note_status_change(cfg, &mut prev_status, &update.agent_id, &task, update.status);
					} else {
						// An agent we have never listed; pull the list.
						refresh_now = true;
					}
				}
				Ok(ChannelEvent::Log(entry)) => {
					if watched_id.as_deref() == Some(entry.agent_id.as_str()) {
						logs.push(entry);
						logs_changed = true;
					}
				}
				Ok(ChannelEvent::Result(update)) => {
					if watched_id.as_deref() == Some(update.agent_id.as_str()) {
						last_result = Some(update.result);
					}
				}
				Ok(ChannelEvent::Navigation(update)) => {
					if watched_id.as_deref() == Some(update.agent_id.as_str()) {
						last_nav = Some(update.url);
					}
				}
				Ok(ChannelEvent::Screenshot(update)) => {
					if watched_id.as_deref() == Some(update.agent_id.as_str()) {
						last_screenshot_at = Some(Instant::now());
					}
				}
				Err(TryRecvError::Lagged(_)) => {
					refresh_now = true;
				}
				Err(_) => break,
			}
		}

		// Fold in whatever the spawned API calls finished since the last frame.
		while let Ok(outcome) = api_rx.try_recv() {
			match outcome {
				UiOutcome::Listed { page } => {
					refresh_in_flight = false;
					if seeded {
						for agent in &page.agents {
							note_status_change(
								cfg,
								&mut prev_status,
								&agent.id,
								&agent.task,
								agent.status,
							);
						}
					}
					store.replace_all(page.agents);
					if !seeded {
						seeded = true;
						prev_status.extend(store.all().iter().map(|a| (a.id.clone(), a.status)));
					}
				}
				UiOutcome::Details { id, logs: fetched, result } => {
					// Selection may have moved on while the fetch ran.
					if watched_id.as_deref() == Some(id.as_str()) {
						match fetched {
							Ok(page) => {
								logs.merge_page(page.logs);
								logs_changed = true;
							}
							Err(err) => warn!("log fetch for {id} failed: {err}"),
						}
						match result {
							Ok(fetched_result) => last_result = fetched_result,
							Err(err) => warn!("result fetch for {id} failed: {err}"),
						}
					}
				}
				UiOutcome::Stats { id, result } => match result {
					Ok(fetched) => {
						if watched_id.as_deref() == Some(id.as_str()) {
							stats = Some(fetched);
						}
					}
					Err(err) => {
						status_message = Some((format!("Stats failed: {err}"), Instant::now()));
					}
				},
				UiOutcome::Created { placeholder, result } => {
					store.remove(&placeholder);
					match result {
						Ok(agent) => {
							let id = agent.id.clone();
							prev_status.insert(id.clone(), agent.status);
							store.upsert(agent);
							selected = 0;
							list_state.select(Some(0));
							status_message =
								Some((format!("Created agent {id}"), Instant::now()));
						}
						Err(err) => {
							status_message =
								Some((format!("Create failed: {err}"), Instant::now()));
						}
					}
				}
				UiOutcome::Action { id, action, result } => {
					pending_actions.remove(&id);
					match result {
						Ok(Some(agent)) => {
							status_message = Some((
								format!(
									"{} ok: {} is now {}",
									action.verb(),
									agent.id,
									agent.status.as_str()
								),
								Instant::now(),
							));
							prev_status.insert(agent.id.clone(), agent.status);
							store.upsert(agent);
						}
						Ok(None) => {
							store.remove(&id);
							prev_status.remove(&id);
							if watched_id.as_deref() == Some(id.as_str()) {
								live.unwatch_agent(&id);
								watched_id = None;
							}
							status_message = Some((format!("Deleted {id}"), Instant::now()));
						}
						Err(err) => {
							status_message = Some((
								format!("{} failed: {err}", action.verb()),
								Instant::now(),
							));
						}
					}
				}
			}
		}

		let refresh_due = refresh_now
			|| last_refresh.elapsed()
				>= Duration::from_millis(cfg.general.poll_interval_ms.min(5_000));
		if refresh_due && !refresh_in_flight {
			refresh_now = false;
			refresh_in_flight = true;
			last_refresh = Instant::now();
			spawn_list(client, &api_tx, &list_filter);
		}

		let visible = store.visible(&view);
		clamp_selection(&mut selected, &mut list_state, visible.len());

		// Keep the focused agent's detail pane and subscription in step with
		// the selection.
		let current_id = visible.get(selected).map(|a| a.id.clone());
		if current_id != watched_id || detail_reload {
			detail_reload = false;
			if let Some(old) = watched_id.take() {
				if Some(&old) != current_id.as_ref() {
					live.unwatch_agent(&old);
				}
			}
			logs.clear();
			last_result = None;
			last_nav = None;
			last_screenshot_at = None;
			stats = None;
			last_attention = None;
			if let Some(id) = &current_id {
				live.watch_agent(id);
				spawn_details(client, &api_tx, id, cfg.general.page_size);
			}
			watched_id = current_id;
		}

		if logs_changed {
			let current = triage_logs(logs.entries(), &triage);
			if current != last_attention {
				if let (Some(kind), Some(agent)) = (current, visible.get(selected)) {
					if cfg.notifications.enabled && cfg.notifications.on_attention {
						notify::notify_attention(kind.label(), &agent.task);
					}
				}
				last_attention = current;
			}
		}

		let channel_state = *channel_status.borrow();

		terminal.draw(|f| {
			let size = f.area();
			let footer_height: u16 = if active_status.is_some() || search_mode {
				3
			} else {
				2
			};
			let vertical = Layout::default()
				.direction(Direction::Vertical)
				.constraints([Constraint::Min(3), Constraint::Length(footer_height)].as_ref())
				.split(size);

			let chunks = Layout::default()
				.direction(Direction::Horizontal)
				.constraints([Constraint::Percentage(45), Constraint::Percentage(55)].as_ref())
				.split(vertical[0]);

			let current_style = styles[style_idx];
			let items: Vec<ListItem> = visible
				.iter()
				.enumerate()
				.map(|(idx, agent)| {
					let (status_text, status_style) = status_indicator(agent.status, current_style);
					let mut spans: Vec<Span> = Vec::new();
					// Show number for quick access (1-9)
					if idx < 9 {
						spans.push(Span::styled(
							format!("{} ", idx + 1),
							Style::default().fg(Color::DarkGray),
						));
					} else {
						spans.push(Span::raw("  "));
					}
					spans.push(Span::styled(status_text, status_style));
					spans.push(Span::raw(" "));
					spans.push(Span::raw(truncate_chars(&agent.task, 34)));
					spans.push(Span::styled(
						format!(" · {}", agent.model),
						Style::default().fg(Color::DarkGray),
					));
					spans.push(Span::styled(
						format!(" · {}", format_age(agent.created_at)),
						Style::default().fg(Color::DarkGray),
					));
					if agent.status == AgentStatus::Running {
						if let Some(step) = agent.current_step {
							spans.push(Span::styled(
								format!(" · step {step}/{}", agent.max_steps),
								Style::default().fg(Color::Cyan),
							));
						}
					}
					if let Some(action) = pending_actions.get(&agent.id) {
						spans.push(Span::styled(
							format!(" ⋯ {}", action.marker()),
							Style::default().fg(Color::Yellow),
						));
					}
					ListItem::new(Line::from(spans))
				})
				.collect();

			let mut list_title = format!(
				"Agents ({}/{}) · {}",
				visible.len(),
				store.len(),
				channel_status_label(channel_state)
			);
			if view.filter != StatusFilter::All {
				list_title.push_str(&format!(" · {}", view.filter.label()));
			}
			if !view.search.is_empty() {
				list_title.push_str(&format!(" · \"{}\"", view.search));
			}

			let list = List::new(items)
				.block(Block::default().borders(Borders::ALL).title(list_title))
				.highlight_symbol("▶ ")
				.highlight_style(
					Style::default()
						.add_modifier(Modifier::BOLD | Modifier::REVERSED)
						.fg(Color::White),
				);
			f.render_stateful_widget(list, chunks[0], &mut list_state);

			let right_panes = Layout::default()
				.direction(Direction::Vertical)
				.constraints([Constraint::Min(10), Constraint::Length(9)].as_ref())
				.split(chunks[1]);

			let activity_lines: Vec<Line> = if visible.get(selected).is_some() {
				if logs.is_empty() {
					vec![
						Line::from(""),
						Line::from("No log entries yet."),
						Line::from("They stream in live once the agent runs."),
					]
				} else {
					logs.entries().iter().map(log_line).collect()
				}
			} else if visible.is_empty() && store.is_empty() {
				vec![
					Line::from(""),
					Line::from(Span::styled(
						"No agents yet.",
						Style::default().add_modifier(Modifier::BOLD),
					)),
					Line::from(""),
					Line::from("Press n to create a new agent."),
				]
			} else {
				vec![Line::from("Nothing matches the current filter.")]
			};

			// Pin the view to the newest entries.
			let activity_height = right_panes[0].height.saturating_sub(2) as usize;
			let scroll = activity_lines.len().saturating_sub(activity_height);
			let activity_title = match &last_attention {
				Some(kind) => format!("Activity · needs attention: {}", kind.label()),
				None if logs.is_empty() => "Activity".to_string(),
				None => format!("Activity ({})", logs.len()),
			};
			let activity_block = if last_attention.is_some() {
				Block::default()
					.borders(Borders::ALL)
					.title(activity_title)
					.border_style(Style::default().fg(Color::Yellow))
					.title_style(
						Style::default()
							.fg(Color::Yellow)
							.add_modifier(Modifier::BOLD),
					)
			} else {
				Block::default().borders(Borders::ALL).title(activity_title)
			};
			let activity = Paragraph::new(Text::from(activity_lines))
				.block(activity_block)
				.scroll((scroll as u16, 0));
			f.render_widget(activity, right_panes[0]);

			let details_text = match visible.get(selected) {
				Some(agent) => agent_details(
					agent,
					&last_nav,
					&last_result,
					&stats,
					last_screenshot_at,
				),
				None => "No agent selected".to_string(),
			};
			let details = Paragraph::new(details_text)
				.block(Block::default().borders(Borders::ALL).title("Details"))
				.wrap(Wrap { trim: true });
			f.render_widget(details, right_panes[1]);

			let mut footer_lines = vec![if search_mode {
				format!("Search: {search_buf}█  (Enter keep, Esc clear)")
			} else {
				agents_footer_text(size.width, &view)
			}];
			if let Some(msg) = &active_status {
				footer_lines.push(format!("Status: {msg}"));
			}
			let footer_text = footer_lines.join("  |  ");
			let footer_block = if active_status.is_some() || search_mode {
				Block::default().borders(Borders::ALL)
			} else {
				Block::default()
			};
			let footer = Paragraph::new(footer_text)
				.block(footer_block)
				.wrap(Wrap { trim: true });
			f.render_widget(footer, vertical[1]);

			if show_help {
				let area = centered_rect(70, 80, size);
				let clear = ratatui::widgets::Clear;
				f.render_widget(clear, area);
				let overlay = Paragraph::new(help_text())
					.block(Block::default().borders(Borders::ALL).title("Help"))
					.wrap(Wrap { trim: true });
				f.render_widget(overlay, area);
			}

			if new_agent_mode {
				let area = centered_rect(65, 40, size);
				let clear = ratatui::widgets::Clear;
				f.render_widget(clear, area);
				let cursors = [
					if new_agent_field == 0 { "█" } else { "" },
					if new_agent_field == 1 { "█" } else { "" },
				];
				let body = format!(
					r#"What should the agent do? (at least 10 characters)
> {}{}

Model
> {}{}

Tab to switch fields, Enter to create, Esc to cancel"#,
					new_task_buf, cursors[0], new_model_buf, cursors[1],
				);
				let overlay = Paragraph::new(body)
					.block(
						Block::default()
							.borders(Borders::ALL)
							.title("New Agent")
							.border_style(Style::default().fg(Color::Cyan))
							.title_style(
								Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
							),
					)
					.wrap(Wrap { trim: true });
				f.render_widget(overlay, area);
			}

			if confirm_delete_mode {
				let area = centered_rect(60, 40, size);
				let clear = ratatui::widgets::Clear;
				f.render_widget(clear, area);
				let (id, task) = pending_delete
					.as_ref()
					.map(|(id, task)| (id.as_str(), task.as_str()))
					.unwrap_or(("unknown", ""));
				let body = format!(
					r#"Delete this agent?

{}
{}

The backend removes its logs and results as well.

  [y]   Yes, delete it
  [Esc] No, go back"#,
					id,
					truncate_chars(task, 60)
				);
				let overlay = Paragraph::new(body)
					.block(
						Block::default()
							.borders(Borders::ALL)
							.title("Confirm Delete")
							.border_style(Style::default().fg(Color::Yellow))
							.title_style(
								Style::default()
									.fg(Color::Yellow)
									.add_modifier(Modifier::BOLD),
							),
					)
					.wrap(Wrap { trim: true });
				f.render_widget(overlay, area);
			}
		})?;

		if event::poll(Duration::from_millis(100))? {
			if let Event::Key(key) = event::read()? {
				if key.kind == KeyEventKind::Press {
					if show_help && key.code != KeyCode::Char('h') && key.code != KeyCode::Esc {
						continue;
					}
					// Handle search mode first to capture typing.
					if search_mode {
						match key.code {
							KeyCode::Char(c) if !c.is_control() => {
								search_buf.push(c);
								view.search = search_buf.clone();
							}
							KeyCode::Backspace => {
								search_buf.pop();
								view.search = search_buf.clone();
							}
							KeyCode::Enter => {
								search_mode = false;
							}
							KeyCode::Esc => {
								search_mode = false;
								search_buf.clear();
								view.search.clear();
							}
							_ => {}
						}
						continue;
					}
					// Handle the create prompt.
					if new_agent_mode {
						match key.code {
							KeyCode::Char(c) if !c.is_control() => match new_agent_field {
								0 => new_task_buf.push(c),
								1 => new_model_buf.push(c),
								_ => {}
							},
							KeyCode::Backspace => match new_agent_field {
								0 => {
									new_task_buf.pop();
								}
								1 => {
									new_model_buf.pop();
								}
								_ => {}
							},
							KeyCode::Tab | KeyCode::BackTab => {
								new_agent_field = (new_agent_field + 1) % 2;
							}
							KeyCode::Enter => {
								let task = new_task_buf.trim().to_string();
								if model::task_too_short(&task) {
									// Rejected locally; nothing goes out.
									status_message = Some((
										format!(
											"Task must be at least {} characters",
											model::MIN_TASK_LEN
										),
										Instant::now(),
									));
								} else {
									let request = CreateAgentRequest::new(
										task,
										new_model_buf.trim().to_string(),
									);
									let placeholder = model::placeholder_id(&request.task);
									store.upsert(optimistic_agent(&placeholder, &request));
									spawn_create(client, &api_tx, request, placeholder);
									new_agent_mode = false;
									new_task_buf.clear();
									new_model_buf = cfg.general.default_model.clone();
									new_agent_field = 0;
								}
							}
							KeyCode::Esc => {
								new_agent_mode = false;
								new_task_buf.clear();
								new_model_buf = cfg.general.default_model.clone();
								new_agent_field = 0;
							}
							_ => {}
						}
						continue;
					}
					match key.code {
						KeyCode::Char('q') => break,
						KeyCode::Char('h') => {
							show_help = !show_help;
						}
						KeyCode::Esc => {
							if confirm_delete_mode {
								confirm_delete_mode = false;
								pending_delete = None;
								status_message =
									Some(("Cancelled - agent kept".to_string(), Instant::now()));
							} else if !view.search.is_empty() {
								search_buf.clear();
								view.search.clear();
							} else if status_message.is_some() {
								status_message = None;
							}
							show_help = false;
						}
						KeyCode::Char('j') | KeyCode::Down => {
							if selected + 1 < visible.len() {
								selected += 1;
								list_state.select(Some(selected));
							}
						}
						KeyCode::Char('k') | KeyCode::Up => {
							if selected > 0 {
								selected -= 1;
								list_state.select(Some(selected));
							}
						}
						KeyCode::Char(c) if c.is_ascii_digit() && !confirm_delete_mode => {
							let idx = c.to_digit(10).unwrap_or(0);
							if idx > 0 {
								let target = (idx - 1) as usize;
								if visible.get(target).is_some() {
									selected = target;
									list_state.select(Some(selected));
								}
							}
						}
						KeyCode::Enter => {
							// Reload the focused agent's logs and result.
							detail_reload = true;
						}
						KeyCode::Char('n') if !confirm_delete_mode => {
							new_agent_mode = true;
							new_task_buf.clear();
							new_model_buf = cfg.general.default_model.clone();
							new_agent_field = 0;
						}
						KeyCode::Char('s') if !confirm_delete_mode => {
							if let Some(agent) = visible.get(selected) {
								queue_action(
									client,
									&api_tx,
									&mut pending_actions,
									&mut status_message,
									&agent.id,
									AgentAction::Start,
								);
							}
						}
						KeyCode::Char('x') if !confirm_delete_mode => {
							if let Some(agent) = visible.get(selected) {
								queue_action(
									client,
									&api_tx,
									&mut pending_actions,
									&mut status_message,
									&agent.id,
									AgentAction::Stop,
								);
							}
						}
						KeyCode::Char('p') if !confirm_delete_mode => {
							if let Some(agent) = visible.get(selected) {
								queue_action(
									client,
									&api_tx,
									&mut pending_actions,
									&mut status_message,
									&agent.id,
									AgentAction::Pause,
								);
							}
						}
						KeyCode::Char('u') if !confirm_delete_mode => {
							if let Some(agent) = visible.get(selected) {
								queue_action(
									client,
									&api_tx,
									&mut pending_actions,
									&mut status_message,
									&agent.id,
									AgentAction::Resume,
								);
							}
						}
						KeyCode::Char('d') if !confirm_delete_mode => {
							if let Some(agent) = visible.get(selected) {
								confirm_delete_mode = true;
								pending_delete = Some((agent.id.clone(), agent.task.clone()));
							}
						}
						KeyCode::Char('y') if confirm_delete_mode => {
							if let Some((id, _)) = pending_delete.take() {
								queue_action(
									client,
									&api_tx,
									&mut pending_actions,
									&mut status_message,
									&id,
									AgentAction::Delete,
								);
							}
							confirm_delete_mode = false;
						}
						KeyCode::Char('g') => {
							if let Some(agent) = visible.get(selected) {
								spawn_stats(client, &api_tx, &agent.id);
							}
						}
						KeyCode::Char('f') => {
							view.filter = view.filter.next();
							status_message = Some((
								format!("Filter: {}", view.filter.label()),
								Instant::now(),
							));
						}
						KeyCode::Char('o') => {
							view.toggle_sort(view.sort.next());
							status_message =
								Some((format!("Sort: {}", view.sort.label()), Instant::now()));
						}
						KeyCode::Char('r') => {
							let key = view.sort;
							view.toggle_sort(key);
							let direction = match view.order {
								SortOrder::Ascending => "ascending",
								SortOrder::Descending => "descending",
							};
							status_message =
								Some((format!("Sort: {} {}", view.sort.label(), direction), Instant::now()));
						}
						KeyCode::Char('/') => {
							search_mode = true;
						}
						KeyCode::Char('i') => {
							// Cycle through status indicator styles
							style_idx = (style_idx + 1) % styles.len();
							status_message = Some((
								format!("Status style: {}", styles[style_idx]),
								Instant::now(),
							));
						}
						KeyCode::Char('R') => {
							refresh_now = true;
						}
						_ => {}
					}
				}
			}
		}
	}

	live.close();
	teardown_terminal()?;
	Ok(())
}

fn teardown_terminal() -> Result<()> {
	disable_raw_mode()?;
	execute!(stdout(), LeaveAlternateScreen)?;
	Ok(())
}

fn clamp_selection(selected: &mut usize, list_state: &mut ListState, len: usize) {
	if len == 0 {
		*selected = 0;
		list_state.select(None);
	} else {
		if *selected >= len {
			*selected = len - 1;
		}
		list_state.select(Some(*selected));
	}
}

fn note_status_change(
	cfg: &Config,
	prev_status: &mut HashMap<String, AgentStatus>,
	agent_id: &str,
	task: &str,
	status: AgentStatus,
) {
	let old = prev_status.insert(agent_id.to_string(), status);
	if old == Some(status) || !cfg.notifications.enabled {
		return;
	}
	match status {
		AgentStatus::Completed if cfg.notifications.on_completed => {
			notify::notify_completed(task);
		}
		AgentStatus::Failed if cfg.notifications.on_failed => {
			notify::notify_failed(task);
		}
		_ => {}
	}
}

fn optimistic_agent(id: &str, request: &CreateAgentRequest) -> Agent {
	Agent {
		id: id.to_string(),
		task: request.task.clone(),
		status: AgentStatus::Pending,
		model: request.model.clone(),
		max_steps: request.max_steps,
		headless: request.headless,
		use_vision: request.use_vision,
		generate_gif: request.generate_gif,
		browser_viewport: request.browser_viewport,
		created_at: Utc::now(),
		current_step: None,
		execution_time_ms: None,
		tokens_used: None,
	}
}

fn log_line(entry: &model::LogEntry) -> Line<'static> {
	let level_style = match entry.level {
		LogLevel::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
		LogLevel::Warning => Style::default().fg(Color::Yellow),
		LogLevel::Action => Style::default().fg(Color::Green),
		LogLevel::Debug => Style::default().fg(Color::DarkGray),
		LogLevel::Info => Style::default(),
	};
	let mut spans = vec![
		Span::styled(
			format!("{:>3} ", entry.step),
			Style::default().fg(Color::DarkGray),
		),
		Span::styled(format!("{:<7} ", entry.level.as_str()), level_style),
		Span::raw(entry.message.clone()),
	];
	if let Some(url) = &entry.url {
		spans.push(Span::styled(
			format!("  {url}"),
			Style::default().fg(Color::DarkGray),
		));
	}
	Line::from(spans)
}

fn agent_details(
	agent: &Agent,
	last_nav: &Option<String>,
	last_result: &Option<RunResult>,
	stats: &Option<AgentStats>,
	last_screenshot_at: Option<Instant>,
) -> String {
	let mut out = format!(
		"Id: {}\nModel: {} · {} viewport · {} steps max\nCreated: {}",
		agent.id,
		agent.model,
		agent.browser_viewport.as_str(),
		agent.max_steps,
		agent.created_at.format("%Y-%m-%d %H:%M UTC"),
	);
	if let Some(step) = agent.current_step {
		out.push_str(&format!("\nStep: {step}/{}", agent.max_steps));
	}
	if let Some(url) = last_nav {
		out.push_str(&format!("\nAt: {url}"));
	}
	if let Some(at) = last_screenshot_at {
		out.push_str(&format!(
			"\nScreenshot: {}",
			format_human_duration(at.elapsed())
		));
	}
	if let Some(result) = last_result {
		out.push_str(&format!("\nResult: {}", result.summary));
	}
	if let Some(stats) = stats {
		out.push_str(&format!(
			"\nStats: {} · {} pages · {} steps · {} tokens",
			stats.duration_formatted, stats.pages_visited, stats.steps_completed, stats.tokens_used
		));
	}
	out
}

fn agents_footer_text(width: u16, view: &ViewOptions) -> String {
	let arrow = match view.order {
		SortOrder::Ascending => "↑",
		SortOrder::Descending => "↓",
	};
	let view_part = format!("{}{} · {}", view.sort.label(), arrow, view.filter.label());
	if width < 110 {
		format!("[{view_part}]  enter | n | s/x/p/u | d | f | o/r | / | g | i | R | h | q")
	} else {
		format!(
			"[{view_part}]  enter reload | n new | s start | x stop | p pause | u resume | d delete | f filter | o sort | r reverse | / search | g stats | i style | R refresh | h help | q quit"
		)
	}
}

fn channel_status_label(state: ChannelStatus) -> String {
	match state {
		ChannelStatus::Closed => "offline".to_string(),
		ChannelStatus::Connecting => "connecting…".to_string(),
		ChannelStatus::Open => "live".to_string(),
		ChannelStatus::Reconnecting { attempt } => format!("reconnecting ({attempt})…"),
	}
}

fn status_indicator(status: AgentStatus, style: &str) -> (&'static str, Style) {
	match style {
		"emoji" => match status {
			AgentStatus::Pending => ("🟡", Style::default()),
			AgentStatus::Running => ("🟢", Style::default()),
			AgentStatus::Paused => ("⏸ ", Style::default()),
			AgentStatus::Completed => ("✓ ", Style::default().add_modifier(Modifier::DIM)),
			AgentStatus::Failed => ("🔴", Style::default()),
			AgentStatus::Stopped => ("⏹ ", Style::default()),
			AgentStatus::Idle => ("⚪", Style::default()),
		},
		"text" => match status {
			AgentStatus::Pending => ("[wait]", Style::default().fg(Color::Yellow)),
			AgentStatus::Running => (
				"[RUN] ",
				Style::default()
					.fg(Color::Green)
					.add_modifier(Modifier::BOLD),
			),
			AgentStatus::Paused => ("[paus]", Style::default().fg(Color::Yellow)),
			AgentStatus::Completed => ("[done]", Style::default().fg(Color::Cyan)),
			AgentStatus::Failed => (
				"[FAIL]",
				Style::default()
					.fg(Color::White)
					.bg(Color::Red)
					.add_modifier(Modifier::BOLD),
			),
			AgentStatus::Stopped => ("[stop]", Style::default().fg(Color::DarkGray)),
			AgentStatus::Idle => ("[idle]", Style::default().fg(Color::DarkGray)),
		},
		// "unicode" and anything unrecognized share the default glyphs
		_ => match status {
			AgentStatus::Pending => ("○", Style::default().fg(Color::Yellow)),
			AgentStatus::Running => (
				"▶",
				Style::default()
					.fg(Color::Green)
					.add_modifier(Modifier::BOLD),
			),
			AgentStatus::Paused => ("◑", Style::default().fg(Color::Yellow)),
			AgentStatus::Completed => ("✓", Style::default().fg(Color::Cyan)),
			AgentStatus::Failed => (
				"✗",
				Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
			),
			AgentStatus::Stopped => ("■", Style::default().fg(Color::DarkGray)),
			AgentStatus::Idle => ("·", Style::default().fg(Color::DarkGray)),
		},
	}
}

fn format_human_duration(d: Duration) -> String {
	let secs = d.as_secs();
	if secs < 60 {
		format!("{secs}s ago")
	} else if secs < 3600 {
		format!("{}m ago", secs / 60)
	} else if secs < 86_400 {
		format!("{}h ago", secs / 3600)
	} else {
		format!("{}d ago", secs / 86_400)
	}
}

fn format_age(created_at: DateTime<Utc>) -> String {
	let age = Utc::now()
		.signed_duration_since(created_at)
		.to_std()
		.unwrap_or_default();
	format_human_duration(age)
}

fn format_size(bytes: u64) -> String {
	if bytes < 1024 {
		format!("{bytes} B")
	} else if bytes < 1024 * 1024 {
		format!("{:.1} KB", bytes as f64 / 1024.0)
	} else {
		format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
	}
}

fn truncate_chars(text: &str, max: usize) -> String {
	if text.chars().count() <= max {
		text.to_string()
	} else {
		let cut: String = text.chars().take(max.saturating_sub(1)).collect();
		format!("{cut}…")
	}
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
	let popup_layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints(
			[
				Constraint::Percentage((100 - percent_y) / 2),
				Constraint::Percentage(percent_y),
				Constraint::Percentage((100 - percent_y) / 2),
			]
			.as_ref(),
		)
		.split(r);

	let horizontal = Layout::default()
		.direction(Direction::Horizontal)
		.constraints(
			[
				Constraint::Percentage((100 - percent_x) / 2),
				Constraint::Percentage(percent_x),
				Constraint::Percentage((100 - percent_x) / 2),
			]
			.as_ref(),
		)
		.split(popup_layout[1]);

	horizontal[1]
}

fn help_text() -> String {
	format!(
		r#"╭──────────────────────────────────────╮
│  ROOST - watch your browser agents   │
│               v{:<22}│
╰──────────────────────────────────────╯

Agents:
  j/k ↑/↓   move selection
  1-9       quick navigate
  enter     reload logs + result for selection
  n         new agent
  s         start      x  stop
  p         pause      u  resume
  d         delete (asks first)
  g         fetch run stats

View:
  f         cycle status filter (all/active/idle/completed/failed)
  o         cycle sort column (created/model/duration/tokens)
  r         reverse sort order
  /         search tasks
  i         cycle status style
  R         refresh list now

Other:
  esc       close prompts, dismiss the banner
  h         toggle this help
  q         quit

The header shows the push channel state (live / reconnecting);
while reconnecting the list still refreshes over plain polling.

Config: ~/.roost/config.toml
Logs:   ~/.roost/logs/roost.log"#,
		env!("CARGO_PKG_VERSION")
	)
}

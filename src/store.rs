//! In-memory view state: the one collection of agents the UI renders from,
//! merged from REST responses and pushed events. The store copies fields it
//! is handed and never invents a status transition of its own.

use crate::channel::StatusUpdate;
use crate::model::{Agent, AgentStatus, LogEntry};

#[derive(Debug, Default)]
pub struct AgentStore {
	agents: Vec<Agent>,
}

impl AgentStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Swap in the result of a full list fetch.
	pub fn replace_all(&mut self, agents: Vec<Agent>) {
		self.agents = agents;
	}

	/// Replace by id when known, otherwise prepend so the newest agent
	/// surfaces at the head of the default view.
	pub fn upsert(&mut self, agent: Agent) {
		match self.agents.iter_mut().find(|a| a.id == agent.id) {
			Some(slot) => *slot = agent,
			None => self.agents.insert(0, agent),
		}
	}

	pub fn remove(&mut self, id: &str) -> bool {
		let before = self.agents.len();
		self.agents.retain(|a| a.id != id);
		self.agents.len() != before
	}

	/// Apply a pushed status event by direct field copy. Unknown ids are
	/// ignored; the next list fetch will bring the agent in whole.
	pub fn apply_status(&mut self, update: &StatusUpdate) -> bool {
		match self.agents.iter_mut().find(|a| a.id == update.agent_id) {
			Some(agent) => {
				agent.status = update.status;
				if update.current_step.is_some() {
					agent.current_step = update.current_step;
				}
				true
			}
			None => false,
		}
	}

	pub fn get(&self, id: &str) -> Option<&Agent> {
		self.agents.iter().find(|a| a.id == id)
	}

	pub fn all(&self) -> &[Agent] {
		&self.agents
	}

	pub fn len(&self) -> usize {
		self.agents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.agents.is_empty()
	}

	/// Filtered, searched, sorted snapshot for rendering.
	pub fn visible(&self, view: &ViewOptions) -> Vec<Agent> {
		let needle = view.search.trim().to_lowercase();
		let mut out: Vec<Agent> = self
			.agents
			.iter()
			.filter(|a| view.filter.matches(a.status))
			.filter(|a| {
				needle.is_empty()
					|| a.task.to_lowercase().contains(&needle)
					|| a.id.to_lowercase().contains(&needle)
			})
			.cloned()
			.collect();
		out.sort_by(|a, b| {
			let ord = match view.sort {
				SortKey::Created => a.created_at.cmp(&b.created_at),
				SortKey::Model => a.model.to_lowercase().cmp(&b.model.to_lowercase()),
				SortKey::Duration => a
					.execution_time_ms
					.unwrap_or(0)
					.cmp(&b.execution_time_ms.unwrap_or(0)),
				SortKey::Tokens => a.tokens_used.unwrap_or(0).cmp(&b.tokens_used.unwrap_or(0)),
			};
			match view.order {
				SortOrder::Ascending => ord,
				SortOrder::Descending => ord.reverse(),
			}
		});
		out
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
	#[default]
	All,
	Active,
	Idle,
	Completed,
	Failed,
}

impl StatusFilter {
	pub fn matches(&self, status: AgentStatus) -> bool {
		match self {
			StatusFilter::All => true,
			StatusFilter::Active => status.is_active(),
			StatusFilter::Idle => status == AgentStatus::Idle,
			StatusFilter::Completed => status == AgentStatus::Completed,
			StatusFilter::Failed => {
				matches!(status, AgentStatus::Failed | AgentStatus::Stopped)
			}
		}
	}

	pub fn next(&self) -> Self {
		match self {
			StatusFilter::All => StatusFilter::Active,
			StatusFilter::Active => StatusFilter::Idle,
			StatusFilter::Idle => StatusFilter::Completed,
			StatusFilter::Completed => StatusFilter::Failed,
			StatusFilter::Failed => StatusFilter::All,
		}
	}

	pub fn label(&self) -> &'static str {
		match self {
			StatusFilter::All => "all",
			StatusFilter::Active => "active",
			StatusFilter::Idle => "idle",
			StatusFilter::Completed => "completed",
			StatusFilter::Failed => "failed",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
	#[default]
	Created,
	Model,
	Duration,
	Tokens,
}

impl SortKey {
	pub fn next(&self) -> Self {
		match self {
			SortKey::Created => SortKey::Model,
			SortKey::Model => SortKey::Duration,
			SortKey::Duration => SortKey::Tokens,
			SortKey::Tokens => SortKey::Created,
		}
	}

	pub fn label(&self) -> &'static str {
		match self {
			SortKey::Created => "created",
			SortKey::Model => "model",
			SortKey::Duration => "duration",
			SortKey::Tokens => "tokens",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
	Ascending,
	#[default]
	Descending,
}

impl SortOrder {
	pub fn flipped(&self) -> Self {
		match self {
			SortOrder::Ascending => SortOrder::Descending,
			SortOrder::Descending => SortOrder::Ascending,
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
	pub filter: StatusFilter,
	pub search: String,
	pub sort: SortKey,
	pub order: SortOrder,
}

impl ViewOptions {
	/// Reselecting the current key flips the direction; a new key starts
	/// descending again.
	pub fn toggle_sort(&mut self, key: SortKey) {
		if self.sort == key {
			self.order = self.order.flipped();
		} else {
			self.sort = key;
			self.order = SortOrder::Descending;
		}
	}
}

/// Log entries for the focused agent, merged by id so a page fetch and a
/// pushed event carrying the same entry produce one row.
#[derive(Debug, Default)]
pub struct LogBuffer {
	entries: Vec<LogEntry>,
}

impl LogBuffer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, entry: LogEntry) {
		match self.entries.iter_mut().find(|e| e.id == entry.id) {
			Some(slot) => *slot = entry,
			None => self.entries.push(entry),
		}
		self.resort();
	}

	pub fn merge_page(&mut self, page: Vec<LogEntry>) {
		for entry in page {
			match self.entries.iter_mut().find(|e| e.id == entry.id) {
				Some(slot) => *slot = entry,
				None => self.entries.push(entry),
			}
		}
		self.resort();
	}

	fn resort(&mut self) {
		self.entries
			.sort_by(|a, b| (a.step, a.timestamp, a.id).cmp(&(b.step, b.timestamp, b.id)));
	}

	pub fn entries(&self) -> &[LogEntry] {
		&self.entries
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{LogLevel, ViewportProfile};
	use chrono::{Duration, Utc};

	fn agent(id: &str, task: &str, status: AgentStatus, age_minutes: i64) -> Agent {
		Agent {
			id: id.to_string(),
			task: task.to_string(),
			status,
			model: "gpt-4o".to_string(),
			max_steps: 25,
			headless: true,
			use_vision: false,
			generate_gif: false,
			browser_viewport: ViewportProfile::Pc,
			created_at: Utc::now() - Duration::minutes(age_minutes),
			current_step: None,
			execution_time_ms: None,
			tokens_used: None,
		}
	}

	fn entry(id: i64, step: u32, message: &str) -> LogEntry {
		LogEntry {
			id,
			agent_id: "a1".to_string(),
			step,
			timestamp: Utc::now(),
			level: LogLevel::Info,
			message: message.to_string(),
			url: None,
			screenshot: None,
			details: None,
		}
	}

	#[test]
	fn test_upsert_keeps_one_entry_per_id() {
		let mut store = AgentStore::new();
		store.upsert(agent("a1", "first version", AgentStatus::Pending, 10));
		store.upsert(agent("a2", "other", AgentStatus::Running, 5));
		store.upsert(agent("a1", "second version", AgentStatus::Running, 10));

		assert_eq!(store.len(), 2);
		let a1 = store.get("a1").unwrap();
		assert_eq!(a1.task, "second version");
		assert_eq!(a1.status, AgentStatus::Running);
		// Replacement happens in place; a2 is still at the head.
		assert_eq!(store.all()[0].id, "a2");
	}

	#[test]
	fn test_upsert_unknown_id_prepends() {
		let mut store = AgentStore::new();
		store.replace_all(vec![agent("old", "existing", AgentStatus::Idle, 60)]);
		store.upsert(agent("new", "fresh", AgentStatus::Pending, 0));
		assert_eq!(store.all()[0].id, "new");
		assert_eq!(store.all()[1].id, "old");
	}

	#[test]
	fn test_remove_excludes_from_every_view() {
		let mut store = AgentStore::new();
		store.replace_all(vec![
			agent("a1", "keep me", AgentStatus::Running, 1),
			agent("a2", "drop me", AgentStatus::Failed, 2),
		]);
		assert!(store.remove("a2"));
		assert!(!store.remove("a2"));

		for filter in [
			StatusFilter::All,
			StatusFilter::Active,
			StatusFilter::Failed,
		] {
			let view = ViewOptions {
				filter,
				..Default::default()
			};
			assert!(store.visible(&view).iter().all(|a| a.id != "a2"));
		}
	}

	#[test]
	fn test_status_filter_categories() {
		assert!(StatusFilter::Active.matches(AgentStatus::Running));
		assert!(StatusFilter::Active.matches(AgentStatus::Pending));
		assert!(StatusFilter::Active.matches(AgentStatus::Paused));
		assert!(!StatusFilter::Active.matches(AgentStatus::Completed));

		assert!(StatusFilter::Failed.matches(AgentStatus::Failed));
		assert!(StatusFilter::Failed.matches(AgentStatus::Stopped));
		assert!(!StatusFilter::Failed.matches(AgentStatus::Running));

		assert!(StatusFilter::Idle.matches(AgentStatus::Idle));
		assert!(StatusFilter::All.matches(AgentStatus::Stopped));
	}

	#[test]
	fn test_search_is_case_insensitive() {
		let mut store = AgentStore::new();
		store.replace_all(vec![
			agent("a1", "Check GitHub Trending", AgentStatus::Idle, 1),
			agent("a2", "book a flight", AgentStatus::Idle, 2),
		]);
		let view = ViewOptions {
			search: "github".to_string(),
			..Default::default()
		};
		let visible = store.visible(&view);
		assert_eq!(visible.len(), 1);
		assert_eq!(visible[0].id, "a1");
	}

	#[test]
	fn test_default_sort_is_most_recent_first() {
		let mut store = AgentStore::new();
		store.replace_all(vec![
			agent("older", "t", AgentStatus::Idle, 30),
			agent("newest", "t", AgentStatus::Idle, 1),
			agent("oldest", "t", AgentStatus::Idle, 90),
		]);
		let ids: Vec<String> = store
			.visible(&ViewOptions::default())
			.into_iter()
			.map(|a| a.id)
			.collect();
		assert_eq!(ids, vec!["newest", "older", "oldest"]);
	}

	#[test]
	fn test_sort_toggle_flips_then_resets() {
		let mut view = ViewOptions::default();
		assert_eq!(view.sort, SortKey::Created);
		assert_eq!(view.order, SortOrder::Descending);

		view.toggle_sort(SortKey::Created);
		assert_eq!(view.order, SortOrder::Ascending);
		view.toggle_sort(SortKey::Created);
		assert_eq!(view.order, SortOrder::Descending);

		view.toggle_sort(SortKey::Tokens);
		assert_eq!(view.sort, SortKey::Tokens);
		assert_eq!(view.order, SortOrder::Descending);
	}

	#[test]
	fn test_sort_by_tokens_treats_missing_as_zero() {
		let mut store = AgentStore::new();
		let mut heavy = agent("heavy", "t", AgentStatus::Completed, 5);
		heavy.tokens_used = Some(90_000);
		let mut light = agent("light", "t", AgentStatus::Completed, 3);
		light.tokens_used = Some(1_200);
		let unknown = agent("unknown", "t", AgentStatus::Pending, 1);
		store.replace_all(vec![light, unknown, heavy]);

		let view = ViewOptions {
			sort: SortKey::Tokens,
			..Default::default()
		};
		let ids: Vec<String> = store
			.visible(&view)
			.into_iter()
			.map(|a| a.id)
			.collect();
		assert_eq!(ids, vec!["heavy", "light", "unknown"]);
	}

	#[test]
	fn test_apply_status_is_a_direct_field_copy() {
		let mut store = AgentStore::new();
		store.upsert(agent("a1", "t", AgentStatus::Running, 1));

		let applied = store.apply_status(&StatusUpdate {
			agent_id: "a1".to_string(),
			status: AgentStatus::Completed,
			current_step: Some(9),
			timestamp: None,
		});
		assert!(applied);
		let a1 = store.get("a1").unwrap();
		assert_eq!(a1.status, AgentStatus::Completed);
		assert_eq!(a1.current_step, Some(9));

		// Unknown agents are not conjured out of a status event.
		let applied = store.apply_status(&StatusUpdate {
			agent_id: "ghost".to_string(),
			status: AgentStatus::Running,
			current_step: None,
			timestamp: None,
		});
		assert!(!applied);
		assert_eq!(store.len(), 1);
	}

	#[test]
	fn test_log_buffer_merges_by_id() {
		let mut buffer = LogBuffer::new();
		buffer.merge_page(vec![entry(1, 1, "opened page"), entry(2, 2, "typed query")]);
		// The push path delivers entry 2 again plus a new one.
		buffer.push(entry(2, 2, "typed query (retried)"));
		buffer.push(entry(3, 3, "submitted form"));

		assert_eq!(buffer.len(), 3);
		assert_eq!(buffer.entries()[1].message, "typed query (retried)");
		let steps: Vec<u32> = buffer.entries().iter().map(|e| e.step).collect();
		assert_eq!(steps, vec![1, 2, 3]);
	}
}

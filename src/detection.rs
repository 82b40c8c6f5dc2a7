use crate::model::{LogEntry, LogLevel};
use regex::Regex;

// Only the tail of the log matters; an obstacle twenty steps back was
// either cleared or the run already died on it.
const RECENT_WINDOW: usize = 20;

/// Situations where a run is blocked on something only a human can clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attention {
	Captcha,
	LoginWall,
	RateLimited,
	RepeatedErrors,
}

impl Attention {
	pub fn label(&self) -> &'static str {
		match self {
			Attention::Captcha => "captcha challenge",
			Attention::LoginWall => "login required",
			Attention::RateLimited => "rate limited",
			Attention::RepeatedErrors => "repeated errors",
		}
	}
}

pub struct TriageConfig {
	pub captcha_patterns: Vec<Regex>,
	pub login_patterns: Vec<Regex>,
	pub rate_limit_patterns: Vec<Regex>,
	pub error_streak: usize,
}

pub fn default_triage() -> TriageConfig {
	let captcha_patterns = vec![
		// Challenge pages (high confidence)
		Regex::new(r"(?i)captcha").unwrap(),
		Regex::new(r"(?i)verify (that )?you('| a)?re (a )?human").unwrap(),
		Regex::new(r"(?i)are you a robot").unwrap(),
		Regex::new(r"(?i)cloudflare.*challenge").unwrap(),
	];
	let login_patterns = vec![
		Regex::new(r"(?i)log ?in (is )?(required|to continue)").unwrap(),
		Regex::new(r"(?i)sign ?in to continue").unwrap(),
		Regex::new(r"(?i)session (has )?(expired|timed out)").unwrap(),
		Regex::new(r"(?i)authentication required").unwrap(),
	];
	let rate_limit_patterns = vec![
		Regex::new(r"(?i)rate limit").unwrap(),
		Regex::new(r"(?i)too many requests").unwrap(),
		Regex::new(r"\b429\b").unwrap(),
	];

	TriageConfig {
		captcha_patterns,
		login_patterns,
		rate_limit_patterns,
		error_streak: 3,
	}
}

/// Scan recent log entries for a blocker worth flagging to the user.
pub fn triage_logs(entries: &[LogEntry], triage: &TriageConfig) -> Option<Attention> {
	let start = entries.len().saturating_sub(RECENT_WINDOW);
	let recent = &entries[start..];

	// Explicit obstacles first.
	if matches_any(recent, &triage.captcha_patterns) {
		return Some(Attention::Captcha);
	}
	if matches_any(recent, &triage.login_patterns) {
		return Some(Attention::LoginWall);
	}
	if matches_any(recent, &triage.rate_limit_patterns) {
		return Some(Attention::RateLimited);
	}

	// A run that only produces errors is stuck even without a named cause.
	if triage.error_streak > 0 && recent.len() >= triage.error_streak {
		let tail = &recent[recent.len() - triage.error_streak..];
		if tail.iter().all(|e| e.level == LogLevel::Error) {
			return Some(Attention::RepeatedErrors);
		}
	}

	None
}

fn matches_any(entries: &[LogEntry], patterns: &[Regex]) -> bool {
	entries
		.iter()
		.any(|e| patterns.iter().any(|re| re.is_match(&e.message)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;

	fn entry(step: u32, level: LogLevel, message: &str) -> LogEntry {
		LogEntry {
			id: step as i64,
			agent_id: "a1".to_string(),
			step,
			timestamp: Utc::now(),
			level,
			message: message.to_string(),
			url: None,
			screenshot: None,
			details: None,
		}
	}

	#[test]
	fn test_captcha_is_flagged() {
		let logs = vec![
			entry(1, LogLevel::Action, "opened https://example.com"),
			entry(2, LogLevel::Warning, "page shows a CAPTCHA challenge"),
		];
		assert_eq!(
			triage_logs(&logs, &default_triage()),
			Some(Attention::Captcha)
		);
	}

	#[test]
	fn test_login_wall_is_flagged() {
		let logs = vec![entry(1, LogLevel::Info, "Sign in to continue to your account")];
		assert_eq!(
			triage_logs(&logs, &default_triage()),
			Some(Attention::LoginWall)
		);
	}

	#[test]
	fn test_rate_limit_is_flagged() {
		let logs = vec![entry(1, LogLevel::Error, "request failed with status 429")];
		assert_eq!(
			triage_logs(&logs, &default_triage()),
			Some(Attention::RateLimited)
		);
	}

	#[test]
	fn test_error_streak_is_flagged() {
		let logs = vec![
			entry(1, LogLevel::Info, "starting"),
			entry(2, LogLevel::Error, "click failed"),
			entry(3, LogLevel::Error, "click failed"),
			entry(4, LogLevel::Error, "click failed"),
		];
		assert_eq!(
			triage_logs(&logs, &default_triage()),
			Some(Attention::RepeatedErrors)
		);
	}

	#[test]
	fn test_interrupted_error_streak_is_not_flagged() {
		let logs = vec![
			entry(1, LogLevel::Error, "click failed"),
			entry(2, LogLevel::Error, "click failed"),
			entry(3, LogLevel::Action, "recovered, scrolling"),
		];
		assert_eq!(triage_logs(&logs, &default_triage()), None);
	}

	#[test]
	fn test_old_obstacles_age_out_of_the_window() {
		let mut logs = vec![entry(1, LogLevel::Warning, "hit a captcha")];
		for step in 2..30 {
			logs.push(entry(step, LogLevel::Action, "clicking through results"));
		}
		assert_eq!(triage_logs(&logs, &default_triage()), None);
	}

	#[test]
	fn test_quiet_logs_need_no_attention() {
		let logs = vec![
			entry(1, LogLevel::Info, "starting"),
			entry(2, LogLevel::Action, "navigated to https://example.com"),
		];
		assert_eq!(triage_logs(&logs, &default_triage()), None);
	}
}

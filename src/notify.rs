// Desktop notifications for agent transitions. Best effort: a missing
// notifier tool must never take the dashboard down.

const BODY_LIMIT: usize = 120;

pub fn notify_completed(task: &str) {
	send("Agent completed", &truncate(task));
}

pub fn notify_failed(task: &str) {
	send("Agent failed", &truncate(task));
}

pub fn notify_attention(reason: &str, task: &str) {
	send(&format!("Agent needs attention: {reason}"), &truncate(task));
}

fn truncate(text: &str) -> String {
	if text.chars().count() <= BODY_LIMIT {
		return text.to_string();
	}
	let cut: String = text.chars().take(BODY_LIMIT).collect();
	format!("{cut}…")
}

#[cfg(target_os = "macos")]
fn send(title: &str, body: &str) {
	use std::process::Command;
	let script = format!(
		"display notification \"{}\" with title \"{}\"",
		escape(body),
		escape(title)
	);
	let _ = Command::new("osascript").arg("-e").arg(script).status();
}

#[cfg(target_os = "macos")]
fn escape(text: &str) -> String {
	text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(target_os = "linux")]
fn send(title: &str, body: &str) {
	use std::process::Command;
	let _ = Command::new("notify-send")
		.arg("--app-name=roost")
		.arg(title)
		.arg(body)
		.status();
}

#[cfg(target_os = "windows")]
fn send(title: &str, body: &str) {
	use std::process::Command;
	let _ = Command::new("powershell")
		.args(["-Command", &powershell_script(title, body)])
		.status();
}

// Balloon tip via Windows.Forms. Single-quoted PowerShell strings; an
// embedded quote is escaped by doubling it.
#[cfg(any(target_os = "windows", test))]
fn powershell_script(title: &str, body: &str) -> String {
	let quote = |text: &str| format!("'{}'", text.replace('\'', "''"));
	format!(
		"Add-Type -AssemblyName System.Windows.Forms; \
		 $n = New-Object System.Windows.Forms.NotifyIcon; \
		 $n.Icon = [System.Drawing.SystemIcons]::Information; \
		 $n.Visible = $true; \
		 $n.ShowBalloonTip(5000, {}, {}, 'Info')",
		quote(title),
		quote(body)
	)
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
fn send(_title: &str, _body: &str) {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_caps_body_length() {
		let long = "x".repeat(400);
		let cut = truncate(&long);
		assert_eq!(cut.chars().count(), BODY_LIMIT + 1);
		assert!(cut.ends_with('…'));
		assert_eq!(truncate("short"), "short");
	}

	#[test]
	fn test_powershell_script_doubles_embedded_quotes() {
		let script = powershell_script("Agent failed", "couldn't reach 'checkout'");
		assert!(script.contains("'Agent failed'"));
		assert!(script.contains("'couldn''t reach ''checkout'''"));
		assert!(script.contains("ShowBalloonTip"));
	}
}

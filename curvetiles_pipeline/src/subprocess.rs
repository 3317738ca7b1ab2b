//! Shared driver for the external tile tools.

use crate::error::Cancelled;
use anyhow::{Context, Result, bail};
use curvetiles_core::CancellationToken;
use std::process::Stdio;
use tokio::process::Command;

/// Runs an external tool to completion, capturing combined output.
///
/// On cancellation the child is terminated (via kill-on-drop) and the call
/// returns [`Cancelled`]. A nonzero exit turns into an error carrying the
/// exit code and the tool's combined stdout/stderr, which the scheduler
/// stores in the job's error log.
pub(crate) async fn run_tool(command: &mut Command, tool: &str, cancel: &CancellationToken) -> Result<String> {
	command
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true);

	let child = command.spawn().with_context(|| format!("failed to spawn {tool}; is it installed?"))?;

	let output = tokio::select! {
		() = cancel.cancelled() => {
			return Err(anyhow::Error::new(Cancelled)).with_context(|| format!("{tool} terminated"));
		}
		result = child.wait_with_output() => {
			result.with_context(|| format!("failed to wait for {tool}"))?
		}
	};

	let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
	combined.push_str(&String::from_utf8_lossy(&output.stderr));

	if !output.status.success() {
		let code = output.status.code().map_or("signal".to_string(), |c| c.to_string());
		bail!("{tool} exited with status {code}:\n{combined}");
	}
	Ok(combined)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn captures_output_of_successful_tool() {
		let cancel = CancellationToken::new();
		let mut command = Command::new("sh");
		command.arg("-c").arg("echo built 42 tiles");
		let output = run_tool(&mut command, "sh", &cancel).await.unwrap();
		assert!(output.contains("built 42 tiles"));
	}

	#[tokio::test]
	async fn nonzero_exit_carries_output_in_error() {
		let cancel = CancellationToken::new();
		let mut command = Command::new("sh");
		command.arg("-c").arg("echo boom >&2; exit 3");
		let error = run_tool(&mut command, "sh", &cancel).await.unwrap_err();
		let message = error.to_string();
		assert!(message.contains("status 3"), "{message}");
		assert!(message.contains("boom"), "{message}");
	}

	#[tokio::test]
	async fn cancellation_terminates_the_child() {
		let cancel = CancellationToken::new();
		cancel.cancel();
		let mut command = Command::new("sleep");
		command.arg("30");
		let error = run_tool(&mut command, "sleep", &cancel).await.unwrap_err();
		assert!(crate::error::is_cancelled(&error));
	}

	#[tokio::test]
	async fn missing_binary_is_a_clear_error() {
		let cancel = CancellationToken::new();
		let mut command = Command::new("curvetiles-no-such-binary");
		let error = run_tool(&mut command, "curvetiles-no-such-binary", &cancel).await.unwrap_err();
		assert!(error.to_string().contains("is it installed"));
	}
}

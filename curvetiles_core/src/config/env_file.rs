use anyhow::{Context, Result};
use std::{env, fs, path::Path};

/// Overlays a flat `KEY=value` file into the process environment.
///
/// Lines starting with `#` and blank lines are ignored. Values already set
/// in the environment win; the file only fills gaps. Must be called before
/// any threads are spawned.
pub fn load_env_file(path: &Path) -> Result<usize> {
	let content = fs::read_to_string(path).with_context(|| format!("failed to read env file {path:?}"))?;

	let mut applied = 0;
	for (number, line) in content.lines().enumerate() {
		let line = line.trim();
		if line.is_empty() || line.starts_with('#') {
			continue;
		}
		let (key, value) = line
			.split_once('=')
			.with_context(|| format!("{path:?}:{}: expected KEY=value, got {line:?}", number + 1))?;
		let key = key.trim();
		let value = value.trim();
		if env::var_os(key).is_none() {
			// Safety: only called from startup, before worker threads exist.
			unsafe { env::set_var(key, value) };
			applied += 1;
		}
	}
	Ok(applied)
}

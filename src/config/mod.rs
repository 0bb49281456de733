use anyhow::Result;
use serde::Deserialize;

/// Ambient runtime configuration for the CLI binaries.
///
/// Native library callers never go through this type — they construct a
/// `Provider` directly with explicit parameters. This exists so the
/// `validate`/`benchmark` binaries (and anyone else who wants file/env
/// driven defaults) don't have to hand-roll env parsing.
///
/// Values are loaded from (in order): `config` file (optional) and
/// environment variables prefixed with `OIDCRP_` (e.g. `OIDCRP_DEBUG`).
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Settings {
	pub http_timeout_ms: u64,
	pub refresh_interval_secs: u64,
	pub refresh_retry_secs: u64,
	pub debug: bool,
	pub log_level: Option<String>,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			http_timeout_ms: 10_000,
			refresh_interval_secs: 60,
			refresh_retry_secs: 5,
			debug: false,
			log_level: Some("info".to_string()),
		}
	}
}

/// Partial settings used to overlay environment/file values on top of defaults.
#[derive(Debug, Deserialize)]
struct PartialSettings {
	http_timeout_ms: Option<u64>,
	refresh_interval_secs: Option<u64>,
	refresh_retry_secs: Option<u64>,
	debug: Option<bool>,
	log_level: Option<String>,
}

/// Load settings from config file (optional) and environment variables.
pub fn load() -> Result<Settings> {
	let builder = config::Config::builder()
		.add_source(config::File::with_name("config").required(false))
		// Use a double-underscore separator so single-underscore env names
		// like `OIDCRP_HTTP_TIMEOUT_MS` map to `http_timeout_ms` rather than
		// nested `http.timeout.ms`.
		.add_source(config::Environment::with_prefix("OIDCRP").separator("__"));

	let cfg = builder.build()?;
	let partial: PartialSettings = cfg.try_deserialize()?;

	let mut s = Settings::default();
	if let Some(v) = partial.http_timeout_ms {
		s.http_timeout_ms = v;
	}
	if let Some(v) = partial.refresh_interval_secs {
		s.refresh_interval_secs = v;
	}
	if let Some(v) = partial.refresh_retry_secs {
		s.refresh_retry_secs = v;
	}
	if let Some(v) = partial.debug {
		s.debug = v;
	}
	if let Some(v) = partial.log_level {
		s.log_level = Some(v);
	}

	// Explicit direct-env overrides; the `config` crate's env source doesn't
	// always map cleanly in CI/test harnesses, so re-check directly.
	if let Ok(v) = std::env::var("OIDCRP_DEBUG") {
		s.debug = !v.is_empty() && v != "0" && v.to_lowercase() != "false";
	}
	if let Ok(v) = std::env::var("OIDCRP_LOG_LEVEL") {
		if !v.is_empty() {
			s.log_level = Some(v);
		}
	}

	Ok(s)
}

#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use std::env;

	#[test]
	fn test_load_defaults_and_env_overlay() {
		let orig_debug = env::var_os("OIDCRP_DEBUG");
		let orig_level = env::var_os("OIDCRP_LOG_LEVEL");

		unsafe { env::remove_var("OIDCRP_DEBUG") };
		unsafe { env::remove_var("OIDCRP_LOG_LEVEL") };

		let s = load().expect("load should succeed with defaults");
		let d = Settings::default();
		assert_eq!(s.http_timeout_ms, d.http_timeout_ms);
		assert_eq!(s.refresh_interval_secs, d.refresh_interval_secs);
		assert!(!s.debug);

		unsafe { env::set_var("OIDCRP_DEBUG", "true") };
		unsafe { env::set_var("OIDCRP_LOG_LEVEL", "debug") };

		let s2 = load().expect("load should succeed with env");
		assert!(s2.debug);
		assert_eq!(s2.log_level.as_deref(), Some("debug"));

		match orig_debug {
			Some(v) => unsafe { env::set_var("OIDCRP_DEBUG", v) },
			None => unsafe { env::remove_var("OIDCRP_DEBUG") },
		}
		match orig_level {
			Some(v) => unsafe { env::set_var("OIDCRP_LOG_LEVEL", v) },
			None => unsafe { env::remove_var("OIDCRP_LOG_LEVEL") },
		}
	}
}

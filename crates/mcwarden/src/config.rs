use serde::Deserialize;
use std::path::{Path, PathBuf};

use warden::commands::{default_sampler_command, DEFAULT_CPU_THRESHOLD};
use warden::{CpuSampler, Dispatcher, LaunchSpec};

// ── mcwarden.toml / ~/.config/mcwarden/config.toml ──────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
	#[serde(default)]
	pub server: ServerConfig,
	#[serde(default)]
	pub wrapper: WrapperConfig,
	#[serde(default)]
	pub cpu: CpuConfig,
	#[serde(default)]
	pub backup: BackupConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
	#[serde(default = "default_java")]
	pub java: String,
	#[serde(default = "default_jvm_args")]
	pub jvm_args: Vec<String>,
	#[serde(default = "default_jar")]
	pub jar: String,
	#[serde(default = "default_server_args")]
	pub server_args: Vec<String>,
	pub dir: Option<PathBuf>,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			java: default_java(),
			jvm_args: default_jvm_args(),
			jar: default_jar(),
			server_args: default_server_args(),
			dir: None,
		}
	}
}

fn default_java() -> String { "java".into() }
fn default_jvm_args() -> Vec<String> { vec!["-Xms1G".into(), "-Xmx8G".into()] }
fn default_jar() -> String { "minecraft_server.1.13.2.jar".into() }
fn default_server_args() -> Vec<String> { vec!["nogui".into()] }

#[derive(Debug, Clone, Deserialize)]
pub struct WrapperConfig {
	#[serde(default = "default_poll_timeout")]
	pub poll_timeout_secs: u64,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

impl Default for WrapperConfig {
	fn default() -> Self {
		Self { poll_timeout_secs: default_poll_timeout(), log_level: default_log_level() }
	}
}

fn default_poll_timeout() -> u64 { 10 }
fn default_log_level() -> String { "info".into() }

#[derive(Debug, Clone, Deserialize)]
pub struct CpuConfig {
	#[serde(default = "default_threshold")]
	pub threshold: f64,
	#[serde(default = "default_sampler_command")]
	pub sampler: Vec<String>,
}

impl Default for CpuConfig {
	fn default() -> Self {
		Self { threshold: default_threshold(), sampler: default_sampler_command() }
	}
}

fn default_threshold() -> f64 { DEFAULT_CPU_THRESHOLD }

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BackupConfig {
	pub command: Option<Vec<String>>,
}

impl Config {
	pub fn launch_spec(&self) -> LaunchSpec {
		let server = &self.server;
		let spec = LaunchSpec::java(&server.java, &server.jvm_args, &server.jar, &server.server_args);
		match &server.dir {
			Some(dir) => spec.with_dir(dir.clone()),
			None => spec,
		}
	}

	pub fn dispatcher(&self) -> Dispatcher {
		let sampler = CpuSampler {
			command: self.cpu.sampler.clone(),
			threshold: self.cpu.threshold,
		};
		Dispatcher::new(sampler).with_backup(self.backup.command.clone())
	}
}

/// A missing file means defaults unless it was asked for explicitly. Unreadable
/// or malformed files are reported and defaults used.
pub fn load(path: Option<&Path>, explicit: bool) -> Config {
	match read(path, explicit) {
		Ok(config) => config,
		Err(warning) => {
			eprintln!("warning: {}, using defaults", warning);
			Config::default()
		}
	}
}

fn read(path: Option<&Path>, explicit: bool) -> Result<Config, String> {
	let Some(path) = path else {
		return Ok(Config::default());
	};
	match std::fs::read_to_string(path) {
		Ok(content) => toml::from_str(&content).map_err(|e| format!("failed to parse {}: {}", path.display(), e)),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(Config::default()),
		Err(e) => Err(format!("failed to read {}: {}", path.display(), e)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write(content: &str) -> (tempfile::TempDir, PathBuf) {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("mcwarden.toml");
		std::fs::write(&path, content).unwrap();
		(dir, path)
	}

	#[test]
	fn defaults_without_file() {
		let config = load(None, false);
		assert_eq!(config.server.jar, "minecraft_server.1.13.2.jar");
		assert_eq!(config.server.jvm_args, vec!["-Xms1G", "-Xmx8G"]);
		assert_eq!(config.wrapper.poll_timeout_secs, 10);
		assert_eq!(config.cpu.threshold, 80.0);
		assert!(config.backup.command.is_none());
		assert_eq!(
			config.launch_spec().argv(),
			vec!["java", "-Xms1G", "-Xmx8G", "-jar", "minecraft_server.1.13.2.jar", "nogui"]
		);
	}

	#[test]
	fn missing_file_is_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let config = load(Some(&dir.path().join("nope.toml")), false);
		assert_eq!(config.server.java, "java");
	}

	#[test]
	fn missing_explicit_file_is_reported() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("typo.toml");
		let warning = read(Some(&path), true).unwrap_err();
		assert!(warning.contains("typo.toml"), "{}", warning);
		assert!(read(Some(&path), false).is_ok());

		let config = load(Some(&path), true);
		assert_eq!(config.server.jar, "minecraft_server.1.13.2.jar");
	}

	#[test]
	fn partial_sections_keep_defaults() {
		let (_dir, path) = write(
			r#"
[server]
jar = "paper.jar"
dir = "/srv/mc"

[cpu]
threshold = 50.0
sampler = ["ps", "-p", "{pid}", "-o", "%cpu="]

[backup]
command = ["tar", "czf", "world.tgz", "world"]
"#,
		);
		let config = load(Some(&path), true);
		assert_eq!(config.server.jar, "paper.jar");
		assert_eq!(config.server.server_args, vec!["nogui"]);
		assert_eq!(config.wrapper.log_level, "info");
		assert_eq!(config.cpu.threshold, 50.0);

		let spec = config.launch_spec();
		assert_eq!(spec.dir, Some(PathBuf::from("/srv/mc")));
		assert_eq!(spec.args.last().map(String::as_str), Some("nogui"));
	}

	#[test]
	fn malformed_file_falls_back() {
		let (_dir, path) = write("[server\njar = ");
		assert!(read(Some(&path), false).is_err());
		let config = load(Some(&path), false);
		assert_eq!(config.server.jar, "minecraft_server.1.13.2.jar");
	}
}

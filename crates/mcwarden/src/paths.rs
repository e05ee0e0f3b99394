use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "mcwarden";
pub const LOCAL_CONFIG: &str = "mcwarden.toml";

pub fn config_dir() -> PathBuf {
	if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
		PathBuf::from(dir).join(APP_NAME)
	} else if let Some(home) = home_dir() {
		home.join(".config").join(APP_NAME)
	} else {
		PathBuf::from("/tmp").join(APP_NAME).join("config")
	}
}

/// First config file that exists: `explicit`, then `./mcwarden.toml`, then the XDG one.
/// An explicit path is returned even when missing; `config::load` reports it.
pub fn find_config(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
	if let Some(path) = explicit {
		return Some(path.to_path_buf());
	}
	let local = cwd.join(LOCAL_CONFIG);
	if local.is_file() {
		return Some(local);
	}
	let global = config_dir().join("config.toml");
	global.is_file().then_some(global)
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}

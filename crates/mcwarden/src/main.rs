mod config;
mod paths;

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::filter::LevelFilter;
use warden::{Console, Interrupts, Reactor};

use config::Config;

/// Runs a Minecraft server, relays its warnings to chat and answers `!` commands.
#[derive(Debug, Parser)]
#[command(name = "mcwarden", version)]
struct Cli {
	/// Config file (default: ./mcwarden.toml, then ~/.config/mcwarden/config.toml)
	#[arg(long, short)]
	config: Option<PathBuf>,
	/// Server jar to launch
	#[arg(long)]
	jar: Option<String>,
	/// Java executable
	#[arg(long)]
	java: Option<String>,
	/// Working directory for the server
	#[arg(long)]
	dir: Option<PathBuf>,
	/// Log at debug level
	#[arg(long, short)]
	verbose: bool,
	/// Arguments passed to the server after the jar (default: nogui)
	#[arg(trailing_var_arg = true, allow_hyphen_values = true)]
	server_args: Vec<String>,
}

impl Cli {
	fn apply(&self, config: &mut Config) {
		if let Some(jar) = &self.jar {
			config.server.jar = jar.clone();
		}
		if let Some(java) = &self.java {
			config.server.java = java.clone();
		}
		if let Some(dir) = &self.dir {
			config.server.dir = Some(dir.clone());
		}
		if !self.server_args.is_empty() {
			config.server.server_args = self.server_args.clone();
		}
		if self.verbose {
			config.wrapper.log_level = "debug".into();
		}
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	let cli = Cli::parse();

	let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
	let path = paths::find_config(cli.config.as_deref(), &cwd);
	let mut config = config::load(path.as_deref(), cli.config.is_some());
	cli.apply(&mut config);

	let level = config.wrapper.log_level.parse::<LevelFilter>().unwrap_or_else(|_| {
		eprintln!("warning: unknown log level {:?}, using info", config.wrapper.log_level);
		LevelFilter::INFO
	});
	tracing_subscriber::fmt().with_writer(std::io::stderr).with_max_level(level).init();

	// stdin is read on a blocking thread the runtime would wait for on shutdown
	let code = match run(&config).await {
		Ok(code) => code,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			1
		}
	};
	std::process::exit(code);
}

async fn run(config: &Config) -> warden::Result<i32> {
	let spec = config.launch_spec();
	tracing::info!("starting server: {}", spec.argv().join(" "));

	let mut reactor = Reactor::launch(
		spec,
		config.dispatcher(),
		warden::lines_of(tokio::io::stdin()),
		Console::stdio(),
		Interrupts::sigint()?,
	)?
	.with_poll_timeout(Duration::from_secs(config.wrapper.poll_timeout_secs.max(1)));

	let status = reactor.run().await?;
	tracing::info!("server exited: {}", describe(status));
	Ok(status.map(exit_code).unwrap_or(0))
}

fn exit_code(status: ExitStatus) -> i32 {
	match (status.code(), status.signal()) {
		(Some(code), _) => code,
		(None, Some(signal)) => 128 + signal,
		(None, None) => 1,
	}
}

fn describe(status: Option<ExitStatus>) -> String {
	match status {
		Some(s) => s.to_string(),
		None => "unknown status".into(),
	}
}

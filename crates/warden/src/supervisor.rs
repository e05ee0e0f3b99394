use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::{Error, Result};
use crate::handlers::LineHandler;
use crate::registry::{ProcessSources, Registry};
use crate::types::{LaunchSpec, StreamKind};

/// Owns the server process and any auxiliary processes still being reaped.
pub struct Supervisor {
	child: Child,
	stdin: Option<ChildStdin>,
	pid: u32,
	spec: LaunchSpec,
	sources: ProcessSources,
	exit_status: Option<ExitStatus>,
	auxiliaries: Vec<AuxiliaryProcess>,
}

/// A short-lived helper process. Its stdout is piped, stderr goes to ours.
pub struct AuxiliaryProcess {
	label: String,
	child: Child,
}

impl Supervisor {
	/// Starts the server with piped stdio and registers its stdout and stderr
	/// with handlers built by `make_handler`.
	pub fn launch<F>(spec: LaunchSpec, registry: &mut Registry, mut make_handler: F) -> Result<Self>
	where
		F: FnMut(StreamKind) -> Box<dyn LineHandler>,
	{
		let mut cmd = command(&spec);
		cmd.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.process_group(0);

		let mut child = cmd.spawn().map_err(|source| Error::Launch {
			program: spec.program.clone(),
			source,
		})?;
		let pid = child.id().unwrap_or(0);
		let stdin = child.stdin.take();
		let sources = registry.add_process_output(
			"server",
			&mut child,
			Some(make_handler(StreamKind::Stdout)),
			Some(make_handler(StreamKind::Stderr)),
		);

		tracing::info!("server started (pid {}): {}", pid, spec.argv().join(" "));

		Ok(Self {
			child,
			stdin,
			pid,
			spec,
			sources,
			exit_status: None,
			auxiliaries: Vec::new(),
		})
	}

	pub fn pid(&self) -> u32 {
		self.pid
	}

	pub fn spec(&self) -> &LaunchSpec {
		&self.spec
	}

	pub fn sources(&self) -> ProcessSources {
		self.sources
	}

	pub fn exit_status(&self) -> Option<ExitStatus> {
		self.exit_status
	}

	/// Non-blocking liveness check. Once an exit is observed it is remembered.
	pub fn is_running(&mut self) -> bool {
		if self.exit_status.is_some() {
			return false;
		}
		match self.child.try_wait() {
			Ok(Some(status)) => {
				tracing::info!("server exited ({})", status);
				self.exit_status = Some(status);
				self.stdin = None;
				false
			}
			Ok(None) => true,
			Err(e) => {
				tracing::warn!("failed to poll server status: {}", e);
				false
			}
		}
	}

	/// Writes `text` and a newline to the server's stdin, flushing immediately.
	pub async fn write_line(&mut self, text: &str) -> Result<()> {
		if !self.is_running() {
			return Err(Error::BrokenPipe);
		}
		let Some(stdin) = self.stdin.as_mut() else {
			return Err(Error::BrokenPipe);
		};

		let mut line = String::with_capacity(text.len() + 1);
		line.push_str(text);
		line.push('\n');

		let result = match stdin.write_all(line.as_bytes()).await {
			Ok(()) => stdin.flush().await,
			Err(e) => Err(e),
		};
		match result {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
				self.stdin = None;
				Err(Error::BrokenPipe)
			}
			Err(e) => Err(e.into()),
		}
	}

	pub async fn say(&mut self, message: &str) -> Result<()> {
		self.write_line(&format!("say {}", message)).await
	}

	/// Sends SIGINT to the server. The wrapper keeps running.
	pub fn forward_interrupt(&self) -> Result<()> {
		use nix::sys::signal::{kill, Signal};
		use nix::unistd::Pid;

		tracing::info!("forwarding interrupt to server (pid {})", self.pid);
		kill(Pid::from_raw(self.pid as i32), Signal::SIGINT)
			.map_err(|errno| Error::Io(std::io::Error::from(errno)))
	}

	/// Interrupts the server and waits up to `grace` for it to exit, then kills it.
	pub async fn shutdown(&mut self, grace: Duration) -> Option<ExitStatus> {
		if !self.is_running() {
			return self.exit_status;
		}
		self.stdin = None;
		if let Err(e) = self.forward_interrupt() {
			tracing::warn!("failed to interrupt server: {}", e);
		}

		let status = match tokio::time::timeout(grace, self.child.wait()).await {
			Ok(result) => result,
			Err(_) => {
				tracing::warn!("server (pid {}) did not stop within {:?}, killing", self.pid, grace);
				match self.child.kill().await {
					Ok(()) => self.child.wait().await,
					Err(e) => Err(e),
				}
			}
		};
		match status {
			Ok(status) => {
				tracing::info!("server stopped ({})", status);
				self.exit_status = Some(status);
			}
			Err(e) => tracing::warn!("failed to stop server: {}", e),
		}
		self.exit_status
	}

	/// Starts a helper process. Registering its output is the caller's job.
	pub fn spawn_auxiliary(&self, spec: &LaunchSpec) -> Result<AuxiliaryProcess> {
		let mut cmd = command(spec);
		cmd.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.kill_on_drop(true);

		let child = cmd.spawn().map_err(|source| Error::Launch {
			program: spec.program.clone(),
			source,
		})?;
		let label = spec.program.rsplit('/').next().unwrap_or(&spec.program).to_string();
		tracing::debug!("spawned auxiliary {} (pid {:?})", label, child.id());
		Ok(AuxiliaryProcess { label, child })
	}

	/// Takes back a finished helper. It is reaped now if it has exited, or on a later tick.
	pub fn retire(&mut self, mut aux: AuxiliaryProcess) {
		if !aux.try_reap() {
			self.auxiliaries.push(aux);
		}
	}

	pub fn reap_auxiliaries(&mut self) {
		self.auxiliaries.retain_mut(|aux| !aux.try_reap());
	}

	pub fn pending_auxiliaries(&self) -> usize {
		self.auxiliaries.len()
	}
}

impl AuxiliaryProcess {
	pub fn label(&self) -> &str {
		&self.label
	}

	pub fn pid(&self) -> Option<u32> {
		self.child.id()
	}

	pub fn take_stdout(&mut self) -> Option<ChildStdout> {
		self.child.stdout.take()
	}

	/// Returns true once the process has exited and been reaped.
	fn try_reap(&mut self) -> bool {
		match self.child.try_wait() {
			Ok(Some(status)) => {
				if !status.success() {
					tracing::warn!("{} exited with {}", self.label, status);
				}
				true
			}
			Ok(None) => false,
			Err(e) => {
				tracing::warn!("failed to reap {}: {}", self.label, e);
				true
			}
		}
	}
}

fn command(spec: &LaunchSpec) -> Command {
	let mut cmd = Command::new(&spec.program);
	cmd.args(&spec.args);
	if let Some(dir) = &spec.dir {
		cmd.current_dir(dir);
	}
	cmd
}

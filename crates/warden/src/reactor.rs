use std::io;
use std::process::ExitStatus;
use std::task::Poll;
use std::time::Duration;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;

use crate::commands::Dispatcher;
use crate::console::Console;
use crate::error::Result;
use crate::handlers::{Context, LineHandler, OperatorInput, ServerOutput};
use crate::registry::{LineStream, Registry};
use crate::supervisor::Supervisor;
use crate::types::{LaunchSpec, SourceEvent, SourceId};

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Interrupt notifications raced against the reactor's wait.
pub struct Interrupts {
	source: InterruptSource,
}

enum InterruptSource {
	Signal(Signal),
	Channel(mpsc::UnboundedReceiver<()>),
	Never,
}

impl Interrupts {
	/// Installs a SIGINT listener. From here on SIGINT no longer terminates the wrapper.
	pub fn sigint() -> io::Result<Self> {
		Ok(Self {
			source: InterruptSource::Signal(signal(SignalKind::interrupt())?),
		})
	}

	pub fn channel() -> (mpsc::UnboundedSender<()>, Self) {
		let (tx, rx) = mpsc::unbounded_channel();
		(tx, Self { source: InterruptSource::Channel(rx) })
	}

	pub fn never() -> Self {
		Self { source: InterruptSource::Never }
	}

	async fn recv(&mut self) {
		let delivered = match &mut self.source {
			InterruptSource::Signal(sig) => sig.recv().await.is_some(),
			InterruptSource::Channel(rx) => rx.recv().await.is_some(),
			InterruptSource::Never => false,
		};
		if !delivered {
			self.source = InterruptSource::Never;
			std::future::pending::<()>().await;
		}
	}
}

enum Wake {
	Ready(Vec<(SourceId, SourceEvent)>),
	Interrupt,
	Timeout,
}

/// Single-threaded event loop that runs until the server exits.
pub struct Reactor {
	supervisor: Supervisor,
	registry: Registry,
	console: Console,
	interrupts: Interrupts,
	poll_timeout: Duration,
	shutdown_grace: Duration,
}

impl Reactor {
	pub fn new(supervisor: Supervisor, registry: Registry, console: Console, interrupts: Interrupts) -> Self {
		Self {
			supervisor,
			registry,
			console,
			interrupts,
			poll_timeout: DEFAULT_POLL_TIMEOUT,
			shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
		}
	}

	/// Registers operator input, launches the server with its output bound to
	/// [`ServerOutput`] handlers, and returns a reactor ready to [`run`](Self::run).
	pub fn launch(
		spec: LaunchSpec,
		dispatcher: Dispatcher,
		operator: LineStream,
		console: Console,
		interrupts: Interrupts,
	) -> Result<Self> {
		let mut registry = Registry::new();
		registry.add("operator stdin", operator, Box::new(OperatorInput::new(dispatcher.clone())));
		let supervisor = Supervisor::launch(spec, &mut registry, |stream| -> Box<dyn LineHandler> {
			Box::new(ServerOutput::new(stream, dispatcher.clone()))
		})?;
		Ok(Self::new(supervisor, registry, console, interrupts))
	}

	pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
		self.poll_timeout = timeout;
		self
	}

	/// How long a fatal error waits for the server to stop before killing it.
	pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
		self.shutdown_grace = grace;
		self
	}

	pub fn supervisor(&self) -> &Supervisor {
		&self.supervisor
	}

	pub fn supervisor_mut(&mut self) -> &mut Supervisor {
		&mut self.supervisor
	}

	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	pub fn registry_mut(&mut self) -> &mut Registry {
		&mut self.registry
	}

	/// Runs until the server is observed to have exited. A fatal handler error
	/// ends the loop early, after the server has been stopped.
	pub async fn run(&mut self) -> Result<Option<ExitStatus>> {
		if let Err(e) = self.run_until_exit().await {
			tracing::error!("stopping server after fatal error: {}", e);
			self.supervisor.shutdown(self.shutdown_grace).await;
			return Err(e);
		}
		Ok(self.supervisor.exit_status())
	}

	async fn run_until_exit(&mut self) -> Result<()> {
		loop {
			self.supervisor.reap_auxiliaries();
			if !self.supervisor.is_running() {
				break;
			}

			match self.wait().await {
				Wake::Ready(events) => {
					for (id, event) in events {
						self.dispatch(id, event).await?;
					}
				}
				Wake::Interrupt => {
					if let Err(e) = self.supervisor.forward_interrupt() {
						tracing::warn!("failed to forward interrupt: {}", e);
					}
				}
				Wake::Timeout => {}
			}
		}
		Ok(())
	}

	// The wait set is fixed here; registry changes made by handlers show up next cycle.
	async fn wait(&mut self) -> Wake {
		let snapshot = self.registry.active_sources();
		let timeout = self.poll_timeout;
		let registry = &mut self.registry;
		let interrupts = &mut self.interrupts;

		tokio::select! {
			events = ready_events(registry, &snapshot) => Wake::Ready(events),
			_ = interrupts.recv() => Wake::Interrupt,
			_ = tokio::time::sleep(timeout) => Wake::Timeout,
		}
	}

	async fn dispatch(&mut self, id: SourceId, event: SourceEvent) -> Result<()> {
		// unregistered by an earlier handler in this cycle
		if !self.registry.contains(id) {
			return Ok(());
		}
		if event == SourceEvent::Closed {
			self.registry.mark_closed(id);
		}
		let Some(mut handler) = self.registry.take_handler(id) else {
			return Ok(());
		};

		let mut ctx = Context {
			source: id,
			supervisor: &mut self.supervisor,
			registry: &mut self.registry,
			console: &mut self.console,
		};
		let result = handler.handle(event, &mut ctx).await;
		self.registry.restore_handler(id, handler);

		match result {
			Ok(()) => Ok(()),
			Err(e) if e.is_fatal() => Err(e),
			Err(e) => {
				tracing::warn!("handler for source {} failed: {}", id, e);
				Ok(())
			}
		}
	}
}

/// Resolves once at least one source has a line or hit end-of-stream, taking
/// at most one event from each. Nothing is consumed while pending.
async fn ready_events(registry: &mut Registry, snapshot: &[SourceId]) -> Vec<(SourceId, SourceEvent)> {
	std::future::poll_fn(|cx| {
		let ready: Vec<_> = snapshot
			.iter()
			.filter_map(|&id| match registry.poll_source(id, cx) {
				Poll::Ready(event) => Some((id, event)),
				Poll::Pending => None,
			})
			.collect();
		if ready.is_empty() {
			Poll::Pending
		} else {
			Poll::Ready(ready)
		}
	})
	.await
}

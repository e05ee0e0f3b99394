use async_trait::async_trait;

use crate::classify::{self, LogRecord, ParsedLine, INFO_TAG, WARN_TAG};
use crate::commands::Dispatcher;
use crate::console::Console;
use crate::error::Result;
use crate::registry::Registry;
use crate::supervisor::Supervisor;
use crate::types::{CommandInvocation, SourceEvent, SourceId, StreamKind};

/// What a handler can reach while it processes one event.
pub struct Context<'a> {
	/// The source whose event is being handled.
	pub source: SourceId,
	pub supervisor: &'a mut Supervisor,
	pub registry: &'a mut Registry,
	pub console: &'a mut Console,
}

/// Invoked by the reactor with exactly one event from the source it is bound to.
#[async_trait(?Send)]
pub trait LineHandler {
	async fn handle(&mut self, event: SourceEvent, ctx: &mut Context<'_>) -> Result<()>;
}

/// Operator input: `!` lines go to the dispatcher, everything else to the server.
pub struct OperatorInput {
	dispatcher: Dispatcher,
}

impl OperatorInput {
	pub fn new(dispatcher: Dispatcher) -> Self {
		Self { dispatcher }
	}
}

#[async_trait(?Send)]
impl LineHandler for OperatorInput {
	async fn handle(&mut self, event: SourceEvent, ctx: &mut Context<'_>) -> Result<()> {
		let line = match event {
			SourceEvent::Line(line) => line,
			SourceEvent::Closed => {
				tracing::info!("operator input closed");
				return Ok(());
			}
		};

		if let Some(cmd) = CommandInvocation::parse(line.trim()) {
			tracing::info!("operator command: {}", cmd.name);
			return self.dispatcher.dispatch(&cmd, ctx);
		}
		ctx.supervisor.write_line(&line).await
	}
}

/// Server stdout/stderr: echo locally, then act on warnings and chat commands.
pub struct ServerOutput {
	stream: StreamKind,
	dispatcher: Dispatcher,
}

impl ServerOutput {
	pub fn new(stream: StreamKind, dispatcher: Dispatcher) -> Self {
		Self { stream, dispatcher }
	}

	async fn on_log(&self, record: LogRecord<'_>, ctx: &mut Context<'_>) -> Result<()> {
		match record.tag {
			WARN_TAG => ctx.supervisor.say(record.message).await,
			INFO_TAG => {
				let Some(chat) = record.chat() else {
					return Ok(());
				};
				match CommandInvocation::parse(chat.text) {
					Some(cmd) => {
						tracing::info!("{} issued command: {}", chat.sender, cmd.name);
						self.dispatcher.dispatch(&cmd, ctx)
					}
					None => Ok(()),
				}
			}
			_ => Ok(()),
		}
	}
}

#[async_trait(?Send)]
impl LineHandler for ServerOutput {
	async fn handle(&mut self, event: SourceEvent, ctx: &mut Context<'_>) -> Result<()> {
		let SourceEvent::Line(raw) = event else {
			tracing::debug!("server {} closed", self.stream.as_str());
			return Ok(());
		};

		ctx.console.echo(self.stream, &raw);
		let line = raw.trim();
		if line.is_empty() {
			return Ok(());
		}

		match classify::classify(line) {
			ParsedLine::Log(record) => self.on_log(record, ctx).await,
			_ => {
				tracing::info!("log message doesn't match: {}", line);
				Ok(())
			}
		}
	}
}

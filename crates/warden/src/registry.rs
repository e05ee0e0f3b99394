use std::io;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::Stream;

use crate::error::{Error, Result};
use crate::handlers::LineHandler;
use crate::types::{SourceEvent, SourceId};

/// A readable stream of lines, newline already stripped.
pub type LineStream = Pin<Box<dyn Stream<Item = io::Result<String>>>>;

pub fn lines_of<R>(reader: R) -> LineStream
where
	R: AsyncRead + 'static,
{
	Box::pin(LinesStream::new(BufReader::new(reader).lines()))
}

struct EventSource {
	id: SourceId,
	label: String,
	lines: LineStream,
	// `None` only while the reactor is running this source's handler.
	handler: Option<Box<dyn LineHandler>>,
	live: bool,
}

/// Ids of the stdout/stderr sources registered for one child process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSources {
	pub stdout: Option<SourceId>,
	pub stderr: Option<SourceId>,
}

impl ProcessSources {
	pub fn ids(&self) -> impl Iterator<Item = SourceId> {
		self.stdout.into_iter().chain(self.stderr)
	}
}

/// The set of event sources and the handler bound to each, in registration order.
#[derive(Default)]
pub struct Registry {
	sources: Vec<EventSource>,
	next_id: u64,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Reserves a fresh identifier.
	pub fn allocate_id(&mut self) -> SourceId {
		let id = SourceId::new(self.next_id);
		self.next_id += 1;
		id
	}

	pub fn register(
		&mut self,
		id: SourceId,
		label: impl Into<String>,
		lines: LineStream,
		handler: Box<dyn LineHandler>,
	) -> Result<()> {
		if self.contains(id) {
			return Err(Error::AlreadyRegistered(id));
		}
		if id.get() >= self.next_id {
			self.next_id = id.get() + 1;
		}
		let label = label.into();
		tracing::debug!("registered source {} ({})", id, label);
		self.sources.push(EventSource {
			id,
			label,
			lines,
			handler: Some(handler),
			live: true,
		});
		Ok(())
	}

	/// Registers under a freshly allocated id.
	pub fn add(&mut self, label: impl Into<String>, lines: LineStream, handler: Box<dyn LineHandler>) -> SourceId {
		let id = self.allocate_id();
		self.sources.push(EventSource {
			id,
			label: label.into(),
			lines,
			handler: Some(handler),
			live: true,
		});
		id
	}

	pub fn add_reader<R>(&mut self, label: impl Into<String>, reader: R, handler: Box<dyn LineHandler>) -> SourceId
	where
		R: AsyncRead + 'static,
	{
		self.add(label, lines_of(reader), handler)
	}

	/// Takes the child's piped stdout/stderr and registers each one that has a handler.
	pub fn add_process_output(
		&mut self,
		label: &str,
		child: &mut Child,
		stdout_handler: Option<Box<dyn LineHandler>>,
		stderr_handler: Option<Box<dyn LineHandler>>,
	) -> ProcessSources {
		let mut sources = ProcessSources::default();
		if let Some(handler) = stdout_handler {
			if let Some(stdout) = child.stdout.take() {
				sources.stdout = Some(self.add_reader(format!("{} stdout", label), stdout, handler));
			}
		}
		if let Some(handler) = stderr_handler {
			if let Some(stderr) = child.stderr.take() {
				sources.stderr = Some(self.add_reader(format!("{} stderr", label), stderr, handler));
			}
		}
		sources
	}

	/// Unregisters whichever of the process's sources are still present.
	pub fn remove_process_output(&mut self, sources: &ProcessSources) {
		for id in sources.ids() {
			self.unregister(id);
		}
	}

	/// Drops the source, its stream and its handler. Returns false if it was absent.
	pub fn unregister(&mut self, id: SourceId) -> bool {
		match self.sources.iter().position(|s| s.id == id) {
			Some(index) => {
				let source = self.sources.remove(index);
				tracing::debug!("unregistered source {} ({})", id, source.label);
				true
			}
			None => false,
		}
	}

	pub fn contains(&self, id: SourceId) -> bool {
		self.sources.iter().any(|s| s.id == id)
	}

	pub fn is_live(&self, id: SourceId) -> bool {
		self.sources.iter().any(|s| s.id == id && s.live)
	}

	pub fn label(&self, id: SourceId) -> Option<&str> {
		self.find(id).map(|s| s.label.as_str())
	}

	pub fn len(&self) -> usize {
		self.sources.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sources.is_empty()
	}

	/// Registered sources that have not reached end-of-stream, in registration order.
	pub fn active_sources(&self) -> Vec<SourceId> {
		self.sources.iter().filter(|s| s.live).map(|s| s.id).collect()
	}

	pub fn handler_for(&mut self, id: SourceId) -> Option<&mut (dyn LineHandler + 'static)> {
		self.find_mut(id).and_then(|s| s.handler.as_deref_mut())
	}

	pub(crate) fn mark_closed(&mut self, id: SourceId) {
		if let Some(source) = self.find_mut(id) {
			source.live = false;
		}
	}

	pub(crate) fn take_handler(&mut self, id: SourceId) -> Option<Box<dyn LineHandler>> {
		self.find_mut(id).and_then(|s| s.handler.take())
	}

	/// Puts a handler back after it ran, unless the handler unregistered its own source.
	pub(crate) fn restore_handler(&mut self, id: SourceId, handler: Box<dyn LineHandler>) {
		if let Some(source) = self.find_mut(id) {
			if source.handler.is_none() {
				source.handler = Some(handler);
			}
		}
	}

	/// Polls one source for a single line. Read errors end the stream.
	pub(crate) fn poll_source(&mut self, id: SourceId, cx: &mut TaskContext<'_>) -> Poll<SourceEvent> {
		let Some(source) = self.find_mut(id) else {
			return Poll::Pending;
		};
		if !source.live {
			return Poll::Pending;
		}
		match source.lines.as_mut().poll_next(cx) {
			Poll::Ready(Some(Ok(line))) => Poll::Ready(SourceEvent::Line(line)),
			Poll::Ready(Some(Err(e))) => {
				tracing::warn!("read error on {}: {}", source.label, e);
				Poll::Ready(SourceEvent::Closed)
			}
			Poll::Ready(None) => Poll::Ready(SourceEvent::Closed),
			Poll::Pending => Poll::Pending,
		}
	}

	fn find(&self, id: SourceId) -> Option<&EventSource> {
		self.sources.iter().find(|s| s.id == id)
	}

	fn find_mut(&mut self, id: SourceId) -> Option<&mut EventSource> {
		self.sources.iter_mut().find(|s| s.id == id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::handlers::Context;
	use async_trait::async_trait;
	use tokio_stream::wrappers::UnboundedReceiverStream;
	use tokio_stream::StreamExt;

	struct Noop;

	#[async_trait(?Send)]
	impl LineHandler for Noop {
		async fn handle(&mut self, _event: SourceEvent, _ctx: &mut Context<'_>) -> Result<()> {
			Ok(())
		}
	}

	fn empty_stream() -> LineStream {
		Box::pin(tokio_stream::empty())
	}

	#[test]
	fn duplicate_registration_is_rejected() {
		let mut reg = Registry::new();
		let id = SourceId::new(7);
		reg.register(id, "first", empty_stream(), Box::new(Noop)).unwrap();
		let err = reg.register(id, "second", empty_stream(), Box::new(Noop)).unwrap_err();
		assert!(matches!(err, Error::AlreadyRegistered(dup) if dup == id));
		assert_eq!(reg.len(), 1);
		assert_eq!(reg.label(id), Some("first"));
		assert_eq!(reg.active_sources(), vec![id]);
	}

	#[test]
	fn allocated_ids_skip_explicit_ones() {
		let mut reg = Registry::new();
		reg.register(SourceId::new(4), "explicit", empty_stream(), Box::new(Noop)).unwrap();
		let next = reg.add("auto", empty_stream(), Box::new(Noop));
		assert_eq!(next, SourceId::new(5));
	}

	#[test]
	fn active_sources_keep_registration_order() {
		let mut reg = Registry::new();
		let a = reg.add("a", empty_stream(), Box::new(Noop));
		let b = reg.add("b", empty_stream(), Box::new(Noop));
		let c = reg.add("c", empty_stream(), Box::new(Noop));
		assert_eq!(reg.active_sources(), vec![a, b, c]);

		assert!(reg.unregister(b));
		assert_eq!(reg.active_sources(), vec![a, c]);
		assert!(reg.handler_for(b).is_none());
		assert!(!reg.unregister(b));
	}

	#[test]
	fn closed_sources_leave_the_wait_set() {
		let mut reg = Registry::new();
		let a = reg.add("a", empty_stream(), Box::new(Noop));
		reg.mark_closed(a);
		assert!(reg.contains(a));
		assert!(!reg.is_live(a));
		assert!(reg.active_sources().is_empty());
	}

	#[test]
	fn handler_slot_round_trip() {
		let mut reg = Registry::new();
		let a = reg.add("a", empty_stream(), Box::new(Noop));
		let handler = reg.take_handler(a).unwrap();
		assert!(reg.handler_for(a).is_none());
		reg.restore_handler(a, handler);
		assert!(reg.handler_for(a).is_some());

		let handler = reg.take_handler(a).unwrap();
		reg.unregister(a);
		reg.restore_handler(a, handler);
		assert!(!reg.contains(a));
	}

	#[tokio::test]
	async fn poll_source_reads_one_line_at_a_time() {
		let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
		let mut reg = Registry::new();
		let stream: LineStream = Box::pin(UnboundedReceiverStream::new(rx).map(Ok::<String, io::Error>));
		let id = reg.add("chan", stream, Box::new(Noop));

		tx.send("one".into()).unwrap();
		tx.send("two".into()).unwrap();
		drop(tx);

		let first = std::future::poll_fn(|cx| reg.poll_source(id, cx)).await;
		assert_eq!(first, SourceEvent::Line("one".into()));
		let second = std::future::poll_fn(|cx| reg.poll_source(id, cx)).await;
		assert_eq!(second, SourceEvent::Line("two".into()));
		let third = std::future::poll_fn(|cx| reg.poll_source(id, cx)).await;
		assert_eq!(third, SourceEvent::Closed);
	}
}

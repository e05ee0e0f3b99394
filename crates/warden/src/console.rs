use std::io::{self, Write};

use crate::types::StreamKind;

/// Local echo targets for the server's stdout and stderr.
pub struct Console {
	out: Box<dyn Write>,
	err: Box<dyn Write>,
}

impl Console {
	pub fn new(out: impl Write + 'static, err: impl Write + 'static) -> Self {
		Self {
			out: Box::new(out),
			err: Box::new(err),
		}
	}

	pub fn stdio() -> Self {
		Self::new(io::stdout(), io::stderr())
	}

	pub fn echo(&mut self, stream: StreamKind, line: &str) {
		let target = match stream {
			StreamKind::Stdout => &mut self.out,
			StreamKind::Stderr => &mut self.err,
		};
		let result = writeln!(target, "{}", line).and_then(|_| target.flush());
		if let Err(e) = result {
			tracing::warn!("failed to echo server {}: {}", stream.as_str(), e);
		}
	}
}

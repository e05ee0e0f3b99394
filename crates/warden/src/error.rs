use std::io;

use crate::types::SourceId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The server or an auxiliary process could not be started.
	#[error("failed to launch {program}: {source}")]
	Launch {
		program: String,
		#[source]
		source: io::Error,
	},

	/// A write was attempted after the server's input closed.
	#[error("server input is closed (broken pipe)")]
	BrokenPipe,

	#[error("event source {0} is already registered")]
	AlreadyRegistered(SourceId),

	#[error(transparent)]
	Io(#[from] io::Error),
}

impl Error {
	/// Fatal errors end the reactor; everything else is logged and the loop continues.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Error::Launch { .. })
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_launch_failures_are_fatal() {
		let launch = Error::Launch {
			program: "java".into(),
			source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
		};
		assert!(launch.is_fatal());
		assert!(!Error::BrokenPipe.is_fatal());
		assert!(!Error::AlreadyRegistered(SourceId::new(3)).is_fatal());
		assert!(!Error::Io(io::Error::other("boom")).is_fatal());
	}

	#[test]
	fn launch_error_names_program() {
		let err = Error::Launch {
			program: "top".into(),
			source: io::Error::new(io::ErrorKind::NotFound, "not found"),
		};
		assert_eq!(err.to_string(), "failed to launch top: not found");
	}
}

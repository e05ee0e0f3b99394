use std::fmt;
use std::path::PathBuf;

/// Leading character that marks a line as a command.
pub const COMMAND_PREFIX: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
	pub const fn new(raw: u64) -> Self {
		Self(raw)
	}

	pub fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for SourceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// What a source produced on one wake: a single line, or end-of-stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
	Line(String),
	Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
	Stdout,
	Stderr,
}

impl StreamKind {
	pub fn as_str(self) -> &'static str {
		match self {
			StreamKind::Stdout => "stdout",
			StreamKind::Stderr => "stderr",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
	pub program: String,
	pub args: Vec<String>,
	pub dir: Option<PathBuf>,
}

impl LaunchSpec {
	pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			program: program.into(),
			args: args.into_iter().map(Into::into).collect(),
			dir: None,
		}
	}

	/// `java <jvm_args...> -jar <jar> <server_args...>`
	pub fn java(java: &str, jvm_args: &[String], jar: &str, server_args: &[String]) -> Self {
		let mut args = jvm_args.to_vec();
		args.push("-jar".into());
		args.push(jar.into());
		args.extend(server_args.iter().cloned());
		Self {
			program: java.into(),
			args,
			dir: None,
		}
	}

	/// Builds a spec from an argv template, replacing `{pid}` in every element.
	pub fn from_template(template: &[String], pid: u32) -> Option<Self> {
		let (program, rest) = template.split_first()?;
		let pid = pid.to_string();
		Some(Self {
			program: program.replace("{pid}", &pid),
			args: rest.iter().map(|a| a.replace("{pid}", &pid)).collect(),
			dir: None,
		})
	}

	pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.dir = Some(dir.into());
		self
	}

	pub fn argv(&self) -> Vec<&str> {
		std::iter::once(self.program.as_str())
			.chain(self.args.iter().map(String::as_str))
			.collect()
	}
}

/// A `!name args` line with the prefix stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
	pub name: String,
	pub args: String,
}

impl CommandInvocation {
	/// Returns `None` unless the line starts with [`COMMAND_PREFIX`].
	pub fn parse(line: &str) -> Option<Self> {
		let body = line.strip_prefix(COMMAND_PREFIX)?;
		Some(Self::from_body(body))
	}

	/// Parses a line whose prefix was already removed.
	pub fn from_body(body: &str) -> Self {
		match body.split_once(' ') {
			Some((name, args)) => Self {
				name: name.to_string(),
				args: args.to_string(),
			},
			None => Self {
				name: body.to_string(),
				args: String::new(),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn java_launch_args_order() {
		let spec = LaunchSpec::java(
			"java",
			&["-Xms1G".into(), "-Xmx8G".into()],
			"server.jar",
			&["nogui".into()],
		);
		assert_eq!(spec.argv(), vec!["java", "-Xms1G", "-Xmx8G", "-jar", "server.jar", "nogui"]);
	}

	#[test]
	fn template_replaces_pid() {
		let template: Vec<String> = ["top", "-pid", "{pid}", "-l2"].iter().map(|s| s.to_string()).collect();
		let spec = LaunchSpec::from_template(&template, 4242).unwrap();
		assert_eq!(spec.argv(), vec!["top", "-pid", "4242", "-l2"]);
		assert!(LaunchSpec::from_template(&[], 1).is_none());
	}

	#[test]
	fn command_parse_name_and_args() {
		let cmd = CommandInvocation::parse("!cpu").unwrap();
		assert_eq!(cmd.name, "cpu");
		assert_eq!(cmd.args, "");

		let cmd = CommandInvocation::parse("!backup now please").unwrap();
		assert_eq!(cmd.name, "backup");
		assert_eq!(cmd.args, "now please");
	}

	#[test]
	fn command_parse_requires_prefix() {
		assert!(CommandInvocation::parse("say hello").is_none());
		assert!(CommandInvocation::parse(" !cpu").is_none());
		assert_eq!(CommandInvocation::parse("!").unwrap().name, "");
	}
}

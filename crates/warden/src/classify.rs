//! Parsing of server log lines: `[HH:MM:SS] [tag]: message`, and the chat
//! forms `[name] text` / `<name> text` that appear inside a message.

use regex::Regex;
use std::sync::LazyLock;

pub const WARN_TAG: &str = "Server thread/WARN";
pub const INFO_TAG: &str = "Server thread/INFO";

static LOG_LINE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?s)^\[([0-9]{2}:[0-9]{2}:[0-9]{2})\] \[([^\]]*)\]: (.*)$").unwrap()
});

static CHAT_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?s)^(?:\[([^\]]+)\]|<([^>]+)>) (.*)$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord<'a> {
	pub timestamp: &'a str,
	pub tag: &'a str,
	pub message: &'a str,
}

impl<'a> LogRecord<'a> {
	pub fn chat(&self) -> Option<ChatRecord<'a>> {
		match classify_message(self.message) {
			ParsedLine::Chat(chat) => Some(chat),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatRecord<'a> {
	pub sender: &'a str,
	pub text: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedLine<'a> {
	Log(LogRecord<'a>),
	Chat(ChatRecord<'a>),
	Unmatched(&'a str),
}

/// Classifies a full server output line as a log record or unmatched.
pub fn classify(line: &str) -> ParsedLine<'_> {
	let Some(caps) = LOG_LINE.captures(line) else {
		return ParsedLine::Unmatched(line);
	};
	match (caps.get(1), caps.get(2), caps.get(3)) {
		(Some(ts), Some(tag), Some(msg)) => ParsedLine::Log(LogRecord {
			timestamp: ts.as_str(),
			tag: tag.as_str(),
			message: msg.as_str(),
		}),
		_ => ParsedLine::Unmatched(line),
	}
}

/// Classifies a log message body as chat or unmatched.
pub fn classify_message(message: &str) -> ParsedLine<'_> {
	let Some(caps) = CHAT_MESSAGE.captures(message) else {
		return ParsedLine::Unmatched(message);
	};
	let sender = caps.get(1).or_else(|| caps.get(2));
	match (sender, caps.get(3)) {
		(Some(sender), Some(text)) => ParsedLine::Chat(ChatRecord {
			sender: sender.as_str(),
			text: text.as_str(),
		}),
		_ => ParsedLine::Unmatched(message),
	}
}

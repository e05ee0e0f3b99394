//! # warden
//!
//! Single-threaded reactor for supervising a game server.
//!
//! Multiplexes the server's stdout/stderr, operator input and short-lived
//! helper processes through one wait. Server log lines are classified, warnings
//! are relayed to chat, and `!` commands typed by players or the operator are
//! dispatched, possibly starting helpers whose output joins the wait set.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use warden::{Console, CpuSampler, Dispatcher, Interrupts, LaunchSpec, Reactor};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let spec = LaunchSpec::java(
//!     "java",
//!     &["-Xms1G".into(), "-Xmx8G".into()],
//!     "minecraft_server.1.13.2.jar",
//!     &["nogui".into()],
//! );
//! let operator = warden::lines_of(tokio::io::stdin());
//! let mut reactor = Reactor::launch(
//!     spec,
//!     Dispatcher::new(CpuSampler::default()),
//!     operator,
//!     Console::stdio(),
//!     Interrupts::sigint().unwrap(),
//! )
//! .unwrap();
//! let status = reactor.run().await.unwrap();
//! # }
//! ```

pub mod classify;
pub mod commands;
pub mod console;
pub mod error;
pub mod handlers;
pub mod reactor;
pub mod registry;
pub mod supervisor;
pub mod types;

pub use classify::{classify, classify_message, ChatRecord, LogRecord, ParsedLine};
pub use commands::{CpuSampler, Dispatcher};
pub use console::Console;
pub use error::{Error, Result};
pub use handlers::{Context, LineHandler};
pub use reactor::{Interrupts, Reactor};
pub use registry::{lines_of, LineStream, ProcessSources, Registry};
pub use supervisor::{AuxiliaryProcess, Supervisor};
pub use types::*;

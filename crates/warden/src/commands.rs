use async_trait::async_trait;

use crate::error::Result;
use crate::handlers::{Context, LineHandler};
use crate::supervisor::AuxiliaryProcess;
use crate::types::{CommandInvocation, LaunchSpec, SourceEvent, SourceId};

pub const DEFAULT_CPU_THRESHOLD: f64 = 80.0;

#[derive(Debug, Clone)]
pub struct CpuSampler {
	/// argv template; `{pid}` is replaced with the server pid.
	pub command: Vec<String>,
	pub threshold: f64,
}

impl Default for CpuSampler {
	fn default() -> Self {
		Self {
			command: default_sampler_command(),
			threshold: DEFAULT_CPU_THRESHOLD,
		}
	}
}

#[cfg(target_os = "macos")]
pub fn default_sampler_command() -> Vec<String> {
	["top", "-pid", "{pid}", "-l2", "-stats", "CPU"].iter().map(|s| s.to_string()).collect()
}

#[cfg(not(target_os = "macos"))]
pub fn default_sampler_command() -> Vec<String> {
	["ps", "-p", "{pid}", "-o", "%cpu="].iter().map(|s| s.to_string()).collect()
}

/// Runs `!` commands. Never waits on the processes it starts; their output
/// comes back through handlers registered with the reactor.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
	cpu: CpuSampler,
	backup: Option<Vec<String>>,
}

impl Dispatcher {
	pub fn new(cpu: CpuSampler) -> Self {
		Self { cpu, backup: None }
	}

	pub fn with_backup(mut self, command: Option<Vec<String>>) -> Self {
		self.backup = command.filter(|c| !c.is_empty());
		self
	}

	pub fn dispatch(&self, cmd: &CommandInvocation, ctx: &mut Context<'_>) -> Result<()> {
		match cmd.name.as_str() {
			"cpu" => {
				self.sample_cpu(ctx);
				Ok(())
			}
			"backup" => {
				self.start_backup(ctx);
				Ok(())
			}
			other => {
				tracing::debug!("ignoring unknown command {:?}", other);
				Ok(())
			}
		}
	}

	fn sample_cpu(&self, ctx: &mut Context<'_>) -> Option<SourceId> {
		let Some(spec) = LaunchSpec::from_template(&self.cpu.command, ctx.supervisor.pid()) else {
			tracing::warn!("no cpu sampler configured");
			return None;
		};
		let mut aux = spawn_helper(ctx, &spec)?;
		let Some(stdout) = aux.take_stdout() else {
			ctx.supervisor.retire(aux);
			return None;
		};
		let label = format!("{} (cpu sample)", aux.label());
		let handler = CpuSampleHandler::new(aux, self.cpu.threshold);
		Some(ctx.registry.add_reader(label, stdout, Box::new(handler)))
	}

	fn start_backup(&self, ctx: &mut Context<'_>) -> Option<SourceId> {
		let Some(template) = &self.backup else {
			tracing::debug!("ignoring backup: no backup command configured");
			return None;
		};
		let spec = LaunchSpec::from_template(template, ctx.supervisor.pid())?;
		let mut aux = spawn_helper(ctx, &spec)?;
		let Some(stdout) = aux.take_stdout() else {
			ctx.supervisor.retire(aux);
			return None;
		};
		tracing::info!("backup started");
		let label = format!("{} (backup)", aux.label());
		Some(ctx.registry.add_reader(label, stdout, Box::new(BackupHandler::new(aux))))
	}
}

// A helper that cannot start is the command's failure, not the server's.
fn spawn_helper(ctx: &mut Context<'_>, spec: &LaunchSpec) -> Option<AuxiliaryProcess> {
	match ctx.supervisor.spawn_auxiliary(spec) {
		Ok(aux) => Some(aux),
		Err(e) => {
			tracing::warn!("command helper unavailable: {}", e);
			None
		}
	}
}

/// A sampler line that holds a usable percentage.
pub fn parse_sample(line: &str) -> Option<(String, f64)> {
	let sample = line.trim();
	let value = sample.parse::<f64>().ok().filter(|v| v.is_finite())?;
	Some((sample.to_string(), value))
}

pub fn cpu_report(sample: &str, value: f64, threshold: f64) -> String {
	if value > threshold {
		format!("CPU usage is too high: {}%!", sample)
	} else {
		format!("CPU Usage: {}", sample)
	}
}

/// Remembers the last numeric line from the sampler and reports it at end-of-stream.
pub struct CpuSampleHandler {
	process: Option<AuxiliaryProcess>,
	threshold: f64,
	last: Option<(String, f64)>,
}

impl CpuSampleHandler {
	pub fn new(process: AuxiliaryProcess, threshold: f64) -> Self {
		Self {
			process: Some(process),
			threshold,
			last: None,
		}
	}
}

#[async_trait(?Send)]
impl LineHandler for CpuSampleHandler {
	async fn handle(&mut self, event: SourceEvent, ctx: &mut Context<'_>) -> Result<()> {
		match event {
			SourceEvent::Line(line) => {
				if let Some(sample) = parse_sample(&line) {
					self.last = Some(sample);
				}
				Ok(())
			}
			SourceEvent::Closed => {
				ctx.registry.unregister(ctx.source);
				if let Some(aux) = self.process.take() {
					ctx.supervisor.retire(aux);
				}
				match self.last.take() {
					Some((sample, value)) => {
						ctx.supervisor.say(&cpu_report(&sample, value, self.threshold)).await
					}
					None => {
						tracing::warn!("cpu sampler produced no numeric sample");
						Ok(())
					}
				}
			}
		}
	}
}

/// Logs backup output and announces completion in chat.
pub struct BackupHandler {
	process: Option<AuxiliaryProcess>,
}

impl BackupHandler {
	pub fn new(process: AuxiliaryProcess) -> Self {
		Self { process: Some(process) }
	}
}

#[async_trait(?Send)]
impl LineHandler for BackupHandler {
	async fn handle(&mut self, event: SourceEvent, ctx: &mut Context<'_>) -> Result<()> {
		match event {
			SourceEvent::Line(line) => {
				tracing::info!("backup: {}", line);
				Ok(())
			}
			SourceEvent::Closed => {
				ctx.registry.unregister(ctx.source);
				if let Some(aux) = self.process.take() {
					ctx.supervisor.retire(aux);
				}
				tracing::info!("backup finished");
				ctx.supervisor.say("Backup complete").await
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn report_above_threshold_warns() {
		assert_eq!(cpu_report("95.3", 95.3, 80.0), "CPU usage is too high: 95.3%!");
	}

	#[test]
	fn report_at_or_below_threshold() {
		assert_eq!(cpu_report("80", 80.0, 80.0), "CPU Usage: 80");
		assert_eq!(cpu_report("3.1", 3.1, 80.0), "CPU Usage: 3.1");
	}

	#[test]
	fn samples_must_be_finite_numbers() {
		assert_eq!(parse_sample(" 95.3 "), Some(("95.3".to_string(), 95.3)));
		assert_eq!(parse_sample("0"), Some(("0".to_string(), 0.0)));
		assert_eq!(parse_sample("%CPU"), None);
		assert_eq!(parse_sample("nan"), None);
		assert_eq!(parse_sample("NaN"), None);
		assert_eq!(parse_sample("inf"), None);
		assert_eq!(parse_sample("-infinity"), None);
		assert_eq!(parse_sample(""), None);
	}

	#[test]
	fn default_sampler_takes_pid() {
		let sampler = CpuSampler::default();
		assert!(sampler.command.iter().any(|a| a == "{pid}"));
		assert_eq!(sampler.threshold, DEFAULT_CPU_THRESHOLD);
	}

	#[test]
	fn empty_backup_command_is_unset() {
		let d = Dispatcher::default().with_backup(Some(vec![]));
		assert!(d.backup.is_none());
	}
}

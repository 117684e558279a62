use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use super::notifier::Notifier;
use super::queue::QueueStore;
use super::worker::{CycleReport, StageWorker};

/// How a worker process is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Poll forever, pausing between cycles.
    Loop,
    /// Run a single cycle; an external scheduler re-invokes the process.
    Once,
}

impl FromStr for ScheduleMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "loop" | "daemon" => Ok(Self::Loop),
            "once" | "oneshot" | "cron" => Ok(Self::Once),
            other => Err(format!("unknown schedule mode '{other}'")),
        }
    }
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loop => f.write_str("loop"),
            Self::Once => f.write_str("once"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub mode: ScheduleMode,
    /// Short pause taken right after a cycle.
    pub settle: Duration,
    /// Long pause following the settle interval.
    pub idle: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            mode: ScheduleMode::Loop,
            settle: Duration::from_secs(10),
            idle: Duration::from_secs(3600),
        }
    }
}

impl ScheduleConfig {
    pub fn once() -> Self {
        Self {
            mode: ScheduleMode::Once,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub advanced: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

impl SchedulerSummary {
    fn absorb(&mut self, report: &CycleReport) {
        self.advanced += report.advanced;
        self.failed += report.failed;
        self.dead_lettered += report.dead_lettered;
    }
}

/// Drives a [`StageWorker`] according to a [`ScheduleConfig`].
///
/// Cycles are blocking and run on tokio's blocking pool, one at a time.
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Run until the mode says stop; in loop mode that is never.
    pub async fn run<S, N>(&self, worker: Arc<StageWorker<S, N>>) -> SchedulerSummary
    where
        S: QueueStore + 'static,
        N: Notifier + 'static,
    {
        self.run_until(worker, std::future::pending()).await
    }

    /// Run until the mode says stop or `shutdown` resolves. Shutdown is only
    /// observed between cycles; a cycle in progress always finishes.
    pub async fn run_until<S, N, F>(
        &self,
        worker: Arc<StageWorker<S, N>>,
        shutdown: F,
    ) -> SchedulerSummary
    where
        S: QueueStore + 'static,
        N: Notifier + 'static,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = SchedulerSummary::default();
        let role = worker.role();
        info!(%role, mode = %self.config.mode, "scheduler started");

        loop {
            let cycle_worker = Arc::clone(&worker);
            let outcome = tokio::task::spawn_blocking(move || cycle_worker.poll_cycle()).await;
            summary.cycles += 1;

            match outcome {
                Ok(Ok(report)) => summary.absorb(&report),
                Ok(Err(err)) => {
                    summary.failed_cycles += 1;
                    error!(%role, error = %err, "poll cycle aborted; retrying next cycle");
                }
                Err(err) => {
                    summary.failed_cycles += 1;
                    error!(%role, error = %err, "poll cycle task panicked");
                }
            }

            if self.config.mode == ScheduleMode::Once {
                break;
            }

            let pause = self.config.settle + self.config.idle;
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = &mut shutdown => {
                    info!(%role, "shutdown requested");
                    break;
                }
            }
        }

        info!(%role, cycles = summary.cycles, "scheduler stopped");
        summary
    }
}

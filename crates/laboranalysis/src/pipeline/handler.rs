use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::debug;

use super::order::{Order, OrderKind};
use super::stage::WorkerRole;
use crate::config::HandlerConfig;
use crate::reports::ReportCatalog;

const STDERR_TAIL: usize = 512;

/// Failure modes of a stage handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The order cannot be completed yet; it stays queued without an operator
    /// notification.
    #[error("report for '{subject}' is not available yet")]
    NotReady { subject: String },
    #[error("{0}")]
    Failed(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Domain work performed for one order at one stage.
///
/// Handlers may be re-invoked for the same order after a failure, so they
/// must tolerate repeated runs.
pub trait StageHandler: Send + Sync {
    fn handle(&self, order: &Order) -> Result<(), HandlerError>;
}

/// Handlers a worker dispatches to, keyed by order kind.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<OrderKind, Arc<dyn StageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the same handler for every order kind.
    pub fn uniform(handler: Arc<dyn StageHandler>) -> Self {
        let mut registry = Self::new();
        for kind in OrderKind::ordered() {
            registry.register(kind, handler.clone());
        }
        registry
    }

    pub fn with(mut self, kind: OrderKind, handler: Arc<dyn StageHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    pub fn register(&mut self, kind: OrderKind, handler: Arc<dyn StageHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: OrderKind) -> Option<&dyn StageHandler> {
        self.handlers.get(&kind).map(|handler| handler.as_ref())
    }

    /// Handlers wired from deployment configuration for `role`.
    pub fn for_role(role: WorkerRole, config: &HandlerConfig) -> Self {
        let command_for = |command: &Option<String>| -> Arc<dyn StageHandler> {
            match command.as_deref().and_then(CommandHandler::from_command_line) {
                Some(handler) => Arc::new(handler),
                None => Arc::new(UnconfiguredHandler { role }),
            }
        };

        match role {
            WorkerRole::Harvest => Self::uniform(command_for(&config.harvest_command)),
            WorkerRole::Analyze => Self::uniform(command_for(&config.analyze_command)),
            WorkerRole::Notify => Self::uniform(Arc::new(ReportArtifactHandler::new(
                ReportCatalog::new(config.reports_dir.clone()),
            ))),
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("HandlerRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

/// Runs an external program per order.
///
/// The subject is passed as the final argument; `ORDER_ID`, `ORDER_KIND`,
/// `ORDER_SUBJECT` and `ORDER_CUSTOMER` are exported to its environment.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandHandler {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line. Blank input yields `None`.
    pub fn from_command_line(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts.map(str::to_string).collect()))
    }
}

impl StageHandler for CommandHandler {
    fn handle(&self, order: &Order) -> Result<(), HandlerError> {
        debug!(program = %self.program.display(), subject = %order.subject, "running stage command");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&order.subject)
            .env(
                "ORDER_ID",
                order.id.as_ref().map(|id| id.as_str()).unwrap_or_default(),
            )
            .env("ORDER_KIND", order.kind.tag())
            .env("ORDER_SUBJECT", &order.subject)
            .env("ORDER_CUSTOMER", order.customer.as_deref().unwrap_or_default())
            .stdin(Stdio::null())
            .output()?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let tail_start = stderr
            .char_indices()
            .rev()
            .nth(STDERR_TAIL)
            .map_or(0, |(index, _)| index);
        Err(HandlerError::Failed(format!(
            "{} exited with {}: {}",
            self.program.display(),
            output.status,
            &stderr[tail_start..]
        )))
    }
}

/// Placeholder for a stage whose command was never configured; every order
/// fails so it stays queued and the operator hears about it.
#[derive(Debug, Clone, Copy)]
pub struct UnconfiguredHandler {
    pub role: WorkerRole,
}

impl StageHandler for UnconfiguredHandler {
    fn handle(&self, _order: &Order) -> Result<(), HandlerError> {
        Err(HandlerError::Failed(format!(
            "no command configured for the {} stage",
            self.role
        )))
    }
}

/// Notifying-stage check: the order's report must already be on disk.
#[derive(Debug, Clone)]
pub struct ReportArtifactHandler {
    catalog: ReportCatalog,
}

impl ReportArtifactHandler {
    pub fn new(catalog: ReportCatalog) -> Self {
        Self { catalog }
    }
}

impl StageHandler for ReportArtifactHandler {
    fn handle(&self, order: &Order) -> Result<(), HandlerError> {
        if self.catalog.contains(order.kind, &order.subject)? {
            Ok(())
        } else {
            Err(HandlerError::NotReady {
                subject: order.subject.clone(),
            })
        }
    }
}

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::handler::{HandlerError, HandlerRegistry};
use super::notifier::{Notification, NotificationTemplates, Notifier};
use super::order::{Order, OrderDocument};
use super::queue::{QueueStore, StageQueue, StoreError};
use super::stage::{Stage, WorkerRole};
use super::transition::transition;

/// What happened to one order during a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderOutcome {
    /// Handler succeeded and the order moved to the next queue.
    Advanced,
    /// Handler or transition failed; the order stays and the operator was told.
    Failed,
    /// Handler reported the order is not ready; it stays silently.
    Deferred,
    /// Kind could not be determined or no handler is registered for it.
    Skipped,
    /// Retry limit reached; the order moved to the dead-letter queue.
    DeadLettered,
}

impl OrderOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Advanced => "advanced",
            Self::Failed => "failed",
            Self::Deferred => "deferred",
            Self::Skipped => "skipped",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

/// Tally of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub admitted: usize,
    pub scanned: usize,
    pub advanced: usize,
    pub failed: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub dead_lettered: usize,
}

impl CycleReport {
    pub fn record(&mut self, outcome: OrderOutcome) {
        self.scanned += 1;
        match outcome {
            OrderOutcome::Advanced => self.advanced += 1,
            OrderOutcome::Failed => self.failed += 1,
            OrderOutcome::Deferred => self.deferred += 1,
            OrderOutcome::Skipped => self.skipped += 1,
            OrderOutcome::DeadLettered => self.dead_lettered += 1,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.admitted == 0 && self.scanned == 0
    }
}

/// Drains one stage queue: dispatches each order to its handler and advances
/// it on success.
pub struct StageWorker<S, N> {
    role: WorkerRole,
    store: Arc<S>,
    notifier: Arc<N>,
    handlers: HandlerRegistry,
    templates: NotificationTemplates,
    max_attempts: Option<u32>,
}

impl<S, N> StageWorker<S, N>
where
    S: QueueStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        role: WorkerRole,
        store: Arc<S>,
        notifier: Arc<N>,
        handlers: HandlerRegistry,
        templates: NotificationTemplates,
    ) -> Self {
        Self {
            role,
            store,
            notifier,
            handlers,
            templates,
            max_attempts: None,
        }
    }

    /// Cap consecutive failures per order; `None` or `Some(0)` retries forever.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts.filter(|limit| *limit > 0);
        self
    }

    pub fn role(&self) -> WorkerRole {
        self.role
    }

    /// Run one scan-and-process pass over the worker's queues.
    ///
    /// Only a failure to list a queue aborts the cycle; per-order failures are
    /// reported and contained.
    pub fn poll_cycle(&self) -> Result<CycleReport, StoreError> {
        let mut report = CycleReport::default();

        if let Some(source) = self.role.admits_from() {
            report.admitted = self.admit(source)?;
        }

        let input = StageQueue::new(self.store.as_ref(), self.role.input());
        let documents = input.list_all()?;
        if documents.is_empty() {
            debug!(stage = %input.stage(), "no orders waiting");
            return Ok(report);
        }

        for document in &documents {
            let outcome = self.process(document);
            metrics::counter!(
                "laboranalysis_orders_total",
                "stage" => self.role.input().collection(),
                "outcome" => outcome.label()
            )
            .increment(1);
            report.record(outcome);
        }

        info!(
            role = %self.role,
            scanned = report.scanned,
            advanced = report.advanced,
            failed = report.failed,
            deferred = report.deferred,
            skipped = report.skipped,
            dead_lettered = report.dead_lettered,
            "poll cycle finished"
        );
        Ok(report)
    }

    /// Pull classifiable orders from `source` into the worker's input queue.
    fn admit(&self, source: Stage) -> Result<usize, StoreError> {
        let target = self.role.input();
        let mut admitted = 0;

        for document in self.store.list_all(source)? {
            if let Err(err) = document.classify() {
                warn!(stage = %source, %document, error = %err, "leaving unclassifiable order in place");
                continue;
            }
            match transition(self.store.as_ref(), source, target, &document) {
                Ok(_) => {
                    debug!(order_id = document.get_str("id").unwrap_or("-"), "admitted order");
                    admitted += 1;
                }
                Err(err) => {
                    error!(stage = %source, %document, error = %err, "failed to admit order");
                }
            }
        }

        Ok(admitted)
    }

    fn process(&self, document: &OrderDocument) -> OrderOutcome {
        let stage = self.role.input();
        let order = match document.classify() {
            Ok(order) => order,
            Err(err) => {
                warn!(%stage, %document, error = %err, "skipping unclassifiable order");
                return OrderOutcome::Skipped;
            }
        };

        let Some(handler) = self.handlers.get(order.kind) else {
            warn!(%stage, kind = %order.kind, "no handler registered; skipping order");
            return OrderOutcome::Skipped;
        };

        match handler.handle(&order) {
            Ok(()) => {}
            Err(HandlerError::NotReady { subject }) => {
                debug!(%stage, %subject, "order not ready; leaving queued");
                return OrderOutcome::Deferred;
            }
            Err(err) => return self.fail(document, &order, &err.to_string()),
        }

        if let Err(err) = transition(self.store.as_ref(), stage, self.role.output(), document) {
            return self.fail(document, &order, &format!("transition failed: {err}"));
        }

        if self.max_attempts.is_some() {
            if let Err(err) = self.store.clear_attempts(stage, document) {
                warn!(%stage, error = %err, "failed to clear attempt counter");
            }
        }

        info!(
            %stage,
            next = %self.role.output(),
            kind = %order.kind,
            order_id = order.id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            "order advanced"
        );
        self.dispatch(self.templates.success(self.role, &order));
        OrderOutcome::Advanced
    }

    fn fail(&self, document: &OrderDocument, order: &Order, reason: &str) -> OrderOutcome {
        let stage = self.role.input();
        warn!(%stage, kind = %order.kind, subject = %order.subject, %reason, "order processing failed");

        if let Some(limit) = self.max_attempts {
            match self.store.record_attempt(stage, document) {
                Ok(attempts) if attempts >= limit => {
                    return self.dead_letter(document, attempts, reason);
                }
                Ok(_) => {}
                Err(err) => warn!(%stage, error = %err, "failed to record attempt"),
            }
        }

        self.dispatch(self.templates.problem(self.role, document, reason));
        OrderOutcome::Failed
    }

    fn dead_letter(&self, document: &OrderDocument, attempts: u32, reason: &str) -> OrderOutcome {
        let stage = self.role.input();
        if let Err(err) = transition(self.store.as_ref(), stage, Stage::DeadLetter, document) {
            let reason = format!("{reason}; moving to dead_letter failed: {err}");
            self.dispatch(self.templates.problem(self.role, document, &reason));
            return OrderOutcome::Failed;
        }

        if let Err(err) = self.store.clear_attempts(stage, document) {
            warn!(%stage, error = %err, "failed to clear attempt counter");
        }
        error!(%stage, attempts, "order moved to dead_letter");
        self.dispatch(
            self.templates
                .dead_letter(self.role, document, attempts, reason),
        );
        OrderOutcome::DeadLettered
    }

    /// Fire-and-forget delivery; failures are logged and otherwise ignored.
    fn dispatch(&self, notification: Notification) {
        if let Err(err) = self.notifier.notify(&notification) {
            error!(
                subject = %notification.subject,
                error = %err,
                "notification delivery failed"
            );
        }
    }
}

impl<S, N> std::fmt::Debug for StageWorker<S, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageWorker")
            .field("role", &self.role)
            .field("handlers", &self.handlers)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

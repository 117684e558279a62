use std::io::Read;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::import::{parse_rows, ImportSummary};
use crate::pipeline::{
    queue_depths, NotificationTemplates, Notifier, Order, OrderId, OrderKind, QueueDepth,
    QueueStore, Stage, StoreError,
};

/// Customer request as submitted through the form, API or CSV import.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderRequest {
    pub customer: String,
    /// `vacancy` / `resume` or the full `vacancy_request` / `resume_request` tag.
    pub kind: String,
    pub subject: String,
}

impl OrderRequest {
    pub fn new(
        customer: impl Into<String>,
        kind: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            customer: customer.into(),
            kind: kind.into(),
            subject: subject.into(),
        }
    }

    /// Normalize and validate into a fresh order with a new id.
    pub fn into_order(self) -> Result<Order, IntakeError> {
        let customer = self.customer.trim();
        if customer.is_empty() {
            return Err(IntakeError::MissingCustomer);
        }
        if !customer.contains('@') || customer.starts_with('@') || customer.ends_with('@') {
            return Err(IntakeError::InvalidCustomer(customer.to_string()));
        }

        let kind = OrderKind::from_tag(&self.kind)
            .ok_or_else(|| IntakeError::UnknownKind(self.kind.trim().to_string()))?;

        let subject = self.subject.trim();
        if subject.is_empty() {
            return Err(IntakeError::MissingSubject);
        }

        Ok(Order::new(kind, customer, subject))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedOrder {
    pub order_id: OrderId,
    pub kind: OrderKind,
    pub subject: String,
    pub stage: Stage,
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("customer email is required")]
    MissingCustomer,
    #[error("customer '{0}' is not a valid email address")]
    InvalidCustomer(String),
    #[error("order subject is required")]
    MissingSubject,
    #[error("unknown order kind '{0}'; expected 'vacancy' or 'resume'")]
    UnknownKind(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to read import file: {0}")]
    Csv(#[from] csv::Error),
}

impl IntakeError {
    /// True for problems with the request itself rather than the backend.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingCustomer
                | Self::InvalidCustomer(_)
                | Self::MissingSubject
                | Self::UnknownKind(_)
        )
    }
}

/// Accepts customer orders into the `incoming` queue.
pub struct IntakeService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    templates: NotificationTemplates,
}

impl<S, N> IntakeService<S, N>
where
    S: QueueStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, templates: NotificationTemplates) -> Self {
        Self {
            store,
            notifier,
            templates,
        }
    }

    /// Validate and enqueue one order, then tell the operator about it.
    pub fn submit(&self, request: OrderRequest) -> Result<SubmittedOrder, IntakeError> {
        let order = request.into_order()?;
        let document = order.to_document();
        self.store.enqueue(Stage::Incoming, &document)?;

        let order_id = order.id.clone().unwrap_or_else(OrderId::generate);
        info!(%order_id, kind = %order.kind, subject = %order.subject, "order accepted");

        if let Err(err) = self.notifier.notify(&self.templates.new_order(&document)) {
            error!(%order_id, error = %err, "failed to notify operator about new order");
        }

        Ok(SubmittedOrder {
            order_id,
            kind: order.kind,
            subject: order.subject,
            stage: Stage::Incoming,
        })
    }

    /// Submit every row of a `customer,kind,subject` CSV. Invalid rows are
    /// reported in the summary; a store failure aborts the import.
    pub fn import_csv<R: Read>(&self, reader: R) -> Result<ImportSummary, IntakeError> {
        let mut summary = ImportSummary::default();

        for (line, row) in parse_rows(reader)? {
            let request = match row {
                Ok(request) => request,
                Err(err) if err.is_io_error() => return Err(IntakeError::Csv(err)),
                Err(err) => {
                    summary.reject(line, err.to_string());
                    continue;
                }
            };

            match self.submit(request) {
                Ok(submitted) => summary.accept(submitted.order_id),
                Err(err) if err.is_validation() => summary.reject(line, err.to_string()),
                Err(err) => return Err(err),
            }
        }

        info!(
            accepted = summary.accepted.len(),
            rejected = summary.rejected.len(),
            "order import finished"
        );
        Ok(summary)
    }

    pub fn queue_depths(&self) -> Result<Vec<QueueDepth>, StoreError> {
        queue_depths(self.store.as_ref())
    }
}

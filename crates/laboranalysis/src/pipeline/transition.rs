//! Moving an order from one stage queue to the next.
//!
//! Without store transactions the move is two writes: the destination insert
//! lands first, then the source delete. A crash in between leaves the order in
//! both queues; it can never leave it in neither.

use serde::Serialize;
use tracing::{debug, warn};

use super::order::OrderDocument;
use super::queue::{QueueStore, StoreError};
use super::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    /// False when the destination already held the same identified order.
    pub enqueued: bool,
    /// False when the source held no matching document.
    pub removed: bool,
}

/// Enqueue into `to`, then remove from `from`.
///
/// An identified order already present in `to` is not inserted twice, so a
/// move that was interrupted after its insert completes on the next attempt.
/// Documents without an `id` are always inserted: identical legacy orders are
/// distinct orders.
pub fn enqueue_then_remove<S>(
    store: &S,
    from: Stage,
    to: Stage,
    document: &OrderDocument,
) -> Result<TransferOutcome, StoreError>
where
    S: QueueStore + ?Sized,
{
    let enqueued = if already_holds(store, to, document)? {
        debug!(%from, %to, "destination already holds order; finishing interrupted move");
        false
    } else {
        store.enqueue(to, document)?;
        true
    };

    let removed = store.remove(from, document)?;
    Ok(TransferOutcome { enqueued, removed })
}

/// Whether `stage` holds an identified copy of `document`. Always false for
/// documents without an `id`.
fn already_holds<S>(
    store: &S,
    stage: Stage,
    document: &OrderDocument,
) -> Result<bool, StoreError>
where
    S: QueueStore + ?Sized,
{
    if document.id().is_none() {
        return Ok(false);
    }
    store.contains(stage, document)
}

/// Transition `document` from `from` to `to` through the store's transfer
/// primitive.
///
/// Always pass the document exactly as it was listed; removal matches on every
/// field.
pub fn transition<S>(
    store: &S,
    from: Stage,
    to: Stage,
    document: &OrderDocument,
) -> Result<TransferOutcome, StoreError>
where
    S: QueueStore + ?Sized,
{
    let outcome = store.transfer(from, to, document)?;
    if !outcome.removed {
        warn!(
            %from,
            %to,
            order_id = document.get_str("id").unwrap_or("-"),
            "source queue held no matching document during transition"
        );
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::order::{Order, OrderKind};
    use crate::pipeline::store::InMemoryQueueStore;

    #[test]
    fn transition_moves_document_between_queues() {
        let store = InMemoryQueueStore::default();
        let doc = Order::new(OrderKind::VacancyRequest, "a@x.com", "Engineer").to_document();
        store.enqueue(Stage::Analyzing, &doc).expect("seed");

        let outcome =
            transition(&store, Stage::Analyzing, Stage::Notifying, &doc).expect("transition");

        assert_eq!(
            outcome,
            TransferOutcome {
                enqueued: true,
                removed: true
            }
        );
        assert_eq!(
            store.stages_containing(&doc).expect("snapshot"),
            vec![Stage::Notifying]
        );
    }

    #[test]
    fn interrupted_move_completes_without_second_copy() {
        let store = InMemoryQueueStore::default();
        let doc = Order::new(OrderKind::ResumeRequest, "a@x.com", "analyst").to_document();
        store.enqueue(Stage::Harvesting, &doc).expect("seed source");
        store.enqueue(Stage::Analyzing, &doc).expect("seed destination");

        let outcome =
            transition(&store, Stage::Harvesting, Stage::Analyzing, &doc).expect("transition");

        assert!(!outcome.enqueued);
        assert!(outcome.removed);
        assert_eq!(store.list_all(Stage::Analyzing).expect("list").len(), 1);
        assert!(store.list_all(Stage::Harvesting).expect("list").is_empty());
    }

    #[test]
    fn identical_legacy_documents_both_survive_the_move() {
        let store = InMemoryQueueStore::default();
        let mut fields = serde_json::Map::new();
        fields.insert("customer".to_string(), "a@x.com".into());
        fields.insert("occupation".to_string(), "Engineer".into());
        let doc = OrderDocument(fields);
        store.enqueue(Stage::Analyzing, &doc).expect("seed first");
        store.enqueue(Stage::Analyzing, &doc).expect("seed second");

        for _ in 0..2 {
            let outcome =
                transition(&store, Stage::Analyzing, Stage::Notifying, &doc).expect("transition");
            assert!(outcome.enqueued && outcome.removed);
        }

        assert!(store.list_all(Stage::Analyzing).expect("list").is_empty());
        assert_eq!(store.list_all(Stage::Notifying).expect("list").len(), 2);
    }

    #[test]
    fn modified_copy_leaves_original_behind() {
        let store = InMemoryQueueStore::default();
        let original = Order::new(OrderKind::VacancyRequest, "a@x.com", "Engineer").to_document();
        store.enqueue(Stage::Analyzing, &original).expect("seed");

        let mut derived = original.clone();
        derived
            .0
            .insert("note".to_string(), serde_json::Value::from("touched"));

        let outcome =
            transition(&store, Stage::Analyzing, Stage::Notifying, &derived).expect("transition");

        assert!(!outcome.removed);
        assert_eq!(
            store.stages_containing(&original).expect("snapshot"),
            vec![Stage::Analyzing]
        );
    }
}

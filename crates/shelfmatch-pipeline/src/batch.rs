//! The batch orchestrator: bounded-concurrency execution of per-item
//! pipelines with deterministic, channel-streamed progress.
//!
//! Items are partitioned into chunks of the effective concurrency. Within a
//! chunk every pipeline starts concurrently, but completions are awaited in
//! original index order — progress events arrive deterministically and the
//! counters climb monotonically even though the underlying I/O finishes out
//! of order. Chunks run strictly sequentially. The counters are owned here
//! and mutated only between awaited completions, never concurrently.

use std::future::Future;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use shelfmatch_core::DetectedItem;

use crate::item::ItemOutcome;

pub const MIN_CONCURRENCY: usize = 1;
/// Ceiling chosen for the vision service's sustainable throughput; a fixed
/// conservative limit is the primary defense against throttling.
pub const MAX_CONCURRENCY: usize = 8;

/// Clamps a requested concurrency into the supported range.
#[must_use]
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

/// Cumulative outcome counters, owned by the orchestrator alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounters {
    pub succeeded: u32,
    pub no_match: u32,
    pub errors: u32,
}

impl BatchCounters {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Matched(_) => self.succeeded += 1,
            ItemOutcome::NoMatch => self.no_match += 1,
            ItemOutcome::Failed(_) => self.errors += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.succeeded + self.no_match + self.errors
    }
}

/// Per-item line of the final summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    pub item_id: Uuid,
    pub outcome: String,
    pub detail: Option<String>,
}

/// Final batch summary: totals plus per-item detail, with failed items
/// carrying their specific error message, distinct from no-match items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub counters: BatchCounters,
    pub items: Vec<ItemReport>,
}

/// Progress stream events, emitted in a fixed order: one `Start`, one
/// `Progress` per item in submission order, then a terminal `Complete` (or
/// `Error` for batch-level setup failures).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Start {
        total: usize,
    },
    Progress {
        processed: usize,
        total: usize,
        item_id: Uuid,
        outcome: String,
        detail: Option<String>,
        counters: BatchCounters,
    },
    Complete {
        summary: BatchSummary,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    /// Stream event name matching the serialized `type` tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Start { .. } => "start",
            ProgressEvent::Progress { .. } => "progress",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }
}

/// Runs `process_item` over `items` with bounded concurrency, streaming
/// progress into `progress` and returning the final summary.
///
/// The per-item future is caught at the task boundary: a panic inside it is
/// recorded as that item's error outcome and never aborts siblings. A
/// dropped progress receiver is tolerated — the batch runs to completion
/// either way.
pub async fn run_batch<F, Fut>(
    items: Vec<DetectedItem>,
    concurrency: usize,
    progress: mpsc::Sender<ProgressEvent>,
    process_item: F,
) -> BatchSummary
where
    F: Fn(DetectedItem) -> Fut,
    Fut: Future<Output = ItemOutcome> + Send + 'static,
{
    let total = items.len();
    let effective = clamp_concurrency(concurrency);
    tracing::info!(total, concurrency = effective, "starting match batch");

    let _ = progress.send(ProgressEvent::Start { total }).await;

    let mut counters = BatchCounters::default();
    let mut reports: Vec<ItemReport> = Vec::with_capacity(total);
    let mut processed = 0usize;

    for chunk in items.chunks(effective) {
        // Start the whole chunk concurrently...
        let handles: Vec<(Uuid, tokio::task::JoinHandle<ItemOutcome>)> = chunk
            .iter()
            .map(|item| (item.id, tokio::spawn(process_item(item.clone()))))
            .collect();

        // ...then consume completions in submission order.
        for (item_id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    tracing::error!(item_id = %item_id, error = %join_err, "item task aborted");
                    ItemOutcome::Failed(format!("item task aborted: {join_err}"))
                }
            };

            counters.record(&outcome);
            processed += 1;

            let report = ItemReport {
                item_id,
                outcome: outcome.as_str().to_owned(),
                detail: outcome.detail(),
            };
            let _ = progress
                .send(ProgressEvent::Progress {
                    processed,
                    total,
                    item_id,
                    outcome: report.outcome.clone(),
                    detail: report.detail.clone(),
                    counters,
                })
                .await;
            reports.push(report);
        }
    }

    let summary = BatchSummary {
        total,
        counters,
        items: reports,
    };
    tracing::info!(
        total,
        succeeded = counters.succeeded,
        no_match = counters.no_match,
        errors = counters.errors,
        "match batch complete"
    );
    let _ = progress
        .send(ProgressEvent::Complete {
            summary: summary.clone(),
        })
        .await;

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use shelfmatch_core::{BoundingBox, ItemMetadata};

    fn make_items(count: usize) -> Vec<DetectedItem> {
        (0..count)
            .map(|i| DetectedItem {
                id: Uuid::new_v4(),
                image_id: Uuid::new_v4(),
                crop_url: format!("https://crops.example.com/{i}.jpg"),
                bounding_box: BoundingBox {
                    x: 0,
                    y: 0,
                    width: 10,
                    height: 10,
                },
                retailer: None,
                metadata: ItemMetadata::default(),
            })
            .collect()
    }

    async fn collect_events(mut rx: mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn concurrency_is_clamped_to_supported_range() {
        assert_eq!(clamp_concurrency(0), MIN_CONCURRENCY);
        assert_eq!(clamp_concurrency(1), 1);
        assert_eq!(clamp_concurrency(3), 3);
        assert_eq!(clamp_concurrency(100), MAX_CONCURRENCY);
    }

    #[tokio::test]
    async fn seven_items_concurrency_three_emit_ordered_progress() {
        let items = make_items(7);
        let expected_ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
        let (tx, rx) = mpsc::channel(32);

        let position = Arc::new(std::sync::Mutex::new(
            expected_ids
                .iter()
                .enumerate()
                .map(|(i, id)| (*id, i))
                .collect::<std::collections::HashMap<_, _>>(),
        ));

        let batch = run_batch(items, 3, tx, move |item| {
            let index = *position.lock().expect("position map").get(&item.id).expect("known id");
            async move {
                // Later items in a chunk finish first, forcing the
                // orchestrator to reorder completions.
                tokio::time::sleep(Duration::from_millis(30 - 10 * (index as u64 % 3))).await;
                ItemOutcome::NoMatch
            }
        });

        let (summary, events) = tokio::join!(batch, collect_events(rx));

        assert!(matches!(events.first(), Some(ProgressEvent::Start { total: 7 })));
        assert!(matches!(events.last(), Some(ProgressEvent::Complete { .. })));

        let progress: Vec<&ProgressEvent> = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Progress { .. }))
            .collect();
        assert_eq!(progress.len(), 7);
        for (i, event) in progress.iter().enumerate() {
            let ProgressEvent::Progress {
                processed,
                total,
                item_id,
                ..
            } = event
            else {
                unreachable!("filtered to Progress events");
            };
            // `processed` strictly increases by one per event, and events
            // arrive in original submission order.
            assert_eq!(*processed, i + 1);
            assert_eq!(*total, 7);
            assert_eq!(*item_id, expected_ids[i]);
        }

        assert_eq!(summary.counters.total(), 7);
        assert_eq!(summary.counters.no_match, 7);
    }

    #[tokio::test]
    async fn in_flight_executions_never_exceed_the_limit() {
        let items = make_items(10);
        let (tx, rx) = mpsc::channel(32);

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let batch = {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            run_batch(items, 3, tx, move |_item| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    ItemOutcome::NoMatch
                }
            })
        };

        let (_summary, _events) = tokio::join!(batch, collect_events(rx));
        assert!(
            peak.load(Ordering::SeqCst) <= 3,
            "peak in-flight {} exceeded the concurrency limit",
            peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn one_failing_item_is_isolated_from_its_siblings() {
        let items = make_items(7);
        let failing_id = items[3].id;
        let (tx, rx) = mpsc::channel(32);

        let batch = run_batch(items, 3, tx, move |item| async move {
            if item.id == failing_id {
                ItemOutcome::Failed("candidate search failed: connection refused".to_string())
            } else {
                ItemOutcome::NoMatch
            }
        });

        let (summary, events) = tokio::join!(batch, collect_events(rx));

        assert_eq!(summary.counters.errors, 1);
        assert_eq!(summary.counters.no_match, 6);
        assert_eq!(summary.counters.total(), 7);

        let failed: Vec<&ItemReport> = summary
            .items
            .iter()
            .filter(|r| r.outcome == "error")
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].item_id, failing_id);
        assert!(failed[0]
            .detail
            .as_deref()
            .expect("failure detail preserved")
            .contains("connection refused"));

        // All seven progress events were still emitted.
        let progress_count = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Progress { .. }))
            .count();
        assert_eq!(progress_count, 7);
    }

    #[tokio::test]
    async fn counters_sum_to_total_across_mixed_outcomes() {
        let items = make_items(6);
        let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
        let (tx, rx) = mpsc::channel(32);

        let batch = run_batch(items, 2, tx, move |item| {
            let index = ids.iter().position(|id| *id == item.id).expect("known id");
            async move {
                match index % 3 {
                    0 => ItemOutcome::Matched(shelfmatch_core::SelectedMatch {
                        catalog_key: "0012993201012".to_string(),
                        tier: shelfmatch_core::MatchTier::Identical,
                        confidence: 0.9,
                        visual_similarity: 0.95,
                        reasoning: String::new(),
                        method: shelfmatch_core::SelectionMethod::Consolidation,
                    }),
                    1 => ItemOutcome::NoMatch,
                    _ => ItemOutcome::Failed("boom".to_string()),
                }
            }
        });

        let (summary, _events) = tokio::join!(batch, collect_events(rx));
        assert_eq!(summary.counters.succeeded, 2);
        assert_eq!(summary.counters.no_match, 2);
        assert_eq!(summary.counters.errors, 2);
        assert_eq!(summary.counters.total() as usize, summary.total);
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_abort_the_batch() {
        let items = make_items(4);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let summary = run_batch(items, 2, tx, |_item| async { ItemOutcome::NoMatch }).await;
        assert_eq!(summary.counters.no_match, 4);
    }

    #[tokio::test]
    async fn empty_batch_completes_immediately() {
        let (tx, rx) = mpsc::channel(4);
        let batch = run_batch(Vec::new(), 3, tx, |_item| async { ItemOutcome::NoMatch });
        let (summary, events) = tokio::join!(batch, collect_events(rx));

        assert_eq!(summary.total, 0);
        assert_eq!(events.len(), 2, "just Start and Complete");
    }

    #[test]
    fn progress_event_serializes_with_snake_case_tag() {
        let event = ProgressEvent::Start { total: 3 };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "start");
        assert_eq!(json["total"], 3);
    }
}

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use super::error::CalendarError;
use super::provider::BatchSender;
use super::types::{BatchRequest, ItemResult, MAX_BATCH_SIZE};
use crate::schedule::ReminderEvent;

/// Summary of a dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub success_count: usize,
    pub failure_count: usize,
    pub total: usize,
}

impl Tally {
    /// Count 2xx results against `total`; anything else, including items with
    /// no result at all, is a failure.
    pub fn from_results(results: &[ItemResult], total: usize) -> Self {
        let success_count = results.iter().filter(|r| r.is_success()).count().min(total);
        Self {
            success_count,
            failure_count: total - success_count,
            total,
        }
    }
}

/// Events whose batch has been submitted, out of the run's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub tally: Tally,
    /// Per-event results, in the order the events were given.
    pub results: Vec<ItemResult>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("batch size {requested} exceeds the Graph limit of {max}")]
    BatchSizeExceeded { requested: usize, max: usize },

    #[error("batch size must be at least 1")]
    EmptyBatchSize,

    #[error("batch {batch} failed after {completed} of {total} events were submitted: {source}")]
    BatchSendFailed {
        /// 1-based number of the batch that failed.
        batch: usize,
        completed: usize,
        total: usize,
        /// Results of the batches that finished before the failure.
        results: Vec<ItemResult>,
        #[source]
        source: CalendarError,
    },
}

pub type ProgressCallback<'a> = &'a mut (dyn FnMut(Progress) + Send);

/// Splits reminder events into Graph-sized batches and submits them one at a time.
pub struct BatchDispatcher<'a> {
    sender: &'a dyn BatchSender,
    batch_size: usize,
}

impl<'a> BatchDispatcher<'a> {
    /// Fails when `batch_size` is zero or above the Graph `$batch` limit.
    pub fn new(sender: &'a dyn BatchSender, batch_size: usize) -> Result<Self, DispatchError> {
        if batch_size == 0 {
            return Err(DispatchError::EmptyBatchSize);
        }
        if batch_size > MAX_BATCH_SIZE {
            return Err(DispatchError::BatchSizeExceeded {
                requested: batch_size,
                max: MAX_BATCH_SIZE,
            });
        }
        Ok(Self { sender, batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Submit every event, reporting progress after each batch.
    ///
    /// Batches run strictly in sequence. The first batch that fails in
    /// transport aborts the run; nothing is retried.
    pub async fn dispatch(
        &self,
        events: &[ReminderEvent],
        mut on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<DispatchReport, DispatchError> {
        let total = events.len();
        if total == 0 {
            return Ok(DispatchReport {
                tally: Tally::default(),
                results: Vec::new(),
            });
        }

        let batch_count = total.div_ceil(self.batch_size);
        info!(total, batch_count, batch_size = self.batch_size, "dispatching reminder events");

        let mut results: Vec<ItemResult> = Vec::with_capacity(total);
        let mut completed = 0;

        for (index, chunk) in events.chunks(self.batch_size).enumerate() {
            let requests: Vec<BatchRequest> = chunk
                .iter()
                .enumerate()
                .map(|(offset, event)| {
                    BatchRequest::create_event((completed + offset + 1).to_string(), event.clone())
                })
                .collect();

            match self.sender.send_batch(&requests).await {
                Ok(batch_results) => results.extend(batch_results),
                Err(source) => {
                    error!(
                        batch = index + 1,
                        completed,
                        total,
                        error = %source,
                        "batch send failed, aborting remaining batches"
                    );
                    return Err(DispatchError::BatchSendFailed {
                        batch: index + 1,
                        completed,
                        total,
                        results,
                        source,
                    });
                }
            }

            completed += chunk.len();
            info!(batch = index + 1, completed, total, "batch submitted");

            if let Some(callback) = on_progress.as_deref_mut() {
                callback(Progress {
                    current: completed,
                    total,
                });
            }
        }

        let tally = Tally::from_results(&results, total);
        info!(
            success = tally.success_count,
            failed = tally.failure_count,
            total,
            "dispatch finished"
        );

        Ok(DispatchReport { tally, results })
    }
}

/// Convenience wrapper: validate `batch_size` and dispatch in one call.
pub async fn dispatch(
    events: &[ReminderEvent],
    batch_size: usize,
    sender: &dyn BatchSender,
    on_progress: Option<ProgressCallback<'_>>,
) -> Result<DispatchReport, DispatchError> {
    BatchDispatcher::new(sender, batch_size)?
        .dispatch(events, on_progress)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{payload::create_event, Slot};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Mutex;

    // --- Mock senders for testing ---

    /// Records every batch and answers with a status chosen per request id.
    struct RecordingSender {
        batches: Mutex<Vec<Vec<BatchRequest>>>,
        status_for: fn(usize) -> u16,
        fail_on_batch: Option<usize>,
    }

    impl RecordingSender {
        fn all_created() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                status_for: |_| 201,
                fail_on_batch: None,
            }
        }

        fn failing_on(batch: usize) -> Self {
            Self {
                fail_on_batch: Some(batch),
                ..Self::all_created()
            }
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl BatchSender for RecordingSender {
        async fn send_batch(
            &self,
            requests: &[BatchRequest],
        ) -> Result<Vec<ItemResult>, CalendarError> {
            let mut batches = self.batches.lock().unwrap();
            batches.push(requests.to_vec());
            if self.fail_on_batch == Some(batches.len()) {
                return Err(CalendarError::NetworkError("connection reset".into()));
            }
            Ok(requests
                .iter()
                .map(|r| {
                    let n: usize = r.id.parse().unwrap();
                    ItemResult::new(r.id.clone(), (self.status_for)(n))
                })
                .collect())
        }
    }

    // --- Helper ---

    fn events(n: usize) -> Vec<ReminderEvent> {
        let base = Utc.with_ymd_and_hms(2026, 2, 19, 9, 0, 0).unwrap();
        (0..n)
            .map(|i| create_event("Napa", &(base + Duration::hours(i as i64)), "UTC", Slot::Morning))
            .collect()
    }

    async fn run(
        sender: &RecordingSender,
        n: usize,
    ) -> (Result<DispatchReport, DispatchError>, Vec<Progress>) {
        let mut seen = Vec::new();
        let mut record = |p: Progress| seen.push(p);
        let result = dispatch(&events(n), MAX_BATCH_SIZE, sender, Some(&mut record)).await;
        (result, seen)
    }

    // --- Tests ---

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let sender = RecordingSender::all_created();
        let (result, progress) = run(&sender, 0).await;

        let report = result.unwrap();
        assert_eq!(report.tally, Tally { success_count: 0, failure_count: 0, total: 0 });
        assert!(sender.batch_sizes().is_empty());
        assert!(progress.is_empty());
    }

    #[tokio::test]
    async fn twenty_five_events_use_two_batches() {
        let sender = RecordingSender::all_created();
        let (result, progress) = run(&sender, 25).await;

        let report = result.unwrap();
        assert_eq!(report.tally, Tally { success_count: 25, failure_count: 0, total: 25 });
        assert_eq!(sender.batch_sizes(), vec![20, 5]);
        assert_eq!(
            progress,
            vec![
                Progress { current: 20, total: 25 },
                Progress { current: 25, total: 25 },
            ]
        );
    }

    #[tokio::test]
    async fn batch_count_is_ceiling_of_n_over_twenty() {
        for n in [1, 19, 20, 21, 40, 41, 99] {
            let sender = RecordingSender::all_created();
            let (result, progress) = run(&sender, n).await;
            result.unwrap();

            let sizes = sender.batch_sizes();
            assert_eq!(sizes.len(), n.div_ceil(20), "n = {n}");
            assert!(sizes.iter().all(|s| *s <= 20));
            let last = if n % 20 == 0 { 20 } else { n % 20 };
            assert_eq!(*sizes.last().unwrap(), last, "n = {n}");

            assert_eq!(progress.len(), sizes.len());
            assert!(progress.windows(2).all(|w| w[0].current < w[1].current));
            assert_eq!(progress.last().unwrap(), &Progress { current: n, total: n });
        }
    }

    #[tokio::test]
    async fn per_item_failures_are_tallied_not_raised() {
        let sender = RecordingSender {
            status_for: |n| match n {
                2 => 404,
                5 => 400,
                9 => 500,
                _ => 201,
            },
            ..RecordingSender::all_created()
        };
        let (result, _) = run(&sender, 10).await;

        let report = result.unwrap();
        assert_eq!(report.tally, Tally { success_count: 7, failure_count: 3, total: 10 });
        assert_eq!(report.results.len(), 10);
    }

    #[tokio::test]
    async fn transport_failure_aborts_and_keeps_completed_results() {
        let sender = RecordingSender::failing_on(2);
        let (result, progress) = run(&sender, 30).await;

        match result.unwrap_err() {
            DispatchError::BatchSendFailed {
                batch,
                completed,
                total,
                results,
                source,
            } => {
                assert_eq!(batch, 2);
                assert_eq!(completed, 20);
                assert_eq!(total, 30);
                assert_eq!(results.len(), 20);
                assert!(matches!(source, CalendarError::NetworkError(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(progress, vec![Progress { current: 20, total: 30 }]);
    }

    #[tokio::test]
    async fn failure_stops_later_batches() {
        let sender = RecordingSender::failing_on(1);
        let (result, progress) = run(&sender, 60).await;

        assert!(matches!(
            result,
            Err(DispatchError::BatchSendFailed { completed: 0, .. })
        ));
        assert_eq!(sender.batch_sizes(), vec![20]);
        assert!(progress.is_empty());
    }

    #[tokio::test]
    async fn request_ids_are_numbered_across_batches() {
        let sender = RecordingSender::all_created();
        run(&sender, 22).await.0.unwrap();

        let batches = sender.batches.lock().unwrap();
        assert_eq!(batches[0][0].id, "1");
        assert_eq!(batches[0][19].id, "20");
        assert_eq!(batches[1][0].id, "21");
        assert_eq!(batches[1][1].id, "22");
    }

    #[tokio::test]
    async fn preserves_event_order() {
        let sender = RecordingSender::all_created();
        let input = events(23);
        dispatch(&input, 20, &sender, None).await.unwrap();

        let sent: Vec<ReminderEvent> = sender
            .batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|r| r.body.clone())
            .collect();
        assert_eq!(sent, input);
    }

    #[tokio::test]
    async fn runs_without_progress_callback() {
        let sender = RecordingSender::all_created();
        let report = dispatch(&events(3), 20, &sender, None).await.unwrap();
        assert_eq!(report.tally.success_count, 3);
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_before_sending() {
        let sender = RecordingSender::all_created();
        let err = dispatch(&events(5), 21, &sender, None).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::BatchSizeExceeded { requested: 21, max: 20 }
        ));
        assert!(sender.batch_sizes().is_empty());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let sender = RecordingSender::all_created();
        assert!(matches!(
            BatchDispatcher::new(&sender, 0),
            Err(DispatchError::EmptyBatchSize)
        ));
    }

    #[tokio::test]
    async fn smaller_batch_size_is_honoured() {
        let sender = RecordingSender::all_created();
        dispatch(&events(7), 3, &sender, None).await.unwrap();
        assert_eq!(sender.batch_sizes(), vec![3, 3, 1]);
    }

    #[test]
    fn tally_counts_missing_results_as_failures() {
        let results = vec![ItemResult::new("1", 201), ItemResult::new("2", 201)];
        let tally = Tally::from_results(&results, 5);
        assert_eq!(tally, Tally { success_count: 2, failure_count: 3, total: 5 });
    }
}

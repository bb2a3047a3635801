//! Milestone tracking.
//!
//! Compares current counts against the configured tier lists and records each
//! crossed threshold exactly once. The store decides whether a threshold is
//! new, so overlapping evaluations (dashboard requests and the hourly job)
//! never produce duplicate records or duplicate events.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::milestone::{
    next_goal, MilestoneConfig, MilestoneCounts, MilestoneOverview, MilestoneProgress,
    MilestoneReached, MilestoneRecord, MilestoneType,
};

/// Default number of history records returned.
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Upper bound on requested history records.
pub const MAX_HISTORY_LIMIT: i64 = 500;

#[derive(Debug, Error)]
#[error("Milestone store error: {0}")]
pub struct MilestoneStoreError(pub String);

/// Durable storage for milestone records.
#[async_trait]
pub trait MilestoneStore: Send + Sync {
    /// Inserts a record for `(metric_type, threshold)` unless one exists.
    ///
    /// Returns `true` only for the call that created the record. An insert
    /// that loses a race to a concurrent writer returns `false`.
    async fn record_if_absent(
        &self,
        metric_type: MilestoneType,
        threshold: i64,
    ) -> Result<bool, MilestoneStoreError>;

    /// Records ordered by `reached_at` descending.
    async fn history(&self, limit: i64) -> Result<Vec<MilestoneRecord>, MilestoneStoreError>;
}

/// Evaluation stopped on a store failure.
///
/// `recorded` holds the thresholds committed before the failure; they will not
/// be reported as new again, so callers should still announce them.
#[derive(Debug, Error)]
#[error("Milestone evaluation for {metric_type} failed: {source}")]
pub struct MilestoneEvaluationError {
    pub metric_type: MilestoneType,
    pub recorded: Vec<MilestoneReached>,
    #[source]
    pub source: MilestoneStoreError,
}

/// Tiered progress tracking over an injected tier configuration.
#[derive(Clone)]
pub struct MilestoneTracker {
    store: Arc<dyn MilestoneStore>,
    config: MilestoneConfig,
}

impl MilestoneTracker {
    pub fn new(store: Arc<dyn MilestoneStore>, config: MilestoneConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &MilestoneConfig {
        &self.config
    }

    /// Current count and next goal. Records nothing.
    pub fn progress(&self, metric_type: MilestoneType, count: i64) -> MilestoneProgress {
        MilestoneProgress {
            current: count,
            next_goal: next_goal(self.config.tiers(metric_type).as_slice(), count),
        }
    }

    pub fn overview(&self, counts: MilestoneCounts) -> MilestoneOverview {
        MilestoneOverview {
            users: self.progress(MilestoneType::Users, counts.users),
            suburbs: self.progress(MilestoneType::Suburbs, counts.suburbs),
            cities: self.progress(MilestoneType::Cities, counts.cities),
        }
    }

    /// Records every tier at or below `count` that has no record yet.
    ///
    /// Tiers are visited in ascending order and each newly recorded tier yields
    /// one event, so a jump across several tiers reports all of them.
    pub async fn evaluate(
        &self,
        metric_type: MilestoneType,
        count: i64,
    ) -> Result<Vec<MilestoneReached>, MilestoneEvaluationError> {
        let mut reached = Vec::new();

        for threshold in self.config.tiers(metric_type).reached(count) {
            match self.store.record_if_absent(metric_type, threshold).await {
                Ok(true) => {
                    info!(
                        metric_type = %metric_type,
                        threshold = threshold,
                        current = count,
                        "Milestone reached"
                    );
                    counter!("milestones_reached_total", "type" => metric_type.as_str())
                        .increment(1);
                    reached.push(MilestoneReached {
                        metric_type,
                        threshold,
                        current: count,
                    });
                }
                Ok(false) => {
                    debug!(metric_type = %metric_type, threshold = threshold, "Milestone already recorded");
                }
                Err(source) => {
                    return Err(MilestoneEvaluationError {
                        metric_type,
                        recorded: reached,
                        source,
                    });
                }
            }
        }

        Ok(reached)
    }

    /// Evaluates users, suburbs and cities in turn.
    pub async fn evaluate_all(
        &self,
        counts: MilestoneCounts,
    ) -> Result<Vec<MilestoneReached>, MilestoneEvaluationError> {
        let mut reached = Vec::new();
        for metric_type in MilestoneType::ALL {
            match self.evaluate(metric_type, counts.get(metric_type)).await {
                Ok(events) => reached.extend(events),
                Err(mut err) => {
                    reached.append(&mut err.recorded);
                    err.recorded = reached;
                    return Err(err);
                }
            }
        }
        Ok(reached)
    }

    /// Most recent records first. `limit` defaults to 50 and is capped at 500.
    pub async fn history(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<MilestoneRecord>, MilestoneStoreError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.store.history(limit).await
    }
}

/// Milestone store kept in memory.
///
/// Used by tests and by tooling that runs without a database.
#[derive(Debug, Default)]
pub struct InMemoryMilestoneStore {
    records: std::sync::Mutex<Vec<MilestoneRecord>>,
}

impl InMemoryMilestoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MilestoneRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MilestoneStore for InMemoryMilestoneStore {
    async fn record_if_absent(
        &self,
        metric_type: MilestoneType,
        threshold: i64,
    ) -> Result<bool, MilestoneStoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| MilestoneStoreError(e.to_string()))?;

        if records
            .iter()
            .any(|r| r.metric_type == metric_type && r.value == threshold)
        {
            return Ok(false);
        }

        let id = records.len() as i64 + 1;
        records.push(MilestoneRecord {
            id,
            metric_type,
            value: threshold,
            reached_at: chrono::Utc::now(),
        });
        Ok(true)
    }

    async fn history(&self, limit: i64) -> Result<Vec<MilestoneRecord>, MilestoneStoreError> {
        let records = self
            .records
            .lock()
            .map_err(|e| MilestoneStoreError(e.to_string()))?;

        let mut sorted = records.clone();
        sorted.sort_by(|a, b| b.reached_at.cmp(&a.reached_at).then(b.id.cmp(&a.id)));
        sorted.truncate(limit.max(0) as usize);
        Ok(sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::milestone::{MilestoneTiers, NextGoal};

    fn small_config() -> MilestoneConfig {
        MilestoneConfig {
            users: MilestoneTiers::new(vec![100, 500, 1000]).unwrap(),
            suburbs: MilestoneTiers::new(vec![5, 10]).unwrap(),
            cities: MilestoneTiers::new(vec![3]).unwrap(),
        }
    }

    fn tracker() -> (MilestoneTracker, Arc<InMemoryMilestoneStore>) {
        let store = Arc::new(InMemoryMilestoneStore::new());
        (MilestoneTracker::new(store.clone(), small_config()), store)
    }

    /// Store that fails once a given number of inserts have succeeded.
    struct FailingStore {
        inner: InMemoryMilestoneStore,
        fail_after: usize,
    }

    #[async_trait]
    impl MilestoneStore for FailingStore {
        async fn record_if_absent(
            &self,
            metric_type: MilestoneType,
            threshold: i64,
        ) -> Result<bool, MilestoneStoreError> {
            if self.inner.records().len() >= self.fail_after {
                return Err(MilestoneStoreError("connection reset".to_string()));
            }
            self.inner.record_if_absent(metric_type, threshold).await
        }

        async fn history(&self, limit: i64) -> Result<Vec<MilestoneRecord>, MilestoneStoreError> {
            self.inner.history(limit).await
        }
    }

    #[test]
    fn test_progress_does_not_record() {
        let (tracker, store) = tracker();
        let progress = tracker.progress(MilestoneType::Users, 150);
        assert_eq!(progress.current, 150);
        assert_eq!(progress.next_goal, NextGoal::Tier(500));
        assert!(store.records().is_empty());
    }

    #[test]
    fn test_overview_maxed() {
        let (tracker, _) = tracker();
        let overview = tracker.overview(MilestoneCounts {
            users: 20,
            suburbs: 12,
            cities: 3,
        });
        assert_eq!(overview.users.next_goal, NextGoal::Tier(100));
        assert_eq!(overview.suburbs.next_goal, NextGoal::Maxed);
        assert_eq!(overview.cities.next_goal, NextGoal::Maxed);
    }

    #[tokio::test]
    async fn test_multi_tier_crossing_records_each_tier_once() {
        let (tracker, store) = tracker();

        assert!(tracker.evaluate(MilestoneType::Users, 50).await.unwrap().is_empty());

        let events = tracker.evaluate(MilestoneType::Users, 1200).await.unwrap();
        let thresholds: Vec<i64> = events.iter().map(|e| e.threshold).collect();
        assert_eq!(thresholds, vec![100, 500, 1000]);
        assert!(events.iter().all(|e| e.current == 1200));
        assert_eq!(store.records().len(), 3);
    }

    #[tokio::test]
    async fn test_repeated_evaluation_is_idempotent() {
        let (tracker, store) = tracker();

        let first = tracker.evaluate(MilestoneType::Users, 600).await.unwrap();
        let second = tracker.evaluate(MilestoneType::Users, 600).await.unwrap();

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_evaluation_never_duplicates() {
        let (tracker, store) = tracker();

        let (a, b, c) = tokio::join!(
            tracker.evaluate(MilestoneType::Users, 1200),
            tracker.evaluate(MilestoneType::Users, 1200),
            tracker.evaluate(MilestoneType::Users, 700),
        );
        let total = a.unwrap().len() + b.unwrap().len() + c.unwrap().len();

        assert_eq!(total, 3);
        assert_eq!(store.records().len(), 3);
    }

    #[tokio::test]
    async fn test_drop_in_count_does_not_retract() {
        let (tracker, store) = tracker();

        tracker.evaluate(MilestoneType::Suburbs, 11).await.unwrap();
        let events = tracker.evaluate(MilestoneType::Suburbs, 2).await.unwrap();

        assert!(events.is_empty());
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_evaluate_all_covers_every_type() {
        let (tracker, _) = tracker();
        let events = tracker
            .evaluate_all(MilestoneCounts {
                users: 120,
                suburbs: 5,
                cities: 4,
            })
            .await
            .unwrap();

        let pairs: Vec<(MilestoneType, i64)> =
            events.iter().map(|e| (e.metric_type, e.threshold)).collect();
        assert_eq!(
            pairs,
            vec![
                (MilestoneType::Users, 100),
                (MilestoneType::Suburbs, 5),
                (MilestoneType::Cities, 3),
            ]
        );
    }

    #[tokio::test]
    async fn test_store_failure_keeps_recorded_events() {
        let store = Arc::new(FailingStore {
            inner: InMemoryMilestoneStore::new(),
            fail_after: 1,
        });
        let tracker = MilestoneTracker::new(store, small_config());

        let err = tracker
            .evaluate(MilestoneType::Users, 1200)
            .await
            .unwrap_err();

        assert_eq!(err.metric_type, MilestoneType::Users);
        assert_eq!(err.recorded.len(), 1);
        assert_eq!(err.recorded[0].threshold, 100);
    }

    #[tokio::test]
    async fn test_history_newest_first_and_limited() {
        let (tracker, _) = tracker();
        tracker.evaluate(MilestoneType::Users, 1200).await.unwrap();

        let history = tracker.history(Some(2)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].reached_at >= history[1].reached_at);

        let all = tracker.history(None).await.unwrap();
        assert_eq!(all.len(), 3);
    }
}

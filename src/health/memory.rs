//! Scriptable in-memory health store.
//!
//! Holds workouts and their sub-records in memory, records every query
//! range, and lets callers inject failures and fire change notifications.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::{Capabilities, ChangeNotification, DataSource, DateRange, SourceError};
use crate::models::{QuantitySample, RawWorkout, RoutePoint};
use crate::signal::DoneSignal;

/// Sub-queries that can be made to fail individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubQuery {
    HeartRate,
    StrokeCount,
    Vo2Max,
    Route,
}

#[derive(Default)]
struct StoreState {
    available: bool,
    authorization: Option<String>,
    workouts: Vec<RawWorkout>,
    heart_rate: HashMap<Uuid, Vec<QuantitySample>>,
    strokes: HashMap<Uuid, Vec<QuantitySample>>,
    vo2max: HashMap<Uuid, Vec<QuantitySample>>,
    routes: HashMap<Uuid, Vec<RoutePoint>>,
    fail_queries: bool,
    queries_before_failure: Option<usize>,
    failing_sub_queries: HashSet<SubQuery>,
    query_log: Vec<DateRange>,
    subscribers: Vec<mpsc::Sender<ChangeNotification>>,
}

pub struct InMemoryHealthStore {
    capabilities: Capabilities,
    state: Mutex<StoreState>,
}

impl InMemoryHealthStore {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::all())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            state: Mutex::new(StoreState {
                available: true,
                ..StoreState::default()
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> T {
        // A poisoned lock only means a test panicked mid-update; keep going.
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn set_available(&self, available: bool) {
        self.with_state(|s| s.available = available);
    }

    /// Make authorization fail with `reason`, or succeed with `None`.
    pub fn deny_authorization(&self, reason: Option<&str>) {
        self.with_state(|s| s.authorization = reason.map(str::to_string));
    }

    pub fn add_workout(&self, workout: RawWorkout) {
        self.with_state(|s| s.workouts.push(workout));
    }

    pub fn set_heart_rate(&self, workout: Uuid, samples: Vec<QuantitySample>) {
        self.with_state(|s| s.heart_rate.insert(workout, samples));
    }

    pub fn set_stroke_counts(&self, workout: Uuid, samples: Vec<QuantitySample>) {
        self.with_state(|s| s.strokes.insert(workout, samples));
    }

    pub fn set_vo2max(&self, workout: Uuid, samples: Vec<QuantitySample>) {
        self.with_state(|s| s.vo2max.insert(workout, samples));
    }

    pub fn set_route(&self, workout: Uuid, points: Vec<RoutePoint>) {
        self.with_state(|s| s.routes.insert(workout, points));
    }

    /// Make every workout query fail until reset.
    pub fn fail_queries(&self, fail: bool) {
        self.with_state(|s| s.fail_queries = fail);
    }

    /// Let `successful` more workout queries through, then fail the rest.
    pub fn fail_queries_after(&self, successful: usize) {
        self.with_state(|s| s.queries_before_failure = Some(successful));
    }

    pub fn fail_sub_query(&self, which: SubQuery) {
        self.with_state(|s| s.failing_sub_queries.insert(which));
    }

    /// Every range passed to `query_workouts`, in call order.
    pub fn query_log(&self) -> Vec<DateRange> {
        self.with_state(|s| s.query_log.clone())
    }

    pub fn subscriber_count(&self) -> usize {
        self.with_state(|s| s.subscribers.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// Push a change notification to every live listener. Returns one
    /// receiver per delivered notification; each fires when the listener
    /// signals it is done.
    pub async fn notify_changed(&self) -> Vec<oneshot::Receiver<()>> {
        let subscribers = self.with_state(|s| {
            s.subscribers.retain(|tx| !tx.is_closed());
            s.subscribers.clone()
        });

        let mut receivers = Vec::new();
        for tx in subscribers {
            let (done, rx) = DoneSignal::new();
            if tx.send(ChangeNotification { done }).await.is_ok() {
                receivers.push(rx);
            }
        }
        receivers
    }

    fn sub_query<T: Clone>(
        &self,
        which: SubQuery,
        pick: impl FnOnce(&StoreState) -> Option<&Vec<T>>,
    ) -> Result<Vec<T>, SourceError> {
        self.with_state(|s| {
            if s.failing_sub_queries.contains(&which) {
                return Err(SourceError::Query(format!("{which:?} lookup failed")));
            }
            Ok(pick(s).cloned().unwrap_or_default())
        })
    }
}

impl Default for InMemoryHealthStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for InMemoryHealthStore {
    fn is_available(&self) -> bool {
        self.with_state(|s| s.available)
    }

    async fn request_authorization(&self) -> Result<(), SourceError> {
        self.with_state(|s| {
            if !s.available {
                return Err(SourceError::Unavailable);
            }
            match &s.authorization {
                Some(reason) => Err(SourceError::Denied(reason.clone())),
                None => Ok(()),
            }
        })
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn query_workouts(
        &self,
        range: DateRange,
        limit: usize,
    ) -> Result<Vec<RawWorkout>, SourceError> {
        self.with_state(|s| {
            s.query_log.push(range);
            if let Some(remaining) = s.queries_before_failure.as_mut() {
                if *remaining == 0 {
                    s.fail_queries = true;
                } else {
                    *remaining -= 1;
                }
            }
            if s.fail_queries {
                return Err(SourceError::Query("store unavailable".into()));
            }

            let mut page: Vec<RawWorkout> = s
                .workouts
                .iter()
                .filter(|w| range.contains(&w.end_date))
                .cloned()
                .collect();
            page.sort_by_key(|w| w.end_date);
            page.truncate(limit);
            Ok(page)
        })
    }

    async fn heart_rate_samples(
        &self,
        workout: &RawWorkout,
    ) -> Result<Vec<QuantitySample>, SourceError> {
        self.sub_query(SubQuery::HeartRate, |s| s.heart_rate.get(&workout.uuid))
    }

    async fn stroke_count_samples(
        &self,
        workout: &RawWorkout,
    ) -> Result<Vec<QuantitySample>, SourceError> {
        self.sub_query(SubQuery::StrokeCount, |s| s.strokes.get(&workout.uuid))
    }

    async fn vo2max_samples(
        &self,
        workout: &RawWorkout,
    ) -> Result<Vec<QuantitySample>, SourceError> {
        self.sub_query(SubQuery::Vo2Max, |s| s.vo2max.get(&workout.uuid))
    }

    async fn route(&self, workout: &RawWorkout) -> Result<Vec<RoutePoint>, SourceError> {
        self.sub_query(SubQuery::Route, |s| s.routes.get(&workout.uuid))
    }

    fn subscribe(&self) -> Result<mpsc::Receiver<ChangeNotification>, SourceError> {
        let (tx, rx) = mpsc::channel(16);
        self.with_state(|s| s.subscribers.push(tx));
        Ok(rx)
    }
}

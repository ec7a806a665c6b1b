//! Health data store boundary.
//!
//! `DataSource` is the only way the crate reads workouts. The platform
//! binding implements it over the device store; `memory::InMemoryHealthStore`
//! implements it for tests and demos.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{QuantitySample, RawWorkout, RoutePoint};
use crate::signal::DoneSignal;

pub use memory::InMemoryHealthStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Health data not available")]
    Unavailable,

    #[error("Authorization denied: {0}")]
    Denied(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Change notifications unavailable: {0}")]
    Subscription(String),
}

// ═══════════════════════════════════════════════════════════
// Date ranges
// ═══════════════════════════════════════════════════════════

/// Smallest width a query range may have.
pub fn min_range_width() -> Duration {
    Duration::seconds(1)
}

/// Inclusive time range over workout end dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Build a range with `start <= end` and non-zero width.
    ///
    /// Reversed bounds are swapped. Equal bounds widen to
    /// `[start, start + 1s]`: a zero-width range means "at least the
    /// instant itself".
    pub fn normalized(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let end = if start == end { start + min_range_width() } else { end };
        Self { start, end }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts <= self.end
    }
}

// ═══════════════════════════════════════════════════════════
// Capabilities
// ═══════════════════════════════════════════════════════════

/// Optional sub-queries the store supports, resolved once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub workout_events: bool,
    pub heart_rate_series: bool,
    pub stroke_count: bool,
    pub vo2max: bool,
    pub route: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            workout_events: true,
            heart_rate_series: true,
            stroke_count: true,
            vo2max: true,
            route: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Change notifications
// ═══════════════════════════════════════════════════════════

/// "Something changed" push from the store. The store holds its background
/// execution window open until `done` is signalled.
#[derive(Debug)]
pub struct ChangeNotification {
    pub done: DoneSignal,
}

// ═══════════════════════════════════════════════════════════
// DataSource
// ═══════════════════════════════════════════════════════════

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Whether the device has a health store at all.
    fn is_available(&self) -> bool;

    /// Ask for read access to workouts.
    async fn request_authorization(&self) -> Result<(), SourceError>;

    /// Optional sub-queries this store can answer.
    fn capabilities(&self) -> Capabilities;

    /// Workouts whose end date lies in `range`, ordered by end date
    /// ascending, at most `limit` of them. Not filtered by activity type.
    async fn query_workouts(
        &self,
        range: DateRange,
        limit: usize,
    ) -> Result<Vec<RawWorkout>, SourceError>;

    async fn heart_rate_samples(
        &self,
        workout: &RawWorkout,
    ) -> Result<Vec<QuantitySample>, SourceError>;

    async fn stroke_count_samples(
        &self,
        workout: &RawWorkout,
    ) -> Result<Vec<QuantitySample>, SourceError>;

    async fn vo2max_samples(&self, workout: &RawWorkout)
        -> Result<Vec<QuantitySample>, SourceError>;

    async fn route(&self, workout: &RawWorkout) -> Result<Vec<RoutePoint>, SourceError>;

    /// Register a change listener. Each call creates a new registration.
    fn subscribe(&self) -> Result<mpsc::Receiver<ChangeNotification>, SourceError>;
}

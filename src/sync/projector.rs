//! Record Projector: raw workout plus sub-records into the upload shape.

use std::sync::Arc;

use async_trait::async_trait;

use crate::health::{Capabilities, DataSource};
use crate::models::{ProjectedWorkout, RawWorkout};

/// Turns one raw workout into its upload-ready form.
///
/// Projection never fails the batch: a sub-query that errors contributes
/// an empty collection.
#[async_trait]
pub trait RecordProjector: Send + Sync {
    async fn project(&self, workout: &RawWorkout) -> ProjectedWorkout;
}

/// Projector backed by the health store's sub-queries, gated on the
/// capabilities negotiated when it was built.
pub struct HealthStoreProjector {
    source: Arc<dyn DataSource>,
    capabilities: Capabilities,
}

impl HealthStoreProjector {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        let capabilities = source.capabilities();
        tracing::debug!(?capabilities, "Health store capabilities resolved");
        Self {
            source,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

/// Unwrap a sub-query result, degrading to an empty collection.
fn or_empty<T>(
    result: Result<Vec<T>, crate::health::SourceError>,
    what: &'static str,
    workout: &RawWorkout,
) -> Vec<T> {
    result.unwrap_or_else(|e| {
        tracing::warn!(workout = %workout.uuid, sub_query = what, error = %e, "Sub-query failed");
        Vec::new()
    })
}

#[async_trait]
impl RecordProjector for HealthStoreProjector {
    async fn project(&self, workout: &RawWorkout) -> ProjectedWorkout {
        let caps = self.capabilities;

        let heart_rate_samples = if caps.heart_rate_series {
            or_empty(self.source.heart_rate_samples(workout).await, "heart_rate", workout)
        } else {
            Vec::new()
        };
        let stroke_count_samples = if caps.stroke_count {
            or_empty(self.source.stroke_count_samples(workout).await, "stroke_count", workout)
        } else {
            Vec::new()
        };
        let vo2max_samples = if caps.vo2max {
            or_empty(self.source.vo2max_samples(workout).await, "vo2max", workout)
        } else {
            Vec::new()
        };
        let route = if caps.route {
            or_empty(self.source.route(workout).await, "route", workout)
        } else {
            Vec::new()
        };
        let events = if caps.workout_events {
            workout.events.clone()
        } else {
            Vec::new()
        };

        ProjectedWorkout {
            uuid: workout.uuid,
            start_date: workout.start_date,
            end_date: workout.end_date,
            duration: workout.duration_secs(),
            source: workout.source_name.clone(),
            source_bundle_id: workout.source_bundle_id.clone(),
            device: workout.device.clone(),
            activity_id: workout.activity_id,
            swim_location_type: workout.swim_location,
            lap_length: workout.lap_length_m,
            total_distance: workout.total_distance_m,
            total_energy_burned: workout.total_energy_kcal,
            events,
            heart_rate_samples,
            stroke_count_samples,
            vo2max_samples,
            route,
        }
    }
}

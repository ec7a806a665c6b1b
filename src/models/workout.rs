//! Workout records: the raw shape read from the health store and the
//! projected shape sent over the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{SwimLocation, SwimStrokeStyle, WorkoutEventType};

/// Health-store activity type identifiers for the swim family.
pub const ACTIVITY_SWIMMING: u32 = 46;
pub const ACTIVITY_SWIM_BIKE_RUN: u32 = 74;

/// Hardware that recorded a workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInformation {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub hardware_version: Option<String>,
    pub software_version: Option<String>,
}

/// One event recorded during a workout (lap, segment, pause...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutEvent {
    pub event_type: WorkoutEventType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub stroke_style: Option<SwimStrokeStyle>,
    pub swolf: Option<f64>,
}

/// A workout exactly as the health store returns it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWorkout {
    pub uuid: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub activity_id: u32,
    pub source_name: String,
    pub source_bundle_id: String,
    pub device: Option<DeviceInformation>,
    pub total_distance_m: Option<f64>,
    pub total_energy_kcal: Option<f64>,
    pub swim_location: Option<SwimLocation>,
    pub lap_length_m: Option<f64>,
    pub events: Vec<WorkoutEvent>,
}

impl RawWorkout {
    /// Simple swims and multi-sport workouts with a swim leg.
    pub fn is_swim(&self) -> bool {
        matches!(self.activity_id, ACTIVITY_SWIMMING | ACTIVITY_SWIM_BIKE_RUN)
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_date - self.start_date).num_milliseconds() as f64 / 1000.0
    }
}

/// A timestamped scalar (heart rate, stroke count, VO2max).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantitySample {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
}

/// One location fix along a workout route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub horizontal_accuracy: Option<f64>,
}

/// Upload-ready workout. Dates serialize as RFC 3339 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedWorkout {
    pub uuid: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration: f64,
    pub source: String,
    pub source_bundle_id: String,
    pub device: Option<DeviceInformation>,
    pub activity_id: u32,
    pub swim_location_type: Option<SwimLocation>,
    pub lap_length: Option<f64>,
    pub total_distance: Option<f64>,
    pub total_energy_burned: Option<f64>,
    pub events: Vec<WorkoutEvent>,
    pub heart_rate_samples: Vec<QuantitySample>,
    pub stroke_count_samples: Vec<QuantitySample>,
    pub vo2max_samples: Vec<QuantitySample>,
    pub route: Vec<RoutePoint>,
}

/// Response shape of a one-shot workout read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutResults {
    pub count: usize,
    pub results: Vec<ProjectedWorkout>,
}

impl From<Vec<ProjectedWorkout>> for WorkoutResults {
    fn from(results: Vec<ProjectedWorkout>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

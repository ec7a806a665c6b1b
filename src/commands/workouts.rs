//! One-shot health store commands: availability, permissions, and a plain
//! workout read for display. None of these touch the watermark.

use std::collections::HashSet;

use uuid::Uuid;

use super::{required_date, CommandError};
use crate::core_state::HealthSync;
use crate::health::DateRange;
use crate::models::WorkoutResults;

pub async fn check_availability(sync: &HealthSync) -> Result<(), CommandError> {
    if sync.source().is_available() {
        Ok(())
    } else {
        Err(CommandError::Unavailable)
    }
}

/// Ask for read access to workouts.
pub async fn request_permissions(sync: &HealthSync) -> Result<(), CommandError> {
    check_availability(sync).await?;
    tracing::info!("Requesting health store authorization");
    sync.source().request_authorization().await?;
    Ok(())
}

/// Every workout (any activity type) ending inside `[start_date, end_date]`.
///
/// Reversed bounds are swapped and equal bounds widen to one second.
pub async fn fetch_workouts(
    sync: &HealthSync,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<WorkoutResults, CommandError> {
    let start = required_date("startDate", start_date)?;
    let end = required_date("endDate", end_date)?;
    let range = DateRange::normalized(start, end);
    let page_size = sync.config().batch_limit.max(1);

    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut results = Vec::new();
    let mut cursor = range.start;
    loop {
        let page = sync
            .source()
            .query_workouts(DateRange::normalized(cursor, range.end), page_size)
            .await?;
        let page_len = page.len();
        let mut fresh = 0usize;

        for raw in page {
            if !seen.insert(raw.uuid) {
                continue;
            }
            fresh += 1;
            cursor = cursor.max(raw.end_date);
            results.push(sync.projector().project(&raw).await);
        }

        if page_len < page_size || fresh == 0 {
            break;
        }
    }

    tracing::debug!(start = %range.start, end = %range.end, count = results.len(), "Fetched workouts");
    Ok(WorkoutResults::from(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_state::testing::test_sync;
    use crate::health::memory::fixtures::{at, swim_ending, workout_ending};

    #[tokio::test]
    async fn availability_follows_the_store() {
        let t = test_sync();
        assert!(check_availability(&t.sync).await.is_ok());
        t.store.set_available(false);
        assert_eq!(check_availability(&t.sync).await, Err(CommandError::Unavailable));
    }

    #[tokio::test]
    async fn permissions_fail_when_unavailable() {
        let t = test_sync();
        t.store.set_available(false);
        let err = request_permissions(&t.sync).await.unwrap_err();
        assert_eq!(err.to_string(), "Health data not available");
    }

    #[tokio::test]
    async fn permissions_surface_denial() {
        let t = test_sync();
        assert!(request_permissions(&t.sync).await.is_ok());
        t.store.deny_authorization(Some("user declined"));
        assert_eq!(
            request_permissions(&t.sync).await,
            Err(CommandError::Denied("user declined".into()))
        );
    }

    #[tokio::test]
    async fn fetch_requires_both_dates() {
        let t = test_sync();
        let err = fetch_workouts(&t.sync, None, Some("2024-01-01T00:00:00Z"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Parameter startDate is required!");

        let err = fetch_workouts(&t.sync, Some("2024-01-01T00:00:00Z"), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Parameter endDate is required!");
    }

    #[tokio::test]
    async fn fetch_returns_every_activity_in_range() {
        let t = test_sync();
        t.store.add_workout(swim_ending(at(2024, 1, 2)));
        t.store.add_workout(workout_ending(37, at(2024, 1, 3)));
        t.store.add_workout(swim_ending(at(2024, 3, 1)));

        let results = fetch_workouts(
            &t.sync,
            Some("2024-01-01T00:00:00Z"),
            Some("2024-02-01T00:00:00Z"),
        )
        .await
        .unwrap();

        assert_eq!(results.count, 2);
        assert_eq!(results.results[1].activity_id, 37);
        assert_eq!(t.sync.watermark().get().await, None);
    }

    #[tokio::test]
    async fn fetch_pages_past_the_batch_limit() {
        let t = test_sync();
        for day in 1..=25 {
            t.store.add_workout(swim_ending(at(2024, 1, day)));
        }

        let results = fetch_workouts(
            &t.sync,
            Some("2024-01-01T00:00:00Z"),
            Some("2024-02-01T00:00:00Z"),
        )
        .await
        .unwrap();
        assert_eq!(results.count, 25);
    }

    #[tokio::test]
    async fn zero_width_range_matches_one_second_range() {
        let t = test_sync();
        t.store.add_workout(swim_ending(at(2024, 1, 2)));

        let point = fetch_workouts(
            &t.sync,
            Some("2024-01-02T00:00:00Z"),
            Some("2024-01-02T00:00:00Z"),
        )
        .await
        .unwrap();
        let widened = fetch_workouts(
            &t.sync,
            Some("2024-01-02T00:00:00Z"),
            Some("2024-01-02T00:00:01Z"),
        )
        .await
        .unwrap();

        assert_eq!(point.count, 1);
        assert_eq!(point.results, widened.results);
    }

    #[tokio::test]
    async fn reversed_range_is_swapped() {
        let t = test_sync();
        t.store.add_workout(swim_ending(at(2024, 1, 2)));

        let results = fetch_workouts(
            &t.sync,
            Some("2024-02-01T00:00:00Z"),
            Some("2024-01-01T00:00:00Z"),
        )
        .await
        .unwrap();
        assert_eq!(results.count, 1);
    }

    #[tokio::test]
    async fn query_failure_is_reported() {
        let t = test_sync();
        t.store.fail_queries(true);
        let err = fetch_workouts(
            &t.sync,
            Some("2024-01-01T00:00:00Z"),
            Some("2024-02-01T00:00:00Z"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CommandError::Internal(_)));
    }
}

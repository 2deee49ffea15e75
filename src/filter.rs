//! Time-window filtering of collected resources
//!
//! The window is resolved once per run from configuration and stays
//! immutable for the run's lifetime. Filtering itself is a stateless
//! predicate over a resource's lifetime bounds.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::CollectError;
use crate::resource::Resource;

/// The interval resources must overlap to be in scope for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    /// Resolve the window from its three configuration styles: explicit
    /// bounds, a relative period measured back from `now`, or a lower bound
    /// running up to `now`.
    ///
    /// Explicit bounds and a period are mutually exclusive; supplying both
    /// is rejected before any listing call is made.
    pub fn resolve(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        period: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, CollectError> {
        if (from.is_some() || to.is_some()) && period.is_some() {
            return Err(CollectError::Config(
                "cannot filter records from/to and records for a period at the same time".into(),
            ));
        }

        if let Some(period) = period {
            let duration = humantime::parse_duration(period).map_err(|err| {
                CollectError::Config(format!("wrong format of period {period:?}: {err}"))
            })?;
            let duration = chrono::Duration::from_std(duration).map_err(|err| {
                CollectError::Config(format!("period {period:?} out of range: {err}"))
            })?;

            let window = Self {
                from: now - duration,
                to: now,
            };
            debug!(from = %window.from, to = %window.to, period, "filter set by a period");
            return Ok(window);
        }

        let window = Self {
            from: from.unwrap_or(DateTime::<Utc>::MIN_UTC),
            to: to.unwrap_or(now),
        };
        debug!(from = %window.from, to = %window.to, "filter set by times from and to");
        Ok(window)
    }
}

/// Decides which resources fall into the configured window and forwards the
/// accepted ones.
pub struct Filter {
    window: TimeWindow,
}

impl Filter {
    pub fn new(window: TimeWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Whether a lifetime `[started, ended]` overlaps the window.
    ///
    /// An unset end time means the resource is still active, so only the
    /// start bound can exclude it. An unset start time means the API does
    /// not record a beginning, which never excludes the resource either.
    pub fn includes(
        &self,
        started: Option<DateTime<Utc>>,
        ended: Option<DateTime<Utc>>,
    ) -> bool {
        let starts_in_time = started.map_or(true, |s| s <= self.window.to);
        let still_relevant = ended.map_or(true, |e| e >= self.window.from);
        starts_in_time && still_relevant
    }

    /// Filter one resource, writing it to `filtered` on acceptance.
    ///
    /// An absent resource signals an upstream producer error; it is warned
    /// about and dropped, never treated as a filter failure. Returns whether
    /// the resource was forwarded.
    pub async fn filtering(
        &self,
        resource: Option<Resource>,
        filtered: &mpsc::Sender<Resource>,
    ) -> bool {
        let Some(resource) = resource else {
            warn!(error = "no resource", "cannot filter an absent resource");
            return false;
        };

        if !self.includes(resource.started_at(), resource.ended_at()) {
            return false;
        }

        if filtered.send(resource).await.is_err() {
            debug!("filtered channel closed, dropping resource");
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Server;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn window(from: i64, to: i64) -> TimeWindow {
        TimeWindow {
            from: at(from),
            to: at(to),
        }
    }

    fn server(started: Option<i64>, ended: Option<i64>) -> Resource {
        Resource::Server(Server {
            id: "srv-1".into(),
            name: None,
            status: None,
            created: started.map(at),
            terminated_at: ended.map(at),
            tenant_id: None,
        })
    }

    #[test]
    fn both_window_styles_at_once_is_a_config_error() {
        let err = TimeWindow::resolve(Some(at(100)), Some(at(200)), Some("30d"), at(1000))
            .unwrap_err();
        assert!(matches!(err, CollectError::Config(_)));
    }

    #[test]
    fn period_runs_back_from_now() {
        let now = at(1_000_000);
        let window = TimeWindow::resolve(None, None, Some("1h"), now).unwrap();
        assert_eq!(window.to, now);
        assert_eq!(window.from, now - chrono::Duration::hours(1));
    }

    #[test]
    fn unparseable_period_is_a_config_error() {
        let err = TimeWindow::resolve(None, None, Some("next tuesday"), at(0)).unwrap_err();
        assert!(matches!(err, CollectError::Config(_)));
    }

    #[test]
    fn missing_upper_bound_runs_up_to_now() {
        let now = at(5000);
        let window = TimeWindow::resolve(Some(at(100)), None, None, now).unwrap();
        assert_eq!(window.from, at(100));
        assert_eq!(window.to, now);
    }

    #[test]
    fn explicit_bounds_are_taken_verbatim() {
        let window = TimeWindow::resolve(Some(at(100)), Some(at(200)), None, at(5000)).unwrap();
        assert_eq!(window, TimeWindow { from: at(100), to: at(200) });
    }

    #[test]
    fn lifetime_overlapping_the_window_is_included() {
        let filter = Filter::new(window(100, 200));
        assert!(filter.includes(Some(at(50)), Some(at(150))));
        assert!(filter.includes(Some(at(150)), Some(at(250))));
        assert!(filter.includes(Some(at(50)), Some(at(250))));
    }

    #[test]
    fn lifetime_outside_the_window_is_excluded() {
        let filter = Filter::new(window(100, 200));
        // ended before the window opened
        assert!(!filter.includes(Some(at(10)), Some(at(50))));
        // started after the window closed
        assert!(!filter.includes(Some(at(300)), None));
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        let filter = Filter::new(window(100, 200));
        assert!(filter.includes(Some(at(200)), None));
        assert!(filter.includes(Some(at(50)), Some(at(100))));
    }

    /// The documented interpretation of a missing end time: the resource is
    /// still active, its lifetime has no upper bound yet, and only the start
    /// bound may exclude it.
    #[test]
    fn unset_end_means_still_active_and_is_included() {
        let filter = Filter::new(window(100, 200));
        assert!(filter.includes(Some(at(50)), None));
    }

    #[tokio::test]
    async fn accepted_resources_are_written_to_the_output_stream() {
        let filter = Filter::new(window(100, 200));
        let (tx, mut rx) = mpsc::channel(4);

        assert!(filter.filtering(Some(server(Some(150), None)), &tx).await);
        drop(tx);

        assert_eq!(rx.recv().await.unwrap().id(), "srv-1");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn rejected_resources_are_silently_dropped() {
        let filter = Filter::new(window(100, 200));
        let (tx, mut rx) = mpsc::channel(4);

        assert!(!filter.filtering(Some(server(Some(900), None)), &tx).await);
        drop(tx);

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn absent_resource_is_warned_about_not_crashed_on() {
        let filter = Filter::new(window(100, 200));
        let (tx, mut rx) = mpsc::channel(4);

        assert!(!filter.filtering(None, &tx).await);
        drop(tx);

        assert!(rx.recv().await.is_none());
    }
}

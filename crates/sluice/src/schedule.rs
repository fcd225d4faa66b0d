//! Daily trigger for `sluice schedule`.

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Fires once a day at a fixed local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl DailySchedule {
    pub fn new(at: NaiveTime) -> Self {
        Self { at }
    }

    pub fn at(&self) -> NaiveTime {
        self.at
    }

    /// The first slot strictly after `now`: today's if it is still ahead,
    /// otherwise tomorrow's.
    ///
    /// A slot that falls in a DST gap is skipped; one that is ambiguous
    /// resolves to its earlier instant.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let mut date = now.date_naive();

        loop {
            if let Some(slot) = tz.from_local_datetime(&date.and_time(self.at)).earliest()
                && slot > *now
            {
                return slot;
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => return now.clone(),
            }
        }
    }

    /// Call `job` at every slot until `shutdown` is cancelled.
    ///
    /// Cancellation is observed only while waiting; a job that has started
    /// runs to completion.
    pub async fn run<F, Fut>(&self, shutdown: CancellationToken, mut job: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            let now = Local::now();
            let next = self.next_after(&now);
            let wait = (next - now).to_std().unwrap_or_default();

            info!(next_run = %next, wait_secs = wait.as_secs(), "Waiting for next scheduled run");

            if shutdown
                .run_until_cancelled(tokio::time::sleep(wait))
                .await
                .is_none()
            {
                info!("Shutdown requested, stopping scheduler");
                return;
            }

            job().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn nine_pm() -> DailySchedule {
        DailySchedule::new(NaiveTime::from_hms_opt(21, 0, 0).unwrap())
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_slot_later_today() {
        let next = nine_pm().next_after(&utc("2024-03-05T08:30:00Z"));
        assert_eq!(next, utc("2024-03-05T21:00:00Z"));
    }

    #[test]
    fn test_slot_already_passed() {
        let next = nine_pm().next_after(&utc("2024-03-05T22:15:00Z"));
        assert_eq!(next, utc("2024-03-06T21:00:00Z"));
    }

    #[test]
    fn test_exactly_at_slot_waits_a_day() {
        let next = nine_pm().next_after(&utc("2024-03-05T21:00:00Z"));
        assert_eq!(next, utc("2024-03-06T21:00:00Z"));
    }

    #[test]
    fn test_month_and_year_rollover() {
        let next = nine_pm().next_after(&utc("2023-12-31T23:59:00Z"));
        assert_eq!(next, utc("2024-01-01T21:00:00Z"));
    }

    #[test]
    fn test_slot_uses_local_offset() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 3, 5, 20, 0, 0).unwrap();
        let next = nine_pm().next_after(&now);
        assert_eq!(next, tz.with_ymd_and_hms(2024, 3, 5, 21, 0, 0).unwrap());
        assert_eq!(next.with_timezone(&Utc), utc("2024-03-05T13:00:00Z"));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let shutdown = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            nine_pm().run(shutdown, move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

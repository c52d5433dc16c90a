//! Daily trigger for the scheduled sync ("at 04:00 every day").
use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl DailySchedule {
    pub fn new(at: NaiveTime) -> Self {
        Self { at }
    }

    /// Parse `HH:MM` (24h).
    pub fn parse(value: &str) -> Result<Self, chrono::ParseError> {
        NaiveTime::parse_from_str(value.trim(), "%H:%M").map(Self::new)
    }

    pub fn at(&self) -> NaiveTime {
        self.at
    }

    /// First fire time strictly after `now`, in `now`'s time zone.
    ///
    /// A wall-clock time skipped by a DST jump fires an hour later; an
    /// ambiguous one fires at its earlier instant.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let mut date = now.date_naive();
        loop {
            let naive = date.and_time(self.at);
            let candidate = tz
                .from_local_datetime(&naive)
                .earliest()
                .or_else(|| {
                    tz.from_local_datetime(&(naive + chrono::Duration::hours(1)))
                        .earliest()
                });
            if let Some(candidate) = candidate {
                if candidate > *now {
                    return candidate;
                }
            }
            date = match date.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => return now.clone(),
            };
        }
    }

    pub fn until_next<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Duration {
        (self.next_after(now) - now.clone())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Run `job` at every fire time in local time until ctrl-c.
    pub async fn run_forever<F, Fut>(&self, mut job: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            let now = Local::now();
            let next = self.next_after(&now);
            let wait = self.until_next(&now);
            info!(next_run = %next, wait_secs = wait.as_secs(), "waiting for next scheduled sync");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    job().await;
                }
                res = tokio::signal::ctrl_c() => {
                    if let Err(err) = res {
                        warn!(?err, "failed to listen for shutdown signal");
                    }
                    info!("shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }
    }
}

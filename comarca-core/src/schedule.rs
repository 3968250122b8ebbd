use std::{str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    error::{Result, ScrapeError},
    model::{ScrapeOptions, ScrapeType},
    orchestrator::Orchestrator,
};

/// Standard 5-field cron layout: minute hour day-of-month month day-of-week.
/// The `cron` crate itself parses a 6/7-field form with seconds, so a zero
/// seconds field is prepended after validation.
const CRON_FIELDS: usize = 5;

/// Rewrites a 5-field Unix expression into the `cron` crate's form.
///
/// Besides the prepended seconds field, numeric day-of-week ordinals are
/// shifted: Unix uses 0/7 = Sunday and 1 = Monday, the crate uses the
/// Quartz convention 1 = Sunday through 7 = Saturday. Named days pass
/// through unchanged.
fn to_crate_expr(expr: &str) -> Result<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != CRON_FIELDS {
        return Err(ScrapeError::InvalidCronSyntax(format!(
            "expected {CRON_FIELDS} fields, found {}",
            fields.len()
        )));
    }
    let dow = translate_dow(fields[4]);
    Ok(format!(
        "0 {} {} {} {} {dow}",
        fields[0], fields[1], fields[2], fields[3]
    ))
}

fn translate_dow(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let (base, step) = match part.split_once('/') {
                Some((base, step)) => (base, Some(step)),
                None => (part, None),
            };
            let shifted = base
                .split('-')
                .map(|token| match token.parse::<u8>() {
                    Ok(n) if n <= 7 => ((n % 7) + 1).to_string(),
                    _ => token.to_string(),
                })
                .collect::<Vec<_>>()
                .join("-");
            match step {
                Some(step) => format!("{shifted}/{step}"),
                None => shifted,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Checks field count and grammar of a 5-field cron expression.
pub fn validate(expr: &str) -> Result<()> {
    let rewritten = to_crate_expr(expr)?;
    Schedule::from_str(&rewritten)
        .map(|_| ())
        .map_err(|err| ScrapeError::InvalidCronSyntax(err.to_string()))
}

/// Next matching instant of `expr` evaluated in `timezone`, normalized to
/// UTC. Fails with InvalidCronSyntax before touching the timezone when the
/// expression itself is malformed.
pub fn next_run_time(expr: &str, timezone: &str) -> Result<DateTime<Utc>> {
    next_run_after(expr, timezone, Utc::now())
}

fn next_run_after(
    expr: &str,
    timezone: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let rewritten = to_crate_expr(expr)?;
    let schedule = Schedule::from_str(&rewritten)
        .map_err(|err| ScrapeError::InvalidCronSyntax(err.to_string()))?;
    let tz: Tz = timezone.parse().map_err(|_| {
        ScrapeError::validation(format!("unknown timezone: {timezone}"))
    })?;

    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| {
            ScrapeError::validation(format!("cron expression never fires: {expr}"))
        })
}

/// One recurring scrape definition.
#[derive(Clone, Debug)]
pub struct RecurringJob {
    pub name: String,
    pub cron_expr: String,
    pub timezone: String,
    pub scrape_type: ScrapeType,
    pub targets: Vec<String>,
    pub enabled: bool,
}

struct ScheduledEntry {
    definition: RecurringJob,
    next_run: Mutex<DateTime<Utc>>,
}

/// Periodically fires recurring definitions through the orchestrator.
///
/// After each fire (and after downtime) the next run is recomputed freshly
/// from now, so missed instants collapse into at most one trigger instead
/// of a backlog.
pub struct CronScheduler {
    orchestrator: Arc<Orchestrator>,
    entries: Vec<ScheduledEntry>,
    tick_interval: Duration,
    runtime: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler")
            .field("definitions", &self.entries.len())
            .field("tick_interval", &self.tick_interval)
            .finish_non_exhaustive()
    }
}

impl CronScheduler {
    /// Validates every definition up front; a single bad expression fails
    /// construction rather than silently never firing.
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        definitions: Vec<RecurringJob>,
        tick_interval: Duration,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let next =
                next_run_time(&definition.cron_expr, &definition.timezone)?;
            entries.push(ScheduledEntry {
                definition,
                next_run: Mutex::new(next),
            });
        }
        Ok(Self {
            orchestrator,
            entries,
            tick_interval,
            runtime: Mutex::new(None),
        })
    }

    /// Spawns the tick loop. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(self).tick_loop(cancel.child_token()));
        *runtime = Some((cancel, handle));
        info!(definitions = self.entries.len(), "cron scheduler started");
    }

    /// Stops ticking; an in-flight trigger finishes. Idempotent.
    pub async fn stop(&self) {
        let taken = self.runtime.lock().take();
        if let Some((cancel, handle)) = taken {
            cancel.cancel();
            let _ = handle.await;
            info!("cron scheduler stopped");
        }
    }

    async fn tick_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut tick = interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => self.fire_due(Utc::now()).await,
            }
        }
    }

    async fn fire_due(&self, now: DateTime<Utc>) {
        for entry in &self.entries {
            if !entry.definition.enabled {
                continue;
            }
            let due = *entry.next_run.lock() <= now;
            if !due {
                continue;
            }

            let definition = &entry.definition;
            match self
                .orchestrator
                .create_job(
                    definition.scrape_type,
                    &definition.targets,
                    ScrapeOptions::default(),
                )
                .await
            {
                Ok(job) => {
                    info!(schedule = %definition.name, job = %job.id, "recurring scrape triggered");
                }
                Err(err) => {
                    warn!(schedule = %definition.name, error = %err, "recurring scrape failed to trigger");
                }
            }

            // Recompute from now, never from the missed instant.
            match next_run_after(&definition.cron_expr, &definition.timezone, now)
            {
                Ok(next) => *entry.next_run.lock() = next,
                Err(err) => {
                    warn!(schedule = %definition.name, error = %err, "failed to recompute next run");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    #[test]
    fn validate_accepts_five_field_expressions() {
        validate("*/5 * * * *").unwrap();
        validate("0 9 * * 1").unwrap();
    }

    #[test]
    fn validate_rejects_wrong_field_count() {
        let err = validate("* * * *").unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidCronSyntax(_)));
        assert!(validate("* * * * * *").is_err());
    }

    #[test]
    fn validate_rejects_bad_grammar() {
        assert!(matches!(
            validate("61 * * * *"),
            Err(ScrapeError::InvalidCronSyntax(_))
        ));
        assert!(validate("* * * * mondayish").is_err());
    }

    #[test]
    fn next_run_is_monday_nine_in_sao_paulo() {
        // Fixed reference instant: 2024-06-05 15:00 UTC, a Wednesday.
        let after = Utc.with_ymd_and_hms(2024, 6, 5, 15, 0, 0).unwrap();
        let next = next_run_after("0 9 * * 1", "America/Sao_Paulo", after).unwrap();

        let tz: Tz = "America/Sao_Paulo".parse().unwrap();
        let local = next.with_timezone(&tz);
        assert_eq!(local.weekday(), Weekday::Mon);
        assert_eq!(local.hour(), 9);
        assert_eq!(local.minute(), 0);
        // São Paulo sits at UTC-3 (no DST since 2019): 09:00 local is 12:00 UTC.
        assert_eq!(next.hour(), 12);
        assert!(next > after);
    }

    #[test]
    fn unix_day_of_week_ordinals_are_translated() {
        assert_eq!(translate_dow("1"), "2");
        assert_eq!(translate_dow("0"), "1");
        assert_eq!(translate_dow("7"), "1");
        assert_eq!(translate_dow("1-5"), "2-6");
        assert_eq!(translate_dow("1,3,5"), "2,4,6");
        assert_eq!(translate_dow("*/2"), "*/2");
        assert_eq!(translate_dow("MON-FRI"), "MON-FRI");
        assert_eq!(translate_dow("*"), "*");
    }

    #[test]
    fn sunday_accepts_both_zero_and_seven() {
        let after = Utc.with_ymd_and_hms(2024, 6, 5, 15, 0, 0).unwrap();
        let by_zero = next_run_after("0 8 * * 0", "UTC", after).unwrap();
        let by_seven = next_run_after("0 8 * * 7", "UTC", after).unwrap();
        assert_eq!(by_zero, by_seven);
        assert_eq!(by_zero.weekday(), Weekday::Sun);
    }

    #[test]
    fn next_run_rejects_unknown_timezone() {
        let err = next_run_time("0 9 * * 1", "America/Atlantis").unwrap_err();
        assert!(matches!(err, ScrapeError::Validation(_)));
    }

    #[test]
    fn invalid_expression_fails_before_timezone_handling() {
        let err = next_run_time("not a cron", "America/Atlantis").unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidCronSyntax(_)));
    }
}

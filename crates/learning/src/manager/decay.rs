use anyhow::Result;
use chrono::{DateTime, Utc};
use homunculus_config::DecayPolicy;
use tracing::{debug, info};

use super::{DecayReport, InstinctManager};
use crate::record::{DOMAIN_CODE_NAVIGATION, InstinctStatus};
use crate::repository::{InstinctFilter, InstinctRepository};

const STALE_AFTER_DAYS: i64 = 90;

/// Age brackets in days, oldest first.
const BRACKET_60: u32 = 60;
const BRACKET_30: u32 = 30;

impl<R: InstinctRepository> InstinctManager<R> {
    /// Lower the confidence of mappings that have gone unused, and retire the
    /// ones untouched for 90 days.  Only records that change are rewritten.
    ///
    /// Under [`DecayPolicy::Recompute`] a bracket delta is applied on every
    /// pass, so running the pass twice within a bracket decays twice.
    pub fn apply_decay(&self, now: DateTime<Utc>) -> Result<DecayReport> {
        let settings = &self.settings;
        let mut report = DecayReport::default();

        for mut record in self.repo.list(&InstinctFilter::domain(DOMAIN_CODE_NAVIGATION))? {
            if record.status == InstinctStatus::Stale {
                continue;
            }
            let Some(last_used) = record.last_used_at() else {
                debug!(id = %record.id, "no parsable last_used; decay skipped");
                continue;
            };
            let days_unused = (now - last_used).num_days();

            if days_unused >= STALE_AFTER_DAYS {
                record.status = InstinctStatus::Stale;
                self.repo.put(&record)?;
                report.marked_stale += 1;
                debug!(id = %record.id, days_unused, "instinct marked stale");
                continue;
            }

            let (bracket, delta) = match days_unused {
                60.. => (BRACKET_60, settings.confidence_decay.days_60_unused),
                30.. => (BRACKET_30, settings.confidence_decay.days_30_unused),
                _ => continue,
            };
            if settings.decay_policy == DecayPolicy::OncePerBracket
                && record.decayed_bracket.is_some_and(|applied| applied >= bracket)
            {
                continue;
            }

            let decayed = (record.confidence + delta).max(settings.confidence_floor);
            if decayed == record.confidence {
                continue;
            }
            debug!(
                id = %record.id,
                days_unused,
                from = record.confidence,
                to = decayed,
                "instinct confidence decayed"
            );
            record.confidence = decayed;
            if settings.decay_policy == DecayPolicy::OncePerBracket {
                record.decayed_bracket = Some(bracket);
            }
            self.repo.put(&record)?;
            report.decayed += 1;
        }

        info!(
            decayed = report.decayed,
            marked_stale = report.marked_stale,
            "decay pass complete"
        );
        Ok(report)
    }
}

use chrono::{DateTime, FixedOffset, Utc};
use glucmon_common::reference::short_hash;
use glucmon_common::types::{Dose, Intake, Visibility};
use glucmon_notify::utils::code_block;
use std::fmt::Write;

const LOG_TIME_FORMAT: &str = "%I:%M %p";

/// One line pair of the activity log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activity<'a> {
    Dose(&'a Dose),
    Intake(&'a Intake),
}

impl Activity<'_> {
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Self::Dose(d) => d.time,
            Self::Intake(i) => i.time,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Dose(d) => &d.id,
            Self::Intake(i) => &i.id,
        }
    }
}

/// The `limit` most recent entries of two time-ascending lists, newest first.
///
/// Walks both lists from the tail. On equal times the intake goes first.
pub fn merge_recent<'a>(doses: &'a [Dose], intakes: &'a [Intake], limit: usize) -> Vec<Activity<'a>> {
    let mut out = Vec::with_capacity(limit.min(doses.len() + intakes.len()));
    let mut i = doses.len();
    let mut j = intakes.len();

    while out.len() < limit && (i > 0 || j > 0) {
        let take_dose = i > 0 && (j == 0 || doses[i - 1].time > intakes[j - 1].time);
        if take_dose {
            out.push(Activity::Dose(&doses[i - 1]));
            i -= 1;
        } else {
            out.push(Activity::Intake(&intakes[j - 1]));
            j -= 1;
        }
    }
    out
}

/// Renders the fenced activity log, or an empty string when nothing is visible.
pub fn describe(
    doses: &[Dose],
    intakes: &[Intake],
    visibility: Visibility,
    limit: usize,
    tz: &FixedOffset,
) -> String {
    let doses: &[Dose] = if visibility.shows_doses() { doses } else { &[] };
    let intakes: &[Intake] = if visibility.shows_intakes() { intakes } else { &[] };

    let entries = merge_recent(doses, intakes, limit);
    if entries.is_empty() {
        return String::new();
    }

    let mut body = String::new();
    for entry in entries {
        let _ = writeln!(
            body,
            "{} :: ({}) {}",
            entry.time().with_timezone(tz).format(LOG_TIME_FORMAT),
            short_hash(entry.id()),
            entry.id()
        );
        let _ = match entry {
            Activity::Dose(d) => writeln!(body, "insulin {} {:.2}", d.category, d.amount),
            Activity::Intake(i) => writeln!(body, "carbs {:.2}", i.amount),
        };
    }
    code_block(&body)
}

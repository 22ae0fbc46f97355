//! Weekly and monthly summary reports.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveTime, Utc,
};
use glucmon_common::types::{Dose, DoseCategory, Intake, Reading};
use glucmon_notify::error::NotifyError;
use glucmon_notify::message::{Attachment, Embed, MessageData};
use glucmon_notify::surface::ChatSurface;
use glucmon_notify::utils::code_block;
use glucmon_storage::StorageError;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::str::FromStr;
use std::sync::Arc;

use crate::chart::{render_attachment, ChartRenderer};
use crate::ReportStore;

const DAY_FORMAT: &str = "%m/%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Week,
    Month,
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "w" | "week" => Ok(Self::Week),
            "m" | "month" => Ok(Self::Month),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Report: window out of range")]
    OutOfRange,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Surface(#[from] NotifyError),
}

/// `[start, end)` in the configured timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl ReportWindow {
    pub fn title(&self) -> String {
        format!(
            "{} to {}",
            self.start.format(DAY_FORMAT),
            self.end.format(DAY_FORMAT)
        )
    }
}

fn local_midnight(date: NaiveDate, tz: FixedOffset) -> DateTime<FixedOffset> {
    let utc = date.and_time(NaiveTime::MIN) - Duration::seconds(tz.local_minus_utc() as i64);
    DateTime::from_naive_utc_and_offset(utc, tz)
}

/// Monday-aligned week or calendar month containing `now`, moved back
/// `offset` periods.
pub fn report_window(
    now: DateTime<FixedOffset>,
    timeframe: Timeframe,
    offset: u32,
) -> Result<ReportWindow, ReportError> {
    let tz = *now.offset();
    let today = now.date_naive();
    let (start, end) = match timeframe {
        Timeframe::Week => {
            let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
            let start = monday
                .checked_sub_signed(Duration::weeks(offset as i64))
                .ok_or(ReportError::OutOfRange)?;
            (start, start + Duration::days(7))
        }
        Timeframe::Month => {
            let first = today.with_day(1).ok_or(ReportError::OutOfRange)?;
            let start = first
                .checked_sub_months(Months::new(offset))
                .ok_or(ReportError::OutOfRange)?;
            let end = start
                .checked_add_months(Months::new(1))
                .ok_or(ReportError::OutOfRange)?;
            (start, end)
        }
    };
    Ok(ReportWindow {
        start: local_midnight(start, tz),
        end: local_midnight(end, tz),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub average: f64,
    /// Population standard deviation.
    pub deviation: f64,
}

pub fn summarize(readings: &[Reading]) -> Summary {
    if readings.is_empty() {
        return Summary::default();
    }
    let n = readings.len() as f64;
    let average = readings.iter().map(|r| r.mmol).sum::<f64>() / n;
    let variance = readings
        .iter()
        .map(|r| (r.mmol - average).powi(2))
        .sum::<f64>()
        / n;
    Summary {
        average,
        deviation: variance.sqrt(),
    }
}

/// Fractions of readings below, inside and above the range. Bounds count as out of range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RangeAnalysis {
    pub below: f64,
    pub in_range: f64,
    pub above: f64,
}

pub fn time_in_range(readings: &[Reading], low: f64, high: f64) -> RangeAnalysis {
    if readings.is_empty() {
        return RangeAnalysis::default();
    }
    let below = readings.iter().filter(|r| r.mmol <= low).count() as f64;
    let above = readings.iter().filter(|r| r.mmol >= high).count() as f64;
    let total = readings.len() as f64;
    RangeAnalysis {
        below: below / total,
        in_range: (total - below - above) / total,
        above: above / total,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DailyTotals {
    pub rapid: f64,
    pub slow: f64,
    pub carbs: f64,
}

/// Per local day totals, only for days with at least one entry.
pub fn daily_totals(
    doses: &[Dose],
    intakes: &[Intake],
    tz: &FixedOffset,
) -> BTreeMap<NaiveDate, DailyTotals> {
    let mut days: BTreeMap<NaiveDate, DailyTotals> = BTreeMap::new();
    for dose in doses {
        let day = days.entry(dose.time.with_timezone(tz).date_naive()).or_default();
        match dose.category {
            DoseCategory::Rapid => day.rapid += dose.amount,
            DoseCategory::Slow => day.slow += dose.amount,
        }
    }
    for intake in intakes {
        days.entry(intake.time.with_timezone(tz).date_naive())
            .or_default()
            .carbs += intake.amount;
    }
    days
}

pub fn render_table(days: &BTreeMap<NaiveDate, DailyTotals>) -> String {
    let mut out = format!(
        "{:>5} {:>6} {:>6} {:>6}\n",
        "",
        DoseCategory::Rapid.as_str(),
        DoseCategory::Slow.as_str(),
        "carbs"
    );
    for (day, totals) in days {
        let _ = writeln!(
            out,
            "{} {:>6.0} {:>6.0} {:>6.0}",
            day.format(DAY_FORMAT),
            totals.rapid,
            totals.slow,
            totals.carbs
        );
    }
    out
}

pub fn report_message(
    window: &ReportWindow,
    summary: Summary,
    ranges: RangeAnalysis,
    table: &str,
    image: Option<Attachment>,
) -> MessageData {
    let mut embed = Embed::titled(window.title())
        .with_description(code_block(table))
        .with_field("Average", format!("{:.2}", summary.average), true)
        .with_field("Deviation", format!("{:.2}", summary.deviation), true)
        .with_field("Below Range", format!("{:.2}", ranges.below), true)
        .with_field("In Range", format!("{:.2}", ranges.in_range), true)
        .with_field("Above Range", format!("{:.2}", ranges.above), true);

    let mut files = Vec::new();
    if let Some(image) = image {
        embed = embed.with_attachment_image(&image.name);
        files.push(image);
    }
    MessageData {
        content: String::new(),
        embeds: vec![embed],
        files,
        mention_everyone: false,
    }
}

pub struct ReportGenerator {
    store: Arc<dyn ReportStore>,
    surface: Arc<dyn ChatSurface>,
    chart: Option<Arc<dyn ChartRenderer>>,
    channel: String,
    tz: FixedOffset,
    low: f64,
    high: f64,
}

impl ReportGenerator {
    pub fn new(
        store: Arc<dyn ReportStore>,
        surface: Arc<dyn ChatSurface>,
        chart: Option<Arc<dyn ChartRenderer>>,
        channel: &str,
        tz: FixedOffset,
        low: f64,
        high: f64,
    ) -> Self {
        Self {
            store,
            surface,
            chart,
            channel: channel.to_string(),
            tz,
            low,
            high,
        }
    }

    /// Builds the report and posts it to the reports channel. Returns the window.
    pub async fn generate(
        &self,
        timeframe: Timeframe,
        offset: u32,
    ) -> Result<ReportWindow, ReportError> {
        let window = report_window(Utc::now().with_timezone(&self.tz), timeframe, offset)?;
        let start = window.start.with_timezone(&Utc);
        let end = window.end.with_timezone(&Utc);

        let image = match &self.chart {
            Some(chart) => render_attachment(&*self.store, || chart.plot_weekly(start, end)).await,
            None => None,
        };

        // 存储查询是闭区间，结束时刻属于下一个周期
        let last = end - Duration::milliseconds(1);
        let readings = self.store.readings_between(start, last).await?;
        let doses = self.store.doses_between(start, last).await?;
        let intakes = self.store.intakes_between(start, last).await?;

        let table = render_table(&daily_totals(&doses, &intakes, &self.tz));
        let message = report_message(
            &window,
            summarize(&readings),
            time_in_range(&readings, self.low, self.high),
            &table,
            image,
        );
        let message_id = self.surface.send_message(&self.channel, &message).await?;
        tracing::info!(
            message_id = %message_id,
            title = %window.title(),
            readings = readings.len(),
            "Report posted"
        );
        Ok(window)
    }
}

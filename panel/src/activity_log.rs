//! In-memory activity log backing the log endpoints
//!
//! [`ActivityLogLayer`] is installed next to the fmt subscriber and copies every
//! event the panel emits into a bounded ring buffer. The log endpoints read
//! from that buffer.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use firefly_core::{PanelError, PanelResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Default number of retained entries
pub const DEFAULT_CAPACITY: usize = 1000;

/// Entries per page of [`ActivityLog::query`]
pub const PAGE_SIZE: usize = 10;

/// Entry kind as the frontend names it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Error,
    Warning,
    Info,
    Debug,
}

impl LogKind {
    fn from_level(level: &Level) -> Self {
        match *level {
            Level::ERROR => LogKind::Error,
            Level::WARN => LogKind::Warning,
            Level::INFO => LogKind::Info,
            _ => LogKind::Debug,
        }
    }
}

impl FromStr for LogKind {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(LogKind::Error),
            "warning" => Ok(LogKind::Warning),
            "info" => Ok(LogKind::Info),
            "debug" => Ok(LogKind::Debug),
            other => Err(PanelError::Validation(format!("Unknown log type: {}", other))),
        }
    }
}

/// One recorded event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Unix seconds
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub source: String,
    pub message: String,
    #[serde(skip)]
    pub recorded_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(
        recorded_at: DateTime<Utc>,
        kind: LogKind,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: recorded_at.timestamp_millis() as f64 / 1000.0,
            kind,
            source: source.into(),
            message: message.into(),
            recorded_at,
        }
    }
}

/// Filters accepted by `/api/logs`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogQuery {
    pub page: usize,
    #[serde(rename = "type")]
    pub kind: String,
    pub date_range: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            page: 1,
            kind: "all".to_string(),
            date_range: "today".to_string(),
            start_date: None,
            end_date: None,
            search: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub logs: Vec<LogEntry>,
    pub pagination: Pagination,
}

/// Bounded ring buffer of log entries, cheap to clone and share
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Tracing layer feeding this log
    pub fn layer(&self) -> ActivityLogLayer {
        ActivityLogLayer { log: self.clone() }
    }

    /// Appends an entry, dropping the oldest one when full
    pub fn push(&self, entry: LogEntry) {
        // A poisoned buffer only loses log lines
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The newest `count` entries, oldest first
    pub fn recent(&self, count: usize) -> Vec<LogEntry> {
        let entries = self.snapshot();
        let skip = entries.len().saturating_sub(count);
        entries.into_iter().skip(skip).collect()
    }

    /// Filters, sorts newest first and paginates. `now` anchors the relative date ranges.
    pub fn query(&self, query: &LogQuery, now: DateTime<Utc>) -> PanelResult<LogPage> {
        let kind = match query.kind.as_str() {
            "" | "all" => None,
            other => Some(other.parse::<LogKind>()?),
        };
        let range = DateRange::resolve(query, now)?;
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut matching: Vec<LogEntry> = self
            .snapshot()
            .into_iter()
            .filter(|entry| kind.map_or(true, |kind| entry.kind == kind))
            .filter(|entry| range.contains(entry.recorded_at))
            .filter(|entry| {
                needle
                    .as_ref()
                    .map_or(true, |needle| entry.message.to_lowercase().contains(needle))
            })
            .collect();
        matching.reverse();

        let total_items = matching.len();
        let total_pages = total_items.div_ceil(PAGE_SIZE).max(1);
        let current_page = query.page.max(1);
        let logs = matching
            .into_iter()
            .skip(current_page.saturating_sub(1).saturating_mul(PAGE_SIZE))
            .take(PAGE_SIZE)
            .collect();

        Ok(LogPage {
            logs,
            pagination: Pagination {
                current_page,
                total_pages,
                total_items,
            },
        })
    }
}

/// Inclusive lower bound and exclusive upper bound, both optional
#[derive(Debug, Clone, Copy)]
struct DateRange {
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

impl DateRange {
    fn resolve(query: &LogQuery, now: DateTime<Utc>) -> PanelResult<Self> {
        let today = now.date_naive();
        let range = match query.date_range.as_str() {
            "" | "all" => DateRange { from: None, until: None },
            "today" => DateRange::days(today, today),
            "yesterday" => {
                let yesterday = today - Duration::days(1);
                DateRange::days(yesterday, yesterday)
            }
            "week" => DateRange { from: Some(now - Duration::days(7)), until: None },
            "month" => DateRange { from: Some(now - Duration::days(30)), until: None },
            "custom" => {
                let start = query.start_date.as_deref().map(parse_date).transpose()?;
                let end = query.end_date.as_deref().map(parse_date).transpose()?;
                DateRange {
                    from: start.map(start_of_day),
                    until: end.map(|end| start_of_day(end + Duration::days(1))),
                }
            }
            other => {
                return Err(PanelError::Validation(format!("Unknown date range: {}", other)))
            }
        };
        Ok(range)
    }

    fn days(first: NaiveDate, last: NaiveDate) -> Self {
        DateRange {
            from: Some(start_of_day(first)),
            until: Some(start_of_day(last + Duration::days(1))),
        }
    }

    fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.until.map_or(true, |until| at < until)
    }
}

fn parse_date(value: &str) -> PanelResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| PanelError::Validation(format!("Invalid date {:?}: {}", value, e)))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Tracing layer that records every event into an [`ActivityLog`]
pub struct ActivityLogLayer {
    log: ActivityLog,
}

impl<S> Layer<S> for ActivityLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let source = metadata
            .target()
            .rsplit("::")
            .next()
            .unwrap_or_default()
            .to_string();

        self.log.push(LogEntry::new(
            Utc::now(),
            LogKind::from_level(metadata.level()),
            source,
            visitor.finish(),
        ));
    }
}

/// Renders the `message` field followed by the remaining fields as `key=value`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }

    fn push_field(&mut self, name: &str, value: &dyn std::fmt::Display) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.push_field(field.name(), &format_args!("{:?}", value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tracing_subscriber::layer::SubscriberExt;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn entry(day: u32, hour: u32, kind: LogKind, message: &str) -> LogEntry {
        LogEntry::new(at(day, hour), kind, "test", message)
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let log = ActivityLog::new(3);
        for i in 0..5 {
            log.push(entry(10, i, LogKind::Info, &format!("m{}", i)));
        }

        let messages: Vec<String> = log.recent(10).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["m2", "m3", "m4"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_recent_is_chronological_tail() {
        let log = ActivityLog::new(10);
        for i in 0..8 {
            log.push(entry(10, i, LogKind::Info, &format!("m{}", i)));
        }

        let messages: Vec<String> = log.recent(3).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["m5", "m6", "m7"]);
    }

    #[test]
    fn test_query_filters_and_paginates() {
        let log = ActivityLog::new(100);
        for i in 0..12 {
            log.push(entry(10, i, LogKind::Info, &format!("Handled request {}", i)));
        }
        log.push(entry(10, 13, LogKind::Error, "Connection lost"));
        log.push(entry(9, 23, LogKind::Warning, "Unknown command"));

        let now = at(10, 20);

        let page = log.query(&LogQuery::default(), now).unwrap();
        assert_eq!(page.pagination.total_items, 13);
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.logs.len(), PAGE_SIZE);
        assert_eq!(page.logs[0].message, "Connection lost");

        let second = LogQuery { page: 2, ..LogQuery::default() };
        let page = log.query(&second, now).unwrap();
        assert_eq!(page.pagination.current_page, 2);
        assert_eq!(page.logs.len(), 3);
        assert_eq!(page.logs[2].message, "Handled request 0");

        let errors = LogQuery { kind: "error".to_string(), ..LogQuery::default() };
        let page = log.query(&errors, now).unwrap();
        assert_eq!(page.logs.len(), 1);
        assert_eq!(page.pagination.total_pages, 1);

        let yesterday = LogQuery { date_range: "yesterday".to_string(), ..LogQuery::default() };
        let page = log.query(&yesterday, now).unwrap();
        assert_eq!(page.logs.len(), 1);
        assert_eq!(page.logs[0].kind, LogKind::Warning);

        let search = LogQuery {
            date_range: "all".to_string(),
            search: Some("REQUEST 1".to_string()),
            ..LogQuery::default()
        };
        let page = log.query(&search, now).unwrap();
        let messages: Vec<&str> = page.logs.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["Handled request 11", "Handled request 10", "Handled request 1"]);
    }

    #[test]
    fn test_query_custom_range() {
        let log = ActivityLog::new(100);
        log.push(entry(1, 12, LogKind::Info, "first"));
        log.push(entry(5, 12, LogKind::Info, "fifth"));
        log.push(entry(9, 12, LogKind::Info, "ninth"));

        let query = LogQuery {
            date_range: "custom".to_string(),
            start_date: Some("2026-03-02".to_string()),
            end_date: Some("2026-03-09".to_string()),
            ..LogQuery::default()
        };
        let page = log.query(&query, at(20, 0)).unwrap();
        let messages: Vec<&str> = page.logs.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["ninth", "fifth"]);

        let bad = LogQuery { start_date: Some("03/02/2026".to_string()), ..query };
        assert!(matches!(log.query(&bad, at(20, 0)), Err(PanelError::Validation(_))));
    }

    #[test]
    fn test_query_rejects_unknown_filters() {
        let log = ActivityLog::default();
        let kind = LogQuery { kind: "fatal".to_string(), ..LogQuery::default() };
        assert!(matches!(log.query(&kind, Utc::now()), Err(PanelError::Validation(_))));

        let range = LogQuery { date_range: "decade".to_string(), ..LogQuery::default() };
        assert!(matches!(log.query(&range, Utc::now()), Err(PanelError::Validation(_))));
    }

    #[test]
    fn test_empty_log_has_one_page() {
        let page = ActivityLog::default().query(&LogQuery::default(), Utc::now()).unwrap();
        assert!(page.logs.is_empty());
        assert_eq!(
            page.pagination,
            Pagination { current_page: 1, total_pages: 1, total_items: 0 }
        );
    }

    #[test]
    fn test_query_page_past_the_end() {
        let log = ActivityLog::new(100);
        for i in 0..3 {
            log.push(entry(10, i, LogKind::Info, "tick"));
        }

        let query = LogQuery {
            page: usize::MAX,
            date_range: "all".to_string(),
            ..LogQuery::default()
        };
        let page = log.query(&query, at(10, 20)).unwrap();
        assert!(page.logs.is_empty());
        assert_eq!(page.pagination.current_page, usize::MAX);
        assert_eq!(page.pagination.total_items, 3);
    }

    #[test]
    fn test_layer_records_events() {
        let log = ActivityLog::new(10);
        let subscriber = tracing_subscriber::registry().with(log.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(path = "ui.background.speed", "Config updated");
            tracing::warn!("Rejected login");
            tracing::debug!(attempt = 2, "Retrying");
        });

        let entries = log.recent(10);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].kind, LogKind::Info);
        assert_eq!(entries[0].message, "Config updated path=ui.background.speed");
        assert_eq!(entries[0].source, "tests");
        assert_eq!(entries[1].kind, LogKind::Warning);
        assert_eq!(entries[1].message, "Rejected login");
        assert_eq!(entries[2].kind, LogKind::Debug);
        assert_eq!(entries[2].message, "Retrying attempt=2");
    }
}

//! User-facing progress log for a single generation request.
//!
//! Every entry is mirrored to `tracing` as it is recorded. Once the request is
//! done the log is rendered as a Markdown `## Log` section and appended to the
//! quickstart document.

use std::fmt::Write;

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub time: OffsetDateTime,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct GenerationLog {
    start: OffsetDateTime,
    end: Option<OffsetDateTime>,
    entries: Vec<LogEntry>,
}

impl GenerationLog {
    pub fn new() -> Self {
        Self::starting_at(OffsetDateTime::now_utc())
    }

    pub fn starting_at(start: OffsetDateTime) -> Self {
        Self {
            start,
            end: None,
            entries: Vec::new(),
        }
    }

    /// Record `text` with the current UTC time.
    pub fn log(&mut self, text: impl Into<String>) {
        self.log_at(text, OffsetDateTime::now_utc());
    }

    pub fn log_at(&mut self, text: impl Into<String>, time: OffsetDateTime) {
        let text = text.into();
        info!("{}", text);
        self.entries.push(LogEntry { time, text });
    }

    /// Mark the request as complete. Later calls keep the first end time.
    pub fn finish(&mut self) {
        self.finish_at(OffsetDateTime::now_utc());
    }

    pub fn finish_at(&mut self, end: OffsetDateTime) {
        if self.end.is_none() {
            self.end = Some(end);
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    /// Render as Markdown. An unfinished log is rendered as if it finished now.
    pub fn to_markdown(&self) -> String {
        let end = self.end.unwrap_or_else(OffsetDateTime::now_utc);
        let mut out = String::new();

        out.push_str("## Log\n");
        out.push_str("```\n");
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "[{} (UTC)]: {} +{}ms",
                timestamp(entry.time),
                entry.text,
                elapsed_ms(self.start, entry.time)
            );
        }
        let _ = writeln!(
            out,
            "[{} (UTC)]: Completed in total of {} ms",
            timestamp(end),
            elapsed_ms(self.start, end)
        );
        out.push_str("```\n");
        out
    }
}

impl Default for GenerationLog {
    fn default() -> Self {
        Self::new()
    }
}

fn timestamp(time: OffsetDateTime) -> String {
    time.format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| time.unix_timestamp().to_string())
}

fn elapsed_ms(start: OffsetDateTime, at: OffsetDateTime) -> i128 {
    (at - start).whole_milliseconds()
}

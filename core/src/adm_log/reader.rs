//! Memory-mapped scan of a single admin log file.
//!
//! The file is mapped read-only and walked line by line without loading it
//! into a string first. Server logs are Windows-1252 in practice, so each
//! line is decoded on its own; a stray byte garbles one line, not the file.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::{Local, NaiveDateTime, NaiveTime};
use encoding_rs::WINDOWS_1252;
use memchr::memchr_iter;
use memmap2::Mmap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::adm_log::{
    EventKind, LogParser, ParseOutcome, PatternRegistry, PlayerEvent, ReaderError,
    TimestampResolver, parse_session_header,
};
use crate::context::date_from_filename;

/// At most this many malformed lines are kept verbatim for the report.
const MALFORMED_SAMPLE_LIMIT: usize = 10;
/// Malformed samples are cut to this many characters.
const MALFORMED_SAMPLE_CHARS: usize = 100;
/// The session header, when present, sits at the very top of the file.
const HEADER_SCAN_LINES: usize = 25;
const HEADER_SCAN_BYTES: usize = 32 * 1024;

/// Parse counters for one file, mergeable across a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseSummary {
    pub total_lines: u64,
    pub parsed_events: u64,
    pub malformed_lines: u64,
    pub malformed_samples: Vec<String>,
    pub comment_lines: u64,
    pub filtered_events: u64,
    pub files_parsed: u64,
    pub files_failed: u64,
    pub connections: u64,
    pub disconnections: u64,
    pub deaths: u64,
    pub combat_events: u64,
    pub building_events: u64,
    pub emotes: u64,
    pub teleports: u64,
    pub kind_counts: BTreeMap<String, u64>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

impl ParseSummary {
    pub fn record_event(&mut self, event: &PlayerEvent) {
        self.parsed_events += 1;
        *self
            .kind_counts
            .entry(event.kind.name().to_string())
            .or_default() += 1;

        match event.kind {
            EventKind::Connection => self.connections += 1,
            EventKind::Disconnection => self.disconnections += 1,
            EventKind::Hit | EventKind::Kill => self.combat_events += 1,
            EventKind::Emote => self.emotes += 1,
            EventKind::Teleported => self.teleports += 1,
            _ => {}
        }
        if event.kind.is_death() {
            self.deaths += 1;
        }
        if event.kind.is_building() {
            self.building_events += 1;
        }

        self.start_time = Some(match self.start_time {
            Some(t) => t.min(event.timestamp),
            None => event.timestamp,
        });
        self.end_time = Some(match self.end_time {
            Some(t) => t.max(event.timestamp),
            None => event.timestamp,
        });
    }

    /// A line that matched a known shape but carries no event payload.
    pub fn record_recognized(&mut self, kind: EventKind) {
        *self.kind_counts.entry(kind.name().to_string()).or_default() += 1;
    }

    pub fn record_malformed(&mut self, line_number: u64, line: &str) {
        self.malformed_lines += 1;
        if self.malformed_samples.len() < MALFORMED_SAMPLE_LIMIT {
            let mut chars = line.chars();
            let mut sample: String = chars.by_ref().take(MALFORMED_SAMPLE_CHARS).collect();
            if chars.next().is_some() {
                sample.push_str("...");
            }
            self.malformed_samples.push(format!("Line {line_number}: {sample}"));
        }
    }

    /// Fold another file's counters into this one.
    pub fn merge(&mut self, other: ParseSummary) {
        self.total_lines += other.total_lines;
        self.parsed_events += other.parsed_events;
        self.malformed_lines += other.malformed_lines;
        self.comment_lines += other.comment_lines;
        self.filtered_events += other.filtered_events;
        self.files_parsed += other.files_parsed;
        self.files_failed += other.files_failed;
        self.connections += other.connections;
        self.disconnections += other.disconnections;
        self.deaths += other.deaths;
        self.combat_events += other.combat_events;
        self.building_events += other.building_events;
        self.emotes += other.emotes;
        self.teleports += other.teleports;
        for (kind, count) in other.kind_counts {
            *self.kind_counts.entry(kind).or_default() += count;
        }
        for sample in other.malformed_samples {
            if self.malformed_samples.len() >= MALFORMED_SAMPLE_LIMIT {
                break;
            }
            self.malformed_samples.push(sample);
        }
        self.start_time = merge_edge(self.start_time, other.start_time, NaiveDateTime::min);
        self.end_time = merge_edge(self.end_time, other.end_time, NaiveDateTime::max);
    }
}

fn merge_edge(
    a: Option<NaiveDateTime>,
    b: Option<NaiveDateTime>,
    pick: fn(NaiveDateTime, NaiveDateTime) -> NaiveDateTime,
) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, b) => a.or(b),
    }
}

/// Events and counters extracted from one file.
#[derive(Debug)]
pub struct FileParse {
    pub events: Vec<PlayerEvent>,
    pub summary: ParseSummary,
}

/// Scans one log file and returns its events in line order.
///
/// Events outside the `since`/`until` bounds are dropped and counted as
/// filtered rather than malformed. Only whole-file failures (open, stat,
/// map) return an error; bad lines are counted and kept as samples.
pub fn read_log_file(
    path: &Path,
    registry: &PatternRegistry,
    melee_ammo: &[String],
    since: Option<NaiveDateTime>,
    until: Option<NaiveDateTime>,
) -> Result<FileParse, ReaderError> {
    let file = File::open(path).map_err(|source| ReaderError::OpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    let len = file
        .metadata()
        .map_err(|source| ReaderError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    let mut summary = ParseSummary {
        files_parsed: 1,
        ..ParseSummary::default()
    };

    // Mapping a zero-length file fails, and there is nothing to scan anyway
    if len == 0 {
        debug!("skipping empty log file {}", path.display());
        return Ok(FileParse {
            events: Vec::new(),
            summary,
        });
    }

    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| ReaderError::MemoryMap {
        path: path.to_path_buf(),
        source,
    })?;

    let resolver = build_resolver(path, &mmap);
    let parser = LogParser::new(registry, resolver, melee_ammo);

    let mut events = Vec::new();
    for (idx, raw) in lines(&mmap).enumerate() {
        summary.total_lines += 1;
        let line_number = idx as u64 + 1;
        let (decoded, _, _) = WINDOWS_1252.decode(raw);
        let line = decoded.trim();

        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            summary.comment_lines += 1;
            continue;
        }

        match parser.parse_line(line_number, line) {
            ParseOutcome::Event(event) => {
                if since.is_some_and(|s| event.timestamp < s)
                    || until.is_some_and(|u| event.timestamp > u)
                {
                    summary.filtered_events += 1;
                } else {
                    summary.record_event(&event);
                    events.push(event);
                }
            }
            ParseOutcome::Recognized(kind) => summary.record_recognized(kind),
            ParseOutcome::NoMatch => {
                // The session header was already consumed by the prescan
                if parse_session_header(line).is_none() {
                    summary.record_malformed(line_number, line);
                }
            }
        }
    }

    debug!(
        "scanned {}: {} events, {} malformed of {} lines",
        path.display(),
        events.len(),
        summary.malformed_lines,
        summary.total_lines
    );

    Ok(FileParse { events, summary })
}

/// Derives the file's base date and nominal start time.
///
/// Order of preference: an `AdminLog started on ...` header within the first
/// few lines, then a date embedded in the filename paired with the first
/// line clock, then today at midnight as a last resort.
fn build_resolver(path: &Path, data: &[u8]) -> TimestampResolver {
    let head = &data[..data.len().min(HEADER_SCAN_BYTES)];
    let mut first_clock = None;
    for raw in lines(head).take(HEADER_SCAN_LINES) {
        let (decoded, _, _) = WINDOWS_1252.decode(raw);
        let line = decoded.trim();
        if let Some((date, time)) = parse_session_header(line) {
            return TimestampResolver::new(date, time);
        }
        if first_clock.is_none()
            && let Some(time) = leading_clock(line)
        {
            first_clock = Some(time);
        }
    }

    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let date = date_from_filename(name).unwrap_or_else(|| {
        warn!(
            "no session header or filename date in {}; assuming today",
            path.display()
        );
        Local::now().date_naive()
    });
    TimestampResolver::new(date, first_clock.unwrap_or(NaiveTime::MIN))
}

fn leading_clock(line: &str) -> Option<NaiveTime> {
    let b = line.as_bytes();
    if b.len() < 8 || b[2] != b':' || b[5] != b':' {
        return None;
    }
    line.get(..8)
        .and_then(|clock| NaiveTime::parse_from_str(clock, "%H:%M:%S").ok())
}

/// Yields line slices without the trailing newline. The final line is
/// yielded whether or not the file ends with one.
fn lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut last = 0;
    let mut newlines = memchr_iter(b'\n', data);
    std::iter::from_fn(move || {
        if last >= data.len() {
            return None;
        }
        match newlines.next() {
            Some(nl) => {
                let slice = &data[last..nl];
                last = nl + 1;
                Some(slice)
            }
            None => {
                let slice = &data[last..];
                last = data.len();
                Some(slice)
            }
        }
    })
}

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::app::{FetchResult, LoadResult, ProgressEvent, ProgressKind, ProgressSink};
use crate::domain::EntityRecord;

/// How phase results are rendered; independent of whether prompts are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// A record as printed by `lookup`, with the capitalized display name alongside.
#[derive(Serialize)]
struct EntryView<'a> {
    display_name: String,
    #[serde(flatten)]
    record: &'a EntityRecord,
}

impl<'a> EntryView<'a> {
    fn new(record: &'a EntityRecord) -> Self {
        Self {
            display_name: record.display_name(),
            record,
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_load(result: &LoadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_entry(record: &EntityRecord) -> io::Result<()> {
        Self::print_json(&EntryView::new(record))
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human progress on stderr; counter events overwrite themselves in place.
#[derive(Default)]
pub struct ConsoleProgress {
    mid_line: AtomicBool,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        let mut stderr = io::stderr().lock();
        if let ProgressKind::Counter { .. } = event.kind {
            let _ = write!(stderr, "\r{}...", event.message);
            let _ = stderr.flush();
            self.mid_line.store(true, Ordering::Relaxed);
            return;
        }
        if self.mid_line.swap(false, Ordering::Relaxed) {
            let _ = writeln!(stderr);
        }
        match event.elapsed {
            Some(elapsed) => {
                let _ = writeln!(stderr, "{} ({:.1}s)", event.message, elapsed.as_secs_f64());
            }
            None => {
                let _ = writeln!(stderr, "{}", event.message);
            }
        }
    }
}

pub fn print_fetch_summary(result: &FetchResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}Fetch summary{reset}");
    println!("{green}Fetched entries: {}/{}{reset}", result.succeeded, result.total);
    println!("{yellow}Failures: {}{reset}", result.failed);
    for failure in &result.failures {
        println!("{yellow}  {} ({}){reset}", failure.locator, failure.reason);
    }
    if result.snapshot_written {
        println!("{cyan}Snapshot: {}{reset}", result.snapshot_path);
    } else {
        println!("{yellow}Snapshot left unchanged: {}{reset}", result.snapshot_path);
    }
}

/// Warning for a fetch that left an older snapshot in place, shown before loading it.
pub fn stale_snapshot_notice(result: &FetchResult) -> Option<String> {
    if result.snapshot_written {
        return None;
    }
    Some(format!(
        "Warning: all {} entries failed; {} still holds the previous snapshot",
        result.failed, result.snapshot_path
    ))
}

pub fn print_load_summary(result: &LoadResult) {
    let green = "\x1b[32m";
    let reset = "\x1b[0m";
    println!(
        "{green}Loaded {} entries and {} evolution chains into {}{reset}",
        result.entities, result.evolution_chains, result.database_path
    );
}

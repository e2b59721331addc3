//! Offline replay of captured access logs through the resolver.
//!
//! Used to check a model map against real traffic before deploying it. Each
//! line's last two ` "`-separated fields are taken as the firmware version
//! and device ID, which is how the front proxy appends the MGOS headers:
//!
//! ```text
//! 1.2.3.4 - - [02/Jan/2024:15:04:05 +0000] "GET /update HTTP/1.1" 404 10 "1.9.2" "SHSW-25#ABC 1"
//! ```
//!
//! Nothing is served and no per-client history is written.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use crate::models::StockModelMap;

/// Outcome of a replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Non-blank lines examined.
    pub lines: usize,
    /// Lines that did not resolve to a model, including unparseable ones.
    pub unsupported: usize,
}

/// Replay every line of `path`.
pub fn replay_file(models: &StockModelMap, path: &Path) -> std::io::Result<ReplaySummary> {
    let reader = BufReader::new(File::open(path)?);
    let mut summary = ReplaySummary::default();
    for line in reader.lines() {
        replay_line(models, &line?, &mut summary);
    }
    info!("Lines         : {}", summary.lines);
    info!("Unsupported   : {}", summary.unsupported);
    Ok(summary)
}

/// Replay in-memory lines.
pub fn replay_lines<I, S>(models: &StockModelMap, lines: I) -> ReplaySummary
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut summary = ReplaySummary::default();
    for line in lines {
        replay_line(models, line.as_ref(), &mut summary);
    }
    summary
}

fn replay_line(models: &StockModelMap, line: &str, summary: &mut ReplaySummary) {
    if line.trim().is_empty() {
        return;
    }
    summary.lines += 1;

    let Some((fw_version, device_id)) = parse_line(line) else {
        warn!("malformed log line: {line}");
        summary.unsupported += 1;
        return;
    };
    if let Err(e) = models.resolve(fw_version, device_id) {
        warn!("{e}");
        summary.unsupported += 1;
    }
}

/// Extract `(fw_version, device_id)` from the last two quoted fields.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let mut fields = line.rsplit(" \"");
    let device_id = fields.next()?;
    let fw_version = fields.next()?;
    Some((fw_version.trim_matches('"'), device_id.trim_matches('"')))
}

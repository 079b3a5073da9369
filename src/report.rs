//! Human-readable ingest report.
//!
//! `report.txt` is what an archivist actually reads after a run: identity
//! header, the dedup accounting, duplicate groups worth reviewing, the
//! format breakdown, and the content date range. Derived data only; it is
//! recomputed wholesale on every pass.

use std::path::Path;

use anyhow::{Context as _, Result};
use chrono::Utc;
use polars::prelude::*;

use crate::dedup::{DedupStats, DuplicateGroup};
use crate::unit::IngestUnit;

/// Count identified formats from the identification tool's CSV output.
///
/// Returns `(format name, file count)` pairs, most common first. A missing
/// file yields an empty list (identification may have been skipped); a file
/// that cannot be parsed is an error the caller may soften.
pub fn format_counts(formats_csv: &Path) -> Result<Vec<(String, usize)>> {
    if !formats_csv.exists() {
        return Ok(Vec::new());
    }

    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(formats_csv.to_path_buf()))
        .with_context(|| format!("Failed to open format listing: {}", formats_csv.display()))?
        .finish()
        .with_context(|| format!("Failed to parse format listing: {}", formats_csv.display()))?;

    let formats = frame
        .column("format")
        .or_else(|_| frame.column("id"))
        .context("format listing has neither a 'format' nor an 'id' column")?
        .as_materialized_series()
        .str()
        .context("format column is not text")?;

    let mut counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    for value in formats {
        let name = match value {
            Some(text) if !text.trim().is_empty() => text.trim().to_owned(),
            _ => "unknown".to_owned(),
        };
        *counts.entry(name).or_default() += 1;
    }

    let mut pairs: Vec<(String, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    Ok(pairs)
}

/// Rendered date range for report and registry text.
pub fn date_range_text(stats: &DedupStats) -> String {
    match stats.date_range {
        Some((earliest, latest)) if earliest == latest => earliest.to_string(),
        Some((earliest, latest)) => format!("{earliest}-{latest}"),
        None => "undated".to_owned(),
    }
}

/// Render the full report text.
pub fn render(
    unit: &IngestUnit,
    stats: &DedupStats,
    groups: &[DuplicateGroup],
    formats: &[(String, usize)],
) -> Result<String> {
    let mut out = String::new();

    out.push_str("INGEST REPORT\n");
    out.push_str("=============\n");
    out.push_str(&format!("Barcode:    {}\n", unit.barcode));
    out.push_str(&format!("Job type:   {}\n", unit.job_type));
    out.push_str(&format!("Source:     {}\n", unit.source.display()));
    out.push_str(&format!(
        "Acquired:   {}\n",
        unit.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "Generated:  {}\n\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));

    out.push_str("ACCOUNTING\n");
    let accounting = accounting_frame(stats).context("Failed to build accounting table")?;
    out.push_str(&format!("{accounting}\n"));
    out.push_str(&format!("Date range: {}\n\n", date_range_text(stats)));

    out.push_str("DUPLICATE GROUPS\n");
    if groups.is_empty() {
        out.push_str("No duplicate content.\n\n");
    } else {
        for group in groups {
            out.push_str(&format!(
                "{} copies of {} ({} bytes each)\n",
                group.members.len(),
                group.sha256,
                group.size
            ));
            for member in &group.members {
                out.push_str(&format!("  - {}\n", member.display()));
            }
        }
        out.push('\n');
    }

    out.push_str("FORMATS\n");
    if formats.is_empty() {
        out.push_str("No format identification available.\n");
    } else {
        let frame = formats_frame(formats).context("Failed to build format table")?;
        out.push_str(&format!("{frame}\n"));
    }

    Ok(out)
}

fn accounting_frame(stats: &DedupStats) -> PolarsResult<DataFrame> {
    df!(
        "metric" => [
            "total files",
            "empty files",
            "distinct files",
            "duplicate copies",
            "distinct with duplicates",
            "total bytes",
            "duplicate bytes",
        ],
        "value" => [
            stats.total_files as i64,
            stats.empty_files as i64,
            stats.distinct_files as i64,
            stats.duplicate_copies as i64,
            stats.distinct_with_duplicates as i64,
            stats.total_bytes as i64,
            stats.duplicate_bytes as i64,
        ],
    )
}

fn formats_frame(formats: &[(String, usize)]) -> PolarsResult<DataFrame> {
    let names: Vec<&str> = formats.iter().map(|(name, _)| name.as_str()).collect();
    let counts: Vec<i64> = formats.iter().map(|&(_, count)| count as i64).collect();
    df!(
        "format" => names,
        "files" => counts,
    )
}

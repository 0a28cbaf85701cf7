//! Analyze command implementation.
//!
//! Parses the metrics report lines written by a stress run and summarises how
//! the trigger and the heap evolved.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid ANSI pattern"));

static REPORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"metrics report - trigger: (\d+), heap: (\d+)MB, objects: (\d+), cycles: (\d+), usage: ([\d.]+)%",
    )
    .expect("valid report pattern")
});

/// One parsed metrics report line.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub trigger: u32,
    pub heap_mb: u64,
    pub objects: u64,
    pub cycles: u64,
    /// Usage as a ratio, not a percentage.
    pub usage: f64,
}

/// Parses a single log line; `None` when it is not a report line.
pub fn parse_line(line: &str) -> Option<DataPoint> {
    let line = ANSI_ESCAPE.replace_all(line, "");
    let caps = REPORT_LINE.captures(&line)?;

    let timestamp = line
        .split_whitespace()
        .next()
        .and_then(|token| DateTime::parse_from_rfc3339(token).ok());

    Some(DataPoint {
        timestamp,
        trigger: caps[1].parse().ok()?,
        heap_mb: caps[2].parse().ok()?,
        objects: caps[3].parse().ok()?,
        cycles: caps[4].parse().ok()?,
        usage: caps[5].parse::<f64>().ok()? / 100.0,
    })
}

pub fn parse_log(content: &str) -> Vec<DataPoint> {
    content.lines().filter_map(parse_line).collect()
}

/// Width of one usage band in the trigger-by-usage table, in percent.
const USAGE_BAND_PERCENT: f64 = 10.0;
const USAGE_BANDS: usize = 10;

/// Average trigger observed while usage sat in one band.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageBand {
    /// Lower edge of the band in percent; the band covers `lower..lower + 10`.
    pub lower_percent: u32,
    pub average_trigger: f64,
    pub samples: usize,
}

/// Aggregates over a non-empty series of data points.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub points: usize,
    pub duration_secs: Option<i64>,
    pub min_trigger: u32,
    pub max_trigger: u32,
    pub average_trigger: f64,
    pub trigger_changes: usize,
    /// Mean time between consecutive trigger changes; needs two changes.
    pub average_change_interval_secs: Option<f64>,
    pub peak_usage: f64,
    pub average_usage: f64,
    pub peak_heap_mb: u64,
    pub average_heap_mb: u64,
    pub peak_objects: u64,
    pub collections: u64,
    /// Seconds per collection over the covered duration.
    pub seconds_per_collection: Option<f64>,
    /// Only bands with samples, lowest band first.
    pub usage_bands: Vec<UsageBand>,
    pub conclusions: Vec<String>,
}

fn usage_band_index(usage: f64) -> usize {
    let band = (usage * 100.0 / USAGE_BAND_PERCENT).floor();
    if band <= 0.0 {
        0
    } else {
        (band as usize).min(USAGE_BANDS - 1)
    }
}

fn usage_bands(points: &[DataPoint]) -> Vec<UsageBand> {
    let mut sums = [(0u64, 0usize); USAGE_BANDS];
    for point in points {
        let slot = &mut sums[usage_band_index(point.usage)];
        slot.0 += u64::from(point.trigger);
        slot.1 += 1;
    }

    sums.iter()
        .enumerate()
        .filter(|(_, (_, samples))| *samples > 0)
        .map(|(index, (sum, samples))| UsageBand {
            lower_percent: (index as f64 * USAGE_BAND_PERCENT) as u32,
            average_trigger: *sum as f64 / *samples as f64,
            samples: *samples,
        })
        .collect()
}

fn average_change_interval(points: &[DataPoint]) -> Option<f64> {
    let changes: Vec<_> = points
        .windows(2)
        .filter(|pair| pair[0].trigger != pair[1].trigger)
        .map(|pair| pair[1].timestamp)
        .collect::<Option<Vec<_>>>()?;
    if changes.len() < 2 {
        return None;
    }
    let first = changes.first()?;
    let last = changes.last()?;
    let total_ms = (*last - *first).num_milliseconds() as f64;
    Some(total_ms / 1000.0 / (changes.len() - 1) as f64)
}

fn conclusions(summary: &Summary) -> Vec<String> {
    let mut out = Vec::new();

    if summary.peak_usage > 0.9 {
        out.push(
            "Memory usage came close to the limit; lower safety_factor or raise the memory limit"
                .to_string(),
        );
    }

    if summary.trigger_changes < 5 {
        out.push(
            "Few trigger changes: memory usage was stable or the load varied little".to_string(),
        );
    } else {
        out.push(
            "Frequent trigger changes: the load varied noticeably and the tuner kept responding"
                .to_string(),
        );
    }

    if summary.max_trigger > 400 {
        out.push(
            "Maximum trigger is high and may lengthen single collections; consider a lower max_trigger"
                .to_string(),
        );
    }

    if summary.min_trigger < 50 && summary.peak_usage > 0.7 {
        out.push(
            "High usage drove the trigger low: the process is under memory pressure, review its allocation pattern"
                .to_string(),
        );
    }

    out
}

pub fn summarize(points: &[DataPoint]) -> Option<Summary> {
    let first = points.first()?;
    let last = points.last()?;
    let count = points.len();

    let duration = match (first.timestamp, last.timestamp) {
        (Some(start), Some(end)) => Some(end - start),
        _ => None,
    };

    let trigger_changes = points
        .windows(2)
        .filter(|pair| pair[0].trigger != pair[1].trigger)
        .count();

    let collections = last.cycles.saturating_sub(first.cycles);
    let seconds_per_collection = match duration {
        Some(duration) if collections > 0 => {
            Some(duration.num_milliseconds() as f64 / 1000.0 / collections as f64)
        }
        _ => None,
    };

    let mut summary = Summary {
        points: count,
        duration_secs: duration.map(|d| d.num_seconds()),
        min_trigger: points.iter().map(|p| p.trigger).min().unwrap_or(0),
        max_trigger: points.iter().map(|p| p.trigger).max().unwrap_or(0),
        average_trigger: points.iter().map(|p| f64::from(p.trigger)).sum::<f64>() / count as f64,
        trigger_changes,
        average_change_interval_secs: average_change_interval(points),
        peak_usage: points.iter().map(|p| p.usage).fold(0.0, f64::max),
        average_usage: points.iter().map(|p| p.usage).sum::<f64>() / count as f64,
        peak_heap_mb: points.iter().map(|p| p.heap_mb).max().unwrap_or(0),
        average_heap_mb: points.iter().map(|p| p.heap_mb).sum::<u64>() / count as u64,
        peak_objects: points.iter().map(|p| p.objects).max().unwrap_or(0),
        collections,
        seconds_per_collection,
        usage_bands: usage_bands(points),
        conclusions: Vec::new(),
    };
    summary.conclusions = conclusions(&summary);
    Some(summary)
}

fn or_unknown(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, unit),
        None => "n/a".to_string(),
    }
}

pub fn render_report(summary: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Heap Trigger Tuner - Stress Run Report");
    let _ = writeln!(out, "======================================");
    let _ = writeln!(out, "Data points:        {}", summary.points);
    match summary.duration_secs {
        Some(secs) => {
            let _ = writeln!(out, "Duration:           {}s", secs);
        }
        None => {
            let _ = writeln!(out, "Duration:           unknown (no timestamps)");
        }
    }

    let _ = writeln!(out, "\nTrigger");
    let _ = writeln!(out, "-------");
    let _ = writeln!(
        out,
        "Trigger range:      {} - {}",
        summary.min_trigger, summary.max_trigger
    );
    let _ = writeln!(out, "Average trigger:    {:.1}", summary.average_trigger);
    let _ = writeln!(out, "Trigger changes:    {}", summary.trigger_changes);
    let _ = writeln!(
        out,
        "Change interval:    {}",
        or_unknown(summary.average_change_interval_secs, "s")
    );

    let _ = writeln!(out, "\nMemory");
    let _ = writeln!(out, "------");
    let _ = writeln!(out, "Peak heap:          {}MB", summary.peak_heap_mb);
    let _ = writeln!(out, "Average heap:       {}MB", summary.average_heap_mb);
    let _ = writeln!(out, "Peak objects:       {}", summary.peak_objects);
    let _ = writeln!(out, "Peak usage:         {:.2}%", summary.peak_usage * 100.0);
    let _ = writeln!(
        out,
        "Average usage:      {:.2}%",
        summary.average_usage * 100.0
    );

    let _ = writeln!(out, "\nCollections");
    let _ = writeln!(out, "-----------");
    let _ = writeln!(out, "Collections:        {}", summary.collections);
    let _ = writeln!(
        out,
        "Frequency:          {}",
        match summary.seconds_per_collection {
            Some(secs) => format!("one every {:.1}s", secs),
            None => "n/a".to_string(),
        }
    );

    let _ = writeln!(out, "\nTrigger by usage");
    let _ = writeln!(out, "----------------");
    for band in &summary.usage_bands {
        let _ = writeln!(
            out,
            "- usage {}-{}%: average trigger={:.1} (samples={})",
            band.lower_percent,
            band.lower_percent + USAGE_BAND_PERCENT as u32,
            band.average_trigger,
            band.samples
        );
    }

    let _ = writeln!(out, "\nConclusions");
    let _ = writeln!(out, "-----------");
    for line in &summary.conclusions {
        let _ = writeln!(out, "- {}", line);
    }
    out
}

/// Parses `log` and writes the report to `output` ("-" for stdout).
pub fn command_analyze(log: &Path, output: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let content = fs::read_to_string(log)?;
    let points = parse_log(&content);
    let summary = summarize(&points)
        .ok_or_else(|| format!("No metrics report lines found in {}", log.display()))?;
    let report = render_report(&summary);

    if output.to_string_lossy() == "-" {
        print!("{}", report);
    } else {
        fs::write(output, &report)?;
        println!("✅ Report written to: {}", output.display());
        println!();
        print!("{}", report);
    }

    Ok(())
}

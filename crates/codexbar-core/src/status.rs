//! Waybar status payload rendering.
//!
//! Waybar runs the poller as a `custom` module with `"return-type": "json"`
//! and expects exactly one JSON object per run, so every usage result,
//! including failures, is turned into a [`StatusPayload`].

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::usage::{Provider, UsageError, UsageReport, UsageWindow};

/// Gauge icons for 0-19, 20-39, 40-59, 60-79 and 80-100 percent
pub const LEVEL_ICONS: [&str; 5] = [
    "\u{f0a9e}",
    "\u{f0aa0}",
    "\u{f0aa1}",
    "\u{f0aa3}",
    "\u{f0aa5}",
];
/// Shown when a provider could not be queried
pub const ICON_UNAVAILABLE: &str = "\u{f015a}";
/// Marks the 5-hour window in combined output
pub const ICON_FIVE_HOUR: &str = "\u{f1441}";
/// Marks the weekly window in combined output
pub const ICON_WEEKLY: &str = "\u{f00ed}";

/// CSS class Waybar adds to the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusClass {
    Ok,
    Warn,
    Critical,
    Unknown,
    Error,
}

/// Percent thresholds for `warn` and `critical`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warn: f64,
    pub critical: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn: 70.0,
            critical: 90.0,
        }
    }
}

impl Thresholds {
    /// Class for the highest observed percentage
    pub fn class_for(&self, percent: Option<f64>) -> StatusClass {
        match percent {
            None => StatusClass::Unknown,
            Some(p) if p >= self.critical => StatusClass::Critical,
            Some(p) if p >= self.warn => StatusClass::Warn,
            Some(_) => StatusClass::Ok,
        }
    }
}

/// One line of Waybar custom-module JSON
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPayload {
    pub text: String,
    pub tooltip: String,
    pub class: StatusClass,
    pub percentage: u8,
    pub alt: String,
    pub icon: String,
}

impl StatusPayload {
    /// Compact single-line JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"text":"--","tooltip":"serialization failed","class":"error","percentage":0,"alt":"error","icon":""}"#
                .to_string()
        })
    }
}

/// Icon for a percentage, clamped to 0-100
pub fn icon_for(percent: f64) -> &'static str {
    let clamped = percent.clamp(0.0, 100.0);
    let bucket = ((clamped / 20.0) as usize).min(LEVEL_ICONS.len() - 1);
    LEVEL_ICONS[bucket]
}

/// `42%`, or `--` when unknown
fn percent_text(percent: Option<f64>) -> String {
    match percent {
        Some(p) => format!("{}%", p as i64),
        None => "--".to_string(),
    }
}

fn percentage_field(percent: Option<f64>) -> u8 {
    percent.map(|p| p.clamp(0.0, 100.0) as u8).unwrap_or(0)
}

/// Local reset time, `%Y-%m-%d %H:%M`
pub fn format_reset(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        None => "unknown".to_string(),
    }
}

/// Time left until `at`, e.g. `3h 12m`
pub fn format_eta(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "unknown".to_string();
    };
    let total = (at - now).num_seconds();
    if total <= 0 {
        return "now".to_string();
    }
    format!("{}h {}m", total / 3600, (total % 3600) / 60)
}

fn window_reset(window: &UsageWindow, now: DateTime<Utc>) -> String {
    format!(
        "{} ({})",
        format_reset(window.resets_at),
        format_eta(window.resets_at, now)
    )
}

fn updated_line(now: DateTime<Utc>) -> String {
    format!(
        "Updated: {}",
        now.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    )
}

/// Payload for a single provider
pub fn render_single(
    provider: Provider,
    result: &Result<UsageReport, UsageError>,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> StatusPayload {
    let report = match result {
        Ok(report) => report,
        Err(err) => return error_payload(provider, err),
    };

    let top = report.top_percent();
    let icon = top.map(icon_for).unwrap_or(LEVEL_ICONS[0]);
    let session = percent_text(report.session.percent);
    let weekly = percent_text(report.weekly.percent);

    let tooltip = [
        format!("{} usage", provider),
        format!("5h used: {}", session),
        format!("5h reset: {}", window_reset(&report.session, now)),
        format!("Weekly used: {}", weekly),
        format!("Weekly reset: {}", window_reset(&report.weekly, now)),
        updated_line(now),
    ]
    .join("\n");

    StatusPayload {
        text: format!("{} 5h {} · W {}", icon, session, weekly),
        tooltip,
        class: thresholds.class_for(top),
        percentage: percentage_field(top),
        alt: provider.slug().to_string(),
        icon: icon.to_string(),
    }
}

/// Degraded payload for a provider that failed
pub fn error_payload(provider: Provider, err: &UsageError) -> StatusPayload {
    StatusPayload {
        text: format!("{} {} --", ICON_UNAVAILABLE, provider),
        tooltip: format!("{} error: {}", provider, err),
        class: StatusClass::Error,
        percentage: 0,
        alt: provider.slug().to_string(),
        icon: ICON_UNAVAILABLE.to_string(),
    }
}

/// Payload summarizing several providers side by side
pub fn render_combined(
    results: &[(Provider, Result<UsageReport, UsageError>)],
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> StatusPayload {
    let mut parts = Vec::with_capacity(results.len());
    let mut tooltip = vec!["AI Limits".to_string()];
    let mut top: Option<f64> = None;

    for (provider, result) in results {
        tooltip.push(String::new());
        match result {
            Ok(report) => {
                if let Some(p) = report.top_percent() {
                    top = Some(top.map_or(p, |t| t.max(p)));
                }
                let session = percent_text(report.session.percent);
                let weekly = percent_text(report.weekly.percent);
                parts.push(format!(
                    "{} {} {} {} {}",
                    provider, ICON_FIVE_HOUR, session, ICON_WEEKLY, weekly
                ));
                tooltip.push(format!(
                    "{} 5h: {} (resets {})",
                    provider,
                    session,
                    window_reset(&report.session, now)
                ));
                tooltip.push(format!(
                    "{} weekly: {} (resets {})",
                    provider,
                    weekly,
                    window_reset(&report.weekly, now)
                ));
            }
            Err(err) => {
                parts.push(format!("{} {}", provider, ICON_UNAVAILABLE));
                tooltip.push(format!("{} not available ({})", provider, err));
            }
        }
    }

    tooltip.push(String::new());
    tooltip.push(updated_line(now));

    let all_failed = !results.is_empty() && results.iter().all(|(_, r)| r.is_err());
    let (class, icon) = if all_failed {
        (StatusClass::Error, ICON_UNAVAILABLE)
    } else {
        (
            thresholds.class_for(top),
            top.map(icon_for).unwrap_or(LEVEL_ICONS[0]),
        )
    };

    StatusPayload {
        text: parts.join("  |  "),
        tooltip: tooltip.join("\n"),
        class,
        percentage: percentage_field(top),
        alt: "ai-limits".to_string(),
        icon: icon.to_string(),
    }
}

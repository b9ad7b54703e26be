use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use muxlink_core::StatsSnapshot;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Interrupted,
    TransportLost,
    ListenerFailed,
}

#[derive(Serialize)]
struct SessionSummary<'a> {
    role: &'a str,
    reason: EndReason,
    #[serde(flatten)]
    stats: &'a StatsSnapshot,
}

/// Print the end-of-session counters.
pub fn print_summary(role: &str, reason: EndReason, stats: &StatsSnapshot, format: OutputFormat) {
    let summary = SessionSummary {
        role,
        reason,
        stats,
    };
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&summary).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COUNTER", "VALUE"]);
            for (name, value) in rows(&summary) {
                table.add_row(vec![name.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = rows(&summary)
                .into_iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
    }
}

fn rows(summary: &SessionSummary<'_>) -> Vec<(&'static str, String)> {
    let stats = summary.stats;
    vec![
        ("role", summary.role.to_string()),
        ("reason", reason_name(summary.reason).to_string()),
        ("frames_in", stats.frames_in.to_string()),
        ("frames_out", stats.frames_out.to_string()),
        ("bytes_in", stats.bytes_in.to_string()),
        ("bytes_out", stats.bytes_out.to_string()),
        ("channels_opened", stats.channels_opened.to_string()),
        ("channels_released", stats.channels_released.to_string()),
        ("active_channels", stats.active_channels.to_string()),
        ("closes_sent", stats.closes_sent.to_string()),
        ("stray_closes", stats.stray_closes.to_string()),
        ("dial_failures", stats.dial_failures.to_string()),
        ("dropped_payloads", stats.dropped_payloads.to_string()),
    ]
}

fn reason_name(reason: EndReason) -> &'static str {
    match reason {
        EndReason::Interrupted => "interrupted",
        EndReason::TransportLost => "transport_lost",
        EndReason::ListenerFailed => "listener_failed",
    }
}

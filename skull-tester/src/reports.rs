use anyhow::Result;
use colored::Colorize;
use skull_game::format_remaining;
use std::io::Write;
use std::time::Duration;

use crate::session::SessionReport;

pub fn generate_console_report(
    writer: &mut dyn Write,
    reports: &[SessionReport],
    total_duration: Duration,
) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "{}", "📊 Session Summary".bright_cyan().bold())?;
    writeln!(writer, "{}", "==================".cyan())?;
    writeln!(writer, "Sessions: {}", reports.len())?;
    writeln!(writer, "Total time: {total_duration:?}")?;
    writeln!(writer)?;

    for report in reports {
        let state = &report.state;
        writeln!(
            writer,
            "💀 seed {} · {} · {} · {}s",
            report.seed.to_string().bold(),
            report.strategy,
            format!("{:?}", report.mode).to_lowercase(),
            report.seconds
        )?;
        writeln!(writer, "   Started from: {}", report.load_source)?;
        if let Some(sign_in) = &report.sign_in {
            writeln!(
                writer,
                "   Remote: {} ({} writes)",
                sign_in.green(),
                report.remote_writes
            )?;
        }
        writeln!(
            writer,
            "   Clicks: {} manual, {} automatic, {} rejected ({:.2}/s)",
            report.manual_clicks,
            report.auto_clicks,
            if report.rejected_clicks > 0 {
                report.rejected_clicks.to_string().red()
            } else {
                report.rejected_clicks.to_string().normal()
            },
            report.clicks_per_second()
        )?;
        writeln!(
            writer,
            "   Money: {:.5}  Dead points: {:.5} (+{:.5}/s)",
            state.money,
            state.dead_points,
            report.dead_points_per_second
        )?;
        writeln!(
            writer,
            "   Level {} ({:.1}%)  Energy {:.0}/{:.0}",
            state.level,
            state.level_progress() * 100.0,
            state.energy,
            state.max_energy
        )?;
        if let Some(end) = state.auto_click_end_time {
            writeln!(
                writer,
                "   Auto-click x{}/s, {} left",
                state.auto_click_reward,
                format_remaining(end, report.ended_at_ms)
            )?;
        }
        if let Some(end) = state.special_auto_click_end_time {
            writeln!(
                writer,
                "   Special auto-click, {} left",
                format_remaining(end, report.ended_at_ms)
            )?;
        }
        if !report.purchases.is_empty() {
            writeln!(
                writer,
                "   Purchases ({}): {}",
                report.purchases.len(),
                report.purchases.join(", ").yellow()
            )?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn generate_json_report(writer: &mut dyn Write, reports: &[SessionReport]) -> Result<()> {
    let json_output = serde_json::to_string_pretty(reports)?;
    writeln!(writer, "{json_output}")?;
    Ok(())
}

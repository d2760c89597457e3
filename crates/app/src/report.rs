//! Plain-text rendering of summaries and the scenario catalogue.

use std::fmt::Write as _;
use std::time::Duration;

use scoreload_application::{LoadSummary, TaskSummary};
use scoreload_domain::Scenario;

const NAME_WIDTH: usize = 40;

/// Renders the per-task table followed by the aggregated row.
#[must_use]
pub fn render_summary(summary: &LoadSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<7} {:<NAME_WIDTH$} {:>8} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>8} {:>7}",
        "Type", "Name", "# reqs", "# fails", "Avg", "Min", "Max", "p50", "p95", "p99", "req/s", "fail%"
    );
    let rule = "-".repeat(NAME_WIDTH + 120);
    let _ = writeln!(out, "{rule}");

    for task in &summary.tasks {
        write_row(&mut out, task);
    }
    let _ = writeln!(out, "{rule}");
    write_row(&mut out, &summary.aggregated);

    let _ = writeln!(
        out,
        "\nElapsed {:.1}s, {} requests, {} failures",
        summary.elapsed.as_secs_f64(),
        summary.aggregated.requests,
        summary.aggregated.failures
    );
    if !summary.aggregated.statuses.is_empty() {
        let statuses: Vec<String> = summary
            .aggregated
            .statuses
            .iter()
            .map(|(status, count)| format!("{status}: {count}"))
            .collect();
        let _ = writeln!(out, "Status codes: {}", statuses.join(", "));
    }
    out
}

fn write_row(out: &mut String, task: &TaskSummary) {
    let method = task.method.map_or("", |m| m.as_str());
    let _ = writeln!(
        out,
        "{:<7} {:<NAME_WIDTH$} {:>8} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>8.2} {:>6.1}%",
        method,
        truncate(&task.name, NAME_WIDTH),
        task.requests,
        task.failures,
        millis(task.average),
        millis(task.min),
        millis(task.max),
        millis(task.p50),
        millis(task.p95),
        millis(task.p99),
        task.requests_per_sec,
        task.error_rate() * 100.0,
    );
}

fn millis(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(width - 3).collect();
        short.push_str("...");
        short
    }
}

/// Lists every scenario with its weighted tasks.
#[must_use]
pub fn render_scenarios(scenarios: &[Scenario]) -> String {
    let mut out = String::new();
    for scenario in scenarios {
        let _ = writeln!(
            out,
            "{} - {} (total weight {})",
            scenario.name,
            scenario.description,
            scenario.total_weight()
        );
        for task in &scenario.tasks {
            let _ = writeln!(
                out,
                "    {:>2}x {:<6} {:<36} {}{}",
                task.weight,
                task.method.as_str(),
                task.path,
                task.name,
                if task.cleanup { " [cleanup]" } else { "" }
            );
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use scoreload_domain::find_scenario;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long task name", 10), "a very ...");
    }

    #[test]
    fn test_scenarios_listing_shows_weights_and_cleanup() {
        let text = render_scenarios(&[find_scenario("teams-post").unwrap()]);
        assert!(text.starts_with("teams-post - "));
        assert!(text.contains(" 2x POST   /teams"));
        assert!(text.contains("Create Team [cleanup]"));
    }
}

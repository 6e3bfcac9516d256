//! HTML report rendering
//!
//! The report is a single static page with one Chart.js line chart per
//! requested metric. Each chart plots the aggregated history of its metric as
//! two series, the outlier-trimmed average and the best of the combined runs,
//! on a logarithmic scale. Dashed annotation lines mark the average of the
//! trailing points and one standard deviation either side of it.
//!
//! Chart data is embedded as JSON, where a non-finite `f64` would become
//! `null` and leave a gap. The line parser never produces such values.

use std::{
    fmt::{self, Write as _},
    io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tokio::fs;
use tracing::info;
use trendline_history::{Histories, MetricHistory, MetricLabel, aggregate, history, read_history};

use crate::config::ReportConfig;

/// Name of the rendered report inside the report directory
pub const REPORT_FILE: &str = "index.html";

const CHART_JS: &str = "https://cdnjs.cloudflare.com/ajax/libs/Chart.js/4.3.3/chart.umd.min.js";
const ANNOTATION_JS: &str = "https://cdnjs.cloudflare.com/ajax/libs/chartjs-plugin-annotation/3.0.1/chartjs-plugin-annotation.min.js";

/// Errors produced while generating a report
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Reading the snapshot history failed
    #[error(transparent)]
    History(#[from] history::Error),
    /// Serializing chart data failed
    #[error("Failed to serialize chart data: {0}")]
    Json(#[from] serde_json::Error),
    /// Formatting the page failed
    #[error("Failed to format report: {0}")]
    Format(#[from] fmt::Error),
    /// Error writing or removing the report
    #[error("Failed to write report {path:?}: {source}")]
    Write {
        /// Report path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
}

/// One plotted point
#[derive(Debug, Serialize)]
struct Point<'a> {
    x: &'a str,
    y: f64,
    runs: &'a [String],
}

/// Escapes text for use in HTML content and attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// JSON safe to embed inside a `<script>` element.
fn script_json<T: Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

fn render_chart(out: &mut String, metric: &MetricHistory) -> Result<(), Error> {
    let html_id = metric.label.html_id();
    let id = escape_html(&html_id);
    let title = escape_html(&metric.label.to_string());

    let average: Vec<Point<'_>> = metric
        .history
        .iter()
        .map(|entry| Point {
            x: &entry.entry_label,
            y: entry.value,
            runs: &entry.combines_runs,
        })
        .collect();
    let best: Vec<Point<'_>> = metric
        .history
        .iter()
        .map(|entry| Point {
            x: &entry.entry_label,
            y: entry.best.unwrap_or(entry.value),
            runs: &entry.combines_runs,
        })
        .collect();
    let labels: Vec<&str> = metric
        .history
        .iter()
        .map(|entry| entry.entry_label.as_str())
        .collect();

    writeln!(out, "<div class=\"chart\">")?;
    writeln!(out, "<h2>{title}</h2>")?;
    if metric.history.is_empty() {
        writeln!(out, "<p class=\"no-data\">No data</p>")?;
    }
    writeln!(
        out,
        "<canvas id=\"{id}\" style=\"width:100%;max-height: 500px;\"></canvas>"
    )?;
    writeln!(out, "<script>")?;
    writeln!(
        out,
        "new Chart(document.getElementById({script_id}), {{
    type: 'line',
    data: {{
        labels: {labels},
        datasets: [
            {{ label: 'average of N runs', data: {average} }},
            {{ label: 'best of N runs', data: {best} }}
        ]
    }},
    options: {{
        scales: {{ y: {{ type: 'logarithmic' }} }},
        plugins: {{
            tooltip: {{ callbacks: {{ footer: runsFooter }} }},
            annotation: {{ annotations: {{ averageLine, deviationUpper, deviationLower }} }}
        }}
    }}
}});",
        script_id = script_json(&html_id)?,
        labels = script_json(&labels)?,
        average = script_json(&average)?,
        best = script_json(&best)?,
    )?;
    writeln!(out, "</script>")?;
    writeln!(out, "</div>")?;
    Ok(())
}

fn render_head(out: &mut String, config: &ReportConfig) -> Result<(), Error> {
    let title = escape_html(&config.title);
    let window = config.trailing_window.max(1);
    writeln!(
        out,
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<meta name="description" content="{title}"/>
<meta http-equiv="Permissions-Policy" content="interest-cohort=(), user-id=()" />
<script src="{CHART_JS}"></script>
<script src="{ANNOTATION_JS}"></script>
<script>
    function lastN(values, n = {window}) {{
        return values.length > n ? values.slice(-n) : values;
    }}
    function averageValues(ctx) {{
        const values = lastN(ctx.chart.data.datasets[0].data.map((entry) => entry.y));
        return values.reduce((a, b) => a + b, 0) / values.length;
    }}
    function standardDeviation(ctx) {{
        const values = lastN(ctx.chart.data.datasets[0].data.map((entry) => entry.y));
        const mean = averageValues(ctx);
        return Math.sqrt(values.map((x) => Math.pow(x - mean, 2)).reduce((a, b) => a + b, 0) / values.length);
    }}
    function runsFooter(items) {{
        const runs = items.length > 0 ? items[0].raw.runs : [];
        return runs && runs.length > 1 ? 'runs: ' + runs.join(', ') : '';
    }}
    const averageLine = {{
        type: 'line',
        borderColor: 'rgba(100, 149, 237, 0.5)',
        borderDash: [6, 6],
        borderWidth: 3,
        label: {{
            display: true,
            backgroundColor: 'rgba(100, 149, 237, 0.75)',
            content: (ctx) => 'Average({window}): ' + averageValues(ctx).toFixed(2)
        }},
        scaleID: 'y',
        value: (ctx) => averageValues(ctx)
    }};
    const deviationUpper = {{
        type: 'line',
        borderColor: 'rgba(102, 102, 102, 0.25)',
        borderDash: [6, 6],
        borderWidth: 3,
        label: {{
            display: true,
            backgroundColor: 'rgba(102, 102, 102, 0.5)',
            color: 'black',
            content: (ctx) => (averageValues(ctx) + standardDeviation(ctx)).toFixed(2),
            position: 'start',
            rotation: -90,
            yAdjust: -28
        }},
        scaleID: 'y',
        value: (ctx) => averageValues(ctx) + standardDeviation(ctx)
    }};
    const deviationLower = {{
        type: 'line',
        borderColor: 'rgba(102, 102, 102, 0.25)',
        borderDash: [6, 6],
        borderWidth: 3,
        label: {{
            display: true,
            backgroundColor: 'rgba(102, 102, 102, 0.5)',
            color: 'black',
            content: (ctx) => (averageValues(ctx) - standardDeviation(ctx)).toFixed(2),
            position: 'end',
            rotation: 90,
            yAdjust: 28
        }},
        scaleID: 'y',
        value: (ctx) => averageValues(ctx) - standardDeviation(ctx)
    }};
</script>
</head>"#
    )?;
    Ok(())
}

/// Renders the report page for already aggregated `histories`.
///
/// # Errors
///
/// Returns an error if chart data cannot be serialized.
pub fn render_html(histories: &Histories, config: &ReportConfig) -> Result<String, Error> {
    let mut out = String::new();
    render_head(&mut out, config)?;
    writeln!(out, "<body>")?;
    writeln!(out, "<h1>{}</h1>", escape_html(&config.title))?;
    writeln!(out, "<div class=\"charts\">")?;
    for metric in histories {
        render_chart(&mut out, metric)?;
    }
    writeln!(out, "</div>")?;
    writeln!(out, "</body>")?;
    writeln!(out, "</html>")?;
    Ok(out)
}

/// Reads, aggregates and renders the snapshots in `dir` into
/// `dir/index.html`, replacing any earlier report.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed or the report cannot be
/// written.
pub async fn generate_report(
    dir: &Path,
    labels: &[MetricLabel],
    config: &ReportConfig,
) -> Result<PathBuf, Error> {
    let report_path = dir.join(REPORT_FILE);
    let write_err = |source| Error::Write {
        path: report_path.clone(),
        source: Box::new(source),
    };
    if fs::try_exists(&report_path).await.unwrap_or(false) {
        fs::remove_file(&report_path).await.map_err(write_err)?;
    }

    let histories = read_history(dir, labels).await?;
    let combined = aggregate(&histories);
    let html = render_html(&combined, config)?;

    fs::write(&report_path, html).await.map_err(write_err)?;
    info!("Wrote report {report_path:?}");
    Ok(report_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trendline_history::HistoryEntry;

    fn labels(labels: &[&str]) -> Vec<MetricLabel> {
        labels.iter().map(|l| MetricLabel::new(l)).collect()
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn script_json_cannot_close_script() -> Result<(), Error> {
        let json = script_json(&["</script>"])?;
        assert!(!json.contains("</script>"));
        Ok(())
    }

    #[test]
    fn one_chart_per_label_in_order() -> Result<(), Error> {
        let requested = labels(&["theia_measurements/frontend", "process_cpu_seconds_total"]);
        let mut histories = Histories::new(&requested);
        histories.push(&requested[1], HistoryEntry::new("2023-9-5T10-3-4", 1.5));
        let html = render_html(&aggregate(&histories), &ReportConfig::default())?;

        let frontend = html
            .find("id=\"theia_measurements_frontend\"")
            .expect("frontend chart");
        let cpu = html
            .find("id=\"process_cpu_seconds_total\"")
            .expect("cpu chart");
        assert!(frontend < cpu);
        assert_eq!(html.matches("<div class=\"chart\">").count(), 2);
        assert_eq!(html.matches("No data").count(), 1);
        assert!(html.contains("type: 'logarithmic'"));
        assert!(html.contains("average of N runs"));
        assert!(html.contains("best of N runs"));
        assert!(html.contains("<title>Performance Report</title>"));
        Ok(())
    }

    #[test]
    fn chart_id_survives_markup_characters() -> Result<(), Error> {
        let requested = labels(&["it's&<x>"]);
        let histories = Histories::new(&requested);
        let html = render_html(&histories, &ReportConfig::default())?;

        assert!(html.contains(r#"<canvas id="it&#39;s&amp;&lt;x&gt;""#));
        assert!(html.contains(r#"document.getElementById("it's&<x>")"#));
        Ok(())
    }

    #[test]
    fn chart_embeds_average_and_best() -> Result<(), Error> {
        let requested = labels(&["foo"]);
        let mut histories = Histories::new(&requested);
        for (label, value) in [("m_1", 100.0), ("m_2", 200.0), ("m_3", 50.0)] {
            histories.push(&requested[0], HistoryEntry::new(label, value));
        }
        let html = render_html(&aggregate(&histories), &ReportConfig::default())?;

        assert!(html.contains(r#"labels: ["m[]"]"#));
        assert!(html.contains(r#"{"x":"m[]","y":75.0,"runs":["m_1","m_2","m_3"]}"#));
        assert!(html.contains(r#"{"x":"m[]","y":50.0,"runs":["m_1","m_2","m_3"]}"#));
        Ok(())
    }

    #[test]
    fn trailing_window_is_configurable() -> Result<(), Error> {
        let config = ReportConfig {
            title: "Nightly <perf>".to_string(),
            trailing_window: 5,
        };
        let html = render_html(&Histories::default(), &config)?;
        assert!(html.contains("function lastN(values, n = 5)"));
        assert!(html.contains("'Average(5): '"));
        assert!(html.contains("<h1>Nightly &lt;perf&gt;</h1>"));
        Ok(())
    }

    #[tokio::test]
    async fn generate_replaces_existing_report() -> Result<(), Error> {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join(REPORT_FILE), "stale").expect("write");
        std::fs::write(dir.path().join("m_1.txt"), "foo 100 1\n").expect("write");
        std::fs::write(dir.path().join("m_2.txt"), "foo 200 1\n").expect("write");

        let path = generate_report(dir.path(), &labels(&["foo"]), &ReportConfig::default()).await?;
        let html = std::fs::read_to_string(path).expect("read report");
        assert!(!html.contains("stale"));
        assert!(html.contains(r#"{"x":"m[]","y":100.0,"runs":["m_1","m_2"]}"#));
        Ok(())
    }

    #[tokio::test]
    async fn generate_fails_without_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let result = generate_report(
            &dir.path().join("absent"),
            &labels(&["foo"]),
            &ReportConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(Error::History(_))));
    }
}

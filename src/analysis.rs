//! Analysis module - Timing chart of a finished run

use std::path::Path;
use std::time::Duration;

use plotters::prelude::*;

use crate::error::{LabyrinthError, Result};
use crate::metrics::MetricsReport;

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn chart_err(e: impl std::fmt::Display) -> LabyrinthError {
    LabyrinthError::Chart(e.to_string())
}

/// Quantile lines for each timed stage, drawn against the control period.
pub fn render_timing_chart(report: &MetricsReport, path: impl AsRef<Path>) -> Result<()> {
    let series = [
        ("perception", report.perception_p50, report.perception_p99, &BLUE),
        ("control tick", report.control_p50, report.control_p99, &RED),
        ("step", report.step_p50, report.step_p99, &GREEN),
        ("jitter", report.jitter_p50, report.jitter_p99, &MAGENTA),
    ];
    let period_ms = ms(report.control_period);
    let max_ms = series
        .iter()
        .map(|(_, _, p99, _)| ms(*p99))
        .fold(period_ms, f64::max)
        * 1.2;

    let root = SVGBackend::new(path.as_ref(), (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Control loop timing (ms)", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(40.0..100.0, 0.0..max_ms.max(1.0))
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_desc("Quantile")
        .y_desc("Duration (ms)")
        .draw()
        .map_err(chart_err)?;

    for (label, p50, p99, colour) in series {
        chart
            .draw_series(LineSeries::new(vec![(50.0, ms(p50)), (99.0, ms(p99))], colour))
            .map_err(chart_err)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], colour));
    }

    chart
        .draw_series(LineSeries::new(vec![(40.0, period_ms), (100.0, period_ms)], &BLACK))
        .map_err(chart_err)?
        .label("control period")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    Ok(())
}

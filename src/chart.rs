use std::path::Path;

use anyhow::Result;
use plotters::prelude::*;

const CHART_SIZE: (u32, u32) = (1024, 768);

/// Render a labelled vertical bar chart PNG. Percentage charts clamp the
/// y-axis to 0–100. An empty `bars` slice still produces a valid (empty)
/// chart rather than an error, so a zero-row aggregate never fails a run.
pub fn save_bar_chart(
    path: &Path,
    caption: &str,
    x_desc: &str,
    y_desc: &str,
    bars: &[(String, f64)],
    percentage: bool,
) -> Result<()> {
    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let n = bars.len().max(1);
    let y_max = if percentage {
        100.0
    } else {
        let top = bars.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
        (top * 1.1).max(1.0)
    };

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 28))
        .margin(10)
        .x_label_area_size(70)
        .y_label_area_size(60)
        .build_cartesian_2d((0usize..n).into_segmented(), 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .x_labels(n)
        .x_label_formatter(&|seg| {
            let i = match seg {
                SegmentValue::Exact(i) | SegmentValue::CenterOf(i) => *i,
                SegmentValue::Last => return String::new(),
            };
            bars.get(i).map(|(label, _)| label.clone()).unwrap_or_default()
        })
        .draw()?;

    chart.draw_series(bars.iter().enumerate().map(|(i, (_, value))| {
        Rectangle::new(
            [
                (SegmentValue::Exact(i), 0.0),
                (SegmentValue::Exact(i + 1), *value),
            ],
            BLUE.mix(0.6).filled(),
        )
    }))?;

    root.present()?;
    Ok(())
}

// ── Tests ──

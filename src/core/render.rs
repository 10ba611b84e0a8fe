//! SVG rendering of plot figures.

use crate::core::plot::{Figure, Panel, SeriesData};
use crate::utils::error::{CalSimError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::fmt::Display;
use std::ops::Range;
use std::path::Path;

const FIGURE_SIZE: (u32, u32) = (1600, 900);

const PALETTE: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
];

fn plot_error<E: Display>(e: E) -> CalSimError {
    CalSimError::PlotError {
        message: e.to_string(),
    }
}

/// Time as a fractional year, used as the x coordinate of time series.
pub fn decimal_year(t: &NaiveDateTime) -> f64 {
    let year = t.year();
    let days = if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366.0
    } else {
        365.0
    };
    let day = t.ordinal0() as f64 + t.num_seconds_from_midnight() as f64 / 86_400.0;
    year as f64 + day / days
}

fn padded(min: f64, max: f64) -> Range<f64> {
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    if min == max {
        return (min - 1.0)..(max + 1.0);
    }
    let pad = (max - min) * 0.05;
    (min - pad)..(max + pad)
}

fn bounds(panel: &Panel) -> (Range<f64>, Range<f64>) {
    let mut xs = (f64::INFINITY, f64::NEG_INFINITY);
    let mut ys = (f64::INFINITY, f64::NEG_INFINITY);
    let mut include = |x: f64, y: f64| {
        xs = (xs.0.min(x), xs.1.max(x));
        ys = (ys.0.min(y), ys.1.max(y));
    };

    for series in &panel.series {
        match &series.data {
            SeriesData::Line(points) | SeriesData::Scatter(points) => {
                points.iter().for_each(|&(x, y)| include(x, y));
            }
            SeriesData::TimeLine(points) => {
                points.iter().for_each(|(t, y)| include(decimal_year(t), *y));
            }
            SeriesData::Bars(values) => {
                include(0.0, 0.0);
                include(panel.categories.len().max(values.len()) as f64, 0.0);
                values.iter().flatten().for_each(|&y| include(0.0, y));
            }
        }
    }

    let x = if panel.categories.is_empty() {
        padded(xs.0, xs.1)
    } else {
        0.0..panel.categories.len() as f64
    };
    (x, padded(ys.0, ys.1))
}

fn draw_panel(panel: &Panel, area: &DrawingArea<SVGBackend<'_>, Shift>) -> Result<()> {
    let (x_range, y_range) = bounds(panel);

    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)
        .map_err(plot_error)?;

    let x_format = |x: &f64| -> String {
        if panel.categories.is_empty() {
            format!("{:.2}", x)
        } else if *x < 0.0 {
            String::new()
        } else {
            panel
                .categories
                .get(x.floor() as usize)
                .cloned()
                .unwrap_or_default()
        }
    };
    let mut mesh = chart.configure_mesh();
    mesh.x_desc(panel.x_label.as_str())
        .y_desc(panel.y_label.as_str())
        .x_label_formatter(&x_format);
    if !panel.categories.is_empty() {
        mesh.x_labels(panel.categories.len());
    }
    mesh.draw().map_err(plot_error)?;

    let bar_width = 0.8 / panel.series.len().max(1) as f64;
    for (i, series) in panel.series.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let anno = match &series.data {
            SeriesData::Line(points) => chart
                .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
                .map_err(plot_error)?,
            SeriesData::TimeLine(points) => chart
                .draw_series(LineSeries::new(
                    points.iter().map(|(t, v)| (decimal_year(t), *v)),
                    color.stroke_width(1),
                ))
                .map_err(plot_error)?,
            SeriesData::Scatter(points) => chart
                .draw_series(
                    points
                        .iter()
                        .map(|&(x, y)| Circle::new((x, y), 3, color.filled())),
                )
                .map_err(plot_error)?,
            SeriesData::Bars(values) => chart
                .draw_series(values.iter().enumerate().filter_map(|(c, v)| {
                    v.map(|v| {
                        let x0 = c as f64 + 0.1 + bar_width * i as f64;
                        Rectangle::new([(x0, 0.0), (x0 + bar_width, v)], color.filled())
                    })
                }))
                .map_err(plot_error)?,
        };
        anno.label(series.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    if !panel.series.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(plot_error)?;
    }
    Ok(())
}

/// Draw `figure` to an SVG file at `path`.
pub fn render_svg(figure: &Figure, path: &Path) -> Result<()> {
    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let areas = root.split_evenly((figure.rows.max(1), figure.cols.max(1)));
    for (panel, area) in figure.panels.iter().zip(areas.iter()) {
        draw_panel(panel, area)?;
    }

    root.present().map_err(plot_error)?;
    tracing::info!(
        "📈 Saved {} plot with {} panels to {}",
        figure.kind,
        figure.panels.len(),
        path.display()
    );
    Ok(())
}

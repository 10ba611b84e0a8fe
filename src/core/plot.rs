//! Plot data assembly. Figures are plain data; `core::render` draws them.

use crate::core::stats::{annual_exceedance, monthly_exceedance, monthly_mean, period_mean, WATER_MONTHS};
use crate::domain::model::{SeriesKey, WideFrame};
use crate::utils::error::{CalSimError, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum PlotKind {
    /// Annual averages
    #[cfg_attr(feature = "cli", value(name = "AA"))]
    AnnualAverage,
    /// Exceedance probability
    #[cfg_attr(feature = "cli", value(name = "EX"))]
    Exceedance,
    /// Monthly averages
    #[cfg_attr(feature = "cli", value(name = "MA"))]
    MonthlyAverage,
    /// Scatter against the first series
    #[cfg_attr(feature = "cli", value(name = "SP"))]
    Scatter,
    /// Time series
    #[cfg_attr(feature = "cli", value(name = "TS"))]
    TimeSeries,
}

impl PlotKind {
    pub fn code(&self) -> &'static str {
        match self {
            PlotKind::AnnualAverage => "AA",
            PlotKind::Exceedance => "EX",
            PlotKind::MonthlyAverage => "MA",
            PlotKind::Scatter => "SP",
            PlotKind::TimeSeries => "TS",
        }
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PlotKind {
    type Err = CalSimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "AA" => Ok(PlotKind::AnnualAverage),
            "EX" => Ok(PlotKind::Exceedance),
            "MA" => Ok(PlotKind::MonthlyAverage),
            "SP" => Ok(PlotKind::Scatter),
            "TS" => Ok(PlotKind::TimeSeries),
            other => Err(CalSimError::InvalidConfigValueError {
                field: "plot".to_string(),
                value: other.to_string(),
                reason: "Expected one of AA, EX, MA, SP, TS".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlotOptions {
    /// End-of-month for annual statistics. Exceedance plots are monthly when
    /// unset; annual averages fall back to September.
    pub eom: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SeriesData {
    Line(Vec<(f64, f64)>),
    TimeLine(Vec<(NaiveDateTime, f64)>),
    /// One value per panel category; `None` draws no bar.
    Bars(Vec<Option<f64>>),
    Scatter(Vec<(f64, f64)>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSeries {
    pub label: String,
    pub data: SeriesData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub legend_title: String,
    /// Category names for bar panels.
    pub categories: Vec<String>,
    pub series: Vec<PlotSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub kind: PlotKind,
    pub rows: usize,
    pub cols: usize,
    pub panels: Vec<Panel>,
}

/// Near-square grid for `n` panels.
pub fn grid_shape(n: usize) -> (usize, usize) {
    let rows = ((n as f64).sqrt().round() as usize).max(1);
    let cols = if rows * rows >= n { rows } else { rows + 1 };
    (rows, cols)
}

/// Coefficient of determination of `predicted` against `observed`.
pub fn r_squared(observed: &[f64], predicted: &[f64]) -> f64 {
    let n = observed.len().min(predicted.len());
    if n == 0 {
        return f64::NAN;
    }
    let mean = observed[..n].iter().sum::<f64>() / n as f64;
    let ss_res: f64 = observed[..n]
        .iter()
        .zip(&predicted[..n])
        .map(|(o, p)| (o - p).powi(2))
        .sum();
    let ss_tot: f64 = observed[..n].iter().map(|o| (o - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

fn joined<'a>(values: impl Iterator<Item = &'a String>) -> String {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("/")
}

fn y_label<'a>(keys: impl Iterator<Item = &'a SeriesKey> + Clone) -> String {
    format!(
        "{} ({})",
        joined(keys.clone().map(|k| &k.c)),
        joined(keys.map(|k| &k.data_type))
    )
}

fn title_case(s: &str) -> String {
    s.split('/')
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn month_name(month: u32) -> &'static str {
    const NAMES: [&str; 12] = [
        "January", "February", "March", "April", "May", "June", "July", "August", "September",
        "October", "November", "December",
    ];
    NAMES[(month.clamp(1, 12) - 1) as usize]
}

fn variables(wide: &WideFrame) -> Vec<String> {
    wide.columns
        .iter()
        .map(|c| c.key.b.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Build one panel per Part B from per-column series.
fn per_variable<T>(
    wide: &WideFrame,
    items: &[(SeriesKey, T)],
    mut panel: impl FnMut(&str, &[&(SeriesKey, T)]) -> Panel,
) -> Vec<Panel> {
    variables(wide)
        .iter()
        .map(|var| {
            let selected: Vec<&(SeriesKey, T)> = items.iter().filter(|(k, _)| &k.b == var).collect();
            panel(var, &selected)
        })
        .collect()
}

pub fn build_figure(kind: PlotKind, wide: &WideFrame, options: &PlotOptions) -> Result<Figure> {
    wide.validate()?;
    if wide.columns.is_empty() {
        return Err(CalSimError::PlotError {
            message: "Nothing to plot: the table has no series".to_string(),
        });
    }

    let panels = match kind {
        PlotKind::AnnualAverage => annual_average_panels(wide, options.eom.unwrap_or(9))?,
        PlotKind::Exceedance => exceedance_panels(wide, options.eom)?,
        PlotKind::MonthlyAverage => monthly_average_panels(wide)?,
        PlotKind::Scatter => scatter_panels(wide),
        PlotKind::TimeSeries => time_series_panels(wide),
    };

    let (rows, cols) = match kind {
        PlotKind::AnnualAverage => (1, panels.len()),
        _ => grid_shape(panels.len()),
    };
    tracing::debug!("Built {} figure with {} panels on a {}x{} grid", kind, panels.len(), rows, cols);

    Ok(Figure {
        kind,
        rows,
        cols,
        panels,
    })
}

fn annual_average_panels(wide: &WideFrame, eom: u32) -> Result<Vec<Panel>> {
    let means = period_mean(wide, eom)?;

    let cycles: BTreeSet<&String> = means.iter().map(|(k, _)| &k.a).collect();
    if cycles.len() > 1 {
        return Err(CalSimError::PlotError {
            message: "Annual average plots cannot handle multiple cycle (Part A) data".to_string(),
        });
    }

    let studies: Vec<String> = means
        .iter()
        .map(|(k, _)| k.study.clone().unwrap_or_default())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let data_types: BTreeSet<&String> = means.iter().map(|(k, _)| &k.data_type).collect();

    let mut panels = Vec::new();
    for data_type in data_types {
        let group: Vec<&(SeriesKey, Option<f64>)> =
            means.iter().filter(|(k, _)| &k.data_type == data_type).collect();

        let units: BTreeSet<&String> = group.iter().map(|(k, _)| &k.units).collect();
        if units.len() > 1 {
            return Err(CalSimError::PlotError {
                message: format!(
                    "Annual average plots cannot handle multiple units for {}",
                    data_type
                ),
            });
        }

        let categories: Vec<String> = group
            .iter()
            .map(|(k, _)| k.b.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let series = studies
            .iter()
            .map(|study| PlotSeries {
                label: study.clone(),
                data: SeriesData::Bars(
                    categories
                        .iter()
                        .map(|b| {
                            group
                                .iter()
                                .find(|(k, _)| &k.b == b && k.study.clone().unwrap_or_default() == *study)
                                .and_then(|(_, mean)| *mean)
                        })
                        .collect(),
                ),
            })
            .collect();

        let context = title_case(&joined(group.iter().map(|(k, _)| &k.c)));
        panels.push(Panel {
            title: format!("Annual Average Plot of {}", context),
            x_label: "Part B".to_string(),
            y_label: format!("{} ({})", context, joined(units.into_iter())),
            legend_title: "Study".to_string(),
            categories,
            series,
        });
    }
    Ok(panels)
}

fn exceedance_panels(wide: &WideFrame, eom: Option<u32>) -> Result<Vec<Panel>> {
    let curves = match eom {
        Some(eom) => annual_exceedance(wide, eom)?,
        None => monthly_exceedance(wide)?,
    };
    let items: Vec<(SeriesKey, Vec<(f64, f64)>)> = curves
        .into_iter()
        .map(|c| {
            let points = c.points.iter().map(|p| (p.probability, p.value)).collect();
            (c.key, points)
        })
        .collect();

    Ok(per_variable(wide, &items, |var, selected| Panel {
        title: match eom {
            Some(m) => format!("Exceedance Plot of {} (End of {})", var, month_name(m)),
            None => format!("Exceedance Plot of {} (All Months)", var),
        },
        x_label: "Exceedance Probability".to_string(),
        y_label: y_label(selected.iter().map(|(k, _)| k)),
        legend_title: "Study, Part F".to_string(),
        categories: Vec::new(),
        series: selected
            .iter()
            .map(|(k, points)| PlotSeries {
                label: k.label(),
                data: SeriesData::Line(points.clone()),
            })
            .collect(),
    }))
}

fn monthly_average_panels(wide: &WideFrame) -> Result<Vec<Panel>> {
    let monthly = monthly_mean(wide)?;
    let items: Vec<(SeriesKey, Vec<Option<f64>>)> = monthly
        .columns
        .into_iter()
        .map(|c| (c.key, c.values))
        .collect();

    Ok(per_variable(wide, &items, |var, selected| Panel {
        title: format!("Monthly Averages of {}", var),
        x_label: "Month".to_string(),
        y_label: y_label(selected.iter().map(|(k, _)| k)),
        legend_title: "Study, Part A".to_string(),
        categories: WATER_MONTHS.iter().map(|m| m.to_string()).collect(),
        series: selected
            .iter()
            .map(|(k, values)| PlotSeries {
                label: k.label(),
                data: SeriesData::Bars(values.clone()),
            })
            .collect(),
    }))
}

fn scatter_panels(wide: &WideFrame) -> Vec<Panel> {
    let items: Vec<(SeriesKey, &Vec<Option<f64>>)> = wide
        .columns
        .iter()
        .map(|c| (c.key.clone(), &c.values))
        .collect();

    per_variable(wide, &items, |var, selected| {
        let series = match selected.split_first() {
            Some(((_, base), others)) => others
                .iter()
                .map(|(k, values)| {
                    let points: Vec<(f64, f64)> = base
                        .iter()
                        .zip(values.iter())
                        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                        .collect();
                    let (xs, ys): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
                    PlotSeries {
                        label: format!("{} (R^2: {:.2})", k.label(), r_squared(&xs, &ys)),
                        data: SeriesData::Scatter(points),
                    }
                })
                .collect(),
            None => Vec::new(),
        };
        Panel {
            title: format!("Scatter Plot of {}", var),
            x_label: var.to_string(),
            y_label: y_label(selected.iter().map(|(k, _)| k)),
            legend_title: "Study, Part A".to_string(),
            categories: Vec::new(),
            series,
        }
    })
}

fn time_series_panels(wide: &WideFrame) -> Vec<Panel> {
    let items: Vec<(SeriesKey, &Vec<Option<f64>>)> = wide
        .columns
        .iter()
        .map(|c| (c.key.clone(), &c.values))
        .collect();

    per_variable(wide, &items, |var, selected| Panel {
        title: format!("Time Series Plot of {}", var),
        x_label: "CalSim Period of Record".to_string(),
        y_label: y_label(selected.iter().map(|(k, _)| k)),
        legend_title: "Study, Part A".to_string(),
        categories: Vec::new(),
        series: selected
            .iter()
            .map(|(k, values)| PlotSeries {
                label: k.label(),
                data: SeriesData::TimeLine(
                    wide.index
                        .iter()
                        .zip(values.iter())
                        .filter_map(|(t, v)| v.map(|v| (*t, v)))
                        .collect(),
                ),
            })
            .collect(),
    })
}

//! Water-year statistics on wide tables.

use crate::domain::model::{Column, SeriesKey, WideFrame};
use crate::utils::error::{CalSimError, Result};
use chrono::Datelike;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Calendar month abbreviations in water-year order.
pub const WATER_MONTHS: [&str; 12] = [
    "Oct", "Nov", "Dec", "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep",
];

/// The water year runs from October through September and is named after the
/// year it ends in.
pub fn water_year<D: Datelike>(date: &D) -> i32 {
    if date.month() < 10 {
        date.year()
    } else {
        date.year() + 1
    }
}

/// Annual values per series, indexed by water year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualFrame {
    pub water_years: Vec<i32>,
    pub columns: Vec<Column<SeriesKey>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregation {
    Mean,
    Sum,
    EndOfMonth,
}

impl Aggregation {
    fn for_data_type(data_type: &str) -> Option<Self> {
        match data_type {
            "PER-AVER" => Some(Aggregation::Mean),
            "PER-CUM" => Some(Aggregation::Sum),
            "INST-VAL" => Some(Aggregation::EndOfMonth),
            _ => None,
        }
    }
}

fn check_eom(eom: u32) -> Result<()> {
    if (1..=12).contains(&eom) {
        Ok(())
    } else {
        Err(CalSimError::InvalidConfigValueError {
            field: "eom".to_string(),
            value: eom.to_string(),
            reason: "End-of-month must be a calendar month between 1 and 12".to_string(),
        })
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Aggregate each series to water years by its data type.
///
/// `PER-AVER` series are averaged, `PER-CUM` series are summed and `INST-VAL`
/// series take the last value observed in month `eom`. Years with no valid
/// value are `None`.
pub fn aggregate_annual(wide: &WideFrame, eom: u32) -> Result<AnnualFrame> {
    check_eom(eom)?;
    wide.validate()?;

    let water_years: Vec<i32> = wide
        .index
        .iter()
        .map(water_year)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut columns = Vec::with_capacity(wide.columns.len());
    for column in &wide.columns {
        let Some(aggregation) = Aggregation::for_data_type(&column.key.data_type) else {
            tracing::warn!(
                "⚠️  Skipping {} with unsupported data type '{}'",
                column.key.b,
                column.key.data_type
            );
            continue;
        };

        let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
        for (t, value) in wide.index.iter().zip(&column.values) {
            if aggregation == Aggregation::EndOfMonth && t.month() != eom {
                continue;
            }
            if let Some(v) = value {
                by_year.entry(water_year(t)).or_default().push(*v);
            }
        }

        let values = water_years
            .iter()
            .map(|wy| {
                let present = by_year.get(wy).map(Vec::as_slice).unwrap_or(&[]);
                match aggregation {
                    Aggregation::Mean => mean(present),
                    Aggregation::Sum => (!present.is_empty()).then(|| present.iter().sum()),
                    Aggregation::EndOfMonth => present.last().copied(),
                }
            })
            .collect();

        columns.push(Column {
            key: column.key.clone(),
            values,
        });
    }

    Ok(AnnualFrame {
        water_years,
        columns,
    })
}

/// Long-term mean of the annual values of each series.
pub fn period_mean(wide: &WideFrame, eom: u32) -> Result<Vec<(SeriesKey, Option<f64>)>> {
    let annual = aggregate_annual(wide, eom)?;
    Ok(annual
        .columns
        .into_iter()
        .map(|c| {
            let present: Vec<f64> = c.values.iter().flatten().copied().collect();
            (c.key, mean(&present))
        })
        .collect())
}

/// Calendar-month means, rows in `WATER_MONTHS` order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyMean {
    pub months: Vec<&'static str>,
    pub columns: Vec<Column<SeriesKey>>,
}

pub fn monthly_mean(wide: &WideFrame) -> Result<MonthlyMean> {
    wide.validate()?;
    // Oct..Sep as calendar month numbers.
    let order: Vec<u32> = (10..=12).chain(1..=9).collect();

    let columns = wide
        .columns
        .iter()
        .map(|column| {
            let mut by_month: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
            for (t, value) in wide.index.iter().zip(&column.values) {
                if let Some(v) = value {
                    by_month.entry(t.month()).or_default().push(*v);
                }
            }
            Column {
                key: column.key.clone(),
                values: order
                    .iter()
                    .map(|m| by_month.get(m).and_then(|v| mean(v)))
                    .collect(),
            }
        })
        .collect();

    Ok(MonthlyMean {
        months: WATER_MONTHS.to_vec(),
        columns,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExceedancePoint {
    pub probability: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceedanceCurve {
    pub key: SeriesKey,
    pub points: Vec<ExceedancePoint>,
}

/// Weibull plotting positions, `rank / (n + 1)`, over the valid values.
///
/// Ranks are descending; ties keep their original order. Points come out in
/// ascending probability.
pub fn exceedance(values: &[Option<f64>]) -> Vec<ExceedancePoint> {
    let mut valid: Vec<f64> = values.iter().flatten().copied().collect();
    // Stable sort keeps ties in positional order.
    valid.sort_by(|a, b| b.total_cmp(a));
    let n = valid.len() as f64;
    valid
        .into_iter()
        .enumerate()
        .map(|(i, value)| ExceedancePoint {
            probability: (i + 1) as f64 / (n + 1.0),
            value,
        })
        .collect()
}

pub fn monthly_exceedance(wide: &WideFrame) -> Result<Vec<ExceedanceCurve>> {
    wide.validate()?;
    Ok(wide
        .columns
        .iter()
        .map(|c| ExceedanceCurve {
            key: c.key.clone(),
            points: exceedance(&c.values),
        })
        .collect())
}

pub fn annual_exceedance(wide: &WideFrame, eom: u32) -> Result<Vec<ExceedanceCurve>> {
    let annual = aggregate_annual(wide, eom)?;
    Ok(annual
        .columns
        .into_iter()
        .map(|c| ExceedanceCurve {
            points: exceedance(&c.values),
            key: c.key,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pathname::TimeStep;
    use chrono::{NaiveDate, NaiveDateTime};

    fn t(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn key(data_type: &str) -> SeriesKey {
        SeriesKey {
            study: None,
            a: "CALSIM".into(),
            b: "X".into(),
            c: "C".into(),
            e: "1MON".into(),
            f: "F".into(),
            units: "TAF".into(),
            data_type: data_type.into(),
        }
    }

    fn two_years(data_type: &str) -> WideFrame {
        let index = TimeStep::Month.range(t(1921, 10, 31), t(1923, 9, 30));
        let values = (0..index.len()).map(|i| Some(i as f64)).collect();
        WideFrame {
            index,
            columns: vec![Column {
                key: key(data_type),
                values,
            }],
        }
    }

    #[test]
    fn test_water_year() {
        assert_eq!(water_year(&NaiveDate::from_ymd_opt(2000, 9, 30).unwrap()), 2000);
        assert_eq!(water_year(&NaiveDate::from_ymd_opt(2000, 10, 31).unwrap()), 2001);
    }

    #[test]
    fn test_aggregate_by_data_type() {
        let annual = aggregate_annual(&two_years("PER-CUM"), 9).unwrap();
        assert_eq!(annual.water_years, vec![1922, 1923]);
        assert_eq!(annual.columns[0].values, vec![Some(66.0), Some(210.0)]);

        let annual = aggregate_annual(&two_years("PER-AVER"), 9).unwrap();
        assert_eq!(annual.columns[0].values, vec![Some(5.5), Some(17.5)]);

        let annual = aggregate_annual(&two_years("INST-VAL"), 9).unwrap();
        assert_eq!(annual.columns[0].values, vec![Some(11.0), Some(23.0)]);

        let annual = aggregate_annual(&two_years("INST-CUM"), 9).unwrap();
        assert!(annual.columns.is_empty());

        assert!(aggregate_annual(&two_years("PER-CUM"), 13).is_err());
    }

    #[test]
    fn test_monthly_mean_order() {
        let monthly = monthly_mean(&two_years("PER-AVER")).unwrap();
        assert_eq!(monthly.months[0], "Oct");
        assert_eq!(monthly.columns[0].values[0], Some(6.0));
        assert_eq!(monthly.columns[0].values[11], Some(17.0));
    }

    #[test]
    fn test_exceedance_positions() {
        let points = exceedance(&[Some(2.0), None, Some(5.0), Some(2.0)]);
        let probabilities: Vec<f64> = points.iter().map(|p| p.probability).collect();
        assert_eq!(probabilities, vec![0.25, 0.5, 0.75]);
        assert_eq!(points[0].value, 5.0);
        assert!(points.windows(2).all(|w| w[0].value >= w[1].value));
    }
}

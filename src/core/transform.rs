//! Reshaping between the tidy, wide and condense layouts.

use crate::domain::model::{
    Column, CondenseFrame, CondenseKey, IndexedFrame, PathDefaults, SeriesKey, Table, TableFormat,
    TidyFrame, TidyRecord, WideFrame,
};
use crate::domain::pathname::{Pathname, TimeStep};
use crate::utils::error::{CalSimError, Result};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};

/// Pathname parts as carried by a table; dropped levels are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParts {
    pub a: Option<String>,
    pub b: String,
    pub c: Option<String>,
    pub e: Option<String>,
    pub f: Option<String>,
}

pub fn split_pathname(pathname: &str) -> Result<PathParts> {
    let p = Pathname::parse(pathname)?;
    Ok(PathParts {
        a: Some(p.a),
        b: p.b,
        c: Some(p.c),
        e: Some(p.e),
        f: Some(p.f),
    })
}

/// Rebuild `/A/B/C//E/F/`, filling gaps from `defaults` and inferring Part E
/// from `index` when neither supplies it.
pub fn join_pathname(
    parts: &PathParts,
    defaults: &PathDefaults,
    index: &[NaiveDateTime],
) -> Result<String> {
    let pick = |own: &Option<String>, fallback: &Option<String>| -> Option<String> {
        own.clone()
            .or_else(|| fallback.clone())
            .filter(|v| !v.is_empty())
    };

    let a = pick(&parts.a, &defaults.a);
    let c = pick(&parts.c, &defaults.c);
    let e = pick(&parts.e, &defaults.e)
        .or_else(|| TimeStep::infer(index).map(|s| s.part_e().to_string()));
    let f = pick(&parts.f, &defaults.f);

    let missing: Vec<&str> = [("Part A", &a), ("Part C", &c), ("Part E", &e), ("Part F", &f)]
        .into_iter()
        .filter(|(_, v)| v.is_none())
        .map(|(name, _)| name)
        .collect();
    match (a, c, e, f) {
        (Some(a), Some(c), Some(e), Some(f)) => Ok(Pathname::join(&a, &parts.b, &c, &e, &f)),
        _ => Err(CalSimError::validation(format!(
            "Values required for the following parts: {}",
            missing.join(", ")
        ))),
    }
}

fn series_key(record: &TidyRecord) -> Result<SeriesKey> {
    let p = Pathname::parse(&record.pathname)?;
    Ok(SeriesKey {
        study: record.study.clone(),
        a: p.a,
        b: p.b,
        c: p.c,
        e: p.e,
        f: p.f,
        units: record.units.clone(),
        data_type: record.data_type.clone(),
    })
}

/// Pivot keyed cells into a frame with a sorted, shared index.
fn pivot<K: Ord + Clone>(cells: Vec<(K, NaiveDateTime, Option<f64>)>) -> IndexedFrame<K> {
    let index: BTreeSet<NaiveDateTime> = cells.iter().map(|(_, t, _)| *t).collect();
    let index: Vec<NaiveDateTime> = index.into_iter().collect();

    let mut columns: BTreeMap<K, BTreeMap<NaiveDateTime, Option<f64>>> = BTreeMap::new();
    for (key, t, value) in cells {
        columns.entry(key).or_default().insert(t, value);
    }

    IndexedFrame {
        columns: columns
            .into_iter()
            .map(|(key, values)| Column {
                key,
                values: index.iter().map(|t| values.get(t).copied().flatten()).collect(),
            })
            .collect(),
        index,
    }
}

pub fn tidy_to_wide(frame: &TidyFrame) -> Result<WideFrame> {
    frame.validate()?;
    let cells = frame
        .records
        .iter()
        .map(|r| Ok((series_key(r)?, r.datetime, r.value)))
        .collect::<Result<Vec<_>>>()?;
    Ok(pivot(cells))
}

pub fn wide_to_tidy(frame: &WideFrame) -> Result<TidyFrame> {
    frame.validate()?;
    let mut records = Vec::with_capacity(frame.index.len() * frame.columns.len());
    for column in &frame.columns {
        let k = &column.key;
        let pathname = Pathname::join(&k.a, &k.b, &k.c, &k.e, &k.f);
        records.extend(frame.index.iter().zip(&column.values).map(|(t, v)| TidyRecord {
            study: k.study.clone(),
            datetime: *t,
            pathname: pathname.clone(),
            units: k.units.clone(),
            data_type: k.data_type.clone(),
            value: *v,
        }));
    }
    Ok(TidyFrame::new(records))
}

/// Condense pivots on Part B and the merged units/type, dropping every other
/// level that holds a single value across the frame.
pub fn tidy_to_condense(frame: &TidyFrame) -> Result<CondenseFrame> {
    frame.validate()?;
    let keys = frame
        .records
        .iter()
        .map(series_key)
        .collect::<Result<Vec<_>>>()?;

    let varies = |get: fn(&SeriesKey) -> Option<&String>| -> bool {
        keys.iter().map(get).collect::<BTreeSet<_>>().len() > 1
    };
    let keep_study = varies(|k| k.study.as_ref());
    let keep_a = varies(|k| Some(&k.a));
    let keep_c = varies(|k| Some(&k.c));
    let keep_e = varies(|k| Some(&k.e));
    let keep_f = varies(|k| Some(&k.f));

    let cells = keys
        .into_iter()
        .zip(&frame.records)
        .map(|(k, r)| {
            let key = CondenseKey {
                study: if keep_study { k.study } else { None },
                a: keep_a.then_some(k.a),
                b: k.b,
                c: keep_c.then_some(k.c),
                e: keep_e.then_some(k.e),
                f: keep_f.then_some(k.f),
                units_type: format!("{} {}", k.units, k.data_type),
            };
            (key, r.datetime, r.value)
        })
        .collect();
    Ok(pivot(cells))
}

pub fn condense_to_tidy(frame: &CondenseFrame, defaults: &PathDefaults) -> Result<TidyFrame> {
    frame.validate()?;
    let mut records = Vec::with_capacity(frame.index.len() * frame.columns.len());
    for column in &frame.columns {
        let k = &column.key;
        let mut units_type = k.units_type.split_whitespace();
        let (units, data_type) = match (units_type.next(), units_type.next(), units_type.next()) {
            (Some(u), Some(t), None) => (u.to_string(), t.to_string()),
            _ => {
                return Err(CalSimError::format(format!(
                    "'{}' is not of the form 'UNITS DATA-TYPE'",
                    k.units_type
                )))
            }
        };
        let parts = PathParts {
            a: k.a.clone(),
            b: k.b.clone(),
            c: k.c.clone(),
            e: k.e.clone(),
            f: k.f.clone(),
        };
        let pathname = join_pathname(&parts, defaults, &frame.index)?;

        records.extend(frame.index.iter().zip(&column.values).map(|(t, v)| TidyRecord {
            study: k.study.clone(),
            datetime: *t,
            pathname: pathname.clone(),
            units: units.clone(),
            data_type: data_type.clone(),
            value: *v,
        }));
    }
    Ok(TidyFrame::new(records))
}

impl Table {
    pub fn to_tidy(&self, defaults: &PathDefaults) -> Result<TidyFrame> {
        match self {
            Table::Tidy(t) => {
                same_layout(TableFormat::Tidy);
                Ok(t.clone())
            }
            Table::Wide(w) => wide_to_tidy(w),
            Table::Condense(c) => condense_to_tidy(c, defaults),
        }
    }

    pub fn to_wide(&self, defaults: &PathDefaults) -> Result<WideFrame> {
        match self {
            Table::Wide(w) => {
                same_layout(TableFormat::Wide);
                Ok(w.clone())
            }
            Table::Tidy(t) => tidy_to_wide(t),
            Table::Condense(c) => tidy_to_wide(&condense_to_tidy(c, defaults)?),
        }
    }

    pub fn to_condense(&self) -> Result<CondenseFrame> {
        match self {
            Table::Condense(c) => {
                same_layout(TableFormat::Condense);
                Ok(c.clone())
            }
            Table::Tidy(t) => tidy_to_condense(t),
            Table::Wide(w) => tidy_to_condense(&wide_to_tidy(w)?),
        }
    }

    pub fn convert(&self, format: TableFormat, defaults: &PathDefaults) -> Result<Table> {
        Ok(match format {
            TableFormat::Tidy => Table::Tidy(self.to_tidy(defaults)?),
            TableFormat::Wide => Table::Wide(self.to_wide(defaults)?),
            TableFormat::Condense => Table::Condense(self.to_condense()?),
        })
    }
}

fn same_layout(format: TableFormat) {
    tracing::debug!("Table is already in {:?} layout; returning a copy", format);
}

use crate::domain::model::{IndexedFrame, Table, TidyFrame};
use crate::domain::pathname::Pathname;

fn part_b_matches(part_b: &str, names: &[String], exact: bool) -> bool {
    if exact {
        names.iter().any(|n| n == part_b)
    } else {
        names.iter().any(|n| part_b.contains(n.as_str()))
    }
}

fn select_columns<K: Clone>(
    frame: &IndexedFrame<K>,
    part_b: impl Fn(&K) -> &str,
    names: &[String],
    exact: bool,
) -> IndexedFrame<K> {
    IndexedFrame {
        index: frame.index.clone(),
        columns: frame
            .columns
            .iter()
            .filter(|c| part_b_matches(part_b(&c.key), names, exact))
            .cloned()
            .collect(),
    }
}

/// Keep the series whose Part B matches one of `names`.
///
/// When nothing matches, the input is returned unchanged.
pub fn select_part_b<S: AsRef<str>>(table: &Table, names: &[S], exact: bool) -> Table {
    let names: Vec<String> = names.iter().map(|n| n.as_ref().trim().to_uppercase()).collect();

    let (selected, empty) = match table {
        Table::Tidy(frame) => {
            let records: Vec<_> = frame
                .records
                .iter()
                .filter(|r| {
                    Pathname::parse(&r.pathname)
                        .map(|p| part_b_matches(&p.b, &names, exact))
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            let empty = records.is_empty();
            (Table::Tidy(TidyFrame::new(records)), empty)
        }
        Table::Wide(frame) => {
            let wide = select_columns(frame, |k| k.b.as_str(), &names, exact);
            let empty = wide.columns.is_empty();
            (Table::Wide(wide), empty)
        }
        Table::Condense(frame) => {
            let condense = select_columns(frame, |k| k.b.as_str(), &names, exact);
            let empty = condense.columns.is_empty();
            (Table::Condense(condense), empty)
        }
    };

    if empty {
        tracing::warn!("⚠️  No data selected for Part B {:?}; returning input unchanged", names);
        return table.clone();
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::TidyRecord;
    use chrono::NaiveDate;

    fn frame() -> Table {
        let datetime = NaiveDate::from_ymd_opt(2000, 1, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let records = ["S_SHSTA", "S_OROVL", "C_KSWCK"]
            .iter()
            .map(|b| TidyRecord {
                study: None,
                datetime,
                pathname: Pathname::join("CALSIM", b, "STORAGE", "1MON", "L2015A"),
                units: "TAF".into(),
                data_type: "INST-VAL".into(),
                value: Some(1.0),
            })
            .collect();
        Table::Tidy(TidyFrame::new(records))
    }

    #[test]
    fn test_contains_and_exact() {
        let Table::Tidy(picked) = select_part_b(&frame(), &["s_"], false) else {
            panic!("layout changed");
        };
        assert_eq!(picked.len(), 2);

        let Table::Tidy(picked) = select_part_b(&frame(), &["S_"], true) else {
            panic!("layout changed");
        };
        assert_eq!(picked.len(), 3, "no exact match returns the input");
    }

    #[test]
    fn test_wide_selection() {
        let wide = frame().to_wide(&Default::default()).unwrap();
        let Table::Wide(picked) = select_part_b(&Table::Wide(wide), &["C_KSWCK"], true) else {
            panic!("layout changed");
        };
        assert_eq!(picked.columns.len(), 1);
    }
}

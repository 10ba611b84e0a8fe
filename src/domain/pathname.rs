use crate::utils::error::{CalSimError, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A DSS record pathname, `/A/B/C/D/E/F/`.
///
/// For CalSim output the parts conventionally carry:
/// A = model/cycle, B = variable, C = kind (STORAGE, FLOW-CHANNEL, ...),
/// D = date block, E = time step, F = study tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pathname {
    pub a: String,
    pub b: String,
    pub c: String,
    pub d: String,
    pub e: String,
    pub f: String,
}

impl Pathname {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.trim().split('/').collect();
        if parts.len() != 8 || !parts[0].is_empty() || !parts[7].is_empty() {
            return Err(CalSimError::format(format!(
                "'{}' is not a DSS pathname of the form /A/B/C/D/E/F/",
                raw
            )));
        }
        Ok(Self {
            a: parts[1].to_uppercase(),
            b: parts[2].to_uppercase(),
            c: parts[3].to_uppercase(),
            d: parts[4].to_uppercase(),
            e: parts[5].to_uppercase(),
            f: parts[6].to_uppercase(),
        })
    }

    pub fn join(a: &str, b: &str, c: &str, e: &str, f: &str) -> String {
        format!("/{}/{}/{}//{}/{}/", a, b, c, e, f)
    }

    /// Catalog listings carry the date block in Part D; CalSim tables never do.
    pub fn without_d(mut self) -> Self {
        self.d.clear();
        self
    }

    pub fn time_step(&self) -> Result<TimeStep> {
        TimeStep::from_part_e(&self.e)
    }
}

impl fmt::Display for Pathname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}/{}/{}/{}/{}/{}/",
            self.a, self.b, self.c, self.d, self.e, self.f
        )
    }
}

impl FromStr for Pathname {
    type Err = CalSimError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Regular time steps supported by the toolkit (Part E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeStep {
    Month,
    Day,
    Hour,
    SixHour,
}

impl TimeStep {
    pub fn from_part_e(part_e: &str) -> Result<Self> {
        match part_e.trim().to_uppercase().as_str() {
            "1MON" => Ok(TimeStep::Month),
            "1DAY" => Ok(TimeStep::Day),
            "1HOUR" => Ok(TimeStep::Hour),
            "6HOUR" => Ok(TimeStep::SixHour),
            other => Err(CalSimError::format(format!(
                "Unsupported time step '{}'; expected one of 1MON, 1DAY, 1HOUR, 6HOUR",
                other
            ))),
        }
    }

    pub fn part_e(&self) -> &'static str {
        match self {
            TimeStep::Month => "1MON",
            TimeStep::Day => "1DAY",
            TimeStep::Hour => "1HOUR",
            TimeStep::SixHour => "6HOUR",
        }
    }

    /// Move `n` whole steps from `t`. Monthly steps always land on month ends.
    pub fn advance(&self, t: NaiveDateTime, n: i64) -> NaiveDateTime {
        match self {
            TimeStep::Month => {
                let index = t.year() as i64 * 12 + (t.month0() as i64) + n;
                let year = index.div_euclid(12) as i32;
                let month = index.rem_euclid(12) as u32 + 1;
                match NaiveDate::from_ymd_opt(year, month, 1) {
                    Some(first) => month_end(first).and_time(t.time()),
                    None => t,
                }
            }
            TimeStep::Day => t + Duration::days(n),
            TimeStep::Hour => t + Duration::hours(n),
            TimeStep::SixHour => t + Duration::hours(6 * n),
        }
    }

    /// Inclusive regular index between `start` and `end`.
    pub fn range(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<NaiveDateTime> {
        let first = match self {
            TimeStep::Month => month_end(start.date()).and_time(start.time()),
            _ => start,
        };
        let mut index = Vec::new();
        let mut current = first;
        while current <= end {
            index.push(current);
            current = self.advance(current, 1);
        }
        index
    }

    /// Infer the step of a regular index; needs at least three points.
    pub fn infer(index: &[NaiveDateTime]) -> Option<TimeStep> {
        if index.len() < 3 {
            return None;
        }
        [TimeStep::Month, TimeStep::Day, TimeStep::Hour, TimeStep::SixHour]
            .into_iter()
            .find(|step| {
                let aligned = match step {
                    TimeStep::Month => index.iter().all(|t| is_month_end(t.date())),
                    _ => true,
                };
                aligned && index.windows(2).all(|w| step.advance(w[0], 1) == w[1])
            })
    }
}

impl fmt::Display for TimeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.part_e())
    }
}

pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

pub fn is_month_end(date: NaiveDate) -> bool {
    month_end(date) == date
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let p = Pathname::parse("/CALSIM/S_SHSTA/STORAGE/01JAN1920/1MON/L2015A/").unwrap();
        assert_eq!(p.b, "S_SHSTA");
        assert_eq!(p.d, "01JAN1920");
        assert_eq!(
            p.clone().without_d().to_string(),
            "/CALSIM/S_SHSTA/STORAGE//1MON/L2015A/"
        );
        assert_eq!(p.time_step().unwrap(), TimeStep::Month);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Pathname::parse("CALSIM/S_SHSTA/STORAGE//1MON/L2015A/").is_err());
        assert!(Pathname::parse("/CALSIM/S_SHSTA/1MON/").is_err());
    }

    #[test]
    fn test_monthly_range_uses_month_ends() {
        let range = TimeStep::Month.range(dt(1921, 10, 31), dt(1922, 3, 31));
        assert_eq!(range.len(), 6);
        assert_eq!(range[1], dt(1921, 11, 30));
        assert_eq!(range[4], dt(1922, 2, 28));
    }

    #[test]
    fn test_monthly_range_from_mid_month() {
        let range = TimeStep::Month.range(dt(2000, 1, 15), dt(2000, 3, 31));
        assert_eq!(range, vec![dt(2000, 1, 31), dt(2000, 2, 29), dt(2000, 3, 31)]);
    }

    #[test]
    fn test_infer_step() {
        let monthly = TimeStep::Month.range(dt(1921, 10, 31), dt(1922, 9, 30));
        assert_eq!(TimeStep::infer(&monthly), Some(TimeStep::Month));

        let daily = TimeStep::Day.range(dt(2019, 9, 1), dt(2019, 9, 10));
        assert_eq!(TimeStep::infer(&daily), Some(TimeStep::Day));

        assert_eq!(TimeStep::infer(&monthly[..2]), None);
        assert_eq!(
            TimeStep::infer(&[dt(2000, 1, 1), dt(2000, 1, 2), dt(2000, 1, 5)]),
            None
        );
    }

    #[test]
    fn test_unknown_part_e() {
        assert!(TimeStep::from_part_e("IR-YEAR").is_err());
        assert_eq!(TimeStep::from_part_e("6hour").unwrap(), TimeStep::SixHour);
    }
}

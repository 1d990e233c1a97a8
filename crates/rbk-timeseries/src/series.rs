use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::SeriesError;

/// Ordered `(date, value)` sequence with strictly increasing dates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(NaiveDate, f64)>", into = "Vec<(NaiveDate, f64)>")]
pub struct TimeSeries {
    points: Vec<(NaiveDate, f64)>,
}

impl TryFrom<Vec<(NaiveDate, f64)>> for TimeSeries {
    type Error = SeriesError;

    fn try_from(points: Vec<(NaiveDate, f64)>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<TimeSeries> for Vec<(NaiveDate, f64)> {
    fn from(s: TimeSeries) -> Self {
        s.points
    }
}

impl TimeSeries {
    /// Build a series; rejects non-increasing dates.
    pub fn new(points: Vec<(NaiveDate, f64)>) -> Result<Self, SeriesError> {
        for (i, w) in points.windows(2).enumerate() {
            if w[0].0 >= w[1].0 {
                return Err(SeriesError::NotIncreasing {
                    index: i + 1,
                    prev: w[0].0,
                    next: w[1].0,
                });
            }
        }
        Ok(Self { points })
    }

    pub fn empty() -> Self {
        Self { points: Vec::new() }
    }

    pub fn from_parts(dates: &[NaiveDate], values: &[f64]) -> Result<Self, SeriesError> {
        if dates.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                dates: dates.len(),
                values: values.len(),
            });
        }
        Self::new(dates.iter().copied().zip(values.iter().copied()).collect())
    }

    /// One point per calendar day starting at `start`.
    pub fn daily(start: NaiveDate, values: &[f64]) -> Self {
        let points = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| start.checked_add_days(Days::new(i as u64)).map(|d| (d, *v)))
            .collect();
        Self { points }
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|(d, _)| *d).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, v)| *v).collect()
    }

    pub fn value(&self, index: usize) -> Option<f64> {
        self.points.get(index).map(|(_, v)| *v)
    }

    pub fn last(&self) -> Option<(NaiveDate, f64)> {
        self.points.last().copied()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.points.last().map(|(_, v)| *v)
    }

    /// Index of the last point dated on or before `date`.
    pub fn closest_prior_index(&self, date: NaiveDate) -> Option<usize> {
        let n = self.points.partition_point(|(d, _)| *d <= date);
        n.checked_sub(1)
    }

    /// Number of observations dated on or before `date`.
    pub fn count_up_to(&self, date: NaiveDate) -> usize {
        self.points.partition_point(|(d, _)| *d <= date)
    }

    // ---------------------------------------------------------------------
    // Slicing
    // ---------------------------------------------------------------------

    /// Points `start..=end` (indices clamped to the series).
    pub fn slice(&self, start: usize, end: usize) -> Self {
        if self.points.is_empty() || start > end || start >= self.points.len() {
            return Self::empty();
        }
        let end = end.min(self.points.len() - 1);
        Self {
            points: self.points[start..=end].to_vec(),
        }
    }

    /// Everything dated on or before `date`.
    pub fn up_to(&self, date: NaiveDate) -> Self {
        match self.closest_prior_index(date) {
            Some(idx) => self.slice(0, idx),
            None => Self::empty(),
        }
    }

    /// The last `len` observations ending at the closest prior index to
    /// `date`; the whole history up to `date` when `len` is `None`.
    pub fn window_ending(&self, date: NaiveDate, len: Option<usize>) -> Self {
        let Some(end) = self.closest_prior_index(date) else {
            return Self::empty();
        };
        let start = match len {
            Some(l) if l > 0 => (end + 1).saturating_sub(l),
            _ => 0,
        };
        self.slice(start, end)
    }

    /// Trailing `n` points.
    pub fn tail(&self, n: usize) -> Self {
        let start = self.points.len().saturating_sub(n);
        Self {
            points: self.points[start..].to_vec(),
        }
    }

    // ---------------------------------------------------------------------
    // Transforms
    // ---------------------------------------------------------------------

    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Self {
        Self {
            points: self.points.iter().map(|(d, v)| (*d, f(*v))).collect(),
        }
    }

    pub fn scale(&self, factor: f64) -> Self {
        self.map(|v| v * factor)
    }

    pub fn replace_nan(&self, with: f64) -> Self {
        self.map(|v| if v.is_nan() { with } else { v })
    }

    pub fn drop_nan(&self) -> Self {
        Self {
            points: self.points.iter().copied().filter(|(_, v)| !v.is_nan()).collect(),
        }
    }

    /// First difference. Same length; the first value is NaN.
    pub fn diff(&self) -> Self {
        self.lagged(1, |prev, cur| cur - prev)
    }

    /// Log returns `ln(v_t / v_{t-1})`. Same length; the first value is NaN.
    pub fn log_returns(&self) -> Self {
        self.lagged(1, |prev, cur| (cur / prev).ln())
    }

    /// Simple returns over `lag` observations. The first `lag` values are NaN.
    pub fn pct_change(&self, lag: usize) -> Self {
        self.lagged(lag, |prev, cur| cur / prev - 1.0)
    }

    fn lagged<F: Fn(f64, f64) -> f64>(&self, lag: usize, f: F) -> Self {
        let points = self
            .points
            .iter()
            .enumerate()
            .map(|(i, (d, v))| {
                if lag == 0 {
                    (*d, f(*v, *v))
                } else if i < lag {
                    (*d, f64::NAN)
                } else {
                    (*d, f(self.points[i - lag].1, *v))
                }
            })
            .collect();
        Self { points }
    }

    /// Pointwise sum, keeping `self`'s dates. `None` if lengths differ.
    pub fn add_aligned(&self, other: &TimeSeries) -> Option<Self> {
        if self.len() != other.len() {
            return None;
        }
        Some(Self {
            points: self
                .points
                .iter()
                .zip(other.points.iter())
                .map(|((d, a), (_, b))| (*d, a + b))
                .collect(),
        })
    }

    /// Reindex onto `grid`: exact-date values are kept, gaps carry the
    /// previous grid value forward, leading gaps are NaN.
    pub fn reindex_forward_fill(&self, grid: &[NaiveDate]) -> Self {
        let mut out = Vec::with_capacity(grid.len());
        let mut j = 0usize;
        let mut carried = f64::NAN;
        for &g in grid {
            while j < self.points.len() && self.points[j].0 < g {
                j += 1;
            }
            if j < self.points.len() && self.points[j].0 == g && !self.points[j].1.is_nan() {
                carried = self.points[j].1;
            }
            out.push((g, carried));
        }
        Self { points: out }
    }

    // ---------------------------------------------------------------------
    // Statistics (NaN-skipping)
    // ---------------------------------------------------------------------

    fn finite_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, v)| *v).filter(|v| !v.is_nan())
    }

    pub fn sum(&self) -> f64 {
        self.finite_values().sum()
    }

    pub fn mean(&self) -> Option<f64> {
        let n = self.finite_values().count();
        if n == 0 {
            return None;
        }
        Some(self.sum() / n as f64)
    }

    /// Sample standard deviation (n - 1). `None` with fewer than 2 values.
    pub fn std_dev(&self) -> Option<f64> {
        let n = self.finite_values().count();
        if n < 2 {
            return None;
        }
        let mean = self.mean()?;
        let ss: f64 = self.finite_values().map(|v| (v - mean).powi(2)).sum();
        Some((ss / (n as f64 - 1.0)).sqrt())
    }

    /// Root-mean-square of the values (zero-mean volatility estimate).
    /// 0.0 for an empty series.
    pub fn quadratic_variation(&self) -> f64 {
        let n = self.finite_values().count();
        if n == 0 {
            return 0.0;
        }
        let ss: f64 = self.finite_values().map(|v| v * v).sum();
        (ss / n as f64).sqrt()
    }

    pub fn max(&self) -> Option<(usize, f64)> {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, (_, v))| !v.is_nan())
            .fold(None, |acc, (i, (_, v))| match acc {
                Some((_, best)) if best >= *v => acc,
                _ => Some((i, *v)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn s(values: &[f64]) -> TimeSeries {
        TimeSeries::daily(d(1), values)
    }

    #[test]
    fn rejects_unordered_dates() {
        let err = TimeSeries::new(vec![(d(2), 1.0), (d(1), 2.0)]).unwrap_err();
        assert!(matches!(err, SeriesError::NotIncreasing { index: 1, .. }));
        assert!(TimeSeries::new(vec![(d(1), 1.0), (d(1), 2.0)]).is_err());
    }

    #[test]
    fn closest_prior_index_searches_backwards() {
        let ts = TimeSeries::new(vec![(d(2), 1.0), (d(5), 2.0), (d(9), 3.0)]).unwrap();
        assert_eq!(ts.closest_prior_index(d(1)), None);
        assert_eq!(ts.closest_prior_index(d(2)), Some(0));
        assert_eq!(ts.closest_prior_index(d(8)), Some(1));
        assert_eq!(ts.closest_prior_index(d(30)), Some(2));
        assert_eq!(ts.count_up_to(d(5)), 2);
    }

    #[test]
    fn window_ending_takes_trailing_observations() {
        let ts = s(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let w = ts.window_ending(d(4), Some(2));
        assert_eq!(w.values(), vec![3.0, 4.0]);
        let all = ts.window_ending(d(4), None);
        assert_eq!(all.len(), 4);
        assert!(ts.window_ending(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), Some(3)).is_empty());
    }

    #[test]
    fn diff_keeps_length_with_leading_nan() {
        let out = s(&[1.0, 3.0, 6.0]).diff();
        assert_eq!(out.len(), 3);
        assert!(out.value(0).unwrap().is_nan());
        assert_eq!(out.replace_nan(0.0).values(), vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn pct_change_over_lag() {
        let out = s(&[100.0, 110.0, 121.0]).pct_change(2);
        assert!(out.value(1).unwrap().is_nan());
        assert!((out.value(2).unwrap() - 0.21).abs() < 1e-12);
    }

    #[test]
    fn std_dev_and_quadratic_variation() {
        let ts = s(&[1.0, -1.0, 1.0, -1.0]);
        assert!((ts.quadratic_variation() - 1.0).abs() < 1e-12);
        let sd = ts.std_dev().unwrap();
        assert!((sd - (4.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(s(&[1.0]).std_dev(), None);
        assert_eq!(TimeSeries::empty().quadratic_variation(), 0.0);
    }

    #[test]
    fn statistics_skip_nan() {
        let ts = s(&[f64::NAN, 2.0, 4.0]);
        assert_eq!(ts.mean(), Some(3.0));
        assert_eq!(ts.max(), Some((2, 4.0)));
    }

    #[test]
    fn add_aligned_requires_equal_length() {
        let a = s(&[1.0, 2.0]);
        let b = s(&[10.0, 20.0]);
        assert_eq!(a.add_aligned(&b).unwrap().values(), vec![11.0, 22.0]);
        assert!(a.add_aligned(&s(&[1.0])).is_none());
    }

    #[test]
    fn reindex_carries_forward_and_leaves_leading_nan() {
        let sparse = TimeSeries::new(vec![(d(2), 5.0), (d(4), 7.0)]).unwrap();
        let grid: Vec<NaiveDate> = (1..=5).map(d).collect();
        let out = sparse.reindex_forward_fill(&grid);
        let v = out.values();
        assert!(v[0].is_nan());
        assert_eq!(&v[1..], &[5.0, 5.0, 7.0, 7.0]);
    }

    #[test]
    fn serde_round_trip_validates_order() {
        let ts = s(&[1.0, 2.0]);
        let json = serde_json::to_string(&ts).unwrap();
        let back: TimeSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);

        let bad = r#"[["2024-01-02", 1.0], ["2024-01-01", 2.0]]"#;
        assert!(serde_json::from_str::<TimeSeries>(bad).is_err());
    }
}

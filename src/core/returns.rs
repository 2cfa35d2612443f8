//! Return calculations over a loaded [`SampleSeries`].
//!
//! Each account is measured against its own first present observation, so
//! accounts that started being monitored at different times each carry their
//! own baseline.
use crate::core::sample::SampleSeries;
use chrono::{DateTime, Utc};

pub const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnPoint {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    /// Percent.
    pub value: f64,
}

/// First present value usable as a divisor, with its timestamp.
fn baseline(series: &SampleSeries, account: &str) -> Option<(usize, DateTime<Utc>, f64)> {
    series
        .first_observation(account)
        .filter(|(_, _, first)| *first != 0.0 && first.is_finite())
}

/// Percent change of each present observation relative to the baseline.
///
/// The baseline itself yields `0`. Rows before the baseline and rows where
/// the account is absent produce no point.
pub fn cumulative_returns(series: &SampleSeries, account: &str) -> Vec<ReturnPoint> {
    let Some((first_index, _, first)) = baseline(series, account) else {
        return Vec::new();
    };

    series
        .observations(account)
        .filter(|(index, _, _)| *index >= first_index)
        .map(|(index, timestamp, value)| ReturnPoint {
            index,
            timestamp,
            value: (value / first - 1.0) * 100.0,
        })
        .collect()
}

/// Linearly annualized return of each present observation.
///
/// `((value / first) - 1) / elapsed_years * 100`, where `elapsed_years` runs
/// from the baseline's timestamp. Observations at or before the baseline's
/// timestamp cannot be annualized and are skipped, so the baseline itself
/// never yields a point. Each point depends only on the baseline and the
/// observation, so the whole series is computed in one pass.
pub fn annualized_returns(series: &SampleSeries, account: &str) -> Vec<ReturnPoint> {
    let Some((first_index, first_timestamp, first)) = baseline(series, account) else {
        return Vec::new();
    };

    series
        .observations(account)
        .filter(|(index, _, _)| *index > first_index)
        .filter_map(|(index, timestamp, value)| {
            let elapsed_years = elapsed_years(first_timestamp, timestamp);
            if elapsed_years <= 0.0 {
                return None;
            }
            Some(ReturnPoint {
                index,
                timestamp,
                value: ((value / first - 1.0) / elapsed_years) * 100.0,
            })
        })
        .collect()
}

fn elapsed_years(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_YEAR
}

pub fn latest_cumulative_return(series: &SampleSeries, account: &str) -> Option<f64> {
    cumulative_returns(series, account).last().map(|p| p.value)
}

/// Annualized return at the account's latest present observation.
pub fn latest_annualized_return(series: &SampleSeries, account: &str) -> Option<f64> {
    let (latest_index, _, _) = series.latest_observation(account)?;
    annualized_returns(series, account)
        .last()
        .filter(|p| p.index == latest_index)
        .map(|p| p.value)
}

/// Summary of one account's history, as shown in reports.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountReturns {
    pub account: String,
    pub observations: usize,
    pub first: Option<(DateTime<Utc>, f64)>,
    pub latest: Option<(DateTime<Utc>, f64)>,
    pub cumulative: Option<f64>,
    pub annualized: Option<f64>,
}

impl AccountReturns {
    pub fn from_series(series: &SampleSeries, account: &str) -> Self {
        Self {
            account: account.to_string(),
            observations: series.observations(account).count(),
            first: series.first_observation(account).map(|(_, t, v)| (t, v)),
            latest: series.latest_observation(account).map(|(_, t, v)| (t, v)),
            cumulative: latest_cumulative_return(series, account),
            annualized: latest_annualized_return(series, account),
        }
    }
}

/// Summaries for every account column in the series, in column order.
pub fn summarize(series: &SampleSeries) -> Vec<AccountReturns> {
    series
        .accounts()
        .iter()
        .map(|account| AccountReturns::from_series(series, account))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sample::Sample;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
    }

    fn one_year() -> Duration {
        Duration::milliseconds((SECONDS_PER_YEAR * 1000.0) as i64)
    }

    fn series(rows: Vec<Sample>) -> SampleSeries {
        SampleSeries::from_samples(&rows)
    }

    #[test]
    fn test_one_year_fifty_percent() {
        let s = series(vec![
            Sample::new(t0()).with_value("A", Some(100.0)),
            Sample::new(t0() + one_year()).with_value("A", Some(150.0)),
        ]);

        let cumulative = cumulative_returns(&s, "A");
        assert_eq!(cumulative.len(), 2);
        assert_eq!(cumulative[0].value, 0.0);
        assert!((cumulative[1].value - 50.0).abs() < 1e-9);

        let annual = annualized_returns(&s, "A");
        assert_eq!(annual.len(), 1);
        assert_eq!(annual[0].index, 1);
        assert!((annual[0].value - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_late_starting_account_has_own_baseline() {
        let s = series(vec![
            Sample::new(t0())
                .with_value("A", Some(100.0))
                .with_value("B", None),
            Sample::new(t0() + Duration::days(1))
                .with_value("A", Some(110.0))
                .with_value("B", Some(50.0)),
        ]);

        let cumulative = cumulative_returns(&s, "B");
        assert_eq!(cumulative.len(), 1);
        assert_eq!(cumulative[0].index, 1);
        assert_eq!(cumulative[0].value, 0.0);
        assert!(annualized_returns(&s, "B").is_empty());
    }

    #[test]
    fn test_absent_values_are_skipped() {
        let s = series(vec![
            Sample::new(t0()).with_value("A", Some(100.0)),
            Sample::new(t0() + Duration::days(30)).with_value("A", None),
            Sample::new(t0() + Duration::days(60)).with_value("A", Some(120.0)),
        ]);

        let cumulative = cumulative_returns(&s, "A");
        assert_eq!(
            cumulative.iter().map(|p| p.index).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert!((cumulative[1].value - 20.0).abs() < 1e-9);

        let annual = annualized_returns(&s, "A");
        assert_eq!(annual.len(), 1);
        assert_eq!(annual[0].index, 2);
        let years = 60.0 * 86_400.0 / SECONDS_PER_YEAR;
        assert!((annual[0].value - 20.0 / years).abs() < 1e-6);
    }

    #[test]
    fn test_zero_baseline_yields_nothing() {
        let s = series(vec![
            Sample::new(t0()).with_value("A", Some(0.0)),
            Sample::new(t0() + Duration::days(1)).with_value("A", Some(10.0)),
        ]);
        assert!(cumulative_returns(&s, "A").is_empty());
        assert!(annualized_returns(&s, "A").is_empty());
        assert_eq!(latest_annualized_return(&s, "A"), None);
    }

    #[test]
    fn test_unknown_or_empty_account_yields_nothing() {
        let s = series(vec![Sample::new(t0()).with_value("A", None)]);
        assert!(cumulative_returns(&s, "A").is_empty());
        assert!(cumulative_returns(&s, "Z").is_empty());
        assert!(annualized_returns(&SampleSeries::default(), "A").is_empty());
    }

    #[test]
    fn test_non_increasing_timestamp_is_not_annualized() {
        let s = series(vec![
            Sample::new(t0()).with_value("A", Some(100.0)),
            Sample::new(t0()).with_value("A", Some(101.0)),
            Sample::new(t0() - Duration::hours(1)).with_value("A", Some(102.0)),
            Sample::new(t0() + Duration::days(365)).with_value("A", Some(110.0)),
        ]);

        let annual = annualized_returns(&s, "A");
        assert_eq!(annual.len(), 1);
        assert_eq!(annual[0].index, 3);

        // Cumulative return does not depend on elapsed time.
        assert_eq!(cumulative_returns(&s, "A").len(), 4);
    }

    #[test]
    fn test_latest_annualized_requires_latest_point() {
        let s = series(vec![
            Sample::new(t0()).with_value("A", Some(100.0)),
            Sample::new(t0() + one_year()).with_value("A", Some(120.0)),
            Sample::new(t0() + one_year() + Duration::days(1)).with_value("A", None),
        ]);
        let latest = latest_annualized_return(&s, "A").unwrap();
        assert!((latest - 20.0).abs() < 1e-6);

        let single = series(vec![Sample::new(t0()).with_value("A", Some(100.0))]);
        assert_eq!(latest_annualized_return(&single, "A"), None);
        assert_eq!(latest_cumulative_return(&single, "A"), Some(0.0));
    }

    #[test]
    fn test_summarize_each_account() {
        let s = series(vec![
            Sample::new(t0())
                .with_value("A", Some(100.0))
                .with_value("B", None),
            Sample::new(t0() + one_year())
                .with_value("A", Some(150.0))
                .with_value("B", Some(10.0)),
        ]);

        let summary = summarize(&s);
        assert_eq!(summary.len(), 2);

        let a = &summary[0];
        assert_eq!(a.account, "A");
        assert_eq!(a.observations, 2);
        assert_eq!(a.first, Some((t0(), 100.0)));
        assert!((a.cumulative.unwrap() - 50.0).abs() < 1e-9);
        assert!((a.annualized.unwrap() - 50.0).abs() < 1e-6);

        let b = &summary[1];
        assert_eq!(b.observations, 1);
        assert_eq!(b.cumulative, Some(0.0));
        assert_eq!(b.annualized, None);
    }
}

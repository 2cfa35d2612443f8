//! Recorded observations and their column-oriented view.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One tick: the value of every configured account, `None` where the tick
/// could not value it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub values: Vec<(String, Option<f64>)>,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, account: impl Into<String>, value: Option<f64>) -> Self {
        self.values.push((account.into(), value));
        self
    }

    pub fn value(&self, account: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(name, _)| name == account)
            .and_then(|(_, value)| *value)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }
}

/// Every persisted sample, in append order, with one column per account.
///
/// Built once from the store and never modified; derived series are new
/// values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleSeries {
    timestamps: Vec<DateTime<Utc>>,
    accounts: Vec<String>,
    columns: HashMap<String, Vec<Option<f64>>>,
}

impl SampleSeries {
    /// Builds the series; accounts missing from a sample are absent in that row.
    pub fn from_samples<'a, I>(samples: I) -> Self
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let mut series = SampleSeries::default();
        for (row, sample) in samples.into_iter().enumerate() {
            series.timestamps.push(sample.timestamp);
            for (account, value) in &sample.values {
                let column = series.columns.entry(account.clone()).or_insert_with(|| {
                    series.accounts.push(account.clone());
                    vec![None; row]
                });
                // Duplicate names within a sample: the first occurrence wins.
                if column.len() == row {
                    column.push(*value);
                }
            }
            for column in series.columns.values_mut() {
                if column.len() == row {
                    column.push(None);
                }
            }
        }
        series
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Account names in order of first appearance.
    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    pub fn column(&self, account: &str) -> Option<&[Option<f64>]> {
        self.columns.get(account).map(Vec::as_slice)
    }

    /// Present observations of `account` as `(index, timestamp, value)`.
    pub fn observations<'a>(
        &'a self,
        account: &str,
    ) -> impl Iterator<Item = (usize, DateTime<Utc>, f64)> + 'a {
        let column = self.column(account).unwrap_or(&[]);
        column
            .iter()
            .zip(self.timestamps.iter())
            .enumerate()
            .filter_map(|(index, (value, timestamp))| {
                value
                    .filter(|v| !v.is_nan())
                    .map(|v| (index, *timestamp, v))
            })
    }

    pub fn first_observation(&self, account: &str) -> Option<(usize, DateTime<Utc>, f64)> {
        self.observations(account).next()
    }

    pub fn latest_observation(&self, account: &str) -> Option<(usize, DateTime<Utc>, f64)> {
        self.observations(account).last()
    }

    /// Rebuilds the row view, in append order.
    pub fn to_samples(&self) -> Vec<Sample> {
        self.timestamps
            .iter()
            .enumerate()
            .map(|(row, timestamp)| Sample {
                timestamp: *timestamp,
                values: self
                    .accounts
                    .iter()
                    .map(|account| (account.clone(), self.columns[account][row]))
                    .collect(),
            })
            .collect()
    }
}

//! Time-indexed value sequences attached to device attributes.
//!
//! A [`Profile`] is an ordered sequence of `(timestamp, value)` pairs where
//! insertion order is chronological order. An empty profile means the device
//! attribute is static. Iteration is lazy and restartable: `iter()` borrows
//! and can be called any number of times.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GridError, GridResult};

/// Chronologically ordered `(timestamp, value)` sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile {
    points: Vec<(DateTime<Utc>, f64)>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a point. Timestamps must be non-decreasing; a point carrying
    /// the same timestamp as the current last replaces its value.
    pub fn push(&mut self, ts: DateTime<Utc>, value: f64) -> GridResult<()> {
        if let Some((last_ts, last_value)) = self.points.last_mut() {
            if ts < *last_ts {
                return Err(GridError::Validation(format!(
                    "profile point {} is earlier than preceding point {}",
                    ts, last_ts
                )));
            }
            if ts == *last_ts {
                *last_value = value;
                return Ok(());
            }
        }
        self.points.push((ts, value));
        Ok(())
    }

    /// Build a profile from unordered pairs: sorted by timestamp, with the
    /// last occurrence winning on duplicate stamps. Used by parsers whose
    /// source rows carry no ordering guarantee.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (DateTime<Utc>, f64)>) -> Self {
        let map: BTreeMap<DateTime<Utc>, f64> = pairs.into_iter().collect();
        Self {
            points: map.into_iter().collect(),
        }
    }

    /// Lazy, restartable iteration in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.points.iter().copied()
    }

    pub fn first(&self) -> Option<(DateTime<Utc>, f64)> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<(DateTime<Utc>, f64)> {
        self.points.last().copied()
    }

    /// Timestamp-union merge: points from both profiles are kept, with
    /// `incoming` winning whenever both carry the same timestamp.
    pub fn merge_union(&self, incoming: &Profile) -> Profile {
        let mut map: BTreeMap<DateTime<Utc>, f64> = self.points.iter().copied().collect();
        for (ts, value) in &incoming.points {
            map.insert(*ts, *value);
        }
        Profile {
            points: map.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Profile {
    type Item = (DateTime<Utc>, f64);
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, (DateTime<Utc>, f64)>>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter().copied()
    }
}

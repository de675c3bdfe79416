use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::{Error, Result};

/// Running rating aggregate of one laptop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rating {
    /// Number of accepted ratings.
    pub count: u32,
    /// Sum of accepted scores.
    pub sum: f64,
}

impl Rating {
    /// Mean score, `0.0` before the first rating.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / f64::from(self.count)
        }
    }
}

/// Rating aggregates keyed by laptop id.
///
/// Each laptop owns its own mutex: ratings of one laptop serialize, ratings
/// of different laptops never contend on the same lock. The map itself is
/// only locked long enough to fetch or create a slot.
#[derive(Clone, Default)]
pub struct RatingStore {
    ratings: Arc<DashMap<String, Arc<Mutex<Rating>>>>,
}

impl RatingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `score` to the aggregate of `laptop_id` and returns the new totals.
    ///
    /// The caller is responsible for checking that the laptop exists.
    pub fn add(&self, laptop_id: &str, score: f64) -> Result<Rating> {
        let slot = self
            .ratings
            .entry(laptop_id.to_string())
            .or_default()
            .clone();

        let mut rating = slot.lock();
        rating.count = rating
            .count
            .checked_add(1)
            .ok_or_else(|| Error::Internal(format!("rating count overflow for '{laptop_id}'")))?;
        rating.sum += score;

        Ok(*rating)
    }

    /// Current aggregate of `laptop_id`.
    pub fn get(&self, laptop_id: &str) -> Rating {
        self.ratings
            .get(laptop_id)
            .map(|slot| *slot.lock())
            .unwrap_or_default()
    }
}

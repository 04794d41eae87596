// src/simulation/results.rs
use std::collections::HashMap;
use std::fmt;

/// Holds the classical outcomes of a circuit execution.
/// Maps each measurement key to the value it produced: `0`/`1` for a
/// single-carrier measurement, the excitation total for a
/// `MeasureExcitations`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeasurementRecord {
    outcomes: HashMap<String, u32>,
}

impl MeasurementRecord {
    /// Creates a new, empty record. (Internal visibility)
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, replacing any earlier value under the same key.
    pub(crate) fn record(&mut self, key: &str, value: u32) {
        self.outcomes.insert(key.to_string(), value);
    }

    /// Gets the outcome recorded under `key`, if that measurement ran.
    pub fn get(&self, key: &str) -> Option<u32> {
        self.outcomes.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

impl fmt::Display for MeasurementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Measurement Record:")?;
        if self.outcomes.is_empty() {
            writeln!(f, "  No measurements were taken.")?;
        } else {
            // Sort by key for consistent output
            let mut sorted: Vec<_> = self.outcomes.iter().collect();
            sorted.sort_by_key(|(key, _)| key.as_str());
            for (key, value) in sorted {
                writeln!(f, "  {}: {}", key, value)?;
            }
        }
        Ok(())
    }
}

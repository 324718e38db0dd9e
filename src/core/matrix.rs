//! Build matrix expansion
//!
//! A matrix maps dimension names to value lists. Expansion yields the
//! cartesian product as one assignment per variant, dimensions ordered
//! by name and the last sorted dimension varying fastest.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One concrete choice of value for every dimension
pub type MatrixAssignment = BTreeMap<String, String>;

/// Named dimensions with their candidate values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixSpec(pub BTreeMap<String, Vec<String>>);

impl MatrixSpec {
    pub fn new(dimensions: BTreeMap<String, Vec<String>>) -> Self {
        Self(dimensions)
    }

    /// Number of variants the matrix expands to
    ///
    /// The empty matrix counts as one variant (the empty assignment);
    /// a dimension with no values collapses the product to zero.
    pub fn variant_count(&self) -> usize {
        self.0.values().map(Vec::len).product()
    }

    /// Iterate over every assignment in deterministic order
    pub fn assignments(&self) -> MatrixAssignments<'_> {
        MatrixAssignments {
            dimensions: self
                .0
                .iter()
                .map(|(name, values)| (name.as_str(), values.as_slice()))
                .collect(),
            index: 0,
            total: self.variant_count(),
        }
    }
}

/// Mixed-radix counter over the matrix dimensions
pub struct MatrixAssignments<'a> {
    dimensions: Vec<(&'a str, &'a [String])>,
    index: usize,
    total: usize,
}

impl Iterator for MatrixAssignments<'_> {
    type Item = MatrixAssignment;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.total {
            return None;
        }

        let mut assignment = MatrixAssignment::new();
        let mut remainder = self.index;
        // Decode from the last dimension so it is the fastest-varying digit
        for (name, values) in self.dimensions.iter().rev() {
            let slot = remainder % values.len();
            remainder /= values.len();
            assignment.insert(name.to_string(), values[slot].clone());
        }

        self.index += 1;
        Some(assignment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MatrixAssignments<'_> {}

//! Hierarchical, group-structured output for persisted geometry state.
//!
//! A [`Group`] is a tree of named datasets and child groups. The geometry
//! writes into it; where the tree ends up (a file, a test assertion) is the
//! caller's business.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single named value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dataset {
    Int(i64),
    Float(f64),
    Str(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
}

impl Dataset {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Dataset::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Dataset::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Dataset::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i64]> {
        match self {
            Dataset::IntArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_array(&self) -> Option<&[f64]> {
        match self {
            Dataset::FloatArray(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i32> for Dataset {
    fn from(v: i32) -> Self {
        Dataset::Int(v.into())
    }
}

impl From<i64> for Dataset {
    fn from(v: i64) -> Self {
        Dataset::Int(v)
    }
}

impl From<f64> for Dataset {
    fn from(v: f64) -> Self {
        Dataset::Float(v)
    }
}

impl From<&str> for Dataset {
    fn from(v: &str) -> Self {
        Dataset::Str(v.to_owned())
    }
}

impl From<String> for Dataset {
    fn from(v: String) -> Self {
        Dataset::Str(v)
    }
}

impl From<Vec<i64>> for Dataset {
    fn from(v: Vec<i64>) -> Self {
        Dataset::IntArray(v)
    }
}

impl From<Vec<f64>> for Dataset {
    fn from(v: Vec<f64>) -> Self {
        Dataset::FloatArray(v)
    }
}

impl From<[f64; 3]> for Dataset {
    fn from(v: [f64; 3]) -> Self {
        Dataset::FloatArray(v.to_vec())
    }
}

/// A named node holding datasets and child groups, both in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    datasets: BTreeMap<String, Dataset>,
    groups: BTreeMap<String, Group>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write (or overwrite) a dataset.
    pub fn write(&mut self, name: impl Into<String>, value: impl Into<Dataset>) {
        self.datasets.insert(name.into(), value.into());
    }

    /// Open a child group, creating it if needed.
    pub fn create_group(&mut self, name: impl Into<String>) -> &mut Group {
        self.groups.entry(name.into()).or_default()
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Look up a nested group by a `/`-separated path.
    pub fn path(&self, path: &str) -> Option<&Group> {
        path.split('/')
            .filter(|p| !p.is_empty())
            .try_fold(self, |g, part| g.group(part))
    }

    pub fn datasets(&self) -> &BTreeMap<String, Dataset> {
        &self.datasets
    }

    pub fn groups(&self) -> &BTreeMap<String, Group> {
        &self.groups
    }

    /// Total datasets in this group and all descendants.
    pub fn dataset_count(&self) -> usize {
        self.datasets.len() + self.groups.values().map(Group::dataset_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_groups_and_datasets() {
        let mut root = Group::new();
        root.write("n_cells", 2);
        let cells = root.create_group("cells");
        cells.create_group("cell 1").write("name", "fuel");
        cells.create_group("cell 2").write("temperature", vec![300.0, 600.0]);

        assert_eq!(root.dataset("n_cells").and_then(Dataset::as_int), Some(2));
        let fuel = root.path("cells/cell 1").unwrap();
        assert_eq!(fuel.dataset("name").and_then(Dataset::as_str), Some("fuel"));
        let temps = root.path("cells/cell 2").unwrap().dataset("temperature").unwrap();
        assert_eq!(temps.as_float_array(), Some(&[300.0, 600.0][..]));
        assert_eq!(root.dataset_count(), 3);
        assert!(root.path("cells/cell 9").is_none());
    }

    #[test]
    fn create_group_reopens_existing() {
        let mut root = Group::new();
        root.create_group("a").write("x", 1.5);
        root.create_group("a").write("y", 2.5);
        assert_eq!(root.group("a").unwrap().datasets().len(), 2);
    }
}

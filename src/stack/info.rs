use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use super::mirror::MirrorRecord;
use crate::error::StackError;
use crate::spatial::{StackOrientation, Xyz};

/// Response body of `{project_id}/stack/{stack_id}/info`.
///
/// Unknown fields are ignored; placement fields that are absent fall back to
/// an identity placement.
#[derive(Debug, Clone, Deserialize)]
pub struct StackInfo {
    pub dimension: Xyz<u64>,
    #[serde(default)]
    pub translation: Option<Xyz<Option<f64>>>,
    #[serde(default)]
    pub resolution: Option<Xyz<Option<f64>>>,
    #[serde(default)]
    pub orientation: StackOrientation,
    #[serde(default)]
    pub broken_slices: BrokenSlices,
    #[serde(default)]
    pub canary_location: Option<Xyz<i64>>,
    pub mirrors: Vec<MirrorRecord>,
}

impl StackInfo {
    pub fn from_json(value: serde_json::Value) -> Result<Self, StackError> {
        serde_json::from_value(value).map_err(|e| StackError::InvalidStackInfo(e.to_string()))
    }
}

/// Broken slices arrive either as a list of indices or, from older servers,
/// as an object keyed by slice index.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BrokenSlices {
    List(Vec<i64>),
    Map(BTreeMap<String, serde_json::Value>),
}

impl Default for BrokenSlices {
    fn default() -> Self {
        BrokenSlices::List(Vec::new())
    }
}

impl BrokenSlices {
    pub fn to_set(&self) -> Result<BTreeSet<i64>, StackError> {
        match self {
            BrokenSlices::List(slices) => Ok(slices.iter().copied().collect()),
            BrokenSlices::Map(slices) => slices
                .keys()
                .map(|k| {
                    k.trim().parse::<i64>().map_err(|_| {
                        StackError::InvalidStackInfo(format!("broken slice key {k:?} is not an integer"))
                    })
                })
                .collect(),
        }
    }
}

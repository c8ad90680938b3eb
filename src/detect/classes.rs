use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

/// How a model class id maps to an entry of the class-name table.
///
/// Some models emit ids shifted relative to the dataset's name list
/// (e.g. COCO ids with a background slot), others need an explicit lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelOffset {
    Fixed(usize),
    Map(BTreeMap<usize, usize>),
}

impl Default for LabelOffset {
    fn default() -> Self {
        LabelOffset::Fixed(0)
    }
}

impl LabelOffset {
    fn resolve(&self, class_id: usize) -> Option<usize> {
        match self {
            LabelOffset::Fixed(offset) => class_id.checked_add(*offset),
            LabelOffset::Map(map) => map.get(&class_id).copied(),
        }
    }
}

/// Class-name table supplied by the model.
///
/// Its length fixes the number of per-class counters; a class id is valid
/// when it indexes into it.
#[derive(Clone, Debug)]
pub struct ClassTable {
    names: Vec<String>,
    offset: LabelOffset,
}

/// Two-class accept/defect table used when no model table is configured.
impl Default for ClassTable {
    fn default() -> Self {
        Self {
            names: vec!["good".to_string(), "defect".to_string()],
            offset: LabelOffset::default(),
        }
    }
}

impl ClassTable {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(anyhow!("class table must contain at least one class"));
        }
        Ok(Self {
            names,
            offset: LabelOffset::default(),
        })
    }

    pub fn with_offset(mut self, offset: LabelOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, class_id: usize) -> bool {
        class_id < self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn offset(&self) -> &LabelOffset {
        &self.offset
    }

    /// Display name for a model class id, after applying the label offset.
    pub fn name(&self, class_id: usize) -> Option<&str> {
        self.offset
            .resolve(class_id)
            .and_then(|idx| self.names.get(idx))
            .map(String::as_str)
    }
}

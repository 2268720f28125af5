use std::collections::BTreeMap;

use crate::{ClassifierError, IOName, Result, Shape, Tensor};

/// Raw value produced by one graph output.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputValue {
    Tensor(Tensor),
    Strings { shape: Shape, values: Vec<String> },
    MapSequence(Vec<BTreeMap<String, f32>>),
}

impl OutputValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            OutputValue::Tensor(_) => "numeric tensor",
            OutputValue::Strings { .. } => "string tensor",
            OutputValue::MapSequence(_) => "sequence of maps",
        }
    }
}

/// Named outputs of one inference call, in the order the graph returned them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelOutputs {
    values: Vec<(IOName, OutputValue)>,
}

impl ModelOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: IOName, value: OutputValue) {
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn with(mut self, name: &str, value: OutputValue) -> Self {
        self.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&OutputValue> {
        self.values
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v)
    }

    pub fn require(&self, name: &str) -> Result<&OutputValue> {
        self.get(name)
            .ok_or_else(|| ClassifierError::invalid_output(name, "missing from inference results"))
    }

    pub fn names(&self) -> impl Iterator<Item = &IOName> {
        self.values.iter().map(|(n, _)| n)
    }
}

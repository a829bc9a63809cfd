use super::UserTreePathStop;
use serde::{Deserialize, Serialize};

/// A named, ordered list of stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTreePath {
    id: String,
    name: String,
    stops: Vec<UserTreePathStop>,
}

impl UserTreePath {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stops: Vec::new(),
        }
    }

    pub fn with_stops(mut self, stops: Vec<UserTreePathStop>) -> Self {
        self.stops = stops;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stops(&self) -> &[UserTreePathStop] {
        &self.stops
    }

    pub fn stop(&self, index: usize) -> Option<&UserTreePathStop> {
        self.stops.get(index)
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn stops_mut(&mut self) -> &mut Vec<UserTreePathStop> {
        &mut self.stops
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("Label already in use: {0}")]
    Duplicate(String),
}

/// Hands out unique string labels and tracks labels that came from a file.
///
/// The counter only moves forward, so a label freed by a deletion is not
/// handed out again by `next_label`. It can still be reclaimed explicitly
/// through `add_existing_label`, which is what an undo does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueLabeller {
    prefix: String,
    next: u64,
    labels: BTreeSet<String>,
}

impl UniqueLabeller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn next_label(&mut self) -> String {
        loop {
            let candidate = format!("{}{}", self.prefix, self.next);
            self.next += 1;
            if self.labels.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    pub fn add_existing_label(&mut self, label: &str) -> Result<(), LabelError> {
        if !self.labels.insert(label.to_string()) {
            return Err(LabelError::Duplicate(label.to_string()));
        }
        // Keep generated labels clear of numbered labels read from a file.
        if let Some(num) = label
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.parse::<u64>().ok())
            && num >= self.next
        {
            self.next = num + 1;
        }
        Ok(())
    }

    pub fn remove_label(&mut self, label: &str) -> bool {
        self.labels.remove(label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

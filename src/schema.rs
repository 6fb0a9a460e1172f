// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Expected class schema for specialized models.
//!
//! A freshly loaded model is validated against a [`ClassSchema`] to confirm it
//! is the intended specialized model rather than a generic detector that
//! happened to load. Validation is by class-id set only; label strings are not
//! a reliable identity signal and are never compared.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::{DetectError, Result};

/// The set of class ids a specialized model is expected to expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSchema {
    ids: BTreeSet<usize>,
}

impl ClassSchema {
    /// Create a schema from an arbitrary set of class ids.
    pub fn new<I: IntoIterator<Item = usize>>(ids: I) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// The schema of the specialized pipe model: exactly two classes, ids 0 and 1.
    #[must_use]
    pub fn pipe() -> Self {
        Self::new([0, 1])
    }

    /// Number of classes the schema expects.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.ids.len()
    }

    /// Expected class ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.ids.iter().copied()
    }

    /// Check whether a model's class mapping satisfies this schema.
    ///
    /// Only the id set matters; any labels are acceptable.
    #[must_use]
    pub fn matches(&self, names: &HashMap<usize, String>) -> bool {
        names.len() == self.ids.len() && names.keys().all(|id| self.ids.contains(id))
    }

    /// Validate a model's class mapping against this schema.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::SchemaMismatch`] carrying the expected schema and
    /// the model's actual class ids when the id set does not match.
    pub fn validate(&self, identifier: &str, names: &HashMap<usize, String>) -> Result<()> {
        if self.matches(names) {
            return Ok(());
        }
        let mut found: Vec<usize> = names.keys().copied().collect();
        found.sort_unstable();
        Err(DetectError::SchemaMismatch {
            identifier: identifier.to_string(),
            expected: self.clone(),
            found,
        })
    }
}

impl fmt::Display for ClassSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names_of(ids: &[usize]) -> HashMap<usize, String> {
        ids.iter().map(|&id| (id, format!("class{id}"))).collect()
    }

    #[test]
    fn test_pipe_schema_accepts_any_labels() {
        let schema = ClassSchema::pipe();

        let mut names = HashMap::new();
        names.insert(0, "pipe".to_string());
        names.insert(1, "coupling".to_string());
        assert!(schema.matches(&names));

        // Labels are irrelevant, even numeric strings
        let mut names = HashMap::new();
        names.insert(0, "0".to_string());
        names.insert(1, "1".to_string());
        assert!(schema.matches(&names));
        assert!(schema.validate("m", &names).is_ok());
    }

    #[test]
    fn test_wrong_count_rejected() {
        let schema = ClassSchema::pipe();
        assert!(!schema.matches(&names_of(&[0])));
        assert!(!schema.matches(&names_of(&[0, 1, 2])));

        // A generic 80-class model must never pass as the pipe model
        let coco: Vec<usize> = (0..80).collect();
        assert!(!schema.matches(&names_of(&coco)));
    }

    #[test]
    fn test_wrong_id_set_rejected() {
        let schema = ClassSchema::pipe();
        let err = schema.validate("m", &names_of(&[1, 2])).unwrap_err();
        match err {
            DetectError::SchemaMismatch {
                identifier, found, ..
            } => {
                assert_eq!(identifier, "m");
                assert_eq!(found, vec![1, 2]);
            }
            other => panic!("expected SchemaMismatch, got {other}"),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ClassSchema::pipe().to_string(), "{0, 1}");
        assert_eq!(ClassSchema::new([]).to_string(), "{}");
    }
}

//! Flow records as stored in the document collection.
//!
//! Records are validated before the tree builder recurses into them, so a
//! malformed document is rejected with a clear error instead of propagating
//! missing fields into the composed flow.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

/// A flow document: trigger keywords, reply texts, optional media, and
/// optional named child records.
///
/// `childrens` (sic — the stored field name) uses a `BTreeMap` so child
/// order within one record is deterministic even though store iteration
/// order is not.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowRecord {
    pub keywords: Vec<String>,
    pub answers: Vec<String>,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub childrens: Option<BTreeMap<String, FlowRecord>>,
}

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("{0}: keywords must not be empty")]
    EmptyKeywords(String),

    #[error("{0}: answers must not be empty")]
    EmptyAnswers(String),

    #[error("{0}: childrens is present but empty")]
    EmptyChildren(String),
}

impl FlowRecord {
    /// Validate this record and all nested child records.
    ///
    /// Invariants: `keywords` and `answers` are non-empty; `childrens`, when
    /// present, is non-empty and each value is itself valid. Errors carry
    /// the path to the offending record (e.g. `root/childrens.precios`).
    pub fn validate(&self, path: &str) -> Result<(), RecordError> {
        if self.keywords.is_empty() {
            return Err(RecordError::EmptyKeywords(path.to_string()));
        }
        if self.answers.is_empty() {
            return Err(RecordError::EmptyAnswers(path.to_string()));
        }
        if let Some(children) = &self.childrens {
            if children.is_empty() {
                return Err(RecordError::EmptyChildren(path.to_string()));
            }
            for (key, child) in children {
                child.validate(&format!("{path}/childrens.{key}"))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(keywords: &[&str], answers: &[&str]) -> FlowRecord {
        FlowRecord {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            answers: answers.iter().map(|s| s.to_string()).collect(),
            media: None,
            childrens: None,
        }
    }

    #[test]
    fn valid_leaf_passes() {
        assert!(leaf(&["hola"], &["Bienvenido"]).validate("root").is_ok());
    }

    #[test]
    fn empty_keywords_rejected() {
        let err = leaf(&[], &["Bienvenido"]).validate("root").unwrap_err();
        assert_eq!(err, RecordError::EmptyKeywords("root".into()));
    }

    #[test]
    fn empty_answers_rejected() {
        let err = leaf(&["hola"], &[]).validate("root").unwrap_err();
        assert_eq!(err, RecordError::EmptyAnswers("root".into()));
    }

    #[test]
    fn empty_children_map_rejected() {
        let mut record = leaf(&["hola"], &["Bienvenido"]);
        record.childrens = Some(BTreeMap::new());
        let err = record.validate("root").unwrap_err();
        assert_eq!(err, RecordError::EmptyChildren("root".into()));
    }

    #[test]
    fn nested_error_carries_path() {
        let mut record = leaf(&["hola"], &["Bienvenido"]);
        record.childrens = Some(BTreeMap::from([(
            "precios".to_string(),
            leaf(&[], &["Lista de precios"]),
        )]));
        let err = record.validate("root").unwrap_err();
        assert_eq!(
            err,
            RecordError::EmptyKeywords("root/childrens.precios".into())
        );
    }

    #[test]
    fn deserializes_from_plain_json() {
        let record: FlowRecord = serde_json::from_value(serde_json::json!({
            "keywords": ["hola", "buenas"],
            "answers": ["Bienvenido"],
            "childrens": {
                "horario": {"keywords": ["horario"], "answers": ["Abrimos a las 9"]}
            }
        }))
        .unwrap();
        assert_eq!(record.keywords.len(), 2);
        assert!(record.media.is_none());
        assert_eq!(record.childrens.as_ref().unwrap().len(), 1);
    }
}

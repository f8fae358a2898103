use std::collections::HashSet;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Label used for padding slots in a tile and for points that no tile prediction ever covered
pub const LABEL_PADDING: u8 = u8::MAX;

/// Mapping between the raw classification codes of a source cloud and the contiguous label indices the
/// model works with. The position of a code in the map is its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct ClassMap {
    codes: Vec<u8>,
}

impl ClassMap {
    /// Creates a new `ClassMap` from the given classification codes. Fails if `codes` is empty, contains
    /// duplicates, or is too large to be addressed without colliding with `LABEL_PADDING`
    pub fn new(codes: Vec<u8>) -> Result<Self> {
        if codes.is_empty() {
            return Err(PipelineError::InvalidConfig("Class map must not be empty".into()).into());
        }
        if codes.len() >= LABEL_PADDING as usize {
            return Err(PipelineError::InvalidConfig(format!(
                "Class map holds {} classes, at most {} are supported",
                codes.len(),
                LABEL_PADDING as usize - 1
            ))
            .into());
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = codes.iter().find(|code| !seen.insert(**code)) {
            return Err(PipelineError::InvalidConfig(format!(
                "Classification code {} appears more than once in the class map",
                duplicate
            ))
            .into());
        }
        Ok(Self { codes })
    }

    pub fn num_classes(&self) -> usize {
        self.codes.len()
    }

    pub fn codes(&self) -> &[u8] {
        &self.codes
    }

    /// Returns the label index of the raw classification `code`
    pub fn label_of(&self, code: u8) -> Option<u8> {
        self.codes
            .iter()
            .position(|c| *c == code)
            .map(|label| label as u8)
    }

    /// Returns the raw classification code of `label`
    pub fn code_of(&self, label: u8) -> Option<u8> {
        self.codes.get(label as usize).copied()
    }
}

impl Default for ClassMap {
    /// The classification codes 0 to 8
    fn default() -> Self {
        Self {
            codes: (0..9).collect(),
        }
    }
}

impl TryFrom<Vec<u8>> for ClassMap {
    type Error = anyhow::Error;

    fn try_from(codes: Vec<u8>) -> Result<Self> {
        Self::new(codes)
    }
}

impl From<ClassMap> for Vec<u8> {
    fn from(classes: ClassMap) -> Self {
        classes.codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_and_code_lookup() -> Result<()> {
        let classes = ClassMap::new(vec![1, 2, 6, 9])?;
        assert_eq!(classes.num_classes(), 4);
        assert_eq!(classes.label_of(6), Some(2));
        assert_eq!(classes.label_of(7), None);
        assert_eq!(classes.code_of(3), Some(9));
        assert_eq!(classes.code_of(4), None);
        Ok(())
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let err = ClassMap::new(vec![1, 2, 1]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_json_roundtrip_validates() {
        let classes: ClassMap = serde_json::from_str("[2, 5]").unwrap();
        assert_eq!(classes.codes(), &[2, 5]);
        assert!(serde_json::from_str::<ClassMap>("[]").is_err());
    }
}

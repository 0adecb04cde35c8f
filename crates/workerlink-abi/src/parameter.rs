//! Worker parameter declarations

use crate::error::AbiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Accepted value kind for a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    String,
    ArrayOfStrings,
    Boolean,
    Credential,
    Integer,
    Requirements,
}

impl ParameterKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ParameterKind::String => "string",
            ParameterKind::ArrayOfStrings => "array_of_strings",
            ParameterKind::Boolean => "boolean",
            ParameterKind::Credential => "credential",
            ParameterKind::Integer => "integer",
            ParameterKind::Requirements => "requirements",
        }
    }

    /// JSON Schema `type` used when publishing the parameter
    pub const fn json_type(self) -> &'static str {
        match self {
            ParameterKind::String | ParameterKind::Credential => "string",
            ParameterKind::ArrayOfStrings | ParameterKind::Requirements => "array",
            ParameterKind::Boolean => "boolean",
            ParameterKind::Integer => "integer",
        }
    }
}

impl FromStr for ParameterKind {
    type Err = AbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(ParameterKind::String),
            "array_of_strings" => Ok(ParameterKind::ArrayOfStrings),
            "boolean" => Ok(ParameterKind::Boolean),
            "credential" => Ok(ParameterKind::Credential),
            "integer" => Ok(ParameterKind::Integer),
            "requirements" => Ok(ParameterKind::Requirements),
            other => Err(AbiError::UnknownParameterKind(other.to_string())),
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parameter a worker accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub identifier: String,
    pub label: String,
    pub kinds: Vec<ParameterKind>,
    pub required: bool,
}

impl ParameterDescriptor {
    /// A required parameter accepting a single kind
    pub fn required(identifier: impl Into<String>, label: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            identifier: identifier.into(),
            label: label.into(),
            kinds: vec![kind],
            required: true,
        }
    }

    /// An optional parameter accepting a single kind
    pub fn optional(identifier: impl Into<String>, label: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            required: false,
            ..Self::required(identifier, label, kind)
        }
    }

    /// Accept one more kind
    pub fn with_kind(mut self, kind: ParameterKind) -> Self {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
        self
    }

    pub fn validate(&self) -> Result<(), AbiError> {
        let invalid = |reason: &str| AbiError::InvalidParameter {
            identifier: self.identifier.clone(),
            reason: reason.to_string(),
        };

        if self.identifier.trim().is_empty() {
            return Err(invalid("identifier must not be empty"));
        }
        if self.kinds.is_empty() {
            return Err(invalid("at least one kind is required"));
        }
        if self.identifier.contains('\0') || self.label.contains('\0') {
            return Err(invalid("contains a NUL byte"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in [
            ParameterKind::String,
            ParameterKind::ArrayOfStrings,
            ParameterKind::Boolean,
            ParameterKind::Credential,
            ParameterKind::Integer,
            ParameterKind::Requirements,
        ] {
            assert_eq!(kind, kind.as_str().parse().unwrap());
        }
        assert!("float".parse::<ParameterKind>().is_err());
    }

    #[test]
    fn test_json_types() {
        assert_eq!("string", ParameterKind::Credential.json_type());
        assert_eq!("array", ParameterKind::Requirements.json_type());
        assert_eq!("array", ParameterKind::ArrayOfStrings.json_type());
    }

    #[test]
    fn test_validation() {
        let ok = ParameterDescriptor::required("source_path", "Source path", ParameterKind::String);
        assert!(ok.validate().is_ok());

        let empty = ParameterDescriptor::required("  ", "Blank", ParameterKind::String);
        assert!(empty.validate().is_err());

        let mut no_kind = ParameterDescriptor::optional("x", "X", ParameterKind::String);
        no_kind.kinds.clear();
        assert!(no_kind.validate().is_err());
    }

    #[test]
    fn test_with_kind_deduplicates() {
        let descriptor = ParameterDescriptor::optional("limit", "Limit", ParameterKind::Integer)
            .with_kind(ParameterKind::String)
            .with_kind(ParameterKind::Integer);
        assert_eq!(vec![ParameterKind::Integer, ParameterKind::String], descriptor.kinds);
        assert!(!descriptor.required);
    }
}

//! Serializer and deserializer settings.
//!
//! With the `serde` feature enabled these structs can be loaded from an
//! application's own configuration file; missing keys fall back to
//! [`Default`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Interpretation chains longer than this are treated as cycles.
pub const DEFAULT_MAX_INTERPRETATION_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SerializerConfig {
    /// Write null fields, collection items and map values as BSON null
    /// instead of omitting them.
    pub include_null_fields: bool,
    /// Names of interpretations the serializer may fall back to, in
    /// priority order.
    pub enable_interpretations: Vec<String>,
    pub max_interpretation_depth: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            include_null_fields: true,
            enable_interpretations: Vec::new(),
            max_interpretation_depth: DEFAULT_MAX_INTERPRETATION_DEPTH,
        }
    }
}

impl SerializerConfig {
    pub fn with_include_null_fields(mut self, include: bool) -> Self {
        self.include_null_fields = include;
        self
    }

    pub fn with_interpretation(mut self, name: impl Into<String>) -> Self {
        self.enable_interpretations.push(name.into());
        self
    }

    pub fn with_max_interpretation_depth(mut self, depth: usize) -> Self {
        self.max_interpretation_depth = depth;
        self
    }
}

/// What the decoder does when a wire value cannot be stored in its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum MismatchPolicy {
    /// Abort with `BsonError::TypeMismatch`.
    #[default]
    Error,
    /// Consume the value and leave the target at its default.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct DeserializerConfig {
    /// Keys with no matching object field are skipped rather than rejected.
    pub allow_unknown_fields: bool,
    /// Non-nullable object fields must be present and non-null.
    pub require_fields: bool,
    pub on_type_mismatch: MismatchPolicy,
    pub enable_interpretations: Vec<String>,
    pub max_interpretation_depth: usize,
}

impl Default for DeserializerConfig {
    fn default() -> Self {
        Self {
            allow_unknown_fields: true,
            require_fields: false,
            on_type_mismatch: MismatchPolicy::Error,
            enable_interpretations: Vec::new(),
            max_interpretation_depth: DEFAULT_MAX_INTERPRETATION_DEPTH,
        }
    }
}

impl DeserializerConfig {
    /// Unknown fields rejected, required fields enforced, mismatches fatal.
    pub fn strict() -> Self {
        Self {
            allow_unknown_fields: false,
            require_fields: true,
            ..Self::default()
        }
    }

    /// Unknown fields skipped and mismatched values dropped.
    pub fn lenient() -> Self {
        Self {
            on_type_mismatch: MismatchPolicy::Skip,
            ..Self::default()
        }
    }

    pub fn with_allow_unknown_fields(mut self, allow: bool) -> Self {
        self.allow_unknown_fields = allow;
        self
    }

    pub fn with_require_fields(mut self, require: bool) -> Self {
        self.require_fields = require;
        self
    }

    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.on_type_mismatch = policy;
        self
    }

    pub fn with_interpretation(mut self, name: impl Into<String>) -> Self {
        self.enable_interpretations.push(name.into());
        self
    }

    pub fn with_max_interpretation_depth(mut self, depth: usize) -> Self {
        self.max_interpretation_depth = depth;
        self
    }
}

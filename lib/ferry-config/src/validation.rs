//! Parameter group validation.
//!
//! Every parameter group validates itself into a [`ValidationResult`] tree instead of failing on the first problem, so
//! operators see every misconfigured field in a single report.
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

/// Outcome of validating a field or group.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// The value is acceptable.
    Valid,

    /// The value is missing or malformed.
    Invalid,
}

impl ValidationStatus {
    /// Returns `true` if the status is [`Valid`][ValidationStatus::Valid].
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    fn label(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
        }
    }
}

/// Kind of node in a validation tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    /// A parameter group.
    Group,

    /// A single field within a group.
    Field,

    /// A map of named parameter groups.
    Map,
}

/// The result of validating a parameter group.
///
/// A result is a tree: groups contain field results, nested group results, and map results keyed by map entry. A node
/// is invalid if it was marked invalid itself or if any of its descendants is invalid.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationResult {
    name: String,
    kind: ValidationKind,
    status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    fields: IndexMap<String, ValidationResult>,
}

impl ValidationResult {
    /// Creates a new, valid result for the parameter group with the given name.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self::with_kind(name.into(), ValidationKind::Group)
    }

    fn with_kind(name: String, kind: ValidationKind) -> Self {
        Self {
            name,
            kind,
            status: ValidationStatus::Valid,
            message: None,
            fields: IndexMap::new(),
        }
    }

    fn absorb(&mut self, field: String, result: ValidationResult) {
        if !result.is_valid() {
            self.status = ValidationStatus::Invalid;
        }
        self.fields.insert(field, result);
    }

    /// Records the result of validating a single field.
    pub fn set_result<F, M>(&mut self, field: F, status: ValidationStatus, message: M)
    where
        F: Into<String>,
        M: Into<String>,
    {
        let field = field.into();
        let mut result = Self::with_kind(field.clone(), ValidationKind::Field);
        result.status = status;
        result.message = Some(message.into()).filter(|message| !message.is_empty());
        self.absorb(field, result);
    }

    /// Records the result of validating a nested parameter group.
    pub fn set_group_result<F: Into<String>>(&mut self, field: F, result: ValidationResult) {
        self.absorb(field.into(), result);
    }

    /// Records the results of validating a map of parameter groups, keyed by map entry.
    ///
    /// An empty map produces a valid map node; whether a map may be empty is up to the caller.
    pub fn set_map_result<F, I>(&mut self, field: F, results: I)
    where
        F: Into<String>,
        I: IntoIterator<Item = (String, ValidationResult)>,
    {
        let field = field.into();
        let mut map = Self::with_kind(field.clone(), ValidationKind::Map);
        for (key, result) in results {
            map.absorb(key, result);
        }
        self.absorb(field, map);
    }

    /// Marks this result as invalid with the given message, without attributing it to a field.
    pub fn set_invalid<M: Into<String>>(&mut self, message: M) {
        self.status = ValidationStatus::Invalid;
        self.message = Some(message.into());
    }

    /// Name of the group, field, or map this result describes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overall status.
    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    /// Returns `true` if neither this node nor any descendant is invalid.
    pub fn is_valid(&self) -> bool {
        self.status.is_valid()
    }

    /// Message attached to this node, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Gets the result for the given child field, group, or map entry.
    pub fn field(&self, name: &str) -> Option<&ValidationResult> {
        self.fields.get(name)
    }

    /// Lists every invalid node that carries a message, as a period-separated path paired with that message.
    pub fn invalid_fields(&self) -> Vec<(String, String)> {
        let mut invalid = Vec::new();
        self.collect_invalid(None, &mut invalid);
        invalid
    }

    fn collect_invalid(&self, path: Option<&str>, invalid: &mut Vec<(String, String)>) {
        if self.is_valid() {
            return;
        }
        if let Some(message) = &self.message {
            invalid.push((path.unwrap_or(&self.name).to_string(), message.clone()));
        }
        for (key, child) in &self.fields {
            let child_path = match path {
                Some(path) => format!("{}.{}", path, key),
                None => key.clone(),
            };
            child.collect_invalid(Some(&child_path), invalid);
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        let kind = match self.kind {
            ValidationKind::Group => "parameter group",
            ValidationKind::Field => "field",
            ValidationKind::Map => "parameter group map",
        };
        write!(f, "{}{} \"{}\" {}", indent, kind, self.name, self.status.label())?;
        if let Some(message) = &self.message {
            write!(f, ", {}", message)?;
        }
        writeln!(f)?;

        for child in self.fields.values().filter(|child| !child.is_valid()) {
            child.render(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

/// A named, self-validating group of configuration parameters.
///
/// Groups are immutable once loaded and are shared through the [`ParameterService`][crate::ParameterService].
pub trait ParameterGroup: Send + Sync + 'static {
    /// Name of the group, used as its registry key.
    fn name(&self) -> &str;

    /// Validates every field of the group, returning a complete report.
    fn validate(&self) -> ValidationResult;
}

/// Returns `true` if the string parameter is present and contains something other than whitespace.
pub fn validate_string_parameter<'a, S>(value: S) -> bool
where
    S: Into<Option<&'a str>>,
{
    value.into().is_some_and(|value| !value.trim().is_empty())
}

/// Returns `true` if the integer parameter is strictly positive.
pub fn validate_int_parameter(value: i64) -> bool {
    value > 0
}

/// Records the result of a string parameter check on `result`, with a standard message.
pub fn check_string_parameter<'a, S>(result: &mut ValidationResult, field: &str, value: S)
where
    S: Into<Option<&'a str>>,
{
    if validate_string_parameter(value) {
        result.set_result(field, ValidationStatus::Valid, "");
    } else {
        result.set_result(field, ValidationStatus::Invalid, "must be a non-blank string");
    }
}

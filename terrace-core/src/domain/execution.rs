//! Template executors

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Template language of an executor
///
/// Unknown tags decode into [`TemplateType::Unknown`] and are rejected when the
/// execution is dispatched, naming the offending execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TemplateType {
    /// Structured-text templating
    GoTemplate,
    /// Declarative YAML merge templating
    Spiff,
    Unknown(String),
}

impl TemplateType {
    pub fn as_str(&self) -> &str {
        match self {
            TemplateType::GoTemplate => "GoTemplate",
            TemplateType::Spiff => "Spiff",
            TemplateType::Unknown(other) => other,
        }
    }
}

impl From<String> for TemplateType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "GoTemplate" => TemplateType::GoTemplate,
            "Spiff" => TemplateType::Spiff,
            _ => TemplateType::Unknown(value),
        }
    }
}

impl From<TemplateType> for String {
    fn from(value: TemplateType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured template of a blueprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateExecutor {
    pub name: String,
    #[serde(rename = "type")]
    pub template_type: TemplateType,
    /// Inline template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<serde_json::Value>,
    /// Path of a template file in the blueprint filesystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Where the template of an executor comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemplateSource<'a> {
    Inline(&'a serde_json::Value),
    File(&'a str),
}

impl TemplateExecutor {
    /// Creates an executor with an inline template
    pub fn inline(
        name: impl Into<String>,
        template_type: TemplateType,
        template: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            template_type,
            template: Some(template),
            file: None,
        }
    }

    /// Creates an executor reading its template from the blueprint filesystem
    pub fn from_file(
        name: impl Into<String>,
        template_type: TemplateType,
        file: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            template_type,
            template: None,
            file: Some(file.into()),
        }
    }

    /// Returns the template source; exactly one of `template` and `file` must be set
    pub fn source(&self) -> Result<TemplateSource<'_>> {
        let file = self.file.as_deref().filter(|f| !f.is_empty());
        match (&self.template, file) {
            (Some(_), Some(_)) => Err(CoreError::InvalidTemplateExecutor {
                name: self.name.clone(),
                reason: "only one of template and file may be set".to_string(),
            }),
            (Some(inline), None) => Ok(TemplateSource::Inline(inline)),
            (None, Some(path)) => Ok(TemplateSource::File(path)),
            (None, None) => Err(CoreError::InvalidTemplateExecutor {
                name: self.name.clone(),
                reason: "no template found".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_type_tags() {
        let exec: TemplateExecutor = serde_json::from_value(json!({
            "name": "main",
            "type": "GoTemplate",
            "template": "deployItems: []"
        }))
        .unwrap();
        assert_eq!(exec.template_type, TemplateType::GoTemplate);

        let exec: TemplateExecutor = serde_json::from_value(json!({
            "name": "other",
            "type": "Jinja",
            "file": "x.j2"
        }))
        .unwrap();
        assert_eq!(exec.template_type, TemplateType::Unknown("Jinja".to_string()));
    }

    #[test]
    fn test_template_source_exactly_one() {
        let inline = TemplateExecutor::inline("a", TemplateType::Spiff, json!({"x": 1}));
        assert!(matches!(inline.source().unwrap(), TemplateSource::Inline(_)));

        let file = TemplateExecutor::from_file("b", TemplateType::Spiff, "t.yaml");
        assert_eq!(file.source().unwrap(), TemplateSource::File("t.yaml"));

        let mut both = inline.clone();
        both.file = Some("t.yaml".to_string());
        assert!(both.source().is_err());

        let mut none = inline;
        none.template = None;
        let err = none.source().unwrap_err();
        assert!(err.to_string().contains("no template found"));
    }
}

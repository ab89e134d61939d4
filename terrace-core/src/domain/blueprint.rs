//! Blueprint definitions
//!
//! A blueprint is the `blueprint.yaml` document plus the filesystem it was
//! loaded from. Template executors and subinstallations may reference files
//! relative to that filesystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::execution::TemplateExecutor;
use super::import::{ImportDefinition, ImportType, find_import};
use super::installation::InstallationTemplate;
use crate::error::{CoreError, Result};
use crate::fs::FileSystem;

/// Name of the blueprint document at the filesystem root
pub const BLUEPRINT_FILE_NAME: &str = "blueprint.yaml";

/// An export declared by a blueprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub export_type: ImportType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_type: String,
}

/// A subinstallation either inline or stored in a blueprint file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubinstallationDefinition {
    File { file: String },
    Inline(InstallationTemplate),
}

/// Content of `blueprint.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintDefinition {
    #[serde(default)]
    pub imports: Vec<ImportDefinition>,
    #[serde(default)]
    pub exports: Vec<ExportDefinition>,
    #[serde(default)]
    pub import_executions: Vec<TemplateExecutor>,
    #[serde(default)]
    pub deploy_executions: Vec<TemplateExecutor>,
    #[serde(default)]
    pub subinstallation_executions: Vec<TemplateExecutor>,
    #[serde(default)]
    pub export_executions: Vec<TemplateExecutor>,
    #[serde(default)]
    pub subinstallations: Vec<SubinstallationDefinition>,
}

impl BlueprintDefinition {
    /// Looks up an import, including conditional imports at any depth
    pub fn get_import_by_name(&self, name: &str) -> Option<&ImportDefinition> {
        find_import(&self.imports, name)
    }
}

/// A loaded blueprint
#[derive(Clone)]
pub struct Blueprint {
    pub info: BlueprintDefinition,
    pub fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blueprint")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Blueprint {
    pub fn new(info: BlueprintDefinition, fs: Arc<dyn FileSystem>) -> Self {
        Self { info, fs }
    }

    /// Loads `blueprint.yaml` from the root of the given filesystem
    pub fn from_fs(fs: Arc<dyn FileSystem>) -> Result<Self> {
        let data = fs.read_file(BLUEPRINT_FILE_NAME).map_err(|source| CoreError::Io {
            path: BLUEPRINT_FILE_NAME.to_string(),
            source,
        })?;
        let info: BlueprintDefinition =
            serde_yaml::from_slice(&data).map_err(|e| CoreError::decode("blueprint", e))?;
        Ok(Self { info, fs })
    }

    pub fn get_import_by_name(&self, name: &str) -> Option<&ImportDefinition> {
        self.info.get_import_by_name(name)
    }

    /// Reads a file relative to the blueprint root
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.fs.read_file(path).map_err(|source| CoreError::Io {
            path: path.to_string(),
            source,
        })
    }

    /// Returns all static subinstallations, reading file references
    pub fn get_subinstallations(&self) -> Result<Vec<InstallationTemplate>> {
        self.info
            .subinstallations
            .iter()
            .map(|sub| match sub {
                SubinstallationDefinition::Inline(template) => Ok(template.clone()),
                SubinstallationDefinition::File { file } => {
                    let data = self.read_file(file)?;
                    serde_yaml::from_slice(&data).map_err(|e| {
                        CoreError::decode(format!("subinstallation file {:?}", file), e)
                    })
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    const BLUEPRINT: &str = r#"
imports:
  - name: cluster
    type: target
    targetType: kubernetes-cluster
  - name: config
    type: data
    schema:
      type: object
    conditionalImports:
      - name: extra
        type: data
        required: false
deployExecutions:
  - name: main
    type: GoTemplate
    file: deploy.tpl
subinstallations:
  - file: sub.yaml
  - name: inline
    blueprint:
      ref: cd://resources/inline-blueprint
"#;

    const SUB: &str = r#"
name: from-file
blueprint:
  ref: cd://resources/sub-blueprint
imports:
  data:
    - name: config
      dataRef: config
"#;

    fn blueprint() -> Blueprint {
        let fs = MemoryFs::new()
            .with_file(BLUEPRINT_FILE_NAME, BLUEPRINT)
            .with_file("sub.yaml", SUB);
        Blueprint::from_fs(Arc::new(fs)).unwrap()
    }

    #[test]
    fn test_load_blueprint() {
        let bp = blueprint();
        assert_eq!(bp.info.imports.len(), 2);
        assert_eq!(bp.info.deploy_executions[0].file.as_deref(), Some("deploy.tpl"));
        assert_eq!(bp.get_import_by_name("extra").unwrap().is_required(), false);
    }

    #[test]
    fn test_get_subinstallations() {
        let subs = blueprint().get_subinstallations().unwrap();
        let names: Vec<_> = subs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["from-file", "inline"]);
        assert_eq!(subs[0].imports.data[0].data_ref, "config");
    }

    #[test]
    fn test_missing_blueprint_file() {
        let err = Blueprint::from_fs(Arc::new(MemoryFs::new())).unwrap_err();
        assert!(err.to_string().contains("blueprint.yaml"));
    }
}

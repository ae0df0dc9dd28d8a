//! Resource templates and the loader that reads them.
//!
//! Each state owns a directory of YAML manifests under the assets root.
//! A template is a parsed object plus the role of each of its containers,
//! which transforms use instead of hard-coding container names.

use crate::error::ControllerError;
use crate::transform::common::pod_spec;
use cluster_client::{ClusterObject, ObjectKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Annotation mapping container names to roles (`name=role,name2=role2`)
pub const CONTAINER_ROLES_ANNOTATION: &str = "nvidia.com/gpu-operator.container-roles";

/// What a container does inside an operand pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerRole {
    /// The operand itself
    Main,
    /// Driver companion loading the peer memory module
    RdmaSidecar,
    /// Init container waiting for the RDMA stack
    RdmaValidation,
    /// Init container waiting for the driver
    DriverValidation,
    /// Init container waiting for the toolkit
    ToolkitValidation,
    /// Init container running a CUDA workload
    CudaValidation,
    /// Init container running a device-plugin workload
    PluginValidation,
}

impl ContainerRole {
    /// Annotation value of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerRole::Main => "main",
            ContainerRole::RdmaSidecar => "rdma-sidecar",
            ContainerRole::RdmaValidation => "rdma-validation",
            ContainerRole::DriverValidation => "driver-validation",
            ContainerRole::ToolkitValidation => "toolkit-validation",
            ContainerRole::CudaValidation => "cuda-validation",
            ContainerRole::PluginValidation => "plugin-validation",
        }
    }

    /// Validation init containers run the validator image
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ContainerRole::RdmaValidation
                | ContainerRole::DriverValidation
                | ContainerRole::ToolkitValidation
                | ContainerRole::CudaValidation
                | ContainerRole::PluginValidation
        )
    }
}

impl FromStr for ContainerRole {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let role = match s {
            "main" => ContainerRole::Main,
            "rdma-sidecar" => ContainerRole::RdmaSidecar,
            "rdma-validation" => ContainerRole::RdmaValidation,
            "driver-validation" => ContainerRole::DriverValidation,
            "toolkit-validation" => ContainerRole::ToolkitValidation,
            "cuda-validation" => ContainerRole::CudaValidation,
            "plugin-validation" => ContainerRole::PluginValidation,
            other => return Err(ControllerError::InvalidTemplate(format!("unknown container role '{}'", other))),
        };
        Ok(role)
    }
}

impl fmt::Display for ContainerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container name to role mapping of one template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRoles(BTreeMap<String, ContainerRole>);

impl ContainerRoles {
    /// Parse the roles annotation
    pub fn parse(annotation: &str) -> Result<Self, ControllerError> {
        let mut roles = BTreeMap::new();
        for entry in annotation.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, role) = entry.split_once('=').ok_or_else(|| {
                ControllerError::InvalidTemplate(format!("malformed container role entry '{}'", entry))
            })?;
            roles.insert(name.trim().to_string(), role.trim().parse()?);
        }
        Ok(Self(roles))
    }

    /// Assign a role to a container
    pub fn insert(&mut self, container: impl Into<String>, role: ContainerRole) {
        self.0.insert(container.into(), role);
    }

    /// Role of a container, if any
    pub fn role_of(&self, container: &str) -> Option<ContainerRole> {
        self.0.get(container).copied()
    }
}

/// One manifest of a state
#[derive(Debug, Clone)]
pub struct ResourceTemplate {
    /// The object as authored, without the roles annotation
    pub object: ClusterObject,
    /// Roles of the pod template's containers
    pub roles: ContainerRoles,
}

impl ResourceTemplate {
    /// Build a template from a parsed manifest.
    ///
    /// The roles annotation is consumed here. Without one, the first
    /// container of a pod template is the main container.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ControllerError> {
        let mut object = ClusterObject::from_value(value)
            .map_err(|e| ControllerError::InvalidTemplate(format!("cannot decode manifest: {}", e)))?;

        if matches!(object.kind(), ObjectKind::Pod | ObjectKind::Node) {
            return Err(ControllerError::InvalidTemplate(format!(
                "{} is not a template kind",
                object.key()
            )));
        }

        let annotation = object
            .meta_mut()
            .annotations
            .as_mut()
            .and_then(|a| a.remove(CONTAINER_ROLES_ANNOTATION));
        if object.meta().annotations.as_ref().is_some_and(BTreeMap::is_empty) {
            object.meta_mut().annotations = None;
        }

        let roles = match annotation {
            Some(annotation) => ContainerRoles::parse(&annotation)?,
            None => default_roles(&object),
        };
        Ok(Self { object, roles })
    }

    /// Kind of the templated object
    pub fn kind(&self) -> ObjectKind {
        self.object.kind()
    }

    /// Name of the templated object
    pub fn name(&self) -> &str {
        self.object.name()
    }
}

fn default_roles(object: &ClusterObject) -> ContainerRoles {
    let mut roles = ContainerRoles::default();
    if let Some(first) = pod_spec(object).and_then(|p| p.containers.first()) {
        roles.insert(first.name.clone(), ContainerRole::Main);
    }
    roles
}

/// Parse a (possibly multi-document) YAML stream into templates
pub fn parse_documents(text: &str) -> Result<Vec<ResourceTemplate>, ControllerError> {
    let mut templates = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_json::Value::deserialize(document)
            .map_err(|e| ControllerError::TemplateLoad(format!("invalid YAML: {}", e)))?;
        if value.is_null() {
            continue;
        }
        templates.push(ResourceTemplate::from_value(value)?);
    }
    Ok(templates)
}

/// Source of the templates of each state
pub trait TemplateLoader: Send + Sync {
    /// Load every template of a state, in apply order
    fn load(&self, state_name: &str) -> Result<Vec<ResourceTemplate>, ControllerError>;
}

/// Loads templates from `<root>/<state>/*.yaml` in lexical file order
#[derive(Debug, Clone)]
pub struct FileTemplateLoader {
    root: PathBuf,
}

impl FileTemplateLoader {
    /// Create a loader rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>, ControllerError> {
        let entries = fs::read_dir(dir)
            .map_err(|e| ControllerError::TemplateLoad(format!("cannot read {}: {}", dir.display(), e)))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| ControllerError::TemplateLoad(format!("cannot read {}: {}", dir.display(), e)))?
                .path();
            let is_yaml = path.extension().and_then(|e| e.to_str()).is_some_and(|e| e == "yaml" || e == "yml");
            if path.is_file() && is_yaml {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl TemplateLoader for FileTemplateLoader {
    fn load(&self, state_name: &str) -> Result<Vec<ResourceTemplate>, ControllerError> {
        let dir = self.root.join(state_name);
        let mut templates = Vec::new();
        for file in Self::manifest_files(&dir)? {
            let text = fs::read_to_string(&file)
                .map_err(|e| ControllerError::TemplateLoad(format!("cannot read {}: {}", file.display(), e)))?;
            let parsed = parse_documents(&text).map_err(|e| match e {
                ControllerError::TemplateLoad(msg) => {
                    ControllerError::TemplateLoad(format!("{}: {}", file.display(), msg))
                }
                other => other,
            })?;
            debug!("Loaded {} template(s) from {}", parsed.len(), file.display());
            templates.extend(parsed);
        }
        if templates.is_empty() {
            return Err(ControllerError::TemplateLoad(format!("no manifests found in {}", dir.display())));
        }
        Ok(templates)
    }
}

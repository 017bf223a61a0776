// Workflow template input sections and parameter merging.
// Only the slice the controllers need: augmenting an existing template's
// input section with extra parameter declarations. Declaration validation
// and the substitution language live upstream.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One declared input parameter of a workflow template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub required: bool,
}

/// The input section of a workflow template, split into file inputs and
/// plain (non-file) parameters. `BTreeMap` keeps declaration order stable
/// for serialization and comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateInputs {
    #[serde(default)]
    pub files: BTreeMap<String, ParameterDecl>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterDecl>,
}

/// A workflow template, reduced to the parts the execution controllers
/// touch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub name: String,
    #[serde(default)]
    pub inputs: TemplateInputs,
}

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    /// The merged input section declares the same identifier as both a file
    /// input and a plain parameter.
    #[error("parameter identifier '{0}' collides between the file and non-file input sections")]
    ParameterCollision(String),
}

/// Merge `extra` parameter declarations into the template's non-file input
/// section. A declaration with an identifier already present replaces the
/// prior one. Fails if a resulting identifier appears in both input
/// sections.
pub fn augment(
    mut template: WorkflowTemplate,
    extra: BTreeMap<String, ParameterDecl>,
) -> Result<WorkflowTemplate, TemplateError> {
    for (name, decl) in extra {
        template.inputs.parameters.insert(name, decl);
    }

    for name in template.inputs.parameters.keys() {
        if template.inputs.files.contains_key(name) {
            return Err(TemplateError::ParameterCollision(name.clone()));
        }
    }

    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(description: &str) -> ParameterDecl {
        ParameterDecl {
            description: Some(description.to_string()),
            default: None,
            required: false,
        }
    }

    fn template() -> WorkflowTemplate {
        let mut inputs = TemplateInputs::default();
        inputs.files.insert("dataset".to_string(), decl("input data"));
        inputs
            .parameters
            .insert("threshold".to_string(), decl("cutoff"));
        WorkflowTemplate {
            name: "benchmark".to_string(),
            inputs,
        }
    }

    #[test]
    fn augment_adds_new_parameters() {
        let mut extra = BTreeMap::new();
        extra.insert("iterations".to_string(), decl("loop count"));
        let merged = augment(template(), extra).unwrap();
        assert!(merged.inputs.parameters.contains_key("iterations"));
        assert!(merged.inputs.parameters.contains_key("threshold"));
    }

    #[test]
    fn augment_replaces_prior_declaration_on_tie() {
        let mut extra = BTreeMap::new();
        extra.insert("threshold".to_string(), decl("replacement"));
        let merged = augment(template(), extra).unwrap();
        assert_eq!(
            merged.inputs.parameters["threshold"].description.as_deref(),
            Some("replacement")
        );
    }

    #[test]
    fn augment_rejects_cross_section_collision() {
        let mut extra = BTreeMap::new();
        extra.insert("dataset".to_string(), decl("clashes with file input"));
        let err = augment(template(), extra).unwrap_err();
        assert_eq!(
            err,
            TemplateError::ParameterCollision("dataset".to_string())
        );
    }
}

use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssembleError>;

/// Processing stage a failure is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Read,
    Parse,
    Validate,
    Transform,
    Save,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Read => "read",
            Stage::Parse => "parse",
            Stage::Validate => "validate",
            Stage::Transform => "transform",
            Stage::Save => "save",
        };
        f.write_str(s)
    }
}

/// Who supplied the input that failed to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Client,
    Server,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    Client,
    Server,
}

#[derive(Error, Debug)]
pub enum AssembleError {
    /// A template or uploaded package could not be read.
    #[error("failed to load {what}: {cause:#}")]
    Load {
        what: String,
        origin: Origin,
        cause: anyhow::Error,
    },

    /// Input does not match what the job expects. Raised before any mutation.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("{stage} failed: {cause:#}")]
    Stage { stage: Stage, cause: anyhow::Error },

    #[error("failed to serialize document: {0:#}")]
    Serialize(anyhow::Error),
}

/// Body of a structured error response.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub stage: Option<Stage>,
    pub class: ErrorClass,
}

impl AssembleError {
    pub fn load(what: impl Into<String>, origin: Origin, cause: anyhow::Error) -> Self {
        AssembleError::Load {
            what: what.into(),
            origin,
            cause,
        }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        AssembleError::SchemaMismatch(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            AssembleError::Load {
                origin: Origin::Client,
                ..
            }
            | AssembleError::SchemaMismatch(_) => ErrorClass::Client,
            AssembleError::Load { .. }
            | AssembleError::Stage { .. }
            | AssembleError::Serialize(_) => ErrorClass::Server,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            AssembleError::Load { .. } => Some(Stage::Read),
            AssembleError::SchemaMismatch(_) => Some(Stage::Validate),
            AssembleError::Stage { stage, .. } => Some(*stage),
            AssembleError::Serialize(_) => Some(Stage::Save),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            stage: self.stage(),
            class: self.class(),
        }
    }
}

/// Attaches a [`Stage`] to an `anyhow` result.
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for anyhow::Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|cause| AssembleError::Stage { stage, cause })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn client_load_errors_are_client_class() {
        let err = AssembleError::load("upload.docx", Origin::Client, anyhow!("bad zip"));
        assert_eq!(err.class(), ErrorClass::Client);
        let err = AssembleError::load("template.docx", Origin::Server, anyhow!("missing"));
        assert_eq!(err.class(), ErrorClass::Server);
    }

    #[test]
    fn stage_is_named_in_message_and_response() {
        let res: anyhow::Result<()> = Err(anyhow!("inner")).map_err(|e: anyhow::Error| e.context("outer"));
        let err = res.stage(Stage::Transform).unwrap_err();
        assert_eq!(err.to_string(), "transform failed: outer: inner");
        let body = serde_json::to_value(err.to_response()).expect("json");
        assert_eq!(body["stage"], "transform");
        assert_eq!(body["class"], "server");
    }

    #[test]
    fn schema_mismatch_reports_validate_stage() {
        let err = AssembleError::schema("expected 3 images, got 2");
        assert_eq!(err.stage(), Some(Stage::Validate));
        assert_eq!(err.class(), ErrorClass::Client);
    }
}

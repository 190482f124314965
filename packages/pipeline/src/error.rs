use crate::fetch::FetchError;
use serde::Serialize;
use thiserror::Error;
use wikitext_parser::{ParseError, SerializeError};

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures that end a request.
///
/// Leniency fallbacks in the tokenizer and shape mismatches in extensions are
/// absorbed where they happen and never show up here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Stage '{stage}' failed: {message}")]
    StageFailure {
        stage: String,
        message: String,
        code: u16,
    },

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Selective serialization needs the original source: {0}")]
    MissingProvenanceSource(SerializeError),

    #[error("Serialization failed: {0}")]
    Serialize(SerializeError),

    #[error("Provenance check failed: {0}")]
    InvalidProvenance(#[from] ParseError),

    #[error("Expansion of '{target}' exceeded the maximum depth of {depth}")]
    ExpansionLoop { target: String, depth: usize },

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

impl PipelineError {
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageFailure {
            stage: stage.into(),
            message: message.into(),
            code: 500,
        }
    }

    /// Failure reported from inside a stage that does not know its own name;
    /// the manager fills the name in.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::stage("", message)
    }

    /// Attribute an unnamed stage failure to `stage`. Other errors keep their
    /// own variant and code.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            Self::StageFailure {
                stage: current,
                message,
                code,
            } if current.is_empty() => Self::StageFailure {
                stage: stage.to_string(),
                message,
                code,
            },
            other => other,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationInvalid(message.into())
    }

    /// HTTP-like status code for the error channel.
    pub fn code(&self) -> u16 {
        match self {
            PipelineError::StageFailure { code, .. } => *code,
            PipelineError::ConfigurationInvalid(_) => 400,
            PipelineError::MissingProvenanceSource(_) => 409,
            PipelineError::Serialize(_) | PipelineError::InvalidProvenance(_) => 500,
            PipelineError::ExpansionLoop { .. } => 508,
            PipelineError::Timeout(_) => 504,
            PipelineError::Fetch(FetchError::NotFound(_)) => 404,
            PipelineError::Fetch(FetchError::Transport(_)) => 502,
        }
    }

    pub fn report(&self, context: impl Into<String>) -> ErrorReport {
        ErrorReport {
            message: self.to_string(),
            context: context.into(),
            code: self.code(),
        }
    }
}

impl From<SerializeError> for PipelineError {
    fn from(err: SerializeError) -> Self {
        match err {
            SerializeError::MissingSource { .. } => PipelineError::MissingProvenanceSource(err),
            other => PipelineError::Serialize(other),
        }
    }
}

/// What the error channel carries: a message, diagnostic context and a status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub message: String,
    pub context: String,
    pub code: u16,
}

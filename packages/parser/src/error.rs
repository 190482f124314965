use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

/// Violations of the provenance invariants found when validating a tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Source range [{start}, {end}) is outside the source text (length {len})")]
    InvalidRange { start: usize, end: usize, len: usize },
}

impl ParseError {
    pub fn invalid_range(start: usize, end: usize, len: usize) -> Self {
        Self::InvalidRange { start, end, len }
    }
}

pub type SerializeResult<T> = Result<T, SerializeError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SerializeError {
    #[error("Node claims source range [{start}, {end}) but no original source text was supplied")]
    MissingSource { start: usize, end: usize },

    #[error("Source range [{start}, {end}) does not fit the original source (length {len})")]
    InvalidRange { start: usize, end: usize, len: usize },
}

impl SerializeError {
    pub fn missing_source(start: usize, end: usize) -> Self {
        Self::MissingSource { start, end }
    }

    pub fn invalid_range(start: usize, end: usize, len: usize) -> Self {
        Self::InvalidRange { start, end, len }
    }
}

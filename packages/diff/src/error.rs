use thiserror::Error;

pub type DiffResult<T> = Result<T, DiffError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("Diff record does not match the base text at byte {offset}")]
    Mismatch { offset: usize },
}

impl DiffError {
    pub fn mismatch(offset: usize) -> Self {
        Self::Mismatch { offset }
    }
}

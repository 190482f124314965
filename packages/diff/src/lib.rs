//! Line and word level differences between two markup texts.

pub mod engine;
pub mod error;
pub mod record;
pub mod render;

pub use engine::{diff, diff_lines, diff_words, refine, DEFAULT_WORD_DIFF_MAX_BYTES};
pub use error::{DiffError, DiffResult};
pub use record::{apply, DiffRecord, Segment};
pub use render::{render_markup, DiffSummary};

//! Batch ROUGE evaluation of chat models.
//!
//! [`load`] reads and validates a JSON dataset of instruction/input/output
//! records, [`generate_batch`] runs each record through a [`Generator`], and
//! [`aggregate`] scores the replies against the references.

pub mod aggregate;
pub mod error;
pub mod generate;
pub mod ir;
pub mod load;
pub mod score;
pub mod stats;

pub use aggregate::{ScoreReport, aggregate, aggregate_with};
pub use error::{EvalError, EvalResult};
pub use generate::{
    Batch, FailurePolicy, GenerateOptions, GenerateOptionsBuilder, Generator, SamplingConfig,
    SamplingConfigBuilder, SystemPrompt, generate_batch,
};
pub use load::{Record, load, normalize};

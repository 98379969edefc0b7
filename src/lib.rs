#![recursion_limit = "256"]

pub mod application;
pub mod cli;
pub mod data;
pub mod domain;
pub mod infra;
pub mod ml;

pub use domain::{
    error::{ModelError, ModelResult},
    options::{EmbeddingRepr, ForwardMode},
    sequence::SequenceBatch,
};
pub use ml::{
    debug::DebugSession,
    model::{ForwardOutput, SasRec, SasRecConfig},
};

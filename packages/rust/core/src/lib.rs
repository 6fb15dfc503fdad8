//! Run orchestration for Flashnotes.
//!
//! Ties the catalog, transcript, summarizer and storage crates together
//! into one sequential, resumable run (see [`pipeline::Pipeline`]).

pub mod pipeline;

pub use pipeline::{
    ItemOutcome, ItemReport, ItemStage, Pipeline, ProgressReporter, RunReport, RunState,
    SilentProgress,
};

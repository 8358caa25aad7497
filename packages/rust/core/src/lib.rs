//! Harvest orchestration for Lorebook.
//!
//! Ties the fetcher, stage extractors, image normalizer and dedup store into
//! a full run ([`harvest`]) and produces the run summary ([`write_summary`]).

mod dispatcher;
pub mod pipeline;
pub mod summary;

#[cfg(test)]
mod test_site;

pub use pipeline::{HarvestDeps, HarvestReport, ProgressReporter, SilentProgress, harvest};
pub use summary::{LoreExport, RunMeta, SummaryOutput, export_file_name, write_summary};

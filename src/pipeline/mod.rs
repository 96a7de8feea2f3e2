//! Pipeline stages for bulletin processing.
//!
//! - `classify`: decide whether and how loudly to notify
//! - `render`: fill notification templates per language
//! - `publish`: upload images and per-language artifacts
//! - `poller`: the per-source fetch/dedup/notify loop
//! - `setup`: build pollers from configuration

pub mod classify;
pub mod poller;
pub mod publish;
pub mod render;
pub mod setup;

pub use classify::RelevanceClassifier;
pub use poller::{CycleOutcome, PipelineContext, Poller, next_sleep};
pub use publish::Publisher;
pub use render::{render, render_tier};
pub use setup::Runtime;

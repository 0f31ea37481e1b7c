//! Lifecycle progress events emitted by the generation pipeline.
//!
//! The core calls into a [`ProgressSink`] at well-defined points instead of
//! logging presentation markers; the CLI decides how (or whether) to render
//! them.

use std::path::Path;

/// Receiver for pipeline lifecycle events. All methods default to no-ops so
/// sinks implement only what they present.
pub trait ProgressSink: Send + Sync {
    /// Overview schema and diagram generation is starting for `root`.
    fn overview_started(&self, _root: &Path) {}

    /// Overview generation finished; `diagram` is the produced `.d2` file,
    /// if any.
    fn overview_finished(&self, _diagram: Option<&Path>) {}

    /// Background unit regeneration is starting for `count` units.
    fn units_started(&self, _count: usize) {}

    /// A unit's artifacts were forwarded from the previous run.
    fn unit_reused(&self, _unit_id: &str) {}

    /// Background unit regeneration finished.
    fn units_finished(&self) {}
}

/// Sink that ignores every event. Used when the overlay is disabled.
pub struct NullSink;

impl ProgressSink for NullSink {}

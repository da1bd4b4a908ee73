//! Core engine — resolve outcomes, reconcile events, aggregate the export.

pub mod resolver;
pub mod reconciler;
pub mod aggregator;

//! End-to-end runs of the aggregator against a deterministic fetcher and
//! a temporary TSV store.

mod runs;

//! Periodic scanning and candidate selection.
//!
//! This module handles:
//! - The cancellable scan loop (refresh, persist, rank, strategy)
//! - Two-stage ranking with order books priced only for the head
//! - Strategy callbacks, including the annualized threshold strategy

pub mod runner;
pub mod strategy;
pub mod top;

pub use runner::{CycleReport, ScanLoop, ScanSettings, SharedStore};
pub use strategy::{Selection, Strategy, ThresholdStrategy};
pub use top::{top_n_opportunities, RankedOpportunity};

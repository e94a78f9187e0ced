// src/policy/mod.rs

//! Change-impact policy gate
//!
//! Decides whether a set of changed paths requires a semantic-version bump,
//! and whether that requirement has been fulfilled (marker bumped plus a
//! changelog entry for the new version). Runs in a continuous-integration
//! context; the deployment transactions share only the version utility
//! with this module.

pub mod changelog;
pub mod check;
pub mod rules;

pub use check::{CheckReport, RequirementStatus};
pub use rules::{Classification, MatchKind, PatternTable, Rule};

//! Core domain types and logic.

pub mod config_validation;
pub mod directive;
pub mod error;
pub mod interpreter;
pub mod metrics;
pub mod portfolio;
pub mod rule_parser;
pub mod schedule;
pub mod simulation;

//!
//! Apiflow Validation - declarative response validation for the Apiflow
//! platform.
//!
//! This crate evaluates user-declared assertions (on status code, headers,
//! body content and timing) against a captured HTTP response and produces a
//! [`ValidationResult`] verdict. It has no dependencies on the rest of the
//! platform and performs no I/O: `evaluate` is a pure function, directly
//! callable for ad-hoc requests and consumed by the flow orchestrator for
//! `validation_pass` / `validation_fail` branching.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Rule model - the tagged rule union and its operator sets
pub mod rule;

/// Captured HTTP response data
pub mod response;

/// Validation verdicts
pub mod result;

/// The evaluation engine
pub mod engine;

pub use engine::{evaluate, EnvVars};
pub use response::ResponseData;
pub use result::{RuleOutcome, ValidationResult};
pub use rule::{
    BodyOperator, BodyRule, HeaderOperator, HeaderRule, RequestValidation, RuleCategory, RuleRef,
    RuleLibrary, StatusOperator, StatusRule, TimeOperator, TimeRule, ValidationRule,
};

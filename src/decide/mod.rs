//! Rule tables that pick candidate families and a CV strategy.
//!
//! Both selectors are ordered lists of `(predicate → outcome)` rules
//! evaluated top-down; the first rule that applies wins and contributes its
//! rationale message. Each rule is a plain value so tests can address any
//! single branch.

pub mod family;
pub mod strategy;

pub use family::*;
pub use strategy::*;

/// An automatic choice plus the human-readable reason for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision<T> {
    pub outcome: T,
    pub rationale: String,
}

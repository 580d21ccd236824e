//! Error types for the abstract-interpretation kernel.
//!
//! Follows the three-way split from the design notes: programmer errors
//! (broken invariants) abort via `panic!`/`unreachable!` and never appear
//! here; invalid-argument errors are typed and propagated; legality
//! rejections in the optimizer passes are not errors at all but enumerated
//! outcomes (see [`crate::inliner::InlineFailureReason`]).

use thiserror::Error;

/// The tag of an [`crate::lattice::AbstractDomain`] scaffolding: whether it
/// currently holds a concrete payload or one of the two extremal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainKind {
    Bottom,
    Value,
    Top,
}

impl std::fmt::Display for DomainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainKind::Bottom => write!(f, "Bottom"),
            DomainKind::Value => write!(f, "Value"),
            DomainKind::Top => write!(f, "Top"),
        }
    }
}

/// Invalid-argument errors: an operation was applied outside the domain it
/// is defined on, e.g. reading the payload of a Top scaffolded domain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation}: expected a domain in kind {expected_kind}, found {actual_kind} (argument: {argument})")]
pub struct InvalidAbstractValue {
    pub expected_kind: DomainKind,
    pub actual_kind: DomainKind,
    pub operation: &'static str,
    pub argument: &'static str,
}

impl InvalidAbstractValue {
    pub fn new(
        expected_kind: DomainKind,
        actual_kind: DomainKind,
        operation: &'static str,
        argument: &'static str,
    ) -> Self {
        InvalidAbstractValue {
            expected_kind,
            actual_kind,
            operation,
            argument,
        }
    }
}

/// Errors surfaced while loading a JSON-shaped pass configuration.
///
/// Unknown keys are warned about (see [`crate::config`]) rather than
/// rejected, so this type only covers malformed or unreadable input, not
/// schema drift.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Figment(#[from] figment::Error),
}

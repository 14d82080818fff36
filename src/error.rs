//! Recoverable failures of scene operations.
//!
//! Violations of internal invariants panic instead;
//! see the `# Panics` section of each API.

use crate::ComponentIdentifier;

/// The error type of fallible scene operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The worker thread pool could not be started.
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Serialized data refers to a component type that is not registered.
    #[error("Unknown component type {0:?}")]
    UnknownType(String),

    /// The component type does not implement [`Component::deserialize`](crate::Component::deserialize).
    #[error("Component type {0} cannot be deserialized")]
    NotDeserializable(&'static str),

    /// Serialized data does not have the expected shape.
    #[error("Malformed component data: {0}")]
    Malformed(String),

    /// A JSON value could not be converted.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The identifier does not refer to a live hierarchy component.
    #[error("{0} does not refer to a live component")]
    StaleIdentifier(ComponentIdentifier),

    /// The requested parent is the component itself or one of its descendants.
    #[error("Cannot attach {child} under its own descendant {parent}")]
    CyclicHierarchy {
        /// The component being attached.
        child:  ComponentIdentifier,
        /// The requested parent.
        parent: ComponentIdentifier,
    },
}

/// The result type of fallible scene operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

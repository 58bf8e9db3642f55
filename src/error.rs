// SPDX-License-Identifier: MPL-2.0

//! Error types shared by the widget daemon.
//!
//! Entity resolution failures get their own enum because they never leave the
//! controller: they are turned into the `Error` render state at the refresh
//! boundary. Everything else flows through [`WidgetError`].

use std::path::PathBuf;

use thiserror::Error;

use crate::widget::store::WidgetId;

/// Shared `Result` alias for the daemon.
pub type Result<T> = std::result::Result<T, WidgetError>;

/// Failure to turn an entity id into a picture path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("entity {entity_id} does not exist")]
    EntityNotFound { entity_id: String },

    #[error("entity {entity_id} has no {attribute} attribute")]
    AttributeMissing {
        entity_id: String,
        attribute: &'static str,
    },

    #[error("transport failure: {details}")]
    Transport { details: String },
}

/// Top-level error type for the widget daemon.
#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("[CW-1001] incomplete configuration for widget {widget_id}")]
    IncompleteConfig { widget_id: WidgetId },

    #[error("[CW-1002] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[CW-1003] configuration parse failure in {path}: {details}")]
    ConfigParse { path: PathBuf, details: String },

    #[error("[CW-2001] entity resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    #[error("[CW-2002] unable to fetch image {url}: {details}")]
    ImageFetch { url: String, details: String },

    #[error("[CW-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[CW-3002] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[CW-3003] render surface queue is closed")]
    SurfaceClosed,
}

impl WidgetError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::IncompleteConfig { .. } => "CW-1001",
            Self::InvalidConfig { .. } => "CW-1002",
            Self::ConfigParse { .. } => "CW-1003",
            Self::Resolution(_) => "CW-2001",
            Self::ImageFetch { .. } => "CW-2002",
            Self::Io { .. } => "CW-3001",
            Self::Serialization { .. } => "CW-3002",
            Self::SurfaceClosed => "CW-3003",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

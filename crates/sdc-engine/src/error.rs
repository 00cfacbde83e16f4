//! Engine errors

use sdc_dom::{DomError, ReconcileError};
use sdc_html::ParseError;
use thiserror::Error;

use crate::component::ComponentId;
use crate::config::ConfigError;

/// Errors surfaced to the embedding application.
///
/// Lifecycle failures inside the orchestration chain are rendered as
/// content instead; these cover direct API misuse and setup.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Dom(#[from] DomError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown component {0}")]
    UnknownComponent(ComponentId),

    #[error("invalid url: {0}")]
    Url(String),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

//! Translation errors
//!
//! A translation error is fatal for the current compilation unit: the driver
//! stops and the partially-built package is discarded. Every variant carries
//! the source span of the offending node where one is available.

use thiserror::Error;

use crate::ast::Span;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("unsupported construct: {what}")]
    UnsupportedConstruct { what: String, span: Span },
    #[error("value of type {ty} is larger than a pointer and cannot be boxed into an interface")]
    TooLargeForInterface { ty: String, span: Span },
    #[error("frontend violation: {what}")]
    FrontendViolation { what: String, span: Span },
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranslateError {
    pub fn unsupported(what: impl Into<String>, span: Span) -> Self {
        TranslateError::UnsupportedConstruct {
            what: what.into(),
            span,
        }
    }

    pub fn violation(what: impl Into<String>, span: Span) -> Self {
        TranslateError::FrontendViolation {
            what: what.into(),
            span,
        }
    }

    /// Get the source span where this error occurred
    pub fn span(&self) -> Option<&Span> {
        match self {
            TranslateError::UnsupportedConstruct { span, .. } => Some(span),
            TranslateError::TooLargeForInterface { span, .. } => Some(span),
            TranslateError::FrontendViolation { span, .. } => Some(span),
            TranslateError::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;

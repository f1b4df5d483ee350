//! Form submission collaborator.
//!
//! The network is outside this crate; widgets depend on the [`SubmitForm`]
//! trait and consume whichever transport the application wires in. The
//! server answers a submission with the re-rendered markup for the form,
//! on success and on validation rejection alike, so the consuming widget
//! can reload itself from the response.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dom::Element;

/// A successful submission: the re-rendered form markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: u16,
    pub form: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    /// The server processed the request but rejected the submission; the
    /// returned markup carries the validation error messages.
    #[error("form validation failed with status {status}")]
    Validation { status: u16, form: String },

    /// The request failed outright (transport or server error).
    #[error("form submission failed with status {status}: {reason}")]
    Failed { status: u16, reason: String },
}

/// Submits a form element and returns the server's re-rendered markup.
pub trait SubmitForm {
    fn submit(&self, form: &Element) -> Result<SubmitResponse, SubmitError>;
}

/// Map a raw response to the submission outcome.
pub fn classify_response(
    status: u16,
    body: String,
    reason: impl Into<String>,
) -> Result<SubmitResponse, SubmitError> {
    match status {
        200 => Ok(SubmitResponse { status, form: body }),
        400 => Err(SubmitError::Validation { status, form: body }),
        _ => Err(SubmitError::Failed {
            status,
            reason: reason.into(),
        }),
    }
}

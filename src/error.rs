use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the framework.
///
/// `MissingReloadCallback` and `InvalidEventArgument` are programmer errors:
/// they are returned synchronously and should never occur in correct usage.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no reload callback supplied to controller constructor")]
    MissingReloadCallback,

    #[error("event must be an event name or an event object, got {0}")]
    InvalidEventArgument(String),

    #[error("no element with data-ref=\"{0}\" under the controller element")]
    MissingRef(String),

    #[error("failed to parse markup\n{report}")]
    MarkupParse { report: String },

    #[error("invalid selector `{selector}`\n{report}")]
    SelectorParse { selector: String, report: String },

    #[error("replacement markup must contain exactly one top-level element, found {0}")]
    ReloadMarkup(usize),

    #[error("element has no parent to replace it in")]
    DetachedElement,

    #[error("failed to upgrade `{element}` with {controller}: {source}")]
    Upgrade {
        element: String,
        controller: &'static str,
        #[source]
        source: Box<Error>,
    },
}

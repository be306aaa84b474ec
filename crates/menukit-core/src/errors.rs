/// Core error type for the menu layer.
///
/// Timeout and handler variants display their message verbatim: the text is
/// shown to the end user as-is, so it must not carry a prefix.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    LoaderTimeout(String),

    #[error("{0}")]
    HandlerTimeout(String),

    /// Failure raised by developer code (loader, hook or button handler).
    #[error("{0}")]
    Handler(String),

    #[error("invalid menu id: {0:?}")]
    InvalidMenuId(String),

    #[error("menu registered twice: {0}")]
    DuplicateMenu(String),

    #[error("unknown menu: {0}")]
    UnknownMenu(String),

    #[error("no active menu message in this chat")]
    NoActiveMessage,

    #[error("session error: {0}")]
    Session(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rendered output the messenger cannot deliver.
    #[error("messenger limit exceeded: {0}")]
    Limit(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn handler(msg: impl std::fmt::Display) -> Self {
        Self::Handler(msg.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::LoaderTimeout(_) | Self::HandlerTimeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

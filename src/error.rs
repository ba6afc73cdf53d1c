use thiserror::Error;

/// Errors raised by the kiosk services.
///
/// The `commands` layer flattens these into strings for the UI shell.
#[derive(Debug, Error)]
pub enum KioskError {
    /// The backend answered with a body that does not match the expected schema.
    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    /// The backend answered with a non-success status code.
    #[error("{endpoint} returned HTTP {status}: {message}")]
    HttpStatus {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// Transport-level failure (connect, timeout, TLS).
    #[error("request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    /// Realtime channel failure.
    #[error("realtime channel error: {0}")]
    Channel(String),

    /// A detection box with non-finite or inverted coordinates.
    #[error("invalid detection box {xyxy:?}: {reason}")]
    InvalidBox { xyxy: [f64; 4], reason: String },

    /// A display surface with a zero or negative dimension.
    #[error("invalid display surface {width}x{height}")]
    InvalidSurface { width: f64, height: f64 },

    /// Either side of a link is already linked elsewhere.
    #[error("link conflict: {0}")]
    AlreadyLinked(String),

    #[error("unknown item {0}")]
    UnknownItem(u64),

    #[error("unknown region {0}")]
    UnknownRegion(u64),

    /// No item is currently selected.
    #[error("no item selected")]
    NothingSelected,

    /// Manual entry is missing the name or the price.
    #[error("menu name and price are both required")]
    IncompleteEntry,

    /// The menu search returned nothing for a manual entry.
    #[error("no menu found for '{0}'")]
    MenuNotFound(String),

    /// The captured photo could not be decoded or encoded.
    #[error("image error: {0}")]
    Image(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, KioskError>;

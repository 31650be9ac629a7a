/// Error types for the geomark library
use std::fmt;

/// Result type alias for geomark operations
pub type Result<T> = std::result::Result<T, GeoError>;

/// Main error type for dataset construction and lookups
#[derive(Debug, Clone, PartialEq)]
pub enum GeoError {
    /// A source had a header but no data records
    EmptyInput,

    /// A record carried the wrong number of columns
    SchemaError {
        /// Columns found in the record
        got: usize,
        /// Columns the feed schema requires
        want: usize,
    },

    /// A field failed semantic validation (names the field and value)
    Corrupt(String),

    /// A block's CIDR literal could not be parsed
    InvalidCidr(String),

    /// A lookup query string is not a parsable IP address
    InvalidQueryIp(String),

    /// No range contains the queried address
    NotFound,

    /// No dataset has been published yet
    NotReady,

    /// I/O errors
    Io(String),
}

impl fmt::Display for GeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoError::EmptyInput => write!(f, "empty input data"),
            GeoError::SchemaError { got, want } => {
                write!(f, "wrong number of columns: got {}, wanted {}", got, want)
            }
            GeoError::Corrupt(msg) => write!(f, "corrupted data: {}", msg),
            GeoError::InvalidCidr(msg) => write!(f, "invalid CIDR range: {}", msg),
            GeoError::InvalidQueryIp(msg) => write!(f, "invalid query IP: {}", msg),
            GeoError::NotFound => write!(f, "no range contains the address"),
            GeoError::NotReady => write!(f, "no dataset published yet"),
            GeoError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for GeoError {}

impl From<std::io::Error> for GeoError {
    fn from(err: std::io::Error) -> Self {
        GeoError::Io(err.to_string())
    }
}

impl From<csv::Error> for GeoError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(io) => GeoError::Io(io.to_string()),
            _ => GeoError::Corrupt(format!("unreadable record: {}", err)),
        }
    }
}

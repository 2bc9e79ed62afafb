//! Error types shared by the whole pipeline.
//!
//! Library code returns [`Error`]; the binary converts to `anyhow` at the
//! top level and exits with a single-line message naming the failing stage.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    /// A server answered with a non-2xx status.
    #[error("{url:?} responded with status {status:?}")]
    Request {
        url: String,
        status: String,
        code: u16,
    },

    /// A detail link points outside the host we are allowed to scrape.
    #[error("{context:?} links to a page on {host:?}, but host {expected:?} was expected")]
    UnexpectedHost {
        context: String,
        host: String,
        expected: &'static str,
    },

    /// The vehicle API envelope carried a non-empty error field.
    #[error("api.um.warszawa.pl responded with an error: {0:?}")]
    Api(String),

    #[error("{file} is missing the {column} column")]
    MissingColumn {
        file: &'static str,
        column: &'static str,
    },

    #[error("missing {0} in the GTFS archive")]
    MissingFile(&'static str),

    #[error("{file} contains an invalid {field}: {value:?}")]
    InvalidField {
        file: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("invalid time string: {0:?}")]
    InvalidTime(String),

    /// Only schedule times (certain day) may anchor a comparison.
    #[error("a wall-clock time cannot be the left operand of a schedule comparison")]
    UncertainComparison,

    #[error("unable to find an alert id in GUID {0:?}")]
    AlertId(String),

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("worker panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_error_names_url_and_status() {
        let err = Error::Request {
            url: "https://example.com/feed".into(),
            status: "503 Service Unavailable".into(),
            code: 503,
        };
        assert_eq!(
            err.to_string(),
            "\"https://example.com/feed\" responded with status \"503 Service Unavailable\""
        );
    }

    #[test]
    fn unexpected_host_names_all_parties() {
        let err = Error::UnexpectedHost {
            context: "A/CHANGE/4".into(),
            host: "example.com".into(),
            expected: "wtp.waw.pl",
        };
        let msg = err.to_string();
        assert!(msg.contains("A/CHANGE/4"));
        assert!(msg.contains("example.com"));
        assert!(msg.contains("wtp.waw.pl"));
    }

    #[test]
    fn missing_column_is_fatal_parse_error() {
        let err = Error::MissingColumn {
            file: "routes.txt",
            column: "route_type",
        };
        assert_eq!(err.to_string(), "routes.txt is missing the route_type column");
    }
}

use std::fmt;

use thiserror::Error;


/// Where a backend call went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No response was received.
    Network,
    /// The backend answered with a non-success status.
    Rejected(u16),
    /// The backend answered with something we could not read.
    Malformed,
}


macro_rules! backend_error {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Error)]
        #[error("{}: {}", Self::PREFIX, .message)]
        pub struct $name {
            pub kind: FailureKind,
            pub message: String,
        }

        impl $name {
            const PREFIX: &'static str = $prefix;

            pub fn new<M: Into<String>>(kind: FailureKind, message: M) -> Self {
                $name {
                    kind,
                    message: message.into(),
                }
            }

            pub fn network<E: fmt::Display>(err: E) -> Self {
                Self::new(FailureKind::Network, err.to_string())
            }

            pub fn rejected<M: Into<String>>(status: u16, message: M) -> Self {
                Self::new(FailureKind::Rejected(status), message)
            }

            pub fn malformed<E: fmt::Display>(err: E) -> Self {
                Self::new(FailureKind::Malformed, err.to_string())
            }
        }
    };
}

backend_error!(
    /// Storing a report photo in the bucket failed.
    UploadError, "Image upload failed"
);
backend_error!(
    /// Writing a report row failed.
    InsertError, "Failed to save report"
);
backend_error!(
    /// Reading the report list failed.
    FetchError, "Failed to load reports"
);


#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please fill in all required fields.")]
    MissingFields,
    #[error("Please provide a valid location.")]
    InvalidLocation,
    #[error("Unknown pollution type: {0}")]
    UnknownCategory(String),
}


/// A selected file that is not an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Please select a valid image file.")]
pub struct InvalidFileError {
    pub media_type: String,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_append_the_backend_message() {
        let err = UploadError::rejected(409, "The resource already exists");
        assert_eq!(err.kind, FailureKind::Rejected(409));
        assert_eq!(err.to_string(), "Image upload failed: The resource already exists");

        let err = FetchError::network("connection refused");
        assert_eq!(err.kind, FailureKind::Network);
        assert_eq!(err.to_string(), "Failed to load reports: connection refused");

        assert_eq!(
            InsertError::malformed("bad json").to_string(),
            "Failed to save report: bad json"
        );
    }
}

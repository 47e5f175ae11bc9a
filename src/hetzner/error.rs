//! Errors raised by the cloud API client.

use thiserror::Error;

/// Failure of a single cloud API call.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudError {
    /// The request never produced an HTTP response.
    #[error("request to {endpoint} failed: {message}")]
    Transport {
        /// Method and path of the request.
        endpoint: String,
        /// Client error message.
        message: String,
    },
    /// The API answered with an error envelope.
    #[error("{endpoint} returned {status} {code}: {message}")]
    Api {
        /// Method and path of the request.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// API error code, for example `not_found`.
        code: String,
        /// API error message.
        message: String,
    },
    /// The response body did not match the expected schema.
    #[error("unexpected response from {endpoint}: {message}")]
    Decode {
        /// Method and path of the request.
        endpoint: String,
        /// Decoder error message.
        message: String,
    },
    /// An asynchronous action finished with an error.
    #[error("action {id} ({command}) failed: {code}: {message}")]
    ActionFailed {
        /// Action ID.
        id: u64,
        /// Action command.
        command: String,
        /// API error code.
        code: String,
        /// API error message.
        message: String,
    },
}

impl CloudError {
    /// Returns `true` when the target resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
            || matches!(self, Self::Api { code, .. } if code == "not_found")
    }

    /// Returns `true` when a create collided with an existing unique name.
    #[must_use]
    pub fn is_uniqueness(&self) -> bool {
        matches!(self, Self::Api { code, .. } if code == "uniqueness_error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn api(status: u16, code: &str) -> CloudError {
        CloudError::Api {
            endpoint: String::from("GET /servers/1"),
            status,
            code: code.to_owned(),
            message: String::from("message"),
        }
    }

    #[rstest]
    #[case(api(404, "not_found"), true, false)]
    #[case(api(404, "unknown"), true, false)]
    #[case(api(409, "uniqueness_error"), false, true)]
    #[case(api(500, "server_error"), false, false)]
    fn classifies_api_errors(
        #[case] err: CloudError,
        #[case] not_found: bool,
        #[case] uniqueness: bool,
    ) {
        assert_eq!(err.is_not_found(), not_found);
        assert_eq!(err.is_uniqueness(), uniqueness);
    }
}

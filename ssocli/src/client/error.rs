use thiserror::Error;

/// Errors that can occur while logging in and exchanging the SAML assertion
#[derive(Error, Debug)]
pub enum SsoError {
    #[error("Error retrieving authentication code: {message}")]
    AuthenticationCode {
        status: Option<u16>,
        message: String,
    },

    #[error("Error retrieving access token: {message}")]
    AccessToken { message: String },

    #[error("Error retrieving SAML assertion: {message}")]
    AssertionLookup { message: String },

    #[error("Response did not contain a valid SAML assertion")]
    EmptyAssertion,

    #[error("Malformed SAML assertion: {message}")]
    MalformedAssertion { message: String },

    #[error("AssumeRoleWithSAML rejected the assertion: {message}")]
    RoleAssumption { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Unexpected response while {step}: {message}")]
    Protocol { step: &'static str, message: String },

    #[error("Failed to update credentials file {path}: {message}")]
    CredentialSink { path: String, message: String },
}

impl SsoError {
    pub fn authentication_code(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::AuthenticationCode {
            status,
            message: message.into(),
        }
    }

    pub fn access_token(message: impl Into<String>) -> Self {
        Self::AccessToken {
            message: message.into(),
        }
    }

    pub fn assertion_lookup(message: impl Into<String>) -> Self {
        Self::AssertionLookup {
            message: message.into(),
        }
    }

    pub fn malformed_assertion(message: impl Into<String>) -> Self {
        Self::MalformedAssertion {
            message: message.into(),
        }
    }

    pub fn role_assumption(message: impl Into<String>) -> Self {
        Self::RoleAssumption {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn protocol(step: &'static str, message: impl Into<String>) -> Self {
        Self::Protocol {
            step,
            message: message.into(),
        }
    }

    pub fn credential_sink(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CredentialSink {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Human readable name of the login step that failed
    pub fn step(&self) -> &'static str {
        match self {
            Self::AuthenticationCode { .. } => "Authentication code",
            Self::AccessToken { .. } => "Access token",
            Self::AssertionLookup { .. } => "SAML assertion lookup",
            Self::EmptyAssertion | Self::MalformedAssertion { .. } => "SAML assertion decoding",
            Self::RoleAssumption { .. } => "AssumeRoleWithSAML",
            Self::Transport { .. } => "HTTP transport",
            Self::Protocol { step, .. } => step,
            Self::CredentialSink { .. } => "Credentials file update",
        }
    }
}

impl From<hyper::Error> for SsoError {
    fn from(source: hyper::Error) -> Self {
        Self::transport(source.to_string())
    }
}

impl From<hyper::http::Error> for SsoError {
    fn from(source: hyper::http::Error) -> Self {
        Self::transport(source.to_string())
    }
}

pub type SsoResult<T> = Result<T, SsoError>;

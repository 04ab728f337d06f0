use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::client::cookies::CookieJar;

/// Proof that the directory accepted the AD credentials. Consumed by the token exchange.
#[derive(Debug, Clone)]
pub struct AuthCode {
    pub code: String,
    pub referer: String,
    pub cookies: CookieJar,
}

/// Authenticated portal session, valid for the life of the process
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub cookies: CookieJar,
}

impl AccessToken {
    /// Leading characters of the token, enough to tell sessions apart in logs
    pub fn fingerprint(&self) -> String {
        let head: String = self.token.chars().take(8).collect();
        if head.len() < self.token.len() {
            format!("{}...", head)
        } else {
            head
        }
    }
}

/// An AWS account or custom SAML application registered in the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationInstance {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,
}

/// An assumable role (portal "profile") under an application instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub name: String,

    /// Per-role SAML endpoint
    #[serde(default)]
    pub url: Option<String>,
}

/// The `{"result": [...]}` envelope used by the portal listing endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    pub result: Vec<T>,
}

/// Role and SAML provider pair taken from one assertion attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleArns {
    pub role_arn: String,
    pub principal_arn: String,
}

/// Temporary credentials returned by AssumeRoleWithSAML
#[derive(Clone)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
    pub region: String,
    pub output_format: String,
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .field("region", &self.region)
            .field("output_format", &self.output_format)
            .finish()
    }
}

/// Identity reported by STS GetCallerIdentity for the new credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub arn: String,
    pub account_id: String,
    pub user_id: String,
}

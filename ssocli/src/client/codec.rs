//! Wire codec for the directory login RPC.
//!
//! The login endpoint speaks GWT-RPC: the request is a pipe-delimited string table
//! followed by positional tokens, the response is `//OK` plus a JSON array. Both are
//! tied to one server-side deserializer version, so the layout lives behind a trait.

use serde_json::Value;

use super::error::{SsoError, SsoResult};

pub const CLIENT_ID: &str = "3bec6266d4c83882";
pub const GWT_PERMUTATION: &str = "72CB37F2131C24A860A9833EB1832775";
pub const GWT_MODULE_BASE: &str =
    "https://d32i4gd7pg4909.cloudfront.net/d4a64633fc550d3b73b374cc1fa5e8229d4ca51e/WarpDriveLogin/";
pub const GWT_POLICY_STRONG_NAME: &str = "3848C107E2AD28077897B8F9CEA6E94D";
pub const GWT_CONTENT_TYPE: &str = "text/x-gwt-rpc; charset=utf-8";

const SUCCESS_MARKER: &str = "//OK";
const SERVICE_INTERFACE: &str = "com.amazonaws.warpdrive.console.client.GalaxyInternalGWTService";
const SERVICE_METHOD: &str = "authenticateUser";
const LOGIN_REQUEST_TYPE: &str = "com.amazonaws.warpdrive.console.shared.LoginRequest_v4/3859384737";

/// Positional tokens after the string table, referencing its entries by index
const LOGIN_TOKEN_STREAM: &str = "1|2|3|4|1|5|5|6|6|7|8|0|9|10|6|11|";

/// Response array position of the authentication code: `[8][1]`
const CODE_OUTER_INDEX: usize = 8;
const CODE_INNER_INDEX: usize = 1;

/// Fields the login request carries
#[derive(Clone)]
pub struct LoginFields<'a> {
    pub client_id: &'a str,
    pub netbios: &'a str,
    pub dir_name: &'a str,
    pub login: &'a str,
    pub password: &'a str,
}

/// Encodes the login call and decodes its response
pub trait LoginCodec: Send + Sync {
    /// Extra request headers identifying the client build
    fn headers(&self) -> Vec<(String, String)>;

    fn encode_login_request(&self, fields: &LoginFields<'_>) -> String;

    /// Returns the authentication code, or an `AuthenticationCode` error
    fn decode_login_response(&self, body: &str) -> SsoResult<String>;
}

/// GWT-RPC protocol version 7, flags 0
#[derive(Debug, Clone, Default)]
pub struct GwtRpcV7Codec;

impl LoginCodec for GwtRpcV7Codec {
    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("Content-Type".to_string(), GWT_CONTENT_TYPE.to_string()),
            ("X-GWT-Permutation".to_string(), GWT_PERMUTATION.to_string()),
            ("X-GWT-Module-Base".to_string(), GWT_MODULE_BASE.to_string()),
        ]
    }

    fn encode_login_request(&self, fields: &LoginFields<'_>) -> String {
        let strings = [
            GWT_MODULE_BASE,
            GWT_POLICY_STRONG_NAME,
            SERVICE_INTERFACE,
            SERVICE_METHOD,
            LOGIN_REQUEST_TYPE,
            "",
            fields.client_id,
            fields.netbios,
            fields.dir_name,
            fields.password,
            fields.login,
        ];

        let mut payload = format!("7|0|{}|", strings.len());
        for s in strings {
            payload.push_str(&escape(s));
            payload.push('|');
        }
        payload.push_str(LOGIN_TOKEN_STREAM);
        payload
    }

    fn decode_login_response(&self, body: &str) -> SsoResult<String> {
        let Some(json) = body.strip_prefix(SUCCESS_MARKER) else {
            return Err(SsoError::authentication_code(
                None,
                "login response is missing the success marker",
            ));
        };

        let parsed: Value = serde_json::from_str(json).map_err(|e| {
            SsoError::authentication_code(None, format!("login response is not JSON: {}", e))
        })?;

        parsed
            .get(CODE_OUTER_INDEX)
            .and_then(|entry| entry.get(CODE_INNER_INDEX))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                SsoError::authentication_code(
                    None,
                    "login response has no authentication code at [8][1]",
                )
            })
    }
}

/// GWT-RPC string escaping for the pipe-delimited table
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\!"),
            other => out.push(other),
        }
    }
    out
}

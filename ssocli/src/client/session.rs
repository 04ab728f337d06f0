//! The directory login protocol.
//!
//! Steps run strictly in order and each one consumes what the previous produced:
//! `obtain_authentication_code` -> `obtain_access_token` -> listing or assertion calls.
//! `AuthCode` is taken by value so it cannot be exchanged twice. Any failure ends the run.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, trace};
use url::Url;

use super::codec::{GwtRpcV7Codec, LoginCodec, LoginFields, CLIENT_ID};
use super::cookies::CookieJar;
use super::error::{SsoError, SsoResult};
use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::common::config::DirectoryConfig;
use crate::common::{AccessToken, ApplicationInstance, AuthCode, ListResponse, RoleProfile};

/// Cookie the portal sets once the authentication code has been accepted
pub const SESSION_COOKIE: &str = "x-amz-sso_authn";

/// The token endpoint requires a CSRF token to be present, any value is accepted
const CSRF_TOKEN: &str = "a";

const MAX_REDIRECTS: usize = 10;

const QUERY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?');

const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &QUERY_ENCODE_SET.add(b'/');

/// One login attempt against one directory
pub struct DirectorySession {
    config: DirectoryConfig,
    transport: Arc<dyn HttpTransport>,
    codec: Arc<dyn LoginCodec>,
}

/// Result of a GET that followed redirects
struct Followed {
    response: HttpResponse,
    /// Cookies the final request in the chain carried
    sent: CookieJar,
    /// `sent` plus whatever the final response set
    jar: CookieJar,
}

impl DirectorySession {
    pub fn new(config: DirectoryConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_codec(config, transport, Arc::new(GwtRpcV7Codec))
    }

    pub fn with_codec(
        config: DirectoryConfig,
        transport: Arc<dyn HttpTransport>,
        codec: Arc<dyn LoginCodec>,
    ) -> Self {
        Self {
            config,
            transport,
            codec,
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    fn login_url(&self) -> String {
        format!(
            "https://{}/login/WarpDriveLogin/GalaxyInternalService",
            self.config.directory_url
        )
    }

    fn portal_base(&self) -> String {
        format!("https://portal.sso.{}.amazonaws.com", self.config.sso_region)
    }

    fn referer(&self) -> String {
        format!(
            "https://{}/login/?client_id={}&redirect_uri={}/auth/wd&organization={}",
            self.config.directory_url,
            CLIENT_ID,
            self.portal_base(),
            encode_query(&self.config.dir_name)
        )
    }

    fn profiles_url(&self, app_instance_id: &str) -> String {
        format!(
            "{}/instance/appinstance/{}/profiles",
            self.portal_base(),
            utf8_percent_encode(app_instance_id, PATH_SEGMENT_ENCODE_SET)
        )
    }

    /// Codec headers plus the login referer, sent on the login and profile lookup calls
    fn session_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.codec.headers();
        headers.push(("referer".to_string(), self.referer()));
        headers
    }

    /// Step 1: submit the AD credentials and receive an authentication code
    #[instrument(skip(self), fields(directory = %self.config.directory_url))]
    pub async fn obtain_authentication_code(&self) -> SsoResult<AuthCode> {
        debug!("Getting authentication code from {}", self.config.directory_url);

        let payload = self.codec.encode_login_request(&LoginFields {
            client_id: CLIENT_ID,
            netbios: &self.config.netbios,
            dir_name: &self.config.dir_name,
            login: &self.config.login,
            password: &self.config.password,
        });

        let login_url = parse_url(&self.login_url())?;
        let request =
            HttpRequest::post(login_url.as_str(), payload).headers(&self.session_headers());
        let response = self.transport.send(request).await?;

        if response.status != 200 {
            trace!("Login response body: {}", response.body);
            return Err(SsoError::authentication_code(
                Some(response.status),
                format!("login endpoint returned status {}", response.status),
            ));
        }

        let code = self
            .codec
            .decode_login_response(&response.body)
            .inspect_err(|_| trace!("Login response body: {}", response.body))?;
        trace!("Authentication code: {}", code);

        Ok(AuthCode {
            code,
            referer: self.referer(),
            cookies: CookieJar::new().merged_with(&login_url, response.set_cookies()),
        })
    }

    /// Step 2: exchange the authentication code for the portal session cookie
    #[instrument(skip_all)]
    pub async fn obtain_access_token(&self, auth_code: AuthCode) -> SsoResult<AccessToken> {
        debug!("Exchanging authentication code for access token");

        let token_url = format!(
            "{}/auth/wd?auth_code={}&organization={}&region={}&wdc_csrf_token={}",
            self.portal_base(),
            encode_query(&auth_code.code),
            encode_query(&self.config.dir_name),
            encode_query(&self.config.sso_region),
            CSRF_TOKEN
        );

        let request = HttpRequest::get(token_url, auth_code.cookies)
            .header("referer", auth_code.referer.as_str());
        let followed = self.get_following_redirects(request).await?;

        let token = followed
            .sent
            .get(SESSION_COOKIE)
            .map(str::to_string)
            .ok_or_else(|| {
                SsoError::access_token(format!(
                    "portal did not set the {} cookie (final status {})",
                    SESSION_COOKIE, followed.response.status
                ))
            })?;
        trace!("Access token: {}", token);

        Ok(AccessToken {
            token,
            cookies: followed.jar,
        })
    }

    /// Application instances (AWS accounts and SAML apps) visible to the user
    #[instrument(skip_all)]
    pub async fn list_application_instances(
        &self,
        token: &AccessToken,
    ) -> SsoResult<Vec<ApplicationInstance>> {
        let url = format!("{}/instance/appinstances", self.portal_base());
        let response = self
            .transport
            .send(HttpRequest::get(url, token.cookies.clone()))
            .await?;

        let instances: Vec<ApplicationInstance> =
            parse_result_list("listing application instances", &response)?;
        debug!("Found {} application instances", instances.len());
        Ok(instances)
    }

    /// Role profiles assignable under one application instance
    #[instrument(skip(self, token))]
    pub async fn list_roles_for_application_instance(
        &self,
        app_instance_id: &str,
        token: &AccessToken,
    ) -> SsoResult<Vec<RoleProfile>> {
        let response = self
            .transport
            .send(HttpRequest::get(
                self.profiles_url(app_instance_id),
                token.cookies.clone(),
            ))
            .await?;

        let roles: Vec<RoleProfile> = parse_result_list("listing roles", &response)?;
        debug!("Found {} roles for {}", roles.len(), app_instance_id);
        Ok(roles)
    }

    /// Resolve `role_name` under `app_instance_id` and fetch its base64 SAML response
    #[instrument(skip(self, token))]
    pub async fn get_saml_assertion(
        &self,
        app_instance_id: &str,
        role_name: &str,
        token: &AccessToken,
    ) -> SsoResult<String> {
        debug!(
            "Getting the SAML endpoint for application instance {}",
            app_instance_id
        );

        let request = HttpRequest::get(self.profiles_url(app_instance_id), token.cookies.clone())
            .headers(&self.session_headers());
        let response = self.transport.send(request).await?;

        let body: Value = serde_json::from_str(&response.body).map_err(|e| {
            trace!("Profile response body: {}", response.body);
            SsoError::assertion_lookup(format!(
                "profile listing is not JSON (status {}): {}",
                response.status, e
            ))
        })?;
        let Some(result) = body.get("result") else {
            trace!("Profile response body: {}", response.body);
            return Err(SsoError::assertion_lookup(format!(
                "profile listing has no result (status {})",
                response.status
            )));
        };
        let profiles: Vec<RoleProfile> = serde_json::from_value(result.clone())
            .map_err(|e| SsoError::protocol("looking up the SAML endpoint", e.to_string()))?;

        let endpoint = resolve_endpoint(&profiles, role_name).ok_or_else(|| {
            let available = profiles
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            SsoError::assertion_lookup(format!(
                "role '{}' not found for application instance {} (available: {})",
                role_name, app_instance_id, available
            ))
        })?;
        let endpoint = resolve_location(&self.portal_base(), endpoint)?;
        debug!("SAML endpoint: {}", endpoint);

        let response = self
            .transport
            .send(HttpRequest::get(endpoint, token.cookies.clone()))
            .await?;
        trace!("SAML endpoint response body: {}", response.body);

        let body: Value = serde_json::from_str(&response.body).map_err(|e| {
            SsoError::assertion_lookup(format!(
                "SAML endpoint response is not JSON (status {}): {}",
                response.status, e
            ))
        })?;

        body.get("encodedResponse")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                SsoError::assertion_lookup(format!(
                    "SAML endpoint response has no encodedResponse (status {})",
                    response.status
                ))
            })
    }

    async fn get_following_redirects(&self, mut request: HttpRequest) -> SsoResult<Followed> {
        for _ in 0..=MAX_REDIRECTS {
            let current = parse_url(&request.url)?;
            let sent = request.cookies.clone();
            let response = self.transport.send(request.clone()).await?;
            let jar = sent.merged_with(&current, response.set_cookies());

            let location = response.redirect_location().map(str::to_string);
            let Some(location) = location else {
                return Ok(Followed {
                    response,
                    sent,
                    jar,
                });
            };

            let next = join_url(&current, &location)?;
            debug!("Following redirect to {}", strip_query(&next));
            request = HttpRequest {
                url: next,
                cookies: jar,
                ..request
            };
        }

        Err(SsoError::transport(format!(
            "more than {} redirects",
            MAX_REDIRECTS
        )))
    }
}

/// First profile whose name matches exactly
fn resolve_endpoint<'a>(profiles: &'a [RoleProfile], role_name: &str) -> Option<&'a str> {
    profiles
        .iter()
        .find(|p| p.name == role_name)
        .and_then(|p| p.url.as_deref())
        .filter(|url| !url.is_empty())
}

fn parse_result_list<T: DeserializeOwned>(
    step: &'static str,
    response: &HttpResponse,
) -> SsoResult<Vec<T>> {
    serde_json::from_str::<ListResponse<T>>(&response.body)
        .map(|list| list.result)
        .map_err(|e| {
            trace!("Unparseable body: {}", response.body);
            SsoError::protocol(step, format!("status {}: {}", response.status, e))
        })
}

fn encode_query(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ENCODE_SET).to_string()
}

fn strip_query(url: &str) -> &str {
    url.split_once('?').map(|(base, _)| base).unwrap_or(url)
}

fn parse_url(url: &str) -> SsoResult<Url> {
    Url::parse(url).map_err(|e| SsoError::transport(format!("invalid URL {}: {}", url, e)))
}

fn join_url(base: &Url, location: &str) -> SsoResult<String> {
    base.join(location)
        .map(String::from)
        .map_err(|e| SsoError::transport(format!("invalid location {}: {}", location, e)))
}

/// Resolve a `Location` or endpoint value against the URL it came from
fn resolve_location(base: &str, location: &str) -> SsoResult<String> {
    join_url(&parse_url(base)?, location)
}

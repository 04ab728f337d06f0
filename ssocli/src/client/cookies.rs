//! Cookie state carried between protocol steps.
//!
//! The jar is a value: every step receives the jar produced by the previous one and
//! returns an updated copy, so the cookies each request carried can be inspected.
//! Each cookie remembers the domain and path that scope it; only cookies matching a
//! request's URL go into its `Cookie` header.

use cookie::time::{Duration, OffsetDateTime};
use cookie::Cookie;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredCookie {
    name: String,
    value: String,
    /// Lowercase, without a leading dot
    domain: String,
    /// Set when the cookie had no `Domain` attribute and only goes back to its origin host
    host_only: bool,
    path: String,
    secure: bool,
}

impl StoredCookie {
    fn same_slot(&self, other: &StoredCookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(&host, &self.domain)
        };

        domain_ok && path_matches(url.path(), &self.path) && (!self.secure || url.scheme() == "https")
    }
}

/// Cookies collected during one login run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<StoredCookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `name`, whatever its domain
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Copy of this jar with a host-only cookie for `host` added or replaced
    pub fn with_cookie(
        &self,
        host: &str,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let mut next = self.clone();
        next.store(StoredCookie {
            name: name.into(),
            value: value.into(),
            domain: host.to_ascii_lowercase(),
            host_only: true,
            path: "/".to_string(),
            secure: false,
        });
        next
    }

    /// Copy of this jar updated from the `Set-Cookie` values of a response to `origin`
    pub fn merged_with<'a, I>(&self, origin: &Url, set_cookie_headers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let Some(origin_host) = origin.host_str().map(str::to_ascii_lowercase) else {
            return self.clone();
        };

        let mut next = self.clone();
        for header in set_cookie_headers {
            let parsed = match Cookie::parse(header) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!("Ignoring malformed Set-Cookie: {}", e);
                    continue;
                }
            };

            let (domain, host_only) = match parsed.domain() {
                Some(domain) => (domain.trim_start_matches('.').to_ascii_lowercase(), false),
                None => (origin_host.clone(), true),
            };
            if !domain_matches(&origin_host, &domain) {
                debug!(
                    "Ignoring cookie {} for {} set by {}",
                    parsed.name(),
                    domain,
                    origin_host
                );
                continue;
            }

            let cookie = StoredCookie {
                name: parsed.name().to_string(),
                value: parsed.value_trimmed().to_string(),
                domain,
                host_only,
                path: parsed
                    .path()
                    .filter(|p| p.starts_with('/'))
                    .map(str::to_string)
                    .unwrap_or_else(|| default_path(origin)),
                secure: parsed.secure().unwrap_or(false),
            };

            if is_expired(&parsed) {
                next.cookies.retain(|c| !c.same_slot(&cookie));
            } else {
                next.store(cookie);
            }
        }
        next
    }

    /// Value for the `Cookie` header of a request to `url`, `None` when nothing matches
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let pairs = self
            .cookies
            .iter()
            .filter(|c| c.matches(url))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    fn store(&mut self, cookie: StoredCookie) {
        if let Some(slot) = self.cookies.iter_mut().find(|c| c.same_slot(&cookie)) {
            *slot = cookie;
        } else {
            self.cookies.push(cookie);
        }
    }
}

/// `Max-Age` takes precedence over `Expires`
fn is_expired(cookie: &Cookie<'_>) -> bool {
    if let Some(max_age) = cookie.max_age() {
        return max_age <= Duration::ZERO;
    }
    cookie
        .expires_datetime()
        .map(|at| at <= OffsetDateTime::now_utc())
        .unwrap_or(false)
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/')))
}

/// Directory of the request path, used when `Set-Cookie` has no `Path`
fn default_path(origin: &Url) -> String {
    match origin.path().rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => origin.path()[..idx].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTAL: &str = "portal.sso.us-east-1.amazonaws.com";

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_merge_keeps_original_untouched() {
        let first = CookieJar::new().with_cookie(PORTAL, "JSESSIONID", "abc");
        let second = first.merged_with(
            &url("https://portal.sso.us-east-1.amazonaws.com/auth/wd"),
            ["x-amz-sso_authn=token123; Path=/; Secure; HttpOnly"],
        );

        assert!(!first.contains("x-amz-sso_authn"));
        assert_eq!(second.get("x-amz-sso_authn"), Some("token123"));
        assert_eq!(second.get("JSESSIONID"), Some("abc"));
    }

    #[test]
    fn test_merge_replaces_and_removes() {
        let origin = url("https://portal.sso.us-east-1.amazonaws.com/start");
        let jar = CookieJar::new()
            .with_cookie(PORTAL, "a", "1")
            .with_cookie(PORTAL, "b", "2")
            .merged_with(&origin, ["a=3; Path=/", "b=; Max-Age=0"]);

        assert_eq!(jar.get("a"), Some("3"));
        assert!(!jar.contains("b"));
        assert_eq!(jar.header_for(&origin).as_deref(), Some("a=3"));
    }

    #[test]
    fn test_past_expires_removes_cookie() {
        let origin = url("https://portal.sso.us-east-1.amazonaws.com/");
        let jar = CookieJar::new()
            .with_cookie(PORTAL, "a", "1")
            .merged_with(&origin, ["a=deleted; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT"]);
        assert_eq!(jar.get("a"), None);

        let kept = CookieJar::new()
            .merged_with(&origin, ["a=live; Path=/; Expires=Fri, 01 Jan 2100 00:00:00 GMT"]);
        assert_eq!(kept.get("a"), Some("live"));
    }

    #[test]
    fn test_ignores_malformed_headers() {
        let jar = CookieJar::new().merged_with(&url("https://a.example/"), ["garbage", "=novalue"]);
        assert_eq!(jar, CookieJar::new());
    }

    #[test]
    fn test_header_only_carries_matching_domains() {
        let jar = CookieJar::new()
            .with_cookie("d-corp.awsapps.com", "JSESSIONID", "dir")
            .merged_with(
                &url("https://portal.sso.us-east-1.amazonaws.com/auth/wd"),
                [
                    "x-amz-sso_authn=SESSION; Path=/",
                    "shared=1; Domain=.amazonaws.com; Path=/",
                ],
            );

        assert_eq!(
            jar.header_for(&url("https://portal.sso.us-east-1.amazonaws.com/instance/appinstances"))
                .as_deref(),
            Some("x-amz-sso_authn=SESSION; shared=1")
        );
        assert_eq!(
            jar.header_for(&url("https://signin.aws.amazonaws.com/")).as_deref(),
            Some("shared=1")
        );
        assert_eq!(
            jar.header_for(&url("https://d-corp.awsapps.com/login/")).as_deref(),
            Some("JSESSIONID=dir")
        );
        assert_eq!(jar.header_for(&url("https://evil.example/collect")), None);
    }

    #[test]
    fn test_rejects_cookie_for_foreign_domain() {
        let jar = CookieJar::new().merged_with(
            &url("https://evil.example/"),
            ["x-amz-sso_authn=FORGED; Domain=amazonaws.com; Path=/"],
        );
        assert!(!jar.contains("x-amz-sso_authn"));
    }

    #[test]
    fn test_path_and_secure_scoping() {
        let jar = CookieJar::new().merged_with(
            &url("https://portal.example/auth/wd"),
            ["scoped=1; Path=/auth", "tls=1; Path=/; Secure"],
        );

        assert_eq!(
            jar.header_for(&url("https://portal.example/auth/wd")).as_deref(),
            Some("scoped=1; tls=1")
        );
        assert_eq!(
            jar.header_for(&url("https://portal.example/authx")).as_deref(),
            Some("tls=1")
        );
        assert_eq!(jar.header_for(&url("http://portal.example/auth")).as_deref(), Some("scoped=1"));
    }

    #[test]
    fn test_header_preserves_insertion_order() {
        let jar = CookieJar::new()
            .with_cookie("a.example", "b", "2")
            .with_cookie("a.example", "a", "1");
        assert_eq!(
            jar.header_for(&url("https://a.example/")).as_deref(),
            Some("b=2; a=1")
        );
        assert_eq!(CookieJar::new().header_for(&url("https://a.example/")), None);
    }
}

use std::sync::{Arc, RwLock};

use log::{debug, trace};
use once_cell::sync::Lazy;
use url::Url;

use crate::header::{get_all_headers, Header};
use crate::pool::effective_port;

/// A cookie name/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// The cookie name.
    pub name: String,
    /// The cookie value.
    pub value: String,
}

impl Cookie {
    /// Create a cookie.
    pub fn new(name: &str, value: &str) -> Self {
        Cookie {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Where a stored cookie applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieInfo {
    /// Domain pattern: either an exact host or a `.suffix` pattern.
    pub domain: String,
    /// Path prefix the cookie is scoped to.
    pub path: String,
    /// Ports the cookie may be sent to. `None` means any port.
    pub ports: Option<Vec<u16>>,
    /// Only send over `https`/`shttp`.
    pub secure: bool,
}

impl CookieInfo {
    /// Scope a cookie to a domain pattern and path.
    pub fn new(domain: &str, path: &str) -> Self {
        CookieInfo {
            domain: domain.to_string(),
            path: path.to_string(),
            ports: None,
            secure: false,
        }
    }
}

/// An ordered store of cookies.
///
/// Cookies are identified by (name, domain, path), with name and domain
/// compared case-insensitively and path exactly (RFC 2965 §3.3.3). Storing
/// under an existing identity replaces the entry in place, keeping its
/// position.
///
/// The jar makes no attempt at being thread-safe itself; the process-wide
/// instance handed out by [`global_jar`] sits behind an `RwLock`, making
/// every jar operation atomic with respect to the others.
#[derive(Debug, Default)]
pub struct CookieJar {
    entries: Vec<(CookieInfo, Cookie)>,
}

static GLOBAL_JAR: Lazy<Arc<RwLock<CookieJar>>> =
    Lazy::new(|| Arc::new(RwLock::new(CookieJar::new())));

/// The process-wide cookie jar, shared by all agents that don't configure
/// their own.
pub fn global_jar() -> Arc<RwLock<CookieJar>> {
    GLOBAL_JAR.clone()
}

impl CookieJar {
    /// An empty jar.
    pub fn new() -> Self {
        CookieJar {
            ..Default::default()
        }
    }

    /// Store a cookie. An existing cookie with the same (name, domain,
    /// path) identity is replaced in place.
    pub fn store_cookie(&mut self, info: CookieInfo, cookie: Cookie) {
        let found = self
            .entries
            .iter_mut()
            .find(|(i, c)| same_identity(i, c, &info.domain, &info.path, &cookie.name));
        match found {
            Some(entry) => *entry = (info, cookie),
            None => self.entries.push((info, cookie)),
        }
    }

    /// Remove a cookie by identity. Returns true if something was removed.
    pub fn delete_cookie(&mut self, name: &str, domain: &str, path: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|(i, c)| !same_identity(i, c, domain, path, name));
        before != self.entries.len()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cookies in the jar.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Tells if the jar holds no cookies.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cookies that apply to the given url, most general path first.
    pub fn cookies_for(&self, url: &Url) -> Vec<(CookieInfo, Cookie)> {
        let host = url.host_str().unwrap_or("");
        let port = effective_port(url);
        let secure_scheme = matches!(url.scheme(), "https" | "shttp");

        let mut matching: Vec<(CookieInfo, Cookie)> = self
            .entries
            .iter()
            .filter(|(info, _)| {
                domain_match(host, &info.domain)
                    && port_match(info, port)
                    && path_match(&info.path, url.path())
                    && (!info.secure || secure_scheme)
            })
            .cloned()
            .collect();

        // increasing path depth: most general first
        matching.sort_by_key(|(info, _)| segment_count(&info.path));
        matching
    }

    /// The `Cookie` header value for the url, if any cookies apply.
    pub(crate) fn header_for(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies_for(url);
        if cookies.is_empty() {
            return None;
        }
        let value = cookies
            .iter()
            .map(|(_, c)| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        Some(value)
    }

    /// Process `Set-Cookie` (RFC 2109) and `Set-Cookie2` (RFC 2965)
    /// headers of a response to `url`.
    pub(crate) fn ingest_response(&mut self, url: &Url, headers: &[Header]) {
        for raw in get_all_headers(headers, "set-cookie") {
            self.ingest_one(url, raw, false);
        }
        for raw in get_all_headers(headers, "set-cookie2") {
            self.ingest_one(url, raw, true);
        }
    }

    fn ingest_one(&mut self, url: &Url, raw: &str, rfc2965: bool) {
        let parsed = match parse_set_cookie(raw) {
            Some(p) => p,
            None => {
                trace!("ignoring unparseable cookie: {}", raw);
                return;
            }
        };

        let host = url.host_str().unwrap_or("");

        // version is mandatory in Set-Cookie2
        if rfc2965 && parsed.attr("version").is_none() {
            trace!("ignoring Set-Cookie2 without version: {}", parsed.name);
            return;
        }

        let path = match parsed.attr("path") {
            Some(path) => {
                if !path_match(path, url.path()) {
                    trace!("cookie path {} does not cover {}", path, url.path());
                    return;
                }
                path.to_string()
            }
            None => url.path().to_string(),
        };

        let domain = match parsed.attr("domain") {
            Some(domain) => {
                if !domain_match(host, domain) {
                    trace!("cookie domain {} does not match {}", domain, host);
                    return;
                }
                if prefix_contains_dots(host, domain) {
                    // would cover sibling subdomains the server has no
                    // authority over
                    trace!("cookie domain {} covered by dots in {}", domain, host);
                    return;
                }
                if rfc2965 && !domain_embeds_dot(domain) {
                    trace!("Set-Cookie2 domain without embedded dot: {}", domain);
                    return;
                }
                domain.to_string()
            }
            None => host.to_string(),
        };

        let ports = if rfc2965 {
            match parsed.attr_raw("port") {
                // bare `port` restricts to the port of this url
                Some(None) => Some(vec![effective_port(url)]),
                Some(Some(list)) => {
                    let ports: Vec<u16> = list
                        .split(',')
                        .filter_map(|p| p.trim().parse::<u16>().ok())
                        .collect();
                    if ports.is_empty() {
                        return;
                    }
                    Some(ports)
                }
                None => None,
            }
        } else {
            None
        };

        let info = CookieInfo {
            domain,
            path,
            ports,
            secure: parsed.attr_raw("secure").is_some(),
        };

        // Max-Age=0 is an instruction to discard
        if parsed.attr("max-age").and_then(|v| v.parse::<u64>().ok()) == Some(0) {
            self.delete_cookie(&parsed.name, &info.domain, &info.path);
            return;
        }

        debug!(
            "store cookie {} for domain={} path={}",
            parsed.name, info.domain, info.path
        );
        self.store_cookie(info, Cookie::new(&parsed.name, &parsed.value));
    }
}

fn same_identity(info: &CookieInfo, cookie: &Cookie, domain: &str, path: &str, name: &str) -> bool {
    cookie.name.eq_ignore_ascii_case(name)
        && info.domain.eq_ignore_ascii_case(domain)
        && info.path == path
}

/// Exact host equality, or a `.suffix` pattern the host ends with. Both
/// case-insensitive.
pub(crate) fn domain_match(host: &str, pattern: &str) -> bool {
    if host.eq_ignore_ascii_case(pattern) {
        return true;
    }
    pattern.starts_with('.') && host.to_ascii_lowercase().ends_with(&pattern.to_ascii_lowercase())
}

/// Whether the part of `host` before where `pattern` matches contains a
/// dot. A match "covered by dots" would let a server set cookies for its
/// sibling subdomains.
pub(crate) fn prefix_contains_dots(host: &str, pattern: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    match host.find(&pattern) {
        Some(pos) => host[..pos].contains('.'),
        None => false,
    }
}

/// RFC 2965: a domain attribute must be `.local` or contain a dot in a
/// position after the first character.
fn domain_embeds_dot(domain: &str) -> bool {
    domain == ".local" || domain.char_indices().any(|(i, c)| c == '.' && i > 0)
}

/// The stored path must be absolute and its segments a prefix of the
/// request path's segments. A trailing `/` matches any continuation.
pub(crate) fn path_match(stored: &str, request: &str) -> bool {
    if !stored.starts_with('/') {
        return false;
    }
    let stored: Vec<&str> = stored.split('/').filter(|s| !s.is_empty()).collect();
    let request: Vec<&str> = request.split('/').filter(|s| !s.is_empty()).collect();
    if stored.len() > request.len() {
        return false;
    }
    stored.iter().zip(request.iter()).all(|(s, r)| s == r)
}

fn port_match(info: &CookieInfo, port: u16) -> bool {
    match &info.ports {
        None => true,
        Some(ports) => ports.contains(&port),
    }
}

fn segment_count(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

struct ParsedCookie {
    name: String,
    value: String,
    /// Attribute name (lower case) to optional value.
    attrs: Vec<(String, Option<String>)>,
}

impl ParsedCookie {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attr_raw(name).and_then(|v| v)
    }

    /// Distinguishes a value-less attribute (`Some(None)`) from an absent
    /// one (`None`).
    fn attr_raw(&self, name: &str) -> Option<Option<&str>> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_deref())
    }
}

fn parse_set_cookie(raw: &str) -> Option<ParsedCookie> {
    let mut parts = raw.split(';');

    let first = parts.next()?.trim();
    let eq = first.find('=')?;
    let name = first[..eq].trim();
    if name.is_empty() {
        return None;
    }
    let value = unquote(first[eq + 1..].trim());

    let mut attrs = Vec::new();
    for part in parts {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.find('=') {
            Some(eq) => {
                let name = part[..eq].trim().to_ascii_lowercase();
                let value = unquote(part[eq + 1..].trim());
                attrs.push((name, Some(value)));
            }
            None => attrs.push((part.to_ascii_lowercase(), None)),
        }
    }

    Some(ParsedCookie {
        name: name.to_string(),
        value,
        attrs,
    })
}

fn unquote(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

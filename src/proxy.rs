use log::debug;
use url::Url;

use crate::pool::effective_port;

/// Decides which proxy, if any, a request to the given url goes through.
///
/// The default is [`EnvProxyResolver`]. A closure `Fn(&Url) -> Option<Url>`
/// also works as a resolver.
pub trait ProxyResolver: Send + Sync {
    /// The proxy url for this target, or `None` to go direct.
    fn proxy_for(&self, url: &Url) -> Option<Url>;
}

impl<F> ProxyResolver for F
where
    F: Fn(&Url) -> Option<Url> + Send + Sync,
{
    fn proxy_for(&self, url: &Url) -> Option<Url> {
        self(url)
    }
}

/// Proxy selection from environment variables.
///
/// Consults, in order: the `no_proxy`/`NO_PROXY` exclusion list, then the
/// scheme specific variable (`http_proxy`, `https_proxy`, …), then
/// `all_proxy`/`ALL_PROXY`. Each variable is tried lower-case first, then
/// upper-case, and the first non-empty value wins if it parses as an
/// absolute url.
///
/// Inside a CGI invocation (`REQUEST_METHOD` is set), `http` requests read
/// `cgi_http_proxy` instead of `http_proxy`. `HTTP_PROXY` is where a CGI
/// gateway puts an attacker-controlled `Proxy:` request header, so honoring
/// it there would let remote clients redirect our outbound traffic
/// ("httpoxy").
#[derive(Debug, Default)]
pub struct EnvProxyResolver;

impl ProxyResolver for EnvProxyResolver {
    fn proxy_for(&self, url: &Url) -> Option<Url> {
        resolve(url, &|name| std::env::var(name).ok())
    }
}

fn resolve(url: &Url, env: &dyn Fn(&str) -> Option<String>) -> Option<Url> {
    url.host_str()?;

    if no_proxy_match(url, env) {
        debug!("no_proxy match for {}, going direct", url);
        return None;
    }

    let scheme = url.scheme();
    let in_cgi = env("REQUEST_METHOD").is_some();

    let scheme_var = if in_cgi && scheme == "http" {
        "cgi_http_proxy".to_string()
    } else {
        format!("{}_proxy", scheme)
    };

    let value = lookup(&scheme_var, env).or_else(|| lookup("all_proxy", env))?;

    let proxy = Url::parse(&value).ok()?;
    // only absolute urls with a host make sense as a proxy
    proxy.host_str()?;

    debug!("proxy for {}: {}", url, proxy);
    Some(proxy)
}

/// Lower-case name first, then upper-case, skipping empty values.
fn lookup(name: &str, env: &dyn Fn(&str) -> Option<String>) -> Option<String> {
    env(name)
        .filter(|v| !v.is_empty())
        .or_else(|| env(&name.to_uppercase()).filter(|v| !v.is_empty()))
}

fn no_proxy_match(url: &Url, env: &dyn Fn(&str) -> Option<String>) -> bool {
    let list = match lookup("no_proxy", env) {
        Some(list) => list,
        None => return false,
    };
    let host = url.host_str().unwrap_or("");
    let port = effective_port(url);

    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .any(|pattern| {
            let (host_pattern, port_pattern) = split_port(pattern);
            if let Some(p) = port_pattern {
                if p != port {
                    return false;
                }
            }
            HostMatcher::parse(host_pattern).matches(host)
        })
}

/// Split an optional `:port` suffix off a no_proxy pattern.
fn split_port(pattern: &str) -> (&str, Option<u16>) {
    match pattern.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            (host, port.parse().ok())
        }
        _ => (pattern, None),
    }
}

/// Helps us match hostnames to patterns, mainly for no_proxy support.
#[derive(Clone, Debug)]
enum HostMatcher {
    /// Matches the pattern literally, by string equality.
    Literal(String),
    /// Subdomain match: the pattern is a suffix of the hostname.
    Suffix(String),
    /// Matches any hostname.
    MatchAll,
}

impl HostMatcher {
    fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            return Self::MatchAll;
        }

        let pattern = pattern.to_ascii_lowercase();

        if let Some(suffix) = pattern.strip_prefix('*') {
            // "*.internal" means the same as ".internal"
            return Self::Suffix(suffix.to_string());
        }
        if pattern.starts_with('.') {
            return Self::Suffix(pattern);
        }
        Self::Literal(pattern)
    }

    fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self {
            Self::Literal(lit) => *lit == host,
            Self::Suffix(suffix) => host.ends_with(suffix),
            Self::MatchAll => true,
        }
    }
}

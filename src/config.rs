use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{
    Authenticator, BasicAuthenticator, CredentialsResolver, DigestAuthenticator, UrlCredentials,
};
use crate::proxy::{EnvProxyResolver, ProxyResolver};
use crate::request::Request;
use crate::stream::{Connector, DefaultConnector};

pub(crate) type RetryPredicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// All the knobs of a call, collected.
///
/// An [`Agent`](crate::Agent) carries one; request builders clone it when
/// a call overrides something. `None` for the two limits means unbounded.
#[derive(Clone)]
pub(crate) struct Config {
    pub max_retry_attempts: Option<u32>,
    pub max_redirect_depth: Option<u32>,
    pub retry_predicate: RetryPredicate,
    pub user_agent: String,
    pub proxy_resolver: Arc<dyn ProxyResolver>,
    pub server_credentials: Arc<dyn CredentialsResolver>,
    pub proxy_credentials: Arc<dyn CredentialsResolver>,
    pub connector: Arc<dyn Connector>,
    pub authenticators: HashMap<String, Arc<dyn Authenticator>>,
    pub timeout_connect: Option<Duration>,
    pub timeout_read: Option<Duration>,
    pub timeout_write: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_retry_attempts: Some(1),
            max_redirect_depth: Some(5),
            retry_predicate: Arc::new(|req: &Request| is_idempotent(req.method())),
            user_agent: format!("httpc/{}", env!("CARGO_PKG_VERSION")),
            proxy_resolver: Arc::new(EnvProxyResolver),
            server_credentials: Arc::new(UrlCredentials),
            proxy_credentials: Arc::new(UrlCredentials),
            connector: Arc::new(DefaultConnector),
            authenticators: default_authenticators(),
            timeout_connect: None,
            timeout_read: None,
            timeout_write: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("max_retry_attempts", &self.max_retry_attempts)
            .field("max_redirect_depth", &self.max_redirect_depth)
            .field("user_agent", &self.user_agent)
            .field(
                "authenticators",
                &self.authenticators.keys().collect::<Vec<_>>(),
            )
            .field("timeout_connect", &self.timeout_connect)
            .field("timeout_read", &self.timeout_read)
            .field("timeout_write", &self.timeout_write)
            .finish()
    }
}

/// Safe to reissue without the server having acted twice (RFC 2616
/// §9.1.2). This is the default retry predicate.
pub(crate) fn is_idempotent(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "GET" | "HEAD" | "OPTIONS" | "TRACE" | "PUT" | "DELETE"
    )
}

fn default_authenticators() -> HashMap<String, Arc<dyn Authenticator>> {
    let mut table: HashMap<String, Arc<dyn Authenticator>> = HashMap::new();
    table.insert("basic".to_string(), Arc::new(BasicAuthenticator));
    table.insert("digest".to_string(), Arc::new(DigestAuthenticator));
    table
}

/// Whether a count is still within an optional limit. `None` is
/// unbounded.
pub(crate) fn within(limit: Option<u32>, count: u32) -> bool {
    limit.map(|max| count <= max).unwrap_or(true)
}

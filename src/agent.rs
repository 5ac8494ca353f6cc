use std::io::Read;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use url::Url;

use crate::auth::{Authenticator, CredentialsResolver};
use crate::body::Body;
use crate::config::Config;
use crate::cookies::{global_jar, Cookie, CookieInfo, CookieJar};
use crate::error::Result;
use crate::pool::ConnectionPool;
use crate::proxy::ProxyResolver;
use crate::request::{Request, RequestBuilder};
use crate::response::Response;
use crate::run;
use crate::stream::Connector;

/// Agents keep state between requests.
///
/// An agent owns a connection pool, so sequential requests to the same
/// host reuse the underlying socket when both sides agree to keep it
/// alive. It also carries the configuration for redirects, retries,
/// proxies and authentication, and a cookie jar — by default the
/// process-wide one, shared with every other default agent.
///
/// Agent uses an inner [`Arc`], so cloning an agent results in an
/// instance that shares the same pool and cookie jar.
///
/// ```no_run
/// let agent = httpc::agent();
///
/// agent.post("http://example.com/login")
///     .send_form(&[("user", "martin"), ("pass", "rubbermashgum")])?;
///
/// // reuses the connection, carries the login cookie
/// let secret = agent.get("http://example.com/my-protected-page")
///     .call()?
///     .into_string()?;
/// # Ok::<(), httpc::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Agent {
    pub(crate) config: Arc<Config>,
    pub(crate) state: Arc<AgentState>,
}

/// Container of the state.
///
/// *Internal API*.
#[derive(Debug)]
pub(crate) struct AgentState {
    /// Reused connections between requests.
    pub(crate) pool: Mutex<ConnectionPool>,
    /// Cookies saved between requests.
    pub(crate) jar: Arc<RwLock<CookieJar>>,
}

impl Default for Agent {
    fn default() -> Self {
        AgentBuilder::new().build()
    }
}

impl Agent {
    /// An agent with default configuration.
    pub fn new() -> Self {
        Agent::default()
    }

    /// Request by providing the HTTP verb such as `GET`, `POST`…
    pub fn request(&self, method: &str, url: &str) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url)
    }

    /// Make a GET request from this agent.
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request("GET", url)
    }

    /// Make a HEAD request from this agent.
    pub fn head(&self, url: &str) -> RequestBuilder {
        self.request("HEAD", url)
    }

    /// Make a POST request from this agent.
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request("POST", url)
    }

    /// Make a PUT request from this agent.
    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request("PUT", url)
    }

    /// Make a DELETE request from this agent.
    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request("DELETE", url)
    }

    /// Make a TRACE request from this agent.
    pub fn trace(&self, url: &str) -> RequestBuilder {
        self.request("TRACE", url)
    }

    /// Make an OPTIONS request from this agent.
    pub fn options(&self, url: &str) -> RequestBuilder {
        self.request("OPTIONS", url)
    }

    /// Make a PATCH request from this agent.
    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request("PATCH", url)
    }

    /// The lowest-level driver: run `request` to a terminal response and
    /// hand the delimited body to `reader`.
    ///
    /// Retries, redirects, proxy hints and authentication challenges are
    /// handled inside; `body` may be written once per attempt, so it must
    /// be replayable. The reader receives the response head and a stream
    /// that reports EOF at the body boundary. Whatever the reader leaves
    /// unread is *not* drained: the connection only returns to the pool
    /// if the body was read to completion under keep-alive.
    ///
    /// Returns the reader's value, the effective url after redirects, and
    /// the response head. No status classification is applied; a terminal
    /// 404 reaches the reader like any other response.
    pub fn call_with_response<T, F>(
        &self,
        request: Request,
        body: Option<&mut dyn Body>,
        reader: F,
    ) -> Result<(T, Url, Response)>
    where
        F: FnOnce(&Response, &mut dyn Read) -> Result<T>,
    {
        let mut response = run::run(self, &self.config, request, body)?;
        let url = response.get_url().clone();
        let mut stream = response.take_reader();
        let value = reader(&response, &mut *stream)?;
        // not drained on purpose: the reader's result stands
        drop(stream);
        Ok((value, url, response))
    }

    /// Close the pooled connection for the url's host and port, if any.
    pub fn close_connection(&self, url: &Url) {
        self.state.pool.lock().unwrap().close(url);
    }

    /// Close every pooled connection.
    pub fn close_all_connections(&self) {
        self.state.pool.lock().unwrap().close_all();
    }

    /// Store a cookie in this agent's jar.
    pub fn store_cookie(&self, info: CookieInfo, cookie: Cookie) {
        self.state.jar.write().unwrap().store_cookie(info, cookie);
    }

    /// Remove a cookie from this agent's jar by identity.
    pub fn delete_cookie(&self, name: &str, domain: &str, path: &str) -> bool {
        self.state.jar.write().unwrap().delete_cookie(name, domain, path)
    }

    /// The cookies this agent would send to the given url.
    pub fn cookies_for(&self, url: &Url) -> Vec<(CookieInfo, Cookie)> {
        self.state.jar.read().unwrap().cookies_for(url)
    }

    #[cfg(test)]
    pub(crate) fn pool_size(&self) -> usize {
        self.state.pool.lock().unwrap().len()
    }
}

/// Accumulates agent configuration, then builds the [`Agent`].
///
/// ```
/// let agent = httpc::AgentBuilder::new()
///     .user_agent("fetcher/1.0")
///     .max_redirects(2)
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct AgentBuilder {
    config: Config,
    jar: Option<Arc<RwLock<CookieJar>>>,
}

impl AgentBuilder {
    /// A builder with the default configuration.
    pub fn new() -> AgentBuilder {
        AgentBuilder {
            ..Default::default()
        }
    }

    /// Create the agent.
    pub fn build(self) -> Agent {
        Agent {
            config: Arc::new(self.config),
            state: Arc::new(AgentState {
                pool: Mutex::new(ConnectionPool::new()),
                jar: self.jar.unwrap_or_else(global_jar),
            }),
        }
    }

    /// The `User-Agent` header sent with requests.
    pub fn user_agent(mut self, value: &str) -> Self {
        self.config.user_agent = value.to_string();
        self
    }

    /// Maximum redirect depth. The default is 5.
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.config.max_redirect_depth = Some(max);
        self
    }

    /// Follow redirects without a depth limit.
    pub fn no_redirect_limit(mut self) -> Self {
        self.config.max_redirect_depth = None;
        self
    }

    /// Maximum retry attempts after transport failures. The default is 1.
    pub fn max_retry_attempts(mut self, max: u32) -> Self {
        self.config.max_retry_attempts = Some(max);
        self
    }

    /// Retry transport failures without an attempt limit.
    pub fn no_retry_limit(mut self) -> Self {
        self.config.max_retry_attempts = None;
        self
    }

    /// Replace the retry predicate deciding which requests may be
    /// reissued after a transport failure. The default allows idempotent
    /// methods only.
    pub fn retry_if(
        mut self,
        predicate: impl Fn(&Request) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.config.retry_predicate = Arc::new(predicate);
        self
    }

    /// Replace the proxy resolver. The default reads the conventional
    /// environment variables; see
    /// [`EnvProxyResolver`](crate::EnvProxyResolver).
    pub fn proxy_resolver(mut self, resolver: impl ProxyResolver + 'static) -> Self {
        self.config.proxy_resolver = Arc::new(resolver);
        self
    }

    /// Route all requests through the given proxy.
    pub fn proxy(self, proxy: Url) -> Self {
        self.proxy_resolver(move |_: &Url| Some(proxy.clone()))
    }

    /// Resolver for server (401) credentials. The default takes them
    /// from the request url's userinfo.
    pub fn server_credentials(mut self, resolver: impl CredentialsResolver + 'static) -> Self {
        self.config.server_credentials = Arc::new(resolver);
        self
    }

    /// Resolver for proxy (407) credentials. The default takes them from
    /// the proxy url's userinfo.
    pub fn proxy_credentials(mut self, resolver: impl CredentialsResolver + 'static) -> Self {
        self.config.proxy_credentials = Arc::new(resolver);
        self
    }

    /// Register an authenticator for a challenge scheme token, replacing
    /// any previous one. `basic` and `digest` are registered by default.
    pub fn authenticator(mut self, scheme: &str, authenticator: impl Authenticator + 'static) -> Self {
        self.config
            .authenticators
            .insert(scheme.to_ascii_lowercase(), Arc::new(authenticator));
        self
    }

    /// Replace the transport connector.
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.config.connector = Arc::new(connector);
        self
    }

    /// Timeout for establishing connections.
    pub fn timeout_connect(mut self, timeout: Duration) -> Self {
        self.config.timeout_connect = Some(timeout);
        self
    }

    /// Timeout for individual socket reads.
    pub fn timeout_read(mut self, timeout: Duration) -> Self {
        self.config.timeout_read = Some(timeout);
        self
    }

    /// Timeout for individual socket writes.
    pub fn timeout_write(mut self, timeout: Duration) -> Self {
        self.config.timeout_write = Some(timeout);
        self
    }

    /// Use the given jar instead of the process-wide one.
    pub fn cookie_jar(mut self, jar: Arc<RwLock<CookieJar>>) -> Self {
        self.jar = Some(jar);
        self
    }

    /// Use a fresh jar private to this agent.
    pub fn private_cookie_jar(mut self) -> Self {
        self.jar = Some(Arc::new(RwLock::new(CookieJar::new())));
        self
    }
}

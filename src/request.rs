use url::Url;

use crate::agent::Agent;
use crate::body::{Body, BytesBody, FormBody};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::header::{self, Header};
use crate::multipart::Multipart;
use crate::response::Response;
use crate::run;

/// An in-flight request: method, target url and ordered headers.
///
/// This is the value the execution loop mutates while following redirects
/// and answering authentication challenges. Most callers never build one
/// directly; [`RequestBuilder`] does it for them.
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: String,
    pub(crate) url: Url,
    pub(crate) headers: Vec<Header>,
}

impl Request {
    /// Create a request from a method and url string.
    pub fn new(method: &str, url: &str) -> Result<Request> {
        let url =
            Url::parse(url).map_err(|e| Error::BadUrl(format!("{}: {}", url, e)))?;
        Ok(Request::from_url(method, url))
    }

    /// Create a request from a method and an already parsed url.
    pub fn from_url(method: &str, url: Url) -> Request {
        Request {
            method: method.to_string(),
            url,
            headers: vec![],
        }
    }

    /// The request method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The target url.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The header value for the given name, if any.
    pub fn header(&self, name: &str) -> Option<&str> {
        header::get_header(&self.headers, name)
    }

    /// All header values for the given name.
    pub fn all(&self, name: &str) -> Vec<&str> {
        header::get_all_headers(&self.headers, name)
    }

    /// Tells if the request has the named header.
    pub fn has(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Set a header, replacing any previous value.
    pub fn set(&mut self, name: &str, value: &str) {
        header::set_header(&mut self.headers, Header::new(name, value));
    }

    /// Append a header, keeping previous values with the same name.
    pub fn add(&mut self, name: &str, value: &str) {
        self.headers.push(Header::new(name, value));
    }
}

/// Accumulates request settings, then performs the call.
///
/// ```no_run
/// let body = httpc::get("http://example.com/")
///     .set("Accept", "text/plain")
///     .call()?
///     .into_string()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RequestBuilder {
    agent: Agent,
    method: String,
    url: String,
    headers: Vec<Header>,
    config: Option<Config>,
}

impl RequestBuilder {
    pub(crate) fn new(agent: Agent, method: &str, url: &str) -> Self {
        RequestBuilder {
            agent,
            method: method.to_string(),
            url: url.to_string(),
            headers: vec![],
            config: None,
        }
    }

    fn config_mut(&mut self) -> &mut Config {
        let agent = &self.agent;
        self.config
            .get_or_insert_with(|| (*agent.config).clone())
    }

    /// Set a header on this request, replacing any previous value.
    pub fn set(mut self, name: &str, value: &str) -> Self {
        header::set_header(&mut self.headers, Header::new(name, value));
        self
    }

    /// Append a header, keeping previous values with the same name.
    pub fn add(mut self, name: &str, value: &str) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Maximum redirect depth for this call. Overrides the agent setting.
    pub fn redirects(mut self, max: u32) -> Self {
        self.config_mut().max_redirect_depth = Some(max);
        self
    }

    /// Maximum retry attempts for this call. Overrides the agent setting.
    pub fn retries(mut self, max: u32) -> Self {
        self.config_mut().max_retry_attempts = Some(max);
        self
    }

    /// Replace the retry predicate for this call.
    ///
    /// The default predicate retries only idempotent methods.
    pub fn retry_if(
        mut self,
        predicate: impl Fn(&Request) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.config_mut().retry_predicate = std::sync::Arc::new(predicate);
        self
    }

    /// Route this call through the given proxy, bypassing the resolver.
    pub fn proxy(mut self, proxy: Url) -> Self {
        self.config_mut().proxy_resolver =
            std::sync::Arc::new(move |_: &Url| Some(proxy.clone()));
        self
    }

    /// Perform the call without a body.
    pub fn call(self) -> Result<Response> {
        self.do_call(None)
    }

    /// Send a string body (`text/plain` unless a Content-Type is set).
    pub fn send_string(self, data: &str) -> Result<Response> {
        let mut body = BytesBody::text(data);
        self.do_call(Some(&mut body))
    }

    /// Send a raw byte body.
    pub fn send_bytes(self, data: &[u8]) -> Result<Response> {
        let mut body = BytesBody::new(data.to_vec(), None);
        self.do_call(Some(&mut body))
    }

    /// Send key/value pairs as `application/x-www-form-urlencoded`.
    pub fn send_form(self, pairs: &[(&str, &str)]) -> Result<Response> {
        let mut body = FormBody::new(pairs);
        self.do_call(Some(&mut body))
    }

    /// Send a `multipart/form-data` body.
    pub fn send_multipart(self, mut multipart: Multipart) -> Result<Response> {
        multipart.validate()?;
        self.do_call(Some(&mut multipart))
    }

    /// Send any [`Body`], including a plain closure writing the bytes.
    pub fn send(self, body: &mut dyn Body) -> Result<Response> {
        self.do_call(Some(body))
    }

    fn do_call(mut self, body: Option<&mut dyn Body>) -> Result<Response> {
        let url =
            Url::parse(&self.url).map_err(|e| Error::BadUrl(format!("{}: {}", self.url, e)))?;
        let request = Request {
            method: self.method.clone(),
            url,
            headers: std::mem::take(&mut self.headers),
        };
        let config = match self.config.take() {
            Some(c) => std::sync::Arc::new(c),
            None => self.agent.config.clone(),
        };
        let response = run::run(&self.agent, &config, request, body)?;
        run::classify_status(response)
    }
}

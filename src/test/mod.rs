//! In-process test support: requests to `test://` urls are served by
//! per-path handlers registered here, so the whole execution loop runs
//! without sockets. What the client writes is captured in the stream for
//! later assertions.

use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use url::Url;

use crate::error::Error;
use crate::header::Header;
use crate::stream::Stream;

mod auth;
mod cookie;
mod redirect;
mod simple;

type RequestHandler = dyn Fn(&Url) -> Result<Stream, Error> + Send + 'static;

/// Handlers queue per path; each incoming connect for a path pops one.
static HANDLERS: Lazy<Mutex<HashMap<String, VecDeque<Box<RequestHandler>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub(crate) fn set_handler<H>(path: &str, handler: H)
where
    H: Fn(&Url) -> Result<Stream, Error> + Send + 'static,
{
    let _ = env_logger::try_init();
    let mut handlers = HANDLERS.lock().unwrap();
    handlers
        .entry(path.to_string())
        .or_insert_with(VecDeque::new)
        .push_back(Box::new(handler));
}

/// Called by the default connector for the `test` scheme.
pub(crate) fn resolve_handler(url: &Url) -> Result<Stream, Error> {
    let handler = {
        let mut handlers = HANDLERS.lock().unwrap();
        let queue = handlers
            .get_mut(url.path())
            .ok_or_else(|| Error::ConnectionFailed(format!("no test handler for {}", url.path())))?;
        queue.pop_front().ok_or_else(|| {
            Error::ConnectionFailed(format!("test handlers exhausted for {}", url.path()))
        })?
    };
    handler(url)
}

/// A canned response stream with its own (inaccessible) write capture.
pub(crate) fn make_response(
    status: u16,
    status_text: &str,
    headers: Vec<&str>,
    body: Vec<u8>,
) -> Result<Stream, Error> {
    make_captured_response(
        status,
        status_text,
        headers,
        body,
        Arc::new(Mutex::new(vec![])),
    )
}

/// A canned response stream writing the client's bytes into `capture`.
pub(crate) fn make_captured_response(
    status: u16,
    status_text: &str,
    headers: Vec<&str>,
    mut body: Vec<u8>,
    capture: Arc<Mutex<Vec<u8>>>,
) -> Result<Stream, Error> {
    let mut buf: Vec<u8> = vec![];
    write!(&mut buf, "HTTP/1.1 {} {}\r\n", status, status_text).ok();
    for hstr in headers.iter() {
        let header = hstr.parse::<Header>().unwrap();
        write!(&mut buf, "{}: {}\r\n", header.name(), header.value()).ok();
    }
    write!(&mut buf, "\r\n").ok();
    buf.append(&mut body);
    Ok(Stream::Test(Box::new(Cursor::new(buf)), capture))
}

/// A stream where the server hangs up before any response bytes.
pub(crate) fn make_disconnect(capture: Arc<Mutex<Vec<u8>>>) -> Result<Stream, Error> {
    Ok(Stream::Test(Box::new(Cursor::new(vec![])), capture))
}

/// The captured client bytes as a string.
pub(crate) fn captured(capture: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&capture.lock().unwrap()).into_owned()
}

/// The header value out of a captured request, if present.
pub(crate) fn captured_header(capture: &Arc<Mutex<Vec<u8>>>, name: &str) -> Option<String> {
    let text = captured(capture);
    let prefix = format!("{}:", name.to_ascii_lowercase());
    text.lines()
        .take_while(|l| !l.is_empty())
        .find(|l| l.to_ascii_lowercase().starts_with(&prefix))
        .map(|l| l[prefix.len()..].trim().to_string())
}

/// A default agent with a jar private to the test and no environment
/// proxying, whatever the machine running the tests has configured.
pub(crate) fn test_agent() -> crate::Agent {
    crate::AgentBuilder::new()
        .private_cookie_jar()
        .proxy_resolver(|_: &Url| None)
        .build()
}

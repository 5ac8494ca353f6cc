use std::io::{Read, Write};

use log::{debug, info, trace};
use url::Url;

use crate::agent::Agent;
use crate::auth::{AuthArgs, Challenge};
use crate::body::{discard, Body, BodyKind, LimitedRead};
use crate::config::{within, Config};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::pool::{effective_port, Connection, PoolReturnRead};
use crate::request::Request;
use crate::response::Response;
use crate::stream::ConnectDetails;

/// Drive a request until a terminal response.
///
/// This is the "main loop" of the entire crate: acquire a connection,
/// write the request, parse the response, then retry, follow a redirect,
/// answer an auth challenge, honor a 305 proxy hint, or hand the response
/// back. Cookies are ingested before dispatching on the status. The
/// connection is released (pooled, or closed) on every path out.
pub(crate) fn run(
    agent: &Agent,
    config: &Config,
    mut req: Request,
    mut body: Option<&mut dyn Body>,
) -> Result<Response> {
    let mut attempts: u32 = 0;
    let mut redirects: u32 = 0;
    // set by a 305, consumed by the next connection acquisition
    let mut proxy_override: Option<Url> = None;

    loop {
        let proxy = match proxy_override.take() {
            Some(p) => Some(p),
            None => config.proxy_resolver.proxy_for(&req.url),
        };

        debug!(
            "{} {} (attempt {}, redirect {})",
            req.method, req.url, attempts, redirects
        );

        let mut conn = match acquire_connection(agent, config, &req.url, &proxy) {
            Ok(conn) => conn,
            Err(e) => {
                if e.is_transport()
                    && within(config.max_retry_attempts, attempts)
                    && (config.retry_predicate)(&req)
                {
                    debug!("retrying after connect failure: {}", e);
                    attempts += 1;
                    continue;
                }
                return Err(e);
            }
        };

        let wire_uri = wire_uri(&req.url, proxy.is_some());
        let req_keep_alive = request_keep_alive(&req);

        let body_ref = body.as_mut().map(|b| &mut **b as &mut dyn Body);
        let resp = match send_request(agent, config, &mut conn, &req, &wire_uri, body_ref) {
            Ok(resp) => resp,
            Err(e) => {
                // the stream state is unknown either way: close it
                drop(conn);
                if e.is_transport()
                    && within(config.max_retry_attempts, attempts)
                    && (config.retry_predicate)(&req)
                {
                    debug!("retrying after transport error: {}", e);
                    attempts += 1;
                    continue;
                }
                return Err(e);
            }
        };

        // cookies are updated before status dispatch, so even redirect and
        // challenge responses can set them
        agent
            .state
            .jar
            .write()
            .unwrap()
            .ingest_response(&req.url, resp.headers());

        match resp.status() {
            301 | 302 | 303 | 307 => {
                let location = match resp.header("location").map(str::to_string) {
                    Some(l) => l,
                    // a redirect going nowhere is handed to the caller
                    None => return finish(agent, conn, &req, req_keep_alive, resp),
                };
                let new_url = match req.url.join(&location) {
                    Ok(u) => u,
                    Err(_) => {
                        drop(conn);
                        return Err(Error::BadLocation(location));
                    }
                };
                let status = resp.status();
                drain_and_release(agent, conn, &req, req_keep_alive, &resp);
                redirects += 1;
                if !within(config.max_redirect_depth, redirects) {
                    return Err(Error::TooManyRedirects(redirects));
                }
                info!("redirect {} {} -> {}", status, req.url, new_url);
                req.url = new_url;
                if status == 303 {
                    // see other means re-fetch, not re-submit
                    req.method = "GET".to_string();
                    body = None;
                }
                continue;
            }

            305 => {
                let location = match resp.header("location").map(str::to_string) {
                    Some(l) => l,
                    None => return finish(agent, conn, &req, req_keep_alive, resp),
                };
                let proxy_url = match req.url.join(&location) {
                    Ok(u) => u,
                    Err(_) => {
                        drop(conn);
                        return Err(Error::BadLocation(location));
                    }
                };
                drain_and_release(agent, conn, &req, req_keep_alive, &resp);
                info!("use proxy hint: {}", proxy_url);
                // one-shot: does not count as a redirect
                proxy_override = Some(proxy_url);
                continue;
            }

            401 | 407 => {
                let proxy_challenge = resp.status() == 407;
                let challenge_header = if proxy_challenge {
                    "proxy-authenticate"
                } else {
                    "www-authenticate"
                };
                let auth_header = if proxy_challenge {
                    "Proxy-Authorization"
                } else {
                    "Authorization"
                };

                let challenge = resp
                    .header(challenge_header)
                    .and_then(Challenge::parse);

                let challenge = match challenge {
                    Some(c) => c,
                    None => return finish(agent, conn, &req, req_keep_alive, resp),
                };

                let authenticator = match config.authenticators.get(challenge.scheme()) {
                    Some(a) => a.clone(),
                    None => {
                        drop(conn);
                        return Err(Error::UnknownAuthType(challenge.scheme().to_string()));
                    }
                };

                let resolver = if proxy_challenge {
                    config.proxy_credentials.clone()
                } else {
                    config.server_credentials.clone()
                };
                let auth_url = match (&proxy, proxy_challenge) {
                    (Some(p), true) => p.clone(),
                    _ => req.url.clone(),
                };

                let mut args = AuthArgs {
                    challenge: &challenge,
                    request: &req,
                    wire_uri: &wire_uri,
                    auth_header,
                    credentials: &*resolver,
                    auth_url: &auth_url,
                    body: body.as_mut().map(|b| &mut **b as &mut dyn Body),
                };

                let produced = match authenticator.authenticate(&mut args) {
                    Ok(p) => p,
                    Err(e) => {
                        drop(conn);
                        return Err(e);
                    }
                };

                match produced {
                    Some(new_req) if within(config.max_retry_attempts, attempts) => {
                        drain_and_release(agent, conn, &req, req_keep_alive, &resp);
                        attempts += 1;
                        info!(
                            "answering {} challenge with {} credentials",
                            challenge.scheme(),
                            if proxy_challenge { "proxy" } else { "server" }
                        );
                        req = new_req;
                        continue;
                    }
                    // no credentials, or the budget is spent: the caller
                    // gets the challenge response itself
                    _ => return finish(agent, conn, &req, req_keep_alive, resp),
                }
            }

            _ => return finish(agent, conn, &req, req_keep_alive, resp),
        }
    }
}

/// Map a terminal status to the error taxonomy of the convenience API.
pub(crate) fn classify_status(response: Response) -> Result<Response> {
    match response.status() {
        200..=299 => Ok(response),
        400..=499 => Err(Error::ClientError(Box::new(response))),
        500..=599 => Err(Error::ServerError(Box::new(response))),
        _ => Err(Error::UnexpectedStatus(Box::new(response))),
    }
}

fn acquire_connection(
    agent: &Agent,
    config: &Config,
    url: &Url,
    proxy: &Option<Url>,
) -> Result<Connection> {
    {
        let mut pool = agent.state.pool.lock().unwrap();
        if let Some(conn) = pool.try_get_connection(url) {
            if conn.info.proxy == *proxy {
                return Ok(conn);
            }
            // pooled entry goes through the wrong (or no) proxy; a new
            // connection replaces it
            debug!("discarding pooled connection with stale proxy");
        }
    }

    let (scheme, hostname, port) = match proxy {
        Some(p) => (
            p.scheme(),
            p.host_str().ok_or_else(|| Error::BadUrl(p.to_string()))?,
            effective_port(p),
        ),
        None => (
            url.scheme(),
            url.host_str().ok_or_else(|| Error::BadUrl(url.to_string()))?,
            effective_port(url),
        ),
    };

    let details = ConnectDetails {
        url,
        scheme,
        hostname,
        port,
        timeout_connect: config.timeout_connect,
        timeout_read: config.timeout_read,
        timeout_write: config.timeout_write,
    };

    let stream = config.connector.connect(&details)?;
    Ok(Connection::new(url, proxy.clone(), stream))
}

/// Serialize request line and headers, write the body, flush, and parse
/// the response head.
fn send_request(
    agent: &Agent,
    config: &Config,
    conn: &mut Connection,
    req: &Request,
    wire_uri: &str,
    mut body: Option<&mut dyn Body>,
) -> Result<Response> {
    let mut extra: Vec<Header> = vec![];

    if !req.has("cookie") {
        let jar = agent.state.jar.read().unwrap();
        if let Some(value) = jar.header_for(&req.url) {
            extra.push(Header::new("Cookie", &value));
        }
    }
    if !req.has("host") {
        extra.push(Header::new("Host", &host_header(&req.url)));
    }
    if !req.has("user-agent") {
        extra.push(Header::new("User-Agent", &config.user_agent));
    }
    if !req.has("accept") {
        extra.push(Header::new("Accept", "*/*"));
    }

    let mut use_chunked = req
        .header("transfer-encoding")
        .map(|enc| !enc.is_empty())
        .unwrap_or(false);

    if let Some(b) = body.as_mut() {
        if let Some(content_type) = b.content_type() {
            if !req.has("content-type") {
                extra.push(Header::new("Content-Type", content_type));
            }
        }
        // chunking and Content-Length are mutually exclusive
        if !use_chunked && !req.has("content-length") {
            match b.content_length()? {
                Some(len) => extra.push(Header::new("Content-Length", &len.to_string())),
                None => {
                    extra.push(Header::new("Transfer-Encoding", "chunked"));
                    use_chunked = true;
                }
            }
        }
    }

    // build into a buffer and send in one go
    let mut prelude: Vec<u8> = vec![];
    write!(prelude, "{} {} HTTP/1.1\r\n", req.method, wire_uri)?;
    for header in req.headers.iter().chain(extra.iter()) {
        write!(prelude, "{}: {}\r\n", header.name(), header.value())?;
    }
    write!(prelude, "\r\n")?;

    trace!("sending prelude:\n{}", String::from_utf8_lossy(&prelude));

    conn.stream.write_all(&prelude)?;

    if let Some(b) = body {
        if use_chunked {
            // the encoder writes the terminating chunk when dropped
            let mut encoder = chunked_transfer::Encoder::new(&mut conn.stream);
            b.write_onto(&mut encoder)?;
        } else {
            b.write_onto(&mut conn.stream)?;
        }
    }

    conn.stream.flush()?;

    Response::do_from_read(&req.url, &mut conn.stream)
}

/// Terminal branch: attach the delimited body reader and give the
/// response away. A keep-alive connection returns to the pool when the
/// reader is read to completion; anything else closes when the reader is
/// dropped.
fn finish(
    agent: &Agent,
    conn: Connection,
    req: &Request,
    req_keep_alive: bool,
    mut resp: Response,
) -> Result<Response> {
    let kind = BodyKind::from_response(req.method(), resp.status(), resp.headers());
    let keep_alive = req_keep_alive && resp.is_keep_alive();

    let Connection { info, stream } = conn;

    let reader: Box<dyn Read + Send> = match kind {
        BodyKind::Length(0) if keep_alive => {
            // nothing to drain: the connection is immediately reusable
            let conn = Connection { info, stream };
            agent.state.pool.lock().unwrap().return_connection(conn);
            Box::new(std::io::empty())
        }
        BodyKind::Length(len) if keep_alive => Box::new(PoolReturnRead::new(
            agent.state.clone(),
            info,
            LimitedRead::new(stream, len),
        )),
        BodyKind::Length(len) => Box::new(LimitedRead::new(stream, len)),
        BodyKind::Chunked if keep_alive => Box::new(PoolReturnRead::new(
            agent.state.clone(),
            info,
            chunked_transfer::Decoder::new(stream),
        )),
        BodyKind::Chunked => Box::new(chunked_transfer::Decoder::new(stream)),
        // delimited by connection close: never reusable
        BodyKind::Close => Box::new(stream),
    };

    resp.set_reader(reader);
    Ok(resp)
}

/// Cleanup for a response we re-issue after: drain the body so the
/// connection is reusable, then pool it if both sides asserted
/// keep-alive. Connections that fail draining are closed by the drop.
fn drain_and_release(
    agent: &Agent,
    mut conn: Connection,
    req: &Request,
    req_keep_alive: bool,
    resp: &Response,
) {
    let kind = BodyKind::from_response(req.method(), resp.status(), resp.headers());
    let keep_alive = req_keep_alive && resp.is_keep_alive();

    let drained = match kind {
        BodyKind::Length(0) => true,
        BodyKind::Length(len) => {
            discard(&mut LimitedRead::new(&mut conn.stream, len)).is_ok()
        }
        BodyKind::Chunked => {
            discard(&mut chunked_transfer::Decoder::new(&mut conn.stream)).is_ok()
        }
        // reading to EOF means the connection is spent
        BodyKind::Close => false,
    };

    if drained && keep_alive {
        agent.state.pool.lock().unwrap().return_connection(conn);
    }
}

fn request_keep_alive(req: &Request) -> bool {
    !req.header("connection")
        .map(|v| v.eq_ignore_ascii_case("close"))
        .unwrap_or(false)
}

/// The uri as it goes on the request line: origin-form when direct (with
/// `/` substituted for an empty path), absolute-form when proxied. Never
/// carries fragment or userinfo.
fn wire_uri(url: &Url, proxied: bool) -> String {
    if proxied {
        let mut stripped = url.clone();
        stripped.set_fragment(None);
        let _ = stripped.set_username("");
        let _ = stripped.set_password(None);
        stripped.to_string()
    } else {
        let path = url.path();
        let mut s = if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        };
        if let Some(query) = url.query() {
            s.push('?');
            s.push_str(query);
        }
        s
    }
}

/// Host header value: the host, with the port only when it isn't the
/// scheme default.
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or("localhost");
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

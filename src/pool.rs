use std::collections::HashMap;
use std::io::{Read, Result as IoResult};
use std::sync::Arc;

use log::{debug, trace};
use url::Url;

use crate::agent::AgentState;
use crate::stream::Stream;

/// Reused connections between requests. One per hostname:port.
///
/// Entries are keyed by the *request target* host and port, compared
/// case-sensitively on the host text as given. A pooled entry is only
/// handed back out if its stream still looks alive; dead entries are
/// evicted on lookup.
#[derive(Debug, Default)]
pub(crate) struct ConnectionPool {
    recycle: HashMap<PoolKey, Connection>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        ConnectionPool {
            ..Default::default()
        }
    }

    pub fn try_get_connection(&mut self, url: &Url) -> Option<Connection> {
        let key = PoolKey::new(url);
        let mut conn = self.recycle.remove(&key)?;
        if conn.stream.is_dropped() {
            debug!("evict dead connection for {}:{}", key.hostname, key.port);
            return None;
        }
        trace!("reuse connection for {}:{}", key.hostname, key.port);
        Some(conn)
    }

    pub fn return_connection(&mut self, conn: Connection) {
        let key = PoolKey {
            hostname: conn.info.hostname.clone(),
            port: conn.info.port,
        };
        trace!("pool connection for {}:{}", key.hostname, key.port);
        self.recycle.insert(key, conn);
    }

    /// Close the pooled connection for the url's host and port, if any.
    pub fn close(&mut self, url: &Url) {
        // dropping the entry closes the stream
        self.recycle.remove(&PoolKey::new(url));
    }

    pub fn close_all(&mut self) {
        self.recycle.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.recycle.len()
    }
}

#[derive(Debug, PartialEq, Clone, Eq, Hash)]
pub(crate) struct PoolKey {
    hostname: String,
    port: u16,
}

impl PoolKey {
    fn new(url: &Url) -> Self {
        PoolKey {
            hostname: url.host_str().unwrap_or("localhost").into(),
            port: effective_port(url),
        }
    }
}

/// The port requests to this url actually target.
pub(crate) fn effective_port(url: &Url) -> u16 {
    url.port_or_known_default().unwrap_or(0)
}

/// Identity of a pooled connection, kept apart from the stream so the
/// stream can be wrapped by body readers and recovered afterwards.
#[derive(Debug, Clone)]
pub(crate) struct ConnInfo {
    pub hostname: String,
    pub port: u16,
    /// The proxy this connection goes through, if any. A pooled entry is
    /// only reused when the proxy still matches.
    pub proxy: Option<Url>,
}

/// A live connection: where it goes plus the stream to get there.
#[derive(Debug)]
pub(crate) struct Connection {
    pub info: ConnInfo,
    pub stream: Stream,
}

impl Connection {
    pub fn new(url: &Url, proxy: Option<Url>, stream: Stream) -> Self {
        Connection {
            info: ConnInfo {
                hostname: url.host_str().unwrap_or("localhost").into(),
                port: effective_port(url),
                proxy,
            },
            stream,
        }
    }
}

/// Wraps a body reader and puts the connection back in the pool once the
/// body has been read to completion.
///
/// Only when the underlying reader is exhausted can a new request reuse
/// the socket, so the return happens on the first `Ok(0)` read. Dropping
/// the wrapper before that point closes the connection instead.
pub(crate) struct PoolReturnRead<R: Read + Into<Stream>> {
    state: Option<Arc<AgentState>>,
    info: ConnInfo,
    reader: Option<R>,
}

impl<R: Read + Into<Stream>> PoolReturnRead<R> {
    pub fn new(state: Arc<AgentState>, info: ConnInfo, reader: R) -> Self {
        PoolReturnRead {
            state: Some(state),
            info,
            reader: Some(reader),
        }
    }

    fn return_connection(&mut self) {
        let (state, reader) = match (self.state.take(), self.reader.take()) {
            (Some(s), Some(r)) => (s, r),
            _ => return,
        };
        let stream = reader.into();
        let conn = Connection {
            info: self.info.clone(),
            stream,
        };
        let mut pool = state.pool.lock().unwrap();
        pool.return_connection(conn);
    }

    fn do_read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        match self.reader.as_mut() {
            None => Ok(0),
            Some(reader) => reader.read(buf),
        }
    }
}

impl<R: Read + Into<Stream>> Read for PoolReturnRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let amount = self.do_read(buf)?;
        if amount == 0 {
            self.return_connection();
        }
        Ok(amount)
    }
}

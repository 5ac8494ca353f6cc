use std::fmt;
use std::io::{Cursor, Read, Result as IoResult, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;
use url::Url;

use crate::error::Error;

#[cfg(feature = "tls")]
use native_tls::TlsStream;

/// A duplex byte stream to a server.
///
/// The pool stores this object; both halves of the conversation go through
/// it. Dropping the stream closes the underlying socket.
pub enum Stream {
    /// Plain TCP.
    Http(TcpStream),
    /// TLS over TCP. Requires the **tls** feature.
    #[cfg(feature = "tls")]
    Https(Box<TlsStream<TcpStream>>),
    /// An in-memory, read-only stream.
    Cursor(Cursor<Vec<u8>>),
    #[cfg(test)]
    /// Canned response bytes plus a shared capture of what was written.
    Test(Box<dyn Read + Send>, std::sync::Arc<std::sync::Mutex<Vec<u8>>>),
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Stream[{}]",
            match self {
                Stream::Http(_) => "http",
                #[cfg(feature = "tls")]
                Stream::Https(_) => "https",
                Stream::Cursor(_) => "cursor",
                #[cfg(test)]
                Stream::Test(_, _) => "test",
            }
        )
    }
}

impl Stream {
    /// Whether the remote end has gone away.
    ///
    /// A connection is dropped if a peek reports EOF or errors out. Data
    /// sitting in the receive buffer means the stream is still usable.
    /// Errors while toggling socket modes count as dropped too.
    pub(crate) fn is_dropped(&mut self) -> bool {
        match self {
            Stream::Http(sock) => tcp_dropped(sock),
            #[cfg(feature = "tls")]
            Stream::Https(tls) => tcp_dropped(tls.get_ref()),
            Stream::Cursor(read) => read.position() >= read.get_ref().len() as u64,
            // A boxed reader can't be probed without consuming it.
            #[cfg(test)]
            Stream::Test(_, _) => true,
        }
    }

}

fn tcp_dropped(sock: &TcpStream) -> bool {
    if sock.set_nonblocking(true).is_err() {
        return true;
    }
    let mut buf = [0u8; 1];
    let dropped = match sock.peek(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
        Err(_) => true,
    };
    if sock.set_nonblocking(false).is_err() {
        return true;
    }
    dropped
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        match self {
            Stream::Http(sock) => sock.read(buf),
            #[cfg(feature = "tls")]
            Stream::Https(tls) => tls.read(buf),
            Stream::Cursor(read) => read.read(buf),
            #[cfg(test)]
            Stream::Test(reader, _) => reader.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        match self {
            Stream::Http(sock) => sock.write(buf),
            #[cfg(feature = "tls")]
            Stream::Https(tls) => tls.write(buf),
            Stream::Cursor(_) => panic!("write to read only stream"),
            #[cfg(test)]
            Stream::Test(_, writer) => writer.lock().unwrap().write(buf),
        }
    }
    fn flush(&mut self) -> IoResult<()> {
        match self {
            Stream::Http(sock) => sock.flush(),
            #[cfg(feature = "tls")]
            Stream::Https(tls) => tls.flush(),
            Stream::Cursor(_) => Ok(()),
            #[cfg(test)]
            Stream::Test(_, _) => Ok(()),
        }
    }
}

/// Everything a [`Connector`] needs to open a stream.
///
/// When the request goes through a proxy, `url` is still the request target
/// but `hostname`/`port`/`scheme` point at the proxy.
pub struct ConnectDetails<'a> {
    /// The url the request is for.
    pub url: &'a Url,
    /// The scheme of the host we physically connect to.
    pub scheme: &'a str,
    /// The host we physically connect to.
    pub hostname: &'a str,
    /// The port we physically connect to.
    pub port: u16,
    /// Connect timeout, if configured.
    pub timeout_connect: Option<Duration>,
    /// Read timeout, if configured.
    pub timeout_read: Option<Duration>,
    /// Write timeout, if configured.
    pub timeout_write: Option<Duration>,
}

/// Opens the transport for a request.
///
/// The default implementation does plain TCP for `http` and TLS for
/// `https` (with the **tls** feature). Swap it out on the
/// [`AgentBuilder`](crate::AgentBuilder) to route requests over custom
/// transports.
pub trait Connector: Send + Sync {
    /// Open a stream to `details.hostname:details.port`.
    fn connect(&self, details: &ConnectDetails) -> Result<Stream, Error>;
}

impl<F> Connector for F
where
    F: Fn(&ConnectDetails) -> Result<Stream, Error> + Send + Sync,
{
    fn connect(&self, details: &ConnectDetails) -> Result<Stream, Error> {
        self(details)
    }
}

/// The built-in connector: TCP, and TLS when the **tls** feature is on.
#[derive(Debug, Default)]
pub struct DefaultConnector;

impl Connector for DefaultConnector {
    fn connect(&self, details: &ConnectDetails) -> Result<Stream, Error> {
        match details.scheme {
            "http" => connect_http(details),
            "https" => connect_https(details),
            #[cfg(test)]
            "test" => crate::test::resolve_handler(details.url),
            scheme => Err(Error::UnsupportedScheme(scheme.to_string())),
        }
    }
}

fn connect_http(details: &ConnectDetails) -> Result<Stream, Error> {
    connect_host(details).map(Stream::Http)
}

#[cfg(feature = "tls")]
fn connect_https(details: &ConnectDetails) -> Result<Stream, Error> {
    use native_tls::TlsConnector;

    let socket = connect_host(details)?;
    let connector =
        TlsConnector::new().map_err(|e| Error::ConnectionFailed(format!("tls setup: {}", e)))?;
    let tls = connector
        .connect(details.hostname, socket)
        .map_err(|e| Error::ConnectionFailed(format!("tls handshake: {}", e)))?;

    Ok(Stream::Https(Box::new(tls)))
}

#[cfg(not(feature = "tls"))]
fn connect_https(details: &ConnectDetails) -> Result<Stream, Error> {
    Err(Error::MissingTlsProvider(details.hostname.to_string()))
}

fn connect_host(details: &ConnectDetails) -> Result<TcpStream, Error> {
    let addrs: Vec<SocketAddr> = format!("{}:{}", details.hostname, details.port)
        .to_socket_addrs()
        .map_err(|e| Error::DnsFailed(format!("{}", e)))?
        .collect();

    if addrs.is_empty() {
        return Err(Error::DnsFailed(format!(
            "no ip address for {}",
            details.hostname
        )));
    }

    // pick the first addr. resolvers typically order them for us.
    let sock_addr = addrs[0];

    debug!("connecting to {} at {}", details.hostname, sock_addr);

    let stream = match details.timeout_connect {
        Some(timeout) => TcpStream::connect_timeout(&sock_addr, timeout),
        None => TcpStream::connect(sock_addr),
    }
    .map_err(|err| Error::ConnectionFailed(format!("{}", err)))?;

    // Err if the duration is zero, so only set for Some(nonzero).
    if let Some(t) = details.timeout_read.filter(|t| !t.is_zero()) {
        stream.set_read_timeout(Some(t)).ok();
    }
    if let Some(t) = details.timeout_write.filter(|t| !t.is_zero()) {
        stream.set_write_timeout(Some(t)).ok();
    }

    Ok(stream)
}

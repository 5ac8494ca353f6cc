use std::fmt;
use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult};

use url::Url;

use crate::error::Error;
use crate::header::{get_all_headers, get_header, Header};

/// An HTTP response.
///
/// The response body is read through [`into_reader()`](Response::into_reader)
/// (or the convenience [`into_string()`](Response::into_string) /
/// [`into_vec()`](Response::into_vec)). The body reader reports EOF at the
/// body boundary; reading it to completion hands the connection back to the
/// agent's pool, while dropping it early closes the connection.
pub struct Response {
    url: Url,
    status_line: String,
    index: (usize, usize), // index into status_line where we split: HTTP/1.1 200 OK
    status: u16,
    headers: Vec<Header>,
    reader: Option<Box<dyn Read + Send>>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Response[status: {}, status_text: {}, url: {}]",
            self.status(),
            self.status_text(),
            self.url
        )
    }
}

impl Response {
    /// The entire status line, like `HTTP/1.1 200 OK`.
    pub fn status_line(&self) -> &str {
        self.status_line.as_str()
    }

    /// The http version: `HTTP/1.1`.
    pub fn http_version(&self) -> &str {
        &self.status_line.as_str()[0..self.index.0]
    }

    /// The status as a u16: `200`.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The reason phrase: `OK`.
    pub fn status_text(&self) -> &str {
        let from = self.index.1 + 1;
        if from >= self.status_line.len() {
            ""
        } else {
            self.status_line.as_str()[from..].trim()
        }
    }

    /// The url this response came from, after following any redirects.
    pub fn get_url(&self) -> &Url {
        &self.url
    }

    /// The header value for the given name, if any.
    pub fn header(&self, name: &str) -> Option<&str> {
        get_header(&self.headers, name)
    }

    /// Tells if the response has the named header.
    pub fn has(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// All header values for the given name, or an empty vector.
    pub fn all(&self, name: &str) -> Vec<&str> {
        get_all_headers(&self.headers, name)
    }

    pub(crate) fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Turn this response into a reader over the body.
    ///
    /// The reader reports EOF at the body boundary regardless of how reads
    /// are interleaved.
    pub fn into_reader(mut self) -> Box<dyn Read + Send> {
        self.take_reader()
    }

    /// Read the whole body into a string, replacing invalid UTF-8.
    pub fn into_string(self) -> IoResult<String> {
        let buf = self.into_vec()?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Read the whole body into a byte vector.
    pub fn into_vec(self) -> IoResult<Vec<u8>> {
        let mut buf: Vec<u8> = vec![];
        self.into_reader().read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn take_reader(&mut self) -> Box<dyn Read + Send> {
        self.reader
            .take()
            .unwrap_or_else(|| Box::new(std::io::empty()))
    }

    pub(crate) fn set_reader(&mut self, reader: Box<dyn Read + Send>) {
        self.reader = Some(reader);
    }

    /// Parse a response head. The reader is left positioned at the first
    /// body byte.
    pub(crate) fn do_from_read(url: &Url, reader: &mut impl Read) -> Result<Response, Error> {
        // HTTP/1.1 200 OK\r\n
        let status_line = read_next_line(reader).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                Error::PrematureDisconnection
            } else {
                Error::Io(e)
            }
        })?;

        let (index, status) = parse_status_line(status_line.as_str())?;

        let mut headers: Vec<Header> = Vec::new();
        loop {
            let line = read_next_line(reader).map_err(Error::Io)?;
            if line.is_empty() {
                break;
            }
            if let Ok(header) = line.as_str().parse::<Header>() {
                headers.push(header);
            }
        }

        Ok(Response {
            url: url.clone(),
            status_line,
            index,
            status,
            headers,
            reader: None,
        })
    }

    /// Whether this response agrees to keep the connection alive.
    pub(crate) fn is_keep_alive(&self) -> bool {
        let connection = self.header("connection").unwrap_or("");
        if connection.eq_ignore_ascii_case("close") {
            return false;
        }
        if self.http_version().eq_ignore_ascii_case("HTTP/1.0") {
            return connection.eq_ignore_ascii_case("keep-alive");
        }
        true
    }
}

fn parse_status_line(line: &str) -> Result<((usize, usize), u16), Error> {
    // HTTP/1.1 200 OK\r\n
    let mut split = line.splitn(3, ' ');

    let http_version = split.next().ok_or(Error::BadStatus)?;
    if http_version.len() < 5 || !http_version.starts_with("HTTP/") {
        return Err(Error::BadStatus);
    }
    let index1 = http_version.len();

    let status = split.next().ok_or(Error::BadStatus)?;
    if status.len() != 3 {
        return Err(Error::BadStatus);
    }
    let index2 = index1 + 1 + status.len();

    let status = status.parse::<u16>().map_err(|_| Error::BadStatus)?;

    // reason phrase may be absent
    Ok(((index1, index2), status))
}

fn read_next_line<R: Read>(reader: &mut R) -> IoResult<String> {
    let mut buf = Vec::new();
    let mut one = [0u8; 1];

    loop {
        let amount = reader.read(&mut one)?;
        if amount == 0 {
            return Err(IoError::new(ErrorKind::UnexpectedEof, "unexpected eof"));
        }
        if one[0] == b'\n' {
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            return String::from_utf8(buf)
                .map_err(|_| IoError::new(ErrorKind::InvalidInput, "header is not utf-8"));
        }
        buf.push(one[0]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(raw: &str) -> Result<Response, Error> {
        let url = Url::parse("http://example.com/").unwrap();
        let mut cursor = Cursor::new(raw.as_bytes().to_vec());
        Response::do_from_read(&url, &mut cursor)
    }

    #[test]
    fn parse_simple() {
        let resp = parse("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.status_text(), "OK");
        assert_eq!(resp.http_version(), "HTTP/1.1");
        assert_eq!(resp.header("content-length"), Some("5"));
    }

    #[test]
    fn parse_missing_reason() {
        let resp = parse("HTTP/1.1 302\r\nLocation: /x\r\n\r\n").unwrap();
        assert_eq!(resp.status(), 302);
        assert_eq!(resp.status_text(), "");
    }

    #[test]
    fn empty_stream_is_premature_disconnect() {
        let err = parse("").unwrap_err();
        assert!(matches!(err, Error::PrematureDisconnection));
    }

    #[test]
    fn partial_status_line_is_premature_disconnect() {
        let err = parse("HTTP/1.1 2").unwrap_err();
        assert!(matches!(err, Error::PrematureDisconnection));
    }

    #[test]
    fn garbage_is_bad_status() {
        let err = parse("definitely not http\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::BadStatus));
    }

    #[test]
    fn keep_alive_defaults() {
        let resp = parse("HTTP/1.1 200 OK\r\n\r\n").unwrap();
        assert!(resp.is_keep_alive());
        let resp = parse("HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!resp.is_keep_alive());
        let resp = parse("HTTP/1.0 200 OK\r\n\r\n").unwrap();
        assert!(!resp.is_keep_alive());
        let resp = parse("HTTP/1.0 200 OK\r\nConnection: keep-alive\r\n\r\n").unwrap();
        assert!(resp.is_keep_alive());
    }
}

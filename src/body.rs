use std::io::{self, Read, Write};

use crate::header::{get_header, Header};
use crate::stream::Stream;

/// A request body.
///
/// The execution loop invokes [`write_onto`](Body::write_onto) exactly once
/// per attempt. Retries, redirects and authentication re-challenges all
/// cause another attempt, so implementations must be able to produce the
/// same bytes again. Bodies backed by buffers or files are naturally
/// replayable; for one-shot readers, prefer a closure that reopens its
/// source.
///
/// Closures work directly as bodies:
///
/// ```no_run
/// use std::io::Write;
///
/// let mut body = |w: &mut dyn Write| w.write_all(b"streamed");
/// httpc::post("http://example.com/upload").send(&mut body)?;
/// # Ok::<(), httpc::Error>(())
/// ```
pub trait Body {
    /// Write the body bytes. Called once per attempt.
    fn write_onto(&mut self, w: &mut dyn Write) -> io::Result<()>;

    /// The body length when it can be known up front.
    ///
    /// `None` makes the request use chunked transfer coding. May open
    /// files to measure them.
    fn content_length(&mut self) -> io::Result<Option<u64>> {
        Ok(None)
    }

    /// Default `Content-Type`, used unless the request sets its own.
    fn content_type(&self) -> Option<&str> {
        None
    }
}

impl<F> Body for F
where
    F: FnMut(&mut dyn Write) -> io::Result<()>,
{
    fn write_onto(&mut self, w: &mut dyn Write) -> io::Result<()> {
        self(w)
    }
}

/// A body from a byte buffer.
pub struct BytesBody {
    data: Vec<u8>,
    content_type: Option<String>,
}

impl BytesBody {
    /// A body sending the given bytes with the given `Content-Type`.
    pub fn new(data: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        BytesBody {
            data: data.into(),
            content_type: content_type.map(|c| c.to_string()),
        }
    }

    /// A plain text body.
    pub fn text(data: &str) -> Self {
        Self::new(data.as_bytes().to_vec(), Some("text/plain; charset=utf-8"))
    }
}

impl Body for BytesBody {
    fn write_onto(&mut self, w: &mut dyn Write) -> io::Result<()> {
        w.write_all(&self.data)
    }

    fn content_length(&mut self) -> io::Result<Option<u64>> {
        Ok(Some(self.data.len() as u64))
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

/// An `application/x-www-form-urlencoded` body from key/value pairs.
pub struct FormBody {
    encoded: Vec<u8>,
}

impl FormBody {
    /// Encode the pairs as `key=value&…`.
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in pairs {
            serializer.append_pair(name, value);
        }
        FormBody {
            encoded: serializer.finish().into_bytes(),
        }
    }
}

impl Body for FormBody {
    fn write_onto(&mut self, w: &mut dyn Write) -> io::Result<()> {
        w.write_all(&self.encoded)
    }

    fn content_length(&mut self) -> io::Result<Option<u64>> {
        Ok(Some(self.encoded.len() as u64))
    }

    fn content_type(&self) -> Option<&str> {
        Some("application/x-www-form-urlencoded")
    }
}

/// How the response body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyKind {
    /// Exactly this many bytes follow the header section.
    Length(u64),
    /// Chunked transfer coding.
    Chunked,
    /// Delimited by the server closing the connection.
    Close,
}

impl BodyKind {
    /// Determine framing from status, request method and response headers.
    pub fn from_response(method: &str, status: u16, headers: &[Header]) -> BodyKind {
        // responses that never carry a body, whatever the headers claim
        if method.eq_ignore_ascii_case("head")
            || (100..=199).contains(&status)
            || status == 204
            || status == 304
        {
            return BodyKind::Length(0);
        }
        let is_chunked = get_header(headers, "transfer-encoding")
            .map(|enc| !enc.is_empty())
            .unwrap_or(false);
        if is_chunked {
            return BodyKind::Chunked;
        }
        match get_header(headers, "content-length").and_then(|v| v.parse::<u64>().ok()) {
            Some(len) => BodyKind::Length(len),
            None => BodyKind::Close,
        }
    }
}

/// A reader that reports EOF after exactly `limit` bytes.
///
/// This is what makes `Content-Length` delimited bodies work over a
/// keep-alive connection: however the caller interleaves small and large
/// reads, no byte beyond the limit is consumed from the stream.
pub(crate) struct LimitedRead<R> {
    reader: R,
    limit: u64,
    position: u64,
}

impl<R: Read> LimitedRead<R> {
    pub fn new(reader: R, limit: u64) -> Self {
        LimitedRead {
            reader,
            limit,
            position: 0,
        }
    }
}

impl<R: Read> Read for LimitedRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.limit - self.position;
        if left == 0 {
            return Ok(0);
        }
        let from = if left < buf.len() as u64 {
            &mut buf[0..left as usize]
        } else {
            buf
        };
        let amount = self.reader.read(from)?;
        if amount == 0 {
            // closed before delivering content-length bytes
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "response body ended before content-length",
            ));
        }
        self.position += amount as u64;
        Ok(amount)
    }
}

impl From<LimitedRead<Stream>> for Stream {
    fn from(limited: LimitedRead<Stream>) -> Stream {
        limited.reader
    }
}

impl From<chunked_transfer::Decoder<Stream>> for Stream {
    fn from(decoder: chunked_transfer::Decoder<Stream>) -> Stream {
        decoder.into_inner()
    }
}

/// Read and discard the rest of a body so the connection can be reused.
pub(crate) fn discard(reader: &mut dyn Read) -> io::Result<u64> {
    io::copy(reader, &mut io::sink())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Cursor};

    #[test]
    fn limited_read_stops_at_limit() {
        let data = b"0123456789tail".to_vec();
        let mut r = LimitedRead::new(Cursor::new(data), 10);
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).unwrap();
        assert_eq!(&buf, b"0123456789");
    }

    #[test]
    fn limited_read_interleaved_shapes() {
        let data = b"abc\ndefgh\nrest-of-stream".to_vec();
        let inner = Cursor::new(data);
        let mut r = BufReader::with_capacity(4, LimitedRead::new(inner, 10));

        let mut line = String::new();
        r.read_line(&mut line).unwrap();
        assert_eq!(line, "abc\n");

        let mut one = [0u8; 1];
        r.read(&mut one).unwrap();
        assert_eq!(&one, b"d");

        let mut rest = Vec::new();
        r.read_to_end(&mut rest).unwrap();
        assert_eq!(&rest, b"efgh\n");

        // next read is EOF, not the bytes past the limit
        assert_eq!(r.read(&mut one).unwrap(), 0);
    }

    #[test]
    fn body_kind_for_head_ignores_length() {
        let headers = vec![Header::new("Content-Length", "123")];
        let kind = BodyKind::from_response("HEAD", 200, &headers);
        assert_eq!(kind, BodyKind::Length(0));
    }

    #[test]
    fn body_kind_prefers_chunked() {
        let headers = vec![
            Header::new("Transfer-Encoding", "chunked"),
            Header::new("Content-Length", "123"),
        ];
        let kind = BodyKind::from_response("GET", 200, &headers);
        assert_eq!(kind, BodyKind::Chunked);
    }

    #[test]
    fn form_body_encodes_pairs() {
        let mut body = FormBody::new(&[("k", "v"), ("a b", "c&d")]);
        let mut out = Vec::new();
        body.write_onto(&mut out).unwrap();
        assert_eq!(out, b"k=v&a+b=c%26d");
        assert_eq!(body.content_length().unwrap(), Some(13));
    }
}

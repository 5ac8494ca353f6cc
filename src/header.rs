use std::str::FromStr;

use crate::error::Error;

/// Wrapper type for a header line.
///
/// Headers are kept as the full `Name: value` line, the way they travel on
/// the wire. A request or response holds an ordered `Vec<Header>`, so the
/// same name may occur multiple times (`Set-Cookie` being the common case).
#[derive(Debug, Clone)]
pub struct Header {
    line: String,
    index: usize,
}

impl Header {
    /// Create a header from a name and a value.
    pub fn new(name: &str, value: &str) -> Self {
        let line = format!("{}: {}", name, value);
        Header {
            line,
            index: name.len(),
        }
    }

    /// The header name.
    ///
    /// ```
    /// let header = "X-Forwarded-For: 127.0.0.1".parse::<httpc::Header>().unwrap();
    /// assert_eq!("X-Forwarded-For", header.name());
    /// ```
    pub fn name(&self) -> &str {
        &self.line.as_str()[0..self.index]
    }

    /// The header value.
    ///
    /// ```
    /// let header = "X-Forwarded-For: 127.0.0.1".parse::<httpc::Header>().unwrap();
    /// assert_eq!("127.0.0.1", header.value());
    /// ```
    pub fn value(&self) -> &str {
        self.line.as_str()[self.index + 1..].trim()
    }

    /// Compares the given str to the header name ignoring case.
    ///
    /// ```
    /// let header = "X-Forwarded-For: 127.0.0.1".parse::<httpc::Header>().unwrap();
    /// assert!(header.is_name("x-forwarded-for"));
    /// ```
    pub fn is_name(&self, other: &str) -> bool {
        self.name().eq_ignore_ascii_case(other)
    }
}

impl FromStr for Header {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_ascii() {
            return Err(Error::BadHeader);
        }
        let index = s.find(':').ok_or(Error::BadHeader)?;
        if index == 0 {
            return Err(Error::BadHeader);
        }
        Ok(Header {
            line: s.to_string(),
            index,
        })
    }
}

pub(crate) fn get_header<'h>(headers: &'h [Header], name: &str) -> Option<&'h str> {
    headers.iter().find(|h| h.is_name(name)).map(|h| h.value())
}

pub(crate) fn get_all_headers<'h>(headers: &'h [Header], name: &str) -> Vec<&'h str> {
    headers
        .iter()
        .filter(|h| h.is_name(name))
        .map(|h| h.value())
        .collect()
}

pub(crate) fn has_header(headers: &[Header], name: &str) -> bool {
    get_header(headers, name).is_some()
}

/// Add a header, replacing any previous header with the same name.
pub(crate) fn set_header(headers: &mut Vec<Header>, header: Header) {
    headers.retain(|h| !h.is_name(header.name()));
    headers.push(header);
}

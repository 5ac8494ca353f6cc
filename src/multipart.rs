//! Multipart request bodies which stream their parts out one at a time.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::body::Body;
use crate::error::{Error, Result};
use crate::header::{has_header, Header};

/// A `multipart/form-data` request body.
///
/// Parts are written in insertion order. Literal and file parts can be
/// replayed on retries (files are reopened per attempt); a reader part
/// streams through once and makes the body unreplayable and its length
/// unknown.
///
/// ```no_run
/// let mut form = httpc::Multipart::new();
/// form.add_text("name", "holiday")
///     .add_file("photo", "/tmp/beach.jpg");
/// httpc::post("http://example.com/upload").send_multipart(form)?;
/// # Ok::<(), httpc::Error>(())
/// ```
pub struct Multipart {
    boundary: String,
    content_type: String,
    parts: Vec<Part>,
}

struct Part {
    name: String,
    data: PartData,
    filename: Option<String>,
    headers: Vec<Header>,
}

enum PartData {
    Text(String),
    File(PathBuf),
    Reader(Option<Box<dyn Read + Send>>),
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

impl Multipart {
    /// An empty multipart body with a fresh boundary.
    pub fn new() -> Self {
        let boundary = gen_boundary();
        let content_type = format!("multipart/form-data; boundary={}", boundary);
        Multipart {
            boundary,
            content_type,
            parts: Vec::new(),
        }
    }

    /// The boundary separating the parts.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Add a literal text field.
    pub fn add_text(&mut self, name: &str, text: &str) -> &mut Self {
        self.parts.push(Part {
            name: name.to_string(),
            data: PartData::Text(text.to_string()),
            filename: None,
            headers: vec![],
        });
        self
    }

    /// Add a file field. The file is opened when the body is written and
    /// again on every retry; its size is read up front for the
    /// content-length.
    pub fn add_file(&mut self, name: &str, path: impl AsRef<Path>) -> &mut Self {
        let path = path.as_ref().to_path_buf();
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .map(|f| f.to_string());
        self.parts.push(Part {
            name: name.to_string(),
            data: PartData::File(path),
            filename,
            headers: vec![],
        });
        self
    }

    /// Add a field streamed from a reader.
    ///
    /// The reader is consumed on the first write, so a request carrying
    /// one cannot be retried, and no content-length is precomputed.
    pub fn add_reader(
        &mut self,
        name: &str,
        reader: impl Read + Send + 'static,
        filename: Option<&str>,
    ) -> &mut Self {
        self.parts.push(Part {
            name: name.to_string(),
            data: PartData::Reader(Some(Box::new(reader))),
            filename: filename.map(|f| f.to_string()),
            headers: vec![],
        });
        self
    }

    /// Set a header on the most recently added part, overriding the
    /// generated `Content-Disposition` / `Content-Type` if named so.
    pub fn add_part_header(&mut self, name: &str, value: &str) -> &mut Self {
        if let Some(part) = self.parts.last_mut() {
            part.headers.push(Header::new(name, value));
        }
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for part in &self.parts {
            if part.name.is_empty() {
                return Err(Error::FormDataError("multipart field with empty name".into()));
            }
        }
        Ok(())
    }

    /// The headers and delimiter preceding a part's payload.
    fn part_head(&self, part: &Part) -> Vec<u8> {
        let mut head = Vec::new();
        // writing to a Vec cannot fail
        write!(head, "--{}\r\n", self.boundary).unwrap();

        if !has_header(&part.headers, "content-disposition") {
            write!(head, "Content-Disposition: form-data; name=\"{}\"", part.name).unwrap();
            if let Some(filename) = &part.filename {
                write!(head, "; filename=\"{}\"", filename).unwrap();
            }
            write!(head, "\r\n").unwrap();
        }

        let is_file_like = !matches!(part.data, PartData::Text(_));
        if is_file_like && !has_header(&part.headers, "content-type") {
            write!(head, "Content-Type: application/octet-stream\r\n").unwrap();
        }

        for header in &part.headers {
            write!(head, "{}: {}\r\n", header.name(), header.value()).unwrap();
        }

        write!(head, "\r\n").unwrap();
        head
    }

    fn terminator(&self) -> String {
        format!("--{}--\r\n", self.boundary)
    }
}

impl Body for Multipart {
    fn write_onto(&mut self, w: &mut dyn Write) -> io::Result<()> {
        debug!("writing multipart body with {} parts", self.parts.len());

        // borrow heads up front so the parts can be written mutably below
        let heads: Vec<Vec<u8>> = self.parts.iter().map(|p| self.part_head(p)).collect();

        for (part, head) in self.parts.iter_mut().zip(heads) {
            w.write_all(&head)?;
            match &mut part.data {
                PartData::Text(text) => w.write_all(text.as_bytes())?,
                PartData::File(path) => {
                    // opened per attempt, closed when the copy is done
                    let mut file = File::open(path)?;
                    io::copy(&mut file, w)?;
                }
                PartData::Reader(reader) => match reader.take() {
                    Some(mut reader) => {
                        io::copy(&mut reader, w)?;
                    }
                    None => {
                        return Err(io::Error::new(
                            io::ErrorKind::Other,
                            "multipart reader part cannot be replayed",
                        ));
                    }
                },
            }
            w.write_all(b"\r\n")?;
        }

        w.write_all(self.terminator().as_bytes())?;
        Ok(())
    }

    fn content_length(&mut self) -> io::Result<Option<u64>> {
        let mut total = 0u64;
        for part in &self.parts {
            total += self.part_head(part).len() as u64;
            total += match &part.data {
                PartData::Text(text) => text.len() as u64,
                PartData::File(path) => std::fs::metadata(path)?.len(),
                // opaque stream: no length known up front
                PartData::Reader(_) => return Ok(None),
            };
            total += 2; // trailing \r\n
        }
        total += self.terminator().len() as u64;
        Ok(Some(total))
    }

    fn content_type(&self) -> Option<&str> {
        Some(&self.content_type)
    }
}

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

fn gen_boundary() -> String {
    let unique = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    let time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!(
        "----------------Multipart-=_{:x}=_={}=-={}",
        unique, pid, time
    )
}

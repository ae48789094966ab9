//! Request body variants and their wire encodings.
//!
//! Encoding a [`Body`] yields an [`EncodedBody`]: a payload (bytes or a
//! file-backed stream), a content type, and a content length when one is
//! knowable up front.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::Error;
use crate::transport::Payload;

/// Percent-encoding set for form bodies: everything outside alphanumerics
/// is escaped.
const FORM_ENCODE_SET: &AsciiSet = NON_ALPHANUMERIC;

/// Producer for a JSON body; invoked at encode time so serialization
/// failures surface as [`Error::JsonEncoding`].
pub type JsonProducer = Arc<dyn Fn() -> Result<Vec<u8>, Error> + Send + Sync>;

/// The request body.
#[derive(Clone, Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// Raw bytes with a content type.
    Bytes {
        /// The payload.
        content: Bytes,
        /// Value for the `Content-Type` header.
        content_type: String,
    },
    /// Byte stream from a file path with a content type.
    File {
        /// Path to the file.
        path: PathBuf,
        /// Value for the `Content-Type` header.
        content_type: String,
    },
    /// Form-url-encoded pairs, percent-encoded in order.
    Form(Vec<(String, String)>),
    /// JSON from an external encoder producer.
    Json(JsonProducer),
    /// Multipart/form-data.
    Multipart(MultipartForm),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Empty => write!(f, "Empty"),
            Body::Bytes { content, content_type } => f
                .debug_struct("Bytes")
                .field("len", &content.len())
                .field("content_type", content_type)
                .finish(),
            Body::File { path, content_type } => f
                .debug_struct("File")
                .field("path", path)
                .field("content_type", content_type)
                .finish(),
            Body::Form(pairs) => f.debug_tuple("Form").field(&pairs.len()).finish(),
            Body::Json(_) => write!(f, "Json"),
            Body::Multipart(form) => f
                .debug_struct("Multipart")
                .field("parts", &form.parts.len())
                .finish(),
        }
    }
}

/// An encoded body ready for the transport.
#[derive(Debug, Clone)]
pub struct EncodedBody {
    /// The payload.
    pub payload: Payload,
    /// Value for the `Content-Type` header, when the body implies one.
    pub content_type: Option<String>,
    /// Value for the `Content-Length` header, when knowable.
    pub content_length: Option<u64>,
}

impl EncodedBody {
    fn empty() -> Self {
        Self {
            payload: Payload::Empty,
            content_type: None,
            content_length: Some(0),
        }
    }

    fn bytes(content: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            content_length: Some(content.len() as u64),
            payload: Payload::Bytes(content),
            content_type: Some(content_type.into()),
        }
    }
}

impl Body {
    /// Encode this body for the wire.
    pub(crate) fn encode(&self) -> Result<EncodedBody, Error> {
        match self {
            Body::Empty => Ok(EncodedBody::empty()),
            Body::Bytes { content, content_type } => {
                Ok(EncodedBody::bytes(content.clone(), content_type.clone()))
            }
            Body::File { path, content_type } => {
                let content_length = std::fs::metadata(path).ok().map(|meta| meta.len());
                Ok(EncodedBody {
                    payload: Payload::File(path.clone()),
                    content_type: Some(content_type.clone()),
                    content_length,
                })
            }
            Body::Form(pairs) => {
                let encoded = encode_form(pairs);
                Ok(EncodedBody::bytes(
                    Bytes::from(encoded),
                    "application/x-www-form-urlencoded",
                ))
            }
            Body::Json(producer) => {
                let bytes = producer()?;
                Ok(EncodedBody::bytes(Bytes::from(bytes), "application/json"))
            }
            Body::Multipart(form) => form.encode(),
        }
    }
}

/// Percent-encode pairs and join them with `&`.
pub(crate) fn encode_form(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                percent_encode(name.as_bytes(), FORM_ENCODE_SET),
                percent_encode(value.as_bytes(), FORM_ENCODE_SET)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// One part of a multipart form.
#[derive(Debug, Clone)]
pub enum Part {
    /// A named text field.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// A file read from disk.
    File {
        /// Field name.
        name: String,
        /// Path to the file.
        path: PathBuf,
        /// Filename presented to the server; defaults to the path's
        /// final component.
        filename: Option<String>,
        /// Optional part content type.
        content_type: Option<String>,
    },
    /// An in-memory byte stream.
    Stream {
        /// Field name.
        name: String,
        /// The content.
        content: Bytes,
        /// Optional filename presented to the server.
        filename: Option<String>,
        /// Optional part content type.
        content_type: Option<String>,
    },
}

/// A multipart/form-data body: a boundary and ordered parts.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    boundary: Option<String>,
    parts: Vec<Part>,
}

impl MultipartForm {
    /// Create an empty form. The boundary is a random hex token unless
    /// [`boundary`](Self::boundary) supplies one.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit boundary token.
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Append a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Append a file field.
    pub fn file(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.parts.push(Part::File {
            name: name.into(),
            path: path.into(),
            filename: None,
            content_type: None,
        });
        self
    }

    /// Append an arbitrary part.
    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    fn encode(&self) -> Result<EncodedBody, Error> {
        let boundary = match &self.boundary {
            Some(token) => token.clone(),
            None => format!("{:032x}", rand::random::<u128>()),
        };

        let mut out: Vec<u8> = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match part {
                Part::Text { name, value } => {
                    validate_token(name)?;
                    out.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    out.extend_from_slice(value.as_bytes());
                }
                Part::File {
                    name,
                    path,
                    filename,
                    content_type,
                } => {
                    validate_token(name)?;
                    let filename = match filename {
                        Some(filename) => filename.clone(),
                        None => path
                            .file_name()
                            .and_then(|os| os.to_str())
                            .map(str::to_owned)
                            .ok_or_else(|| Error::MultipartInvalidFile(path.clone()))?,
                    };
                    validate_token(&filename)?;
                    let content = std::fs::read(path)
                        .map_err(|_| Error::MultipartInvalidFile(path.clone()))?;
                    write_file_headers(&mut out, name, &filename, content_type.as_deref());
                    out.extend_from_slice(&content);
                }
                Part::Stream {
                    name,
                    content,
                    filename,
                    content_type,
                } => {
                    validate_token(name)?;
                    match filename {
                        Some(filename) => {
                            validate_token(filename)?;
                            write_file_headers(&mut out, name, filename, content_type.as_deref());
                        }
                        None => {
                            let mut headers =
                                format!("Content-Disposition: form-data; name=\"{name}\"\r\n");
                            if let Some(content_type) = content_type {
                                headers.push_str(&format!("Content-Type: {content_type}\r\n"));
                            }
                            headers.push_str("\r\n");
                            out.extend_from_slice(headers.as_bytes());
                        }
                    }
                    out.extend_from_slice(content);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Ok(EncodedBody::bytes(
            Bytes::from(out),
            format!("multipart/form-data; boundary={boundary}"),
        ))
    }
}

fn write_file_headers(out: &mut Vec<u8>, name: &str, filename: &str, content_type: Option<&str>) {
    let mut headers =
        format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n");
    if let Some(content_type) = content_type {
        headers.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    headers.push_str("\r\n");
    out.extend_from_slice(headers.as_bytes());
}

/// Names and filenames must not smuggle framing characters.
fn validate_token(value: &str) -> Result<(), Error> {
    if value.contains('\r') || value.contains('\n') || value.contains('"') {
        return Err(Error::MultipartStringEncoding(format!(
            "value contains framing characters: {value:?}"
        )));
    }
    Ok(())
}

//! Minimal `multipart/form-data` body for a single file field.
//!
//! `ureq` 2 has no multipart support, and the recognition endpoint only ever
//! takes one file part.

use rand::RngCore;

/// A file part ready to be posted.
#[derive(Clone, Debug)]
pub struct Upload {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// A camera frame encoded as JPEG, as the scan loop sends it.
    pub fn frame_jpeg(bytes: Vec<u8>) -> Self {
        Self {
            field: "file".to_string(),
            filename: "frame.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes,
        }
    }

    /// A user-selected file. Content type is guessed from the extension.
    pub fn file(filename: &str, bytes: Vec<u8>) -> Self {
        let content_type = mime_guess::from_path(filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            field: "file".to_string(),
            filename: filename.to_string(),
            content_type,
            bytes,
        }
    }
}

/// Encoded body plus the matching `Content-Type` header value.
pub struct MultipartBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub fn encode(upload: &Upload) -> MultipartBody {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    encode_with_boundary(upload, &format!("ktm-kiosk-{}", hex::encode(nonce)))
}

fn encode_with_boundary(upload: &Upload, boundary: &str) -> MultipartBody {
    let header = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
        quote(&upload.field),
        quote(&upload.filename),
        upload.content_type
    );
    let trailer = format!("\r\n--{boundary}--\r\n");

    let mut bytes = Vec::with_capacity(header.len() + upload.bytes.len() + trailer.len());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(&upload.bytes);
    bytes.extend_from_slice(trailer.as_bytes());

    MultipartBody {
        content_type: format!("multipart/form-data; boundary={boundary}"),
        bytes,
    }
}

fn quote(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| if c == '"' { "%22".to_string() } else { c.to_string() })
        .collect()
}

//! `multipart/form-data` framing into a single rewindable buffer.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

const READ_CHUNK: usize = 64 * 1024;

pub(crate) struct MultipartWriter {
    boundary: String,
    buffer: BytesMut,
}

impl MultipartWriter {
    pub fn new() -> Self {
        Self::with_boundary(format!("botdispatch-{}", Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            buffer: BytesMut::new(),
        }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn text(&mut self, name: &str, value: &str) {
        self.open_part();
        self.header(&format!(
            "Content-Disposition: form-data; name=\"{}\"",
            escape(name)
        ));
        self.buffer.put_slice(b"\r\n");
        self.buffer.put_slice(value.as_bytes());
        self.buffer.put_slice(b"\r\n");
    }

    pub fn file(&mut self, name: &str, file_name: &str, data: &[u8]) {
        self.open_file(name, file_name);
        self.buffer.put_slice(data);
        self.buffer.put_slice(b"\r\n");
    }

    /// Reads `reader` to the end straight into the body buffer.
    pub async fn file_from_reader<R>(
        &mut self,
        name: &str,
        file_name: &str,
        reader: &mut R,
    ) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.open_file(name, file_name);
        loop {
            self.buffer.reserve(READ_CHUNK);
            if reader.read_buf(&mut self.buffer).await? == 0 {
                break;
            }
        }
        self.buffer.put_slice(b"\r\n");
        Ok(())
    }

    pub fn finish(mut self) -> Bytes {
        self.buffer.put_slice(b"--");
        self.buffer.put_slice(self.boundary.as_bytes());
        self.buffer.put_slice(b"--\r\n");
        self.buffer.freeze()
    }

    fn open_file(&mut self, name: &str, file_name: &str) {
        self.open_part();
        self.header(&format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"",
            escape(name),
            escape(file_name)
        ));
        self.header("Content-Type: application/octet-stream");
        self.buffer.put_slice(b"\r\n");
    }

    fn open_part(&mut self) {
        self.buffer.put_slice(b"--");
        self.buffer.put_slice(self.boundary.as_bytes());
        self.buffer.put_slice(b"\r\n");
    }

    fn header(&mut self, line: &str) {
        self.buffer.put_slice(line.as_bytes());
        self.buffer.put_slice(b"\r\n");
    }
}

/// Quotes and line breaks would end the header value early.
fn escape(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

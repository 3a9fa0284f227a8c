//! Request descriptors and their transport payloads.
//!
//! An [`ApiRequest`] names the remote method and describes its content. The
//! content is turned into bytes by [`content::materialize`] exactly once per
//! dispatch call; see [`ContentCache`].

mod content;
mod multipart;

use anyhow::{Result, bail};
use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Mutex;
use tokio::io::AsyncRead;

pub use content::{ContentCache, MaterializationError, materialize};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A logical API call: the remote method name plus a way to produce its body.
pub trait ApiRequest: Send + Sync {
    /// Type of the `result` field of a successful response.
    type Response: DeserializeOwned + Send;

    fn method_name(&self) -> &str;

    fn http_method(&self) -> Method {
        Method::POST
    }

    /// Describes the body to send. Called once per dispatch call.
    fn content(&self) -> Result<RequestContent<'_>>;
}

/// Logical content of a request, before encoding.
pub enum RequestContent<'a> {
    Empty,
    Json(Value),
    Multipart(MultipartForm<'a>),
}

/// Transport-ready bytes plus their content type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MaterializedContent {
    body: Bytes,
    content_type: Option<String>,
}

impl MaterializedContent {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            content_type: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// A file to upload, backed by memory or by a forward-only stream.
///
/// A stream can be read exactly once. Reading it a second time fails with
/// [`MaterializationError::SourceConsumed`].
pub struct InputFile {
    file_name: String,
    source: Mutex<FileSource>,
}

enum FileSource {
    Memory(Bytes),
    Stream(Option<Box<dyn AsyncRead + Send + Unpin>>),
}

/// What a file part yields when it is encoded.
pub(crate) enum FileData {
    Memory(Bytes),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl InputFile {
    pub fn from_bytes(bytes: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            source: Mutex::new(FileSource::Memory(bytes.into())),
        }
    }

    pub fn from_reader(
        reader: impl AsyncRead + Send + Unpin + 'static,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            source: Mutex::new(FileSource::Stream(Some(Box::new(reader)))),
        }
    }

    /// Opens a file on disk as a streamed upload named after the file.
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self::from_reader(file, file_name))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Whether a streamed source has already been handed out.
    pub fn is_consumed(&self) -> bool {
        let source = self.source.lock().unwrap_or_else(|e| e.into_inner());
        matches!(*source, FileSource::Stream(None))
    }

    pub(crate) fn take_data(&self) -> Result<FileData, MaterializationError> {
        let mut source = self.source.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *source {
            FileSource::Memory(bytes) => Ok(FileData::Memory(bytes.clone())),
            FileSource::Stream(reader) => {
                reader
                    .take()
                    .map(FileData::Stream)
                    .ok_or_else(|| MaterializationError::SourceConsumed {
                        file_name: self.file_name.clone(),
                    })
            }
        }
    }
}

impl std::fmt::Debug for InputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFile")
            .field("file_name", &self.file_name)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// One part of a `multipart/form-data` body.
pub enum FormPart<'a> {
    Text { name: String, value: String },
    File { name: String, file: &'a InputFile },
}

/// Builder for `multipart/form-data` content.
#[derive(Default)]
pub struct MultipartForm<'a> {
    parts: Vec<FormPart<'a>>,
}

impl<'a> MultipartForm<'a> {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Turns the top-level fields of a serializable struct into text parts.
    ///
    /// Strings are sent verbatim, nulls are skipped and everything else is
    /// sent as JSON text.
    pub fn from_params<P: Serialize + ?Sized>(params: &P) -> Result<Self> {
        let Value::Object(fields) = serde_json::to_value(params)? else {
            bail!("Multipart parameters must serialize to a JSON object");
        };

        let mut form = Self::new();
        for (name, value) in fields {
            match value {
                Value::Null => {}
                Value::String(text) => form = form.text(name, text),
                other => form = form.text(name, other.to_string()),
            }
        }
        Ok(form)
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(mut self, name: impl Into<String>, file: &'a InputFile) -> Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            file,
        });
        self
    }

    pub fn parts(&self) -> &[FormPart<'a>] {
        &self.parts
    }

    pub(crate) fn into_parts(self) -> Vec<FormPart<'a>> {
        self.parts
    }
}

/// A request whose parameters are sent as a JSON body.
pub struct JsonRequest<P, T> {
    method_name: String,
    http_method: Method,
    params: P,
    _response: PhantomData<fn() -> T>,
}

impl<P, T> JsonRequest<P, T> {
    pub fn new(method_name: impl Into<String>, params: P) -> Self {
        Self {
            method_name: method_name.into(),
            http_method: Method::POST,
            params,
            _response: PhantomData,
        }
    }

    pub fn with_http_method(mut self, method: Method) -> Self {
        self.http_method = method;
        self
    }

    pub fn params(&self) -> &P {
        &self.params
    }
}

impl<P, T> ApiRequest for JsonRequest<P, T>
where
    P: Serialize + Send + Sync,
    T: DeserializeOwned + Send,
{
    type Response = T;

    fn method_name(&self) -> &str {
        &self.method_name
    }

    fn http_method(&self) -> Method {
        self.http_method.clone()
    }

    fn content(&self) -> Result<RequestContent<'_>> {
        Ok(RequestContent::Json(serde_json::to_value(&self.params)?))
    }
}

/// A request uploading one or more files alongside its parameters.
pub struct MultipartRequest<P, T> {
    method_name: String,
    params: P,
    files: Vec<(String, InputFile)>,
    _response: PhantomData<fn() -> T>,
}

impl<P, T> MultipartRequest<P, T> {
    pub fn new(method_name: impl Into<String>, params: P) -> Self {
        Self {
            method_name: method_name.into(),
            params,
            files: Vec::new(),
            _response: PhantomData,
        }
    }

    pub fn with_file(mut self, field: impl Into<String>, file: InputFile) -> Self {
        self.files.push((field.into(), file));
        self
    }

    pub fn files(&self) -> impl Iterator<Item = &InputFile> {
        self.files.iter().map(|(_, file)| file)
    }
}

impl<P, T> ApiRequest for MultipartRequest<P, T>
where
    P: Serialize + Send + Sync,
    T: DeserializeOwned + Send,
{
    type Response = T;

    fn method_name(&self) -> &str {
        &self.method_name
    }

    fn content(&self) -> Result<RequestContent<'_>> {
        let mut form = MultipartForm::from_params(&self.params)?;
        for (field, file) in &self.files {
            form = form.file(field.clone(), file);
        }
        Ok(RequestContent::Multipart(form))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct SendVideo {
        chat_id: i64,
        caption: Option<String>,
        supports_streaming: bool,
    }

    #[test]
    fn test_json_request_content() {
        let request: JsonRequest<_, Value> = JsonRequest::new(
            "sendMessage",
            json!({"chat_id": 1, "text": "hello"}),
        );

        assert_eq!(request.method_name(), "sendMessage");
        assert_eq!(request.http_method(), Method::POST);
        match request.content().unwrap() {
            RequestContent::Json(value) => {
                assert_eq!(value, json!({"chat_id": 1, "text": "hello"}))
            }
            _ => panic!("Expected JSON content"),
        }
    }

    #[test]
    fn test_json_request_custom_http_method() {
        let request: JsonRequest<_, Value> =
            JsonRequest::new("getMe", json!({})).with_http_method(Method::GET);
        assert_eq!(request.http_method(), Method::GET);
    }

    #[test]
    fn test_form_from_params_skips_nulls_and_encodes_values() {
        let params = SendVideo {
            chat_id: -100,
            caption: None,
            supports_streaming: true,
        };

        let form = MultipartForm::from_params(&params).unwrap();
        let texts: Vec<(&str, &str)> = form
            .parts()
            .iter()
            .filter_map(|part| match part {
                FormPart::Text { name, value } => Some((name.as_str(), value.as_str())),
                FormPart::File { .. } => None,
            })
            .collect();

        assert!(texts.contains(&("chat_id", "-100")));
        assert!(texts.contains(&("supports_streaming", "true")));
        assert!(!texts.iter().any(|(name, _)| *name == "caption"));
    }

    #[test]
    fn test_form_from_params_rejects_non_objects() {
        assert!(MultipartForm::from_params(&42).is_err());
        assert!(MultipartForm::from_params(&vec!["a"]).is_err());
    }

    #[test]
    fn test_multipart_request_lists_files() {
        let request: MultipartRequest<_, Value> =
            MultipartRequest::new("sendVideo", json!({"chat_id": 1}))
                .with_file("video", InputFile::from_bytes(&b"abc"[..], "a.mp4"));

        match request.content().unwrap() {
            RequestContent::Multipart(form) => {
                assert_eq!(form.parts().len(), 2);
                assert!(matches!(
                    form.parts()[1],
                    FormPart::File { ref name, file } if name == "video" && file.file_name() == "a.mp4"
                ));
            }
            _ => panic!("Expected multipart content"),
        }
        assert_eq!(request.files().count(), 1);
    }

    #[test]
    fn test_stream_input_file_can_be_taken_once() {
        let file = InputFile::from_reader(&b"payload"[..], "clip.mp4");
        assert!(!file.is_consumed());

        assert!(matches!(file.take_data(), Ok(FileData::Stream(_))));
        assert!(file.is_consumed());

        assert!(matches!(
            file.take_data(),
            Err(MaterializationError::SourceConsumed { ref file_name }) if file_name == "clip.mp4"
        ));
    }

    #[test]
    fn test_memory_input_file_is_reusable() {
        let file = InputFile::from_bytes(&b"payload"[..], "photo.jpg");
        for _ in 0..2 {
            match file.take_data().unwrap() {
                FileData::Memory(bytes) => assert_eq!(&bytes[..], b"payload"),
                FileData::Stream(_) => panic!("Expected memory data"),
            }
        }
        assert!(!file.is_consumed());
    }

    #[tokio::test]
    async fn test_open_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("moon-landing.mp4");
        tokio::fs::write(&path, b"video").await.unwrap();

        let file = InputFile::open(&path).await.unwrap();
        assert_eq!(file.file_name(), "moon-landing.mp4");
        assert!(!file.is_consumed());
    }

    #[test]
    fn test_materialized_content_accessors() {
        let content = MaterializedContent::new(&b"{}"[..]).with_content_type(JSON_CONTENT_TYPE);
        assert_eq!(content.len(), 2);
        assert!(!content.is_empty());
        assert_eq!(content.content_type(), Some(JSON_CONTENT_TYPE));

        let empty = MaterializedContent::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.content_type(), None);
    }
}

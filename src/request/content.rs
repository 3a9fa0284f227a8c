//! One-shot materialization of request content.

use log::debug;
use thiserror::Error;
use tokio::sync::OnceCell;

use super::multipart::MultipartWriter;
use super::{
    ApiRequest, FileData, FormPart, JSON_CONTENT_TYPE, MaterializedContent, MultipartForm,
    RequestContent,
};

/// The request payload could not be produced. Never retried.
#[derive(Error, Debug)]
pub enum MaterializationError {
    #[error("Failed to build request content: {0}")]
    Build(#[source] anyhow::Error),

    #[error("Failed to encode request body")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to read content of '{file_name}'")]
    Read {
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Content of '{file_name}' was already consumed")]
    SourceConsumed { file_name: String },
}

/// Encodes a request's content into transport-ready bytes.
///
/// Streamed file sources are read to the end, so this must run at most once
/// per request instance. Use [`ContentCache`] to share the result across attempts.
#[tracing::instrument(skip_all)]
pub async fn materialize<R: ApiRequest + ?Sized>(
    request: &R,
) -> Result<MaterializedContent, MaterializationError> {
    let content = request.content().map_err(MaterializationError::Build)?;

    let materialized = match content {
        RequestContent::Empty => MaterializedContent::empty(),
        RequestContent::Json(value) => MaterializedContent::new(serde_json::to_vec(&value)?)
            .with_content_type(JSON_CONTENT_TYPE),
        RequestContent::Multipart(form) => encode_multipart(form).await?,
    };

    debug!(
        "Materialized {} bytes for {}",
        materialized.len(),
        request.method_name()
    );

    Ok(materialized)
}

async fn encode_multipart(
    form: MultipartForm<'_>,
) -> Result<MaterializedContent, MaterializationError> {
    let mut writer = MultipartWriter::new();

    for part in form.into_parts() {
        match part {
            FormPart::Text { name, value } => writer.text(&name, &value),
            FormPart::File { name, file } => {
                match file.take_data()? {
                    FileData::Memory(bytes) => writer.file(&name, file.file_name(), &bytes),
                    FileData::Stream(mut reader) => writer
                        .file_from_reader(&name, file.file_name(), &mut reader)
                        .await
                        .map_err(|source| MaterializationError::Read {
                            file_name: file.file_name().to_string(),
                            source,
                        })?,
                }
            }
        }
    }

    let content_type = writer.content_type();
    Ok(MaterializedContent::new(writer.finish()).with_content_type(content_type))
}

/// Per-dispatch cache of a request's materialized content.
///
/// The first [`get`](ContentCache::get) materializes, later calls return the
/// same buffer without touching the request's sources again. Dropping the
/// cache releases the buffer.
pub struct ContentCache<'r, R: ApiRequest + ?Sized> {
    request: &'r R,
    cell: OnceCell<MaterializedContent>,
}

impl<'r, R: ApiRequest + ?Sized> ContentCache<'r, R> {
    pub fn new(request: &'r R) -> Self {
        Self {
            request,
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<&MaterializedContent, MaterializationError> {
        self.cell.get_or_try_init(|| materialize(self.request)).await
    }

    pub fn is_materialized(&self) -> bool {
        self.cell.initialized()
    }
}

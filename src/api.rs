// API client module: a small blocking HTTP client for the Zenodo
// deposition API. The pipeline never talks to reqwest directly; it goes
// through the `DepositionApi` and `FileTransport` traits so tests can
// swap in stubs.

use crate::config::Config;
use crate::error::ApiError;
use crate::planner::basename;
use crate::uploader::{ProgressObserver, ProgressReader};
use reqwest::blocking::{Body, Client, Response};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Remote deposition identifier. Zenodo hands out integers, but the CLI
/// accepts any string, so the id is kept opaque.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DepositionId(String);

impl DepositionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DepositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DepositionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => DepositionId(n.to_string()),
            RawId::Text(s) => DepositionId(s),
        })
    }
}

/// Deposition as returned by `GET /depositions/{id}` and `POST /depositions`.
/// Only the fields the pipeline reads are decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct DepositionRecord {
    pub id: DepositionId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: Option<RecordMetadata>,
    #[serde(default)]
    pub links: RecordLinks,
    #[serde(default)]
    pub files: Vec<RecordFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordMetadata {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordLinks {
    #[serde(default)]
    pub bucket: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordFile {
    pub filename: String,
}

impl DepositionRecord {
    /// Top-level title, falling back to `metadata.title`.
    pub fn title(&self) -> String {
        self.title
            .clone()
            .or_else(|| self.metadata.as_ref().and_then(|m| m.title.clone()))
            .unwrap_or_default()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.files.iter().map(|f| f.filename.clone()).collect()
    }
}

/// Body of the `POST /depositions` request.
#[derive(Serialize, Debug)]
struct CreateDepositionRequest<'a> {
    metadata: NewDepositionMetadata<'a>,
}

#[derive(Serialize, Debug)]
struct NewDepositionMetadata<'a> {
    title: &'a str,
    upload_type: &'a str,
}

/// Confirmation the bucket returns for a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedFile {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub checksum: Option<String>,
}

impl UploadedFile {
    /// Confirmation from a 2xx response body. The bucket has stored the
    /// file at this point, so a body that is not the expected JSON only
    /// costs the checksum; the key and size come from the local file.
    pub fn from_body(body: &str, path: &Path, size: u64) -> Self {
        match serde_json::from_str(body) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "upload accepted but confirmation body is not JSON"
                );
                UploadedFile {
                    key: basename(path),
                    size,
                    checksum: None,
                }
            }
        }
    }
}

/// Deposition lookup and creation.
pub trait DepositionApi {
    fn get_deposition(&self, id: &str) -> Result<DepositionRecord, ApiError>;
    fn create_deposition(&self, title: &str) -> Result<DepositionRecord, ApiError>;
}

/// One upload attempt: stream `path` into `bucket_url/<basename>`.
///
/// Implementations report every chunk they read to `observer` and must
/// treat a non-success status as an error.
pub trait FileTransport {
    fn put_file(
        &self,
        bucket_url: &str,
        path: &Path,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<UploadedFile, ApiError>;
}

/// Blocking client holding the reqwest client, the depositions endpoint
/// and the access token sent as the `access_token` query parameter.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    api_url: String,
    access_token: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(ApiClient {
            client,
            api_url: config.api_url.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn auth_query(&self) -> [(&'static str, &str); 1] {
        [("access_token", self.access_token.as_str())]
    }
}

impl DepositionApi for ApiClient {
    fn get_deposition(&self, id: &str) -> Result<DepositionRecord, ApiError> {
        let url = format!("{}/{}", self.api_url, id);
        tracing::debug!(%url, "fetching deposition");
        let res = self.client.get(&url).query(&self.auth_query()).send()?;
        decode(check_status(res)?)
    }

    fn create_deposition(&self, title: &str) -> Result<DepositionRecord, ApiError> {
        tracing::debug!(url = %self.api_url, title, "creating deposition");
        let req = CreateDepositionRequest {
            metadata: NewDepositionMetadata {
                title,
                upload_type: "dataset",
            },
        };
        let res = self
            .client
            .post(&self.api_url)
            .query(&self.auth_query())
            .json(&req)
            .send()?;
        decode(check_status(res)?)
    }
}

impl FileTransport for ApiClient {
    fn put_file(
        &self,
        bucket_url: &str,
        path: &Path,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<UploadedFile, ApiError> {
        let url = file_url(bucket_url, &basename(path))?;
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        tracing::debug!(%url, size, "streaming file");

        let body = Body::sized(ProgressReader::new(file, observer), size);
        let res = self
            .client
            .put(url)
            .query(&self.auth_query())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))
            .body(body)
            .send()?;
        let txt = check_status(res)?.text()?;
        Ok(UploadedFile::from_body(&txt, path, size))
    }
}

/// `bucket_url` with `filename` appended as one percent-encoded segment.
pub fn file_url(bucket_url: &str, filename: &str) -> Result<Url, ApiError> {
    let invalid = |reason: String| ApiError::InvalidUrl {
        url: bucket_url.to_string(),
        reason,
    };
    let mut url = Url::parse(bucket_url).map_err(|e| invalid(e.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| invalid("cannot be a base".into()))?;
        segments.pop_if_empty().push(filename);
    }
    Ok(url)
}

fn check_status(res: Response) -> Result<Response, ApiError> {
    if !res.status().is_success() {
        let status = res.status();
        let txt = res.text().unwrap_or_else(|_| "".into());
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: txt,
        });
    }
    Ok(res)
}

fn decode<T: DeserializeOwned>(res: Response) -> Result<T, ApiError> {
    let txt = res.text()?;
    Ok(serde_json::from_str(&txt)?)
}

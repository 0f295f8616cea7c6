//! Remote object store contract and the Google Drive appDataFolder client.
//!
//! The sync engine only sees the [`RemoteStore`] trait: list named objects,
//! fetch content or metadata by id, create-or-replace content by id. Auth is
//! out of scope here; the access token arrives from the environment and
//! `sign_in`/`sign_out` toggle the signed-in flag.

use crate::db::models::generate_id;
use crate::error::{Result, TodoError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// Server-side metadata for a remote object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub modified_time: DateTime<Utc>,
}

/// Create-or-replace request: with `id` the object's content is replaced,
/// without it a new object is created in the app's private folder.
#[derive(Debug, Clone, Copy)]
pub struct CreateFile<'a> {
    pub id: Option<&'a str>,
    pub name: &'a str,
    pub content: &'a str,
    pub mime_type: Option<&'a str>,
}

/// The remote provider boundary. Object storage only; the sync engine never
/// shapes transport-level data through anything but this contract.
pub trait RemoteStore: Send + Sync {
    /// Await underlying transport readiness; returns current auth status.
    fn ready(&self) -> impl Future<Output = Result<bool>> + Send;

    fn is_signed_in(&self) -> bool;

    fn sign_in(&self) -> impl Future<Output = Result<bool>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<()>> + Send;

    /// All objects in the application's private remote folder.
    fn list(&self) -> impl Future<Output = Result<Vec<RemoteFileMeta>>> + Send;

    /// Raw content of an object.
    fn get(&self, file_id: &str) -> impl Future<Output = Result<String>> + Send;

    /// Metadata only, no content fetch.
    fn get_meta(&self, file_id: &str) -> impl Future<Output = Result<RemoteFileMeta>> + Send;

    /// Create or replace; returns updated metadata with the new modified time.
    fn create(&self, file: CreateFile<'_>) -> impl Future<Output = Result<RemoteFileMeta>> + Send;
}

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const APP_DATA_FOLDER: &str = "appDataFolder";
const META_FIELDS: &str = "id, name, mimeType, modifiedTime";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFileMeta>,
}

/// Drive v3 client over the appDataFolder space.
pub struct DriveRemote {
    client: reqwest::Client,
    api_base: String,
    upload_base: String,
    access_token: Option<String>,
    signed_in: AtomicBool,
}

impl DriveRemote {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: API_BASE.to_string(),
            upload_base: UPLOAD_BASE.to_string(),
            access_token,
            signed_in: AtomicBool::new(false),
        }
    }

    /// Token from `GOOGLE_ACCESS_TOKEN`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("GOOGLE_ACCESS_TOKEN").ok())
    }

    fn token(&self) -> Result<&str> {
        if !self.signed_in.load(Ordering::SeqCst) {
            return Err(TodoError::NotSignedIn);
        }
        self.access_token.as_deref().ok_or(TodoError::NotSignedIn)
    }

    async fn ready(&self) -> Result<bool> {
        // plain HTTP has no script/transport bootstrap to await
        Ok(self.is_signed_in())
    }

    fn is_signed_in(&self) -> bool {
        self.signed_in.load(Ordering::SeqCst)
    }

    async fn sign_in(&self) -> Result<bool> {
        let has_token = self.access_token.is_some();
        self.signed_in.store(has_token, Ordering::SeqCst);
        tracing::debug!(signed_in = has_token, "sign_in");
        Ok(has_token)
    }

    async fn sign_out(&self) -> Result<()> {
        self.signed_in.store(false, Ordering::SeqCst);
        tracing::debug!("sign_out");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RemoteFileMeta>> {
        let token = self.token()?;
        let response = self
            .client
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[
                ("spaces", APP_DATA_FOLDER),
                ("fields", "files(id, name, mimeType, modifiedTime)"),
                ("pageSize", "100"),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;
        let list: FileList = response.json().await?;
        tracing::debug!(count = list.files.len(), "list");
        Ok(list.files)
    }

    async fn get(&self, file_id: &str) -> Result<String> {
        let token = self.token()?;
        let response = self
            .client
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.text().await?)
    }

    async fn get_meta(&self, file_id: &str) -> Result<RemoteFileMeta> {
        let token = self.token()?;
        let response = self
            .client
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(token)
            .query(&[("fields", META_FIELDS)])
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn create(&self, file: CreateFile<'_>) -> Result<RemoteFileMeta> {
        let token = self.token()?;

        let boundary = format!("-------{}", generate_id());
        let metadata = create_metadata(file.name, file.id.is_none());
        let body = multipart_body(&boundary, &metadata.to_string(), file.mime_type, file.content);

        let url = format!(
            "{}/files/{}?uploadType=multipart&fields=id,name,mimeType,modifiedTime",
            self.upload_base,
            file.id.unwrap_or("")
        );
        let request = if file.id.is_some() {
            self.client.patch(url)
        } else {
            self.client.post(url)
        };

        let response = request
            .bearer_auth(token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/mixed; boundary=\"{}\"", boundary),
            )
            .body(body)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TodoError::Remote(format!("{}: {}", status, body)))
}

fn create_metadata(name: &str, is_new: bool) -> serde_json::Value {
    if is_new {
        serde_json::json!({
            "kind": "drive#file",
            "parents": [APP_DATA_FOLDER],
            "name": name,
        })
    } else {
        serde_json::json!({ "name": name })
    }
}

/// Hand-built multipart upload body: a JSON metadata part followed by the
/// content part, joined by the boundary delimiter.
fn multipart_body(
    boundary: &str,
    metadata_json: &str,
    mime_type: Option<&str>,
    content: &str,
) -> String {
    let delimiter = format!("\r\n--{}\r\n", boundary);
    let close_delimiter = format!("\r\n--{}--", boundary);

    let mut body = String::new();
    body.push_str(&delimiter);
    body.push_str("Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.push_str(metadata_json);
    body.push_str(&delimiter);
    body.push_str(&format!(
        "Content-Type: {}; charset=UTF-8\r\n\r\n",
        mime_type.unwrap_or("text/plain")
    ));
    body.push_str(content);
    body.push_str(&close_delimiter);
    body
}

impl RemoteStore for DriveRemote {
    fn ready(&self) -> impl Future<Output = Result<bool>> + Send {
        self.ready()
    }

    fn is_signed_in(&self) -> bool {
        self.is_signed_in()
    }

    fn sign_in(&self) -> impl Future<Output = Result<bool>> + Send {
        self.sign_in()
    }

    fn sign_out(&self) -> impl Future<Output = Result<()>> + Send {
        self.sign_out()
    }

    fn list(&self) -> impl Future<Output = Result<Vec<RemoteFileMeta>>> + Send {
        self.list()
    }

    fn get(&self, file_id: &str) -> impl Future<Output = Result<String>> + Send {
        self.get(file_id)
    }

    fn get_meta(&self, file_id: &str) -> impl Future<Output = Result<RemoteFileMeta>> + Send {
        self.get_meta(file_id)
    }

    fn create(&self, file: CreateFile<'_>) -> impl Future<Output = Result<RemoteFileMeta>> + Send {
        self.create(file)
    }
}

use super::PipelineError;
use super::source::StagedFile;
use crate::config::RelayConfig;
use async_trait::async_trait;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio_util::io::ReaderStream;
use url::Url;

/// Upload, delete and listing capabilities of the destination store.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Write the staged file as a whole object under `remote_name`.
    async fn publish(&self, staged: &StagedFile, remote_name: &str) -> Result<(), PipelineError>;

    /// Delete one object by name.
    async fn remove(&self, remote_name: &str) -> Result<(), PipelineError>;

    /// Retrieve the raw multi-status listing document for the collection.
    async fn fetch_listing(&self) -> Result<String, PipelineError>;

    /// Path of the listed collection, used to recognize the root entry in
    /// the listing.
    fn root_path(&self) -> String;
}

/// Characters that must be escaped in a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'%')
    .add(b'/');

const PROPFIND_BODY: &str =
    r#"<?xml version="1.0" encoding="utf-8"?><d:propfind xmlns:d="DAV:"><d:allprop/></d:propfind>"#;

/// WebDAV-backed destination store (PUT / DELETE / PROPFIND Depth:1).
pub struct WebdavStore {
    client: reqwest::Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl WebdavStore {
    pub fn new(config: &RelayConfig) -> anyhow::Result<Self> {
        let mut raw = config.webdav_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw)?;
        let client = reqwest::Client::builder()
            .timeout(config.network_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url,
            username: config.webdav_username.clone(),
            password: config.webdav_password.clone(),
        })
    }

    fn object_url(&self, name: &str) -> Result<Url, PipelineError> {
        let encoded = utf8_percent_encode(name, SEGMENT).to_string();
        self.base_url.join(&encoded).map_err(|e| PipelineError::Upload {
            status: None,
            message: format!("invalid object name {name:?}: {e}"),
        })
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }
}

#[async_trait]
impl DestinationStore for WebdavStore {
    async fn publish(&self, staged: &StagedFile, remote_name: &str) -> Result<(), PipelineError> {
        let url = self.object_url(remote_name)?;
        let file = tokio::fs::File::open(&staged.path)
            .await
            .map_err(|e| PipelineError::Upload {
                status: None,
                message: format!("open {}: {}", staged.path.display(), e),
            })?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .with_auth(self.client.put(url))
            .header(CONTENT_LENGTH, staged.size_bytes)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| PipelineError::Upload {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Upload {
                status: Some(status.as_u16()),
                message: format!("PUT {remote_name} rejected"),
            });
        }
        tracing::info!("⬆️  Published {} ({} bytes)", remote_name, staged.size_bytes);
        Ok(())
    }

    async fn remove(&self, remote_name: &str) -> Result<(), PipelineError> {
        let url = self.object_url(remote_name).map_err(|e| PipelineError::Delete {
            name: remote_name.to_string(),
            message: e.to_string(),
        })?;
        let response = self
            .with_auth(self.client.delete(url))
            .send()
            .await
            .map_err(|e| PipelineError::Delete {
                name: remote_name.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        // 404 means the object is already gone, which is the goal.
        if !status.is_success() && status.as_u16() != 404 {
            return Err(PipelineError::Delete {
                name: remote_name.to_string(),
                message: format!("DELETE returned status {}", status.as_u16()),
            });
        }
        Ok(())
    }

    async fn fetch_listing(&self) -> Result<String, PipelineError> {
        let method = reqwest::Method::from_bytes(b"PROPFIND")
            .map_err(|e| PipelineError::Listing(e.to_string()))?;

        let response = self
            .with_auth(self.client.request(method, self.base_url.clone()))
            .header("Depth", "1")
            .header(CONTENT_TYPE, "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await
            .map_err(|e| PipelineError::Listing(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Listing(format!(
                "PROPFIND returned status {}",
                status.as_u16()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| PipelineError::Listing(e.to_string()))
    }

    fn root_path(&self) -> String {
        self.base_url.path().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(url: &str) -> WebdavStore {
        let config = RelayConfig {
            webdav_url: url.to_string(),
            ..RelayConfig::default()
        };
        WebdavStore::new(&config).unwrap()
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let s = store("http://dav.example.net/remote/backups");
        assert_eq!(s.root_path(), "/remote/backups/");
    }

    #[test]
    fn test_object_url_joins_and_escapes() {
        let s = store("http://dav.example.net/remote/backups/");
        let url = s.object_url("site 2025.zpaq").unwrap();
        assert_eq!(
            url.as_str(),
            "http://dav.example.net/remote/backups/site%202025.zpaq"
        );
    }

    #[test]
    fn test_object_url_never_escapes_into_parent() {
        let s = store("http://dav.example.net/remote/backups/");
        // Slashes in a name are escaped, so the object stays inside the
        // collection.
        let url = s.object_url("../evil.zpaq").unwrap();
        assert!(url.path().starts_with("/remote/backups/"));
    }
}

//! HTTP-backed catalog and downloader clients.
//!
//! Async clients using `reqwest` with Bearer token authentication. The
//! catalog client materializes the full paginated listing; the downloader
//! streams image bytes and reports integer download percentages.

use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::debug;

use panovault_protocol::types::Photo;

use crate::clients::{CatalogLister, ClientFuture, PercentFn, SourceDownloader};
use crate::error::TransferError;

const DEFAULT_CATALOG_URL: &str = "https://streetviewpublish.googleapis.com/v1";
const CATALOG_PAGE_SIZE: u32 = 100;

fn authed_client(access_token: &str) -> Result<reqwest::Client, TransferError> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&format!("Bearer {access_token}"))
        .map_err(|_| TransferError::Download("invalid access token".into()))?;
    headers.insert(AUTHORIZATION, value);
    Ok(reqwest::Client::builder().default_headers(headers).build()?)
}

/// Downloads full-resolution photo bytes from the source host.
pub struct HttpDownloader {
    http: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(access_token: &str) -> Result<Self, TransferError> {
        Ok(Self {
            http: authed_client(access_token)?,
        })
    }

    async fn fetch(&self, url: &str, on_progress: PercentFn) -> Result<Vec<u8>, TransferError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransferError::Download(format!(
                "download failed with status {status} for {url}"
            )));
        }

        let total = resp.content_length();
        let mut bytes = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut last_pct = 0u8;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            bytes.extend_from_slice(&chunk);
            if let Some(total) = total.filter(|t| *t > 0) {
                let pct = ((bytes.len() as f64 / total as f64) * 100.0).min(100.0) as u8;
                if pct != last_pct {
                    last_pct = pct;
                    on_progress(pct);
                }
            }
        }
        if last_pct != 100 {
            on_progress(100);
        }
        debug!(url, bytes = bytes.len(), "download finished");
        Ok(bytes)
    }
}

impl SourceDownloader for HttpDownloader {
    fn download<'a>(&'a self, url: &'a str, on_progress: PercentFn) -> ClientFuture<'a, Vec<u8>> {
        Box::pin(self.fetch(url, on_progress))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogPage {
    #[serde(default)]
    photos: Vec<Photo>,
    next_page_token: Option<String>,
}

/// Lists the user's photo catalog, following pagination to the end.
pub struct HttpCatalog {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(access_token: &str) -> Result<Self, TransferError> {
        Ok(Self {
            http: authed_client(access_token)?,
            base_url: DEFAULT_CATALOG_URL.to_string(),
        })
    }

    /// Overrides the catalog endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn list_all(&self) -> Result<Vec<Photo>, TransferError> {
        let mut photos = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![("pageSize".to_string(), CATALOG_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                params.push(("pageToken".to_string(), token.clone()));
            }
            let resp = self
                .http
                .get(format!("{}/photos", self.base_url))
                .query(&params)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(TransferError::Download(format!(
                    "catalog listing failed with status {status}: {body}"
                )));
            }
            let page: CatalogPage = serde_json::from_slice(&resp.bytes().await?)?;
            photos.extend(page.photos);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        debug!(photos = photos.len(), "catalog listed");
        Ok(photos)
    }
}

impl CatalogLister for HttpCatalog {
    fn list_catalog<'a>(&'a self) -> ClientFuture<'a, Vec<Photo>> {
        Box::pin(self.list_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_page_deserializes_wire_shape() {
        let json = r#"{
            "photos": [
                {
                    "id": "ph-1",
                    "downloadUrl": "https://example.com/ph-1",
                    "pose": {"latitude": 48.85, "longitude": 2.35},
                    "viewCount": 12
                }
            ],
            "nextPageToken": "tok-2"
        }"#;
        let page: CatalogPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.photos.len(), 1);
        assert_eq!(page.photos[0].id, "ph-1");
        assert_eq!(page.next_page_token.as_deref(), Some("tok-2"));
    }

    #[test]
    fn catalog_page_tolerates_empty_listing() {
        let page: CatalogPage = serde_json::from_str("{}").unwrap();
        assert!(page.photos.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn invalid_token_is_rejected() {
        assert!(HttpDownloader::new("bad\ntoken").is_err());
    }
}

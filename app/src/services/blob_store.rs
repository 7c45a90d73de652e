// storefront/src/services/blob_store.rs

//! Blob object storage for uploaded images and attachments.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use actix_web::web::Bytes;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Serialize)]
pub struct StoredBlob {
  pub pathname: String,
  pub url: String,
  pub size: usize,
  pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct BlobObject {
  pub bytes: Bytes,
  pub content_type: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
  async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<StoredBlob>;

  async fn get(&self, path: &str) -> Result<Option<BlobObject>>;

  /// Missing blobs are not an error.
  async fn delete(&self, path: &str) -> Result<()>;

  fn public_url(&self, path: &str) -> String;
}

/// Relative, `/`-separated, no empty or dot segments, `[A-Za-z0-9._-]` only.
pub fn validate_path(path: &str) -> Result<()> {
  if path.is_empty() || path.len() > 512 {
    return Err(AppError::Validation("Blob path must be 1 to 512 characters.".to_string()));
  }
  if path.starts_with('/') {
    return Err(AppError::Validation("Blob path must be relative.".to_string()));
  }
  for segment in path.split('/') {
    if segment.is_empty() || segment == "." || segment == ".." {
      return Err(AppError::Validation(format!("Invalid blob path '{}'.", path)));
    }
    if !segment
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
      return Err(AppError::Validation(format!(
        "Blob path segment '{}' contains unsupported characters.",
        segment
      )));
    }
  }
  Ok(())
}

/// Stores blobs as files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
  root: PathBuf,
  public_base_url: String,
}

impl LocalBlobStore {
  pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
    Self {
      root: root.into(),
      public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
    }
  }

  fn resolve(&self, path: &str) -> Result<PathBuf> {
    validate_path(path)?;
    Ok(self.root.join(path))
  }
}

fn storage_err(action: &str, path: &str, err: std::io::Error) -> AppError {
  AppError::Storage(format!("{} '{}': {}", action, path, err))
}

#[async_trait]
impl BlobStore for LocalBlobStore {
  #[instrument(name = "blob_store::put", skip(self, bytes), fields(size = bytes.len()))]
  async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<StoredBlob> {
    let full = self.resolve(path)?;
    if let Some(parent) = full.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| storage_err("Creating directory for", path, e))?;
    }
    tokio::fs::write(&full, &bytes)
      .await
      .map_err(|e| storage_err("Writing", path, e))?;
    debug!("Blob stored.");
    Ok(StoredBlob {
      pathname: path.to_string(),
      url: self.public_url(path),
      size: bytes.len(),
      content_type: content_type.to_string(),
    })
  }

  async fn get(&self, path: &str) -> Result<Option<BlobObject>> {
    let full = self.resolve(path)?;
    match tokio::fs::read(&full).await {
      Ok(data) => Ok(Some(BlobObject {
        bytes: Bytes::from(data),
        content_type: mime_guess::from_path(&full).first_or_octet_stream().to_string(),
      })),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
      Err(e) => Err(storage_err("Reading", path, e)),
    }
  }

  async fn delete(&self, path: &str) -> Result<()> {
    let full = self.resolve(path)?;
    match tokio::fs::remove_file(&full).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(e) => Err(storage_err("Deleting", path, e)),
    }
  }

  fn public_url(&self, path: &str) -> String {
    format!("{}/{}", self.public_base_url, path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn path_rules() {
    assert!(validate_path("avatars/u1/abc-me.png").is_ok());
    assert!(validate_path("").is_err());
    assert!(validate_path("/etc/passwd").is_err());
    assert!(validate_path("avatars/../secrets").is_err());
    assert!(validate_path("avatars//x.png").is_err());
    assert!(validate_path("avatars/a b.png").is_err());
  }

  #[tokio::test]
  async fn put_get_delete_round() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalBlobStore::new(dir.path(), "http://shop.test/blobs/");

    let stored = store
      .put("products/u1/p-shoe.png", Bytes::from_static(b"\x89PNG"), "image/png")
      .await
      .unwrap();
    assert_eq!(stored.url, "http://shop.test/blobs/products/u1/p-shoe.png");
    assert_eq!(stored.size, 4);

    let fetched = store.get("products/u1/p-shoe.png").await.unwrap().unwrap();
    assert_eq!(&fetched.bytes[..], b"\x89PNG");
    assert_eq!(fetched.content_type, "image/png");

    store.delete("products/u1/p-shoe.png").await.unwrap();
    assert!(store.get("products/u1/p-shoe.png").await.unwrap().is_none());
    store.delete("products/u1/p-shoe.png").await.unwrap();
  }

  #[tokio::test]
  async fn traversal_never_touches_the_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalBlobStore::new(dir.path(), "http://shop.test/blobs");
    let err = store.get("../outside.txt").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
  }
}

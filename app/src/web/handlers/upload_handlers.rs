// storefront/src/web/handlers/upload_handlers.rs

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde_json::json;
use std::str::FromStr;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::Role;
use crate::services::blob_store;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];
const ATTACHMENT_TYPES: &[&str] = &[
  "image/jpeg",
  "image/png",
  "image/webp",
  "image/gif",
  "application/pdf",
  "text/plain",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
  Avatars,
  Backgrounds,
  Products,
  Tickets,
}

impl UploadKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      UploadKind::Avatars => "avatars",
      UploadKind::Backgrounds => "backgrounds",
      UploadKind::Products => "products",
      UploadKind::Tickets => "tickets",
    }
  }

  pub fn allowed_types(&self) -> &'static [&'static str] {
    match self {
      UploadKind::Tickets => ATTACHMENT_TYPES,
      _ => IMAGE_TYPES,
    }
  }

  /// Product imagery is catalog content; everything else belongs to the uploader.
  pub fn permits(&self, role: Role) -> bool {
    match self {
      UploadKind::Products => matches!(role, Role::Admin | Role::Manager | Role::Editor),
      _ => true,
    }
  }
}

impl FromStr for UploadKind {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "avatars" => Ok(UploadKind::Avatars),
      "backgrounds" => Ok(UploadKind::Backgrounds),
      "products" => Ok(UploadKind::Products),
      "tickets" => Ok(UploadKind::Tickets),
      other => Err(AppError::NotFound(format!("Unknown upload kind '{}'.", other))),
    }
  }
}

/// Declared `Content-Type` without parameters, else a guess from the file name.
pub fn content_type_of(declared: Option<&str>, filename: &str) -> String {
  declared
    .and_then(|v| v.split(';').next())
    .map(|v| v.trim().to_ascii_lowercase())
    .filter(|v| !v.is_empty() && v != "application/octet-stream")
    .unwrap_or_else(|| mime_guess::from_path(filename).first_or_octet_stream().essence_str().to_string())
}

#[instrument(
    name = "handler::upload",
    skip(app_state, auth_user, req, path, body),
    fields(user_id = %auth_user.user_id, size = body.len())
)]
pub async fn upload_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req: HttpRequest,
  path: web::Path<(String, String)>,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let (kind, filename) = path.into_inner();
  let kind = UploadKind::from_str(&kind)?;
  if !kind.permits(auth_user.role) {
    return Err(AppError::Forbidden(format!("You cannot upload {}.", kind.as_str())));
  }
  if filename.contains('/') {
    return Err(AppError::Validation("File name must not contain '/'.".to_string()));
  }
  blob_store::validate_path(&filename)?;

  if body.is_empty() {
    return Err(AppError::Validation("Upload body is empty.".to_string()));
  }
  if body.len() > app_state.config.max_upload_bytes {
    return Err(AppError::Validation(format!(
      "File exceeds the {} byte limit.",
      app_state.config.max_upload_bytes
    )));
  }

  let declared = req.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
  let content_type = content_type_of(declared, &filename);
  if !kind.allowed_types().contains(&content_type.as_str()) {
    warn!(%content_type, kind = kind.as_str(), "Rejected upload content type.");
    return Err(AppError::Validation(format!(
      "Content type '{}' is not allowed for {}.",
      content_type,
      kind.as_str()
    )));
  }

  let pathname = format!("{}/{}/{}-{}", kind.as_str(), auth_user.user_id, Uuid::new_v4(), filename);
  let stored = app_state.blobs.put(&pathname, body, &content_type).await?;
  info!(pathname = %stored.pathname, size = stored.size, "Blob uploaded.");

  Ok(HttpResponse::Created().json(json!({
    "success": true,
    "url": stored.url,
    "pathname": stored.pathname,
    "size": stored.size,
    "content_type": stored.content_type,
  })))
}

/// Owner of `{kind}/{user_id}/...`, if the path has that shape.
pub fn owner_of(pathname: &str) -> Option<Uuid> {
  let mut segments = pathname.split('/');
  let kind = segments.next()?;
  UploadKind::from_str(kind).ok()?;
  segments.next()?.parse().ok()
}

#[instrument(name = "handler::delete_upload", skip(app_state, auth_user, path), fields(user_id = %auth_user.user_id))]
pub async fn delete_upload_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let pathname = path.into_inner();
  blob_store::validate_path(&pathname)?;
  if owner_of(&pathname) != Some(auth_user.user_id) {
    auth_user.require_role(&[Role::Manager])?;
  }
  app_state.blobs.delete(&pathname).await?;
  info!(%pathname, "Blob deleted.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "pathname": pathname })))
}

#[instrument(name = "handler::serve_blob", skip(app_state, path))]
pub async fn serve_blob_handler(
  app_state: web::Data<AppState>,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let pathname = path.into_inner();
  let blob = app_state
    .blobs
    .get(&pathname)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("No file at '{}'.", pathname)))?;
  Ok(
    HttpResponse::Ok()
      .content_type(blob.content_type)
      .insert_header((header::CACHE_CONTROL, "public, max-age=31536000, immutable"))
      .body(blob.bytes),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::services::blob_store::BlobStore;
  use actix_web::test::TestRequest;
  use actix_web::web::Bytes;

  #[test]
  fn kinds_and_permissions() {
    assert_eq!(UploadKind::from_str("avatars").unwrap(), UploadKind::Avatars);
    assert!(matches!(UploadKind::from_str("secrets"), Err(AppError::NotFound(_))));
    assert!(UploadKind::Products.permits(Role::Editor));
    assert!(!UploadKind::Products.permits(Role::Customer));
    assert!(UploadKind::Tickets.permits(Role::Customer));
    assert!(UploadKind::Tickets.allowed_types().contains(&"application/pdf"));
    assert!(!UploadKind::Avatars.allowed_types().contains(&"application/pdf"));
  }

  #[test]
  fn content_type_prefers_the_header() {
    assert_eq!(content_type_of(Some("image/PNG; charset=binary"), "a.jpg"), "image/png");
    assert_eq!(content_type_of(None, "photo.jpg"), "image/jpeg");
    assert_eq!(content_type_of(Some("application/octet-stream"), "doc.pdf"), "application/pdf");
    assert_eq!(content_type_of(None, "noext"), "application/octet-stream");
  }

  #[test]
  fn owner_comes_from_the_second_segment() {
    let id = Uuid::new_v4();
    assert_eq!(owner_of(&format!("avatars/{}/x-me.png", id)), Some(id));
    assert_eq!(owner_of("avatars/not-a-uuid/me.png"), None);
    assert_eq!(owner_of(&format!("secrets/{}/me.png", id)), None);
  }

  fn user(role: Role) -> AuthenticatedUser {
    AuthenticatedUser {
      user_id: Uuid::new_v4(),
      role,
    }
  }

  #[actix_web::test]
  async fn upload_stores_under_kind_and_user() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::for_tests(dir.path());
    let caller = user(Role::Customer);
    let req = TestRequest::default()
      .insert_header((header::CONTENT_TYPE, "image/png"))
      .to_http_request();

    let resp = upload_handler(
      web::Data::new(state.clone()),
      caller,
      req,
      web::Path::from(("avatars".to_string(), "me.png".to_string())),
      Bytes::from_static(b"\x89PNG fake"),
    )
    .await
    .unwrap();
    assert_eq!(resp.status(), actix_web::http::StatusCode::CREATED);

    let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let pathname = value["pathname"].as_str().unwrap();
    assert!(pathname.starts_with(&format!("avatars/{}/", caller.user_id)));
    assert!(pathname.ends_with("-me.png"));
    assert!(state.blobs.get(pathname).await.unwrap().is_some());

    let err = delete_upload_handler(
      web::Data::new(state.clone()),
      user(Role::Customer),
      web::Path::from(pathname.to_string()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    delete_upload_handler(web::Data::new(state.clone()), caller, web::Path::from(pathname.to_string()))
      .await
      .unwrap();
    assert!(state.blobs.get(pathname).await.unwrap().is_none());
  }

  #[actix_web::test]
  async fn wrong_type_or_role_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = web::Data::new(AppState::for_tests(dir.path()));

    let req = TestRequest::default()
      .insert_header((header::CONTENT_TYPE, "application/pdf"))
      .to_http_request();
    let err = upload_handler(
      state.clone(),
      user(Role::Customer),
      req,
      web::Path::from(("avatars".to_string(), "cv.pdf".to_string())),
      Bytes::from_static(b"%PDF"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let req = TestRequest::default()
      .insert_header((header::CONTENT_TYPE, "image/png"))
      .to_http_request();
    let err = upload_handler(
      state,
      user(Role::Customer),
      req,
      web::Path::from(("products".to_string(), "lamp.png".to_string())),
      Bytes::from_static(b"png"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
  }
}

// storefront/src/web/handlers/ticket_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use shopflow::ContextData;
use sqlx::{Postgres, QueryBuilder};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::models::ticket::{Ticket, TicketMessage, TicketStatus, MESSAGE_COLUMNS, TICKET_COLUMNS};
use crate::models::user::Role;
use crate::pipelines::contexts::{OpenTicketCtxData, OpenTicketInput, TicketReplyCtxData, TicketReplyInput};
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;
use crate::web::handlers::order_handlers::StatusChange;
use crate::web::handlers::{ensure_completed, Paging};

#[instrument(name = "handler::open_ticket", skip(app_state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn open_ticket_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  payload: web::Json<OpenTicketInput>,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(OpenTicketCtxData {
    app_state: app_state.get_ref().clone(),
    user_id: auth_user.user_id,
    input: payload.into_inner(),
    ticket: None,
    support_notified: false,
  });
  let result = app_state.workflows.run(ctx.clone()).await.map_err(|e| {
    warn!(error = %e, "Opening ticket failed.");
    e
  })?;
  ensure_completed(result)?;

  let guard = ctx.read();
  let ticket = guard
    .ticket
    .as_ref()
    .ok_or_else(|| AppError::Internal("Ticket workflow completed without a ticket.".to_string()))?;
  Ok(HttpResponse::Created().json(json!({
    "success": true,
    "ticket": ticket,
    "support_notified": guard.support_notified,
  })))
}

#[instrument(name = "handler::my_tickets", skip(app_state, auth_user, paging), fields(user_id = %auth_user.user_id))]
pub async fn list_my_tickets_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  paging: web::Query<Paging>,
) -> Result<HttpResponse, AppError> {
  paging.validate()?;
  let sql = format!(
    "SELECT {} FROM tickets WHERE user_id = $1 ORDER BY updated_at DESC LIMIT $2 OFFSET $3",
    TICKET_COLUMNS
  );
  let tickets = sqlx::query_as::<_, Ticket>(&sql)
    .bind(auth_user.user_id)
    .bind(paging.limit())
    .bind(paging.offset())
    .fetch_all(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "tickets": tickets })))
}

#[instrument(name = "handler::ticket_detail", skip(app_state, auth_user, path), fields(ticket_id = %*path))]
pub async fn get_ticket_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let ticket_id = path.into_inner();
  let sql = format!("SELECT {} FROM tickets WHERE id = $1", TICKET_COLUMNS);
  let ticket = sqlx::query_as::<_, Ticket>(&sql)
    .bind(ticket_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .filter(|t| t.user_id == auth_user.user_id || auth_user.role.is_staff())
    .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found.", ticket_id)))?;

  let sql = format!(
    "SELECT {} FROM ticket_messages WHERE ticket_id = $1 ORDER BY created_at ASC",
    MESSAGE_COLUMNS
  );
  let messages = sqlx::query_as::<_, TicketMessage>(&sql)
    .bind(ticket_id)
    .fetch_all(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "ticket": ticket, "messages": messages })))
}

#[instrument(name = "handler::reply_ticket", skip(app_state, auth_user, path, payload), fields(ticket_id = %*path))]
pub async fn reply_ticket_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<TicketReplyInput>,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(TicketReplyCtxData {
    app_state: app_state.get_ref().clone(),
    ticket_id: path.into_inner(),
    author_id: auth_user.user_id,
    author_role: auth_user.role,
    input: payload.into_inner(),
    ticket: None,
    message: None,
    owner_notified: false,
  });
  let result = app_state.workflows.run(ctx.clone()).await.map_err(|e| {
    warn!(error = %e, "Ticket reply failed.");
    e
  })?;
  ensure_completed(result)?;

  let guard = ctx.read();
  Ok(HttpResponse::Created().json(json!({
    "success": true,
    "ticket": guard.ticket,
    "message": guard.message,
    "owner_notified": guard.owner_notified,
  })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct TicketListQuery {
  pub status: Option<TicketStatus>,
  #[validate(range(min = 1, max = 1000000, message = "must be between 1 and 1000000"))]
  pub page: Option<i64>,
  #[validate(range(min = 1, max = 100, message = "must be between 1 and 100"))]
  pub per_page: Option<i64>,
}

#[instrument(name = "handler::manage_tickets", skip(app_state, auth_user, query), fields(user_id = %auth_user.user_id))]
pub async fn list_all_tickets_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  query: web::Query<TicketListQuery>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Manager])?;
  query.validate()?;
  let paging = Paging::from((query.page, query.per_page));

  let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM tickets", TICKET_COLUMNS));
  if let Some(status) = query.status {
    qb.push(" WHERE status = ").push_bind(status);
  }
  qb.push(" ORDER BY updated_at DESC LIMIT ")
    .push_bind(paging.limit())
    .push(" OFFSET ")
    .push_bind(paging.offset());
  let tickets: Vec<Ticket> = qb.build_query_as().fetch_all(&app_state.db_pool).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "tickets": tickets })))
}

#[instrument(name = "handler::set_ticket_status", skip(app_state, auth_user, path, payload), fields(ticket_id = %*path))]
pub async fn update_ticket_status_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<StatusChange<TicketStatus>>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Manager])?;
  let ticket_id = path.into_inner();
  let sql = format!(
    "UPDATE tickets SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING {}",
    TICKET_COLUMNS
  );
  let ticket = sqlx::query_as::<_, Ticket>(&sql)
    .bind(payload.status)
    .bind(ticket_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found.", ticket_id)))?;
  info!(%ticket_id, status = ?ticket.status, "Ticket status changed.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "ticket": ticket })))
}

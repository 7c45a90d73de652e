// storefront/src/pipelines/ticket_pipeline.rs

use crate::errors::AppError;
use crate::models::ticket::{Ticket, TicketMessage, TicketStatus, MESSAGE_COLUMNS, TICKET_COLUMNS};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::{OpenTicketCtxData, TicketReplyCtxData};
use shopflow::{ContextData, Pipeline, PipelineControl, SkipCondition, Workflows};
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

/// Status after a reply: staff pick up open tickets, customers reopen resolved ones.
pub fn status_after_reply(current: TicketStatus, by_staff: bool) -> TicketStatus {
  match (current, by_staff) {
    (TicketStatus::Open, true) => TicketStatus::InProgress,
    (TicketStatus::Resolved, false) => TicketStatus::Open,
    (s, _) => s,
  }
}

pub fn build_open_ticket_pipeline() -> Pipeline<OpenTicketCtxData, AppError> {
  let mut p = Pipeline::<OpenTicketCtxData, AppError>::new(&[
    ("validate_ticket_input", false, None),
    ("create_ticket_db", false, None),
    ("notify_support_ticket", true, None),
  ]);

  p.on_root("validate_ticket_input", |ctx_data: ContextData<OpenTicketCtxData>| {
    Box::pin(async move {
      let input = {
        let mut guard = ctx_data.write();
        guard.input.subject = guard.input.subject.trim().to_string();
        guard.input.body = guard.input.body.trim().to_string();
        guard.input.clone()
      };
      input.validate()?;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Ticket and first message land together or not at all.
  p.on_root("create_ticket_db", |ctx_data: ContextData<OpenTicketCtxData>| {
    Box::pin(async move {
      let (user_id, input, db_pool) = {
        let guard = ctx_data.read();
        (guard.user_id, guard.input.clone(), guard.app_state.db_pool.clone())
      };

      let mut tx = db_pool.begin().await?;
      let sql = format!(
        "INSERT INTO tickets (user_id, subject) VALUES ($1, $2) RETURNING {}",
        TICKET_COLUMNS
      );
      let ticket = sqlx::query_as::<_, Ticket>(&sql)
        .bind(user_id)
        .bind(&input.subject)
        .fetch_one(&mut *tx)
        .await?;
      sqlx::query(
        "INSERT INTO ticket_messages (ticket_id, author_id, body, attachment_url, is_staff) \
         VALUES ($1, $2, $3, $4, FALSE)",
      )
      .bind(ticket.id)
      .bind(user_id)
      .bind(&input.body)
      .bind(&input.attachment_url)
      .execute(&mut *tx)
      .await?;
      tx.commit().await?;

      info!(ticket_id = %ticket.id, %user_id, "Ticket opened.");
      ctx_data.write().ticket = Some(ticket);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("notify_support_ticket", |ctx_data: ContextData<OpenTicketCtxData>| {
    Box::pin(async move {
      let (app_state, ticket, user_id) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), guard.ticket.clone(), guard.user_id)
      };
      let Some(ticket) = ticket else {
        return Ok::<_, AppError>(PipelineControl::Continue);
      };

      let opener: String = sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&app_state.db_pool)
        .await?;
      let (subject, html) = common_steps::ticket_opened_message(&ticket.subject, ticket.id, &opener);
      let inbox = app_state.config.mail_sender.clone();
      let sent = common_steps::notify(&app_state, &inbox, subject, html).await;
      ctx_data.write().support_notified = sent;
      Ok(PipelineControl::Continue)
    })
  });

  p
}

pub fn build_ticket_reply_pipeline() -> Pipeline<TicketReplyCtxData, AppError> {
  let customer_reply: SkipCondition<TicketReplyCtxData> =
    Arc::new(|ctx: ContextData<TicketReplyCtxData>| !ctx.read().author_role.is_staff());

  let mut p = Pipeline::<TicketReplyCtxData, AppError>::new(&[
    ("validate_reply_input", false, None),
    ("load_ticket_for_reply", false, None),
    ("insert_ticket_message_db", false, None),
    ("notify_ticket_owner", true, Some(customer_reply)),
  ]);

  p.on_root("validate_reply_input", |ctx_data: ContextData<TicketReplyCtxData>| {
    Box::pin(async move {
      let input = {
        let mut guard = ctx_data.write();
        guard.input.body = guard.input.body.trim().to_string();
        guard.input.clone()
      };
      input.validate()?;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Customers see only their own tickets; staff see all of them.
  p.on_root("load_ticket_for_reply", |ctx_data: ContextData<TicketReplyCtxData>| {
    Box::pin(async move {
      let (ticket_id, author_id, role, db_pool) = {
        let guard = ctx_data.read();
        (
          guard.ticket_id,
          guard.author_id,
          guard.author_role,
          guard.app_state.db_pool.clone(),
        )
      };

      let sql = format!("SELECT {} FROM tickets WHERE id = $1", TICKET_COLUMNS);
      let ticket = sqlx::query_as::<_, Ticket>(&sql)
        .bind(ticket_id)
        .fetch_optional(&db_pool)
        .await?
        .filter(|t| role.is_staff() || t.user_id == author_id)
        .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found.", ticket_id)))?;

      if !ticket.status.accepts_replies() {
        warn!(%ticket_id, "Reply to a closed ticket.");
        return Err(AppError::Conflict("This ticket is closed.".to_string()));
      }
      ctx_data.write().ticket = Some(ticket);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("insert_ticket_message_db", |ctx_data: ContextData<TicketReplyCtxData>| {
    Box::pin(async move {
      let (ticket, author_id, by_staff, input, db_pool) = {
        let guard = ctx_data.read();
        let ticket = guard
          .ticket
          .clone()
          .ok_or_else(|| AppError::Internal("Ticket missing before reply.".to_string()))?;
        (
          ticket,
          guard.author_id,
          guard.author_role.is_staff(),
          guard.input.clone(),
          guard.app_state.db_pool.clone(),
        )
      };

      let mut tx = db_pool.begin().await?;
      let sql = format!(
        "INSERT INTO ticket_messages (ticket_id, author_id, body, attachment_url, is_staff) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {}",
        MESSAGE_COLUMNS
      );
      let message = sqlx::query_as::<_, TicketMessage>(&sql)
        .bind(ticket.id)
        .bind(author_id)
        .bind(&input.body)
        .bind(&input.attachment_url)
        .bind(by_staff)
        .fetch_one(&mut *tx)
        .await?;
      let next = status_after_reply(ticket.status, by_staff);
      let sql = format!(
        "UPDATE tickets SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING {}",
        TICKET_COLUMNS
      );
      let ticket = sqlx::query_as::<_, Ticket>(&sql)
        .bind(next)
        .bind(ticket.id)
        .fetch_one(&mut *tx)
        .await?;
      tx.commit().await?;

      info!(ticket_id = %ticket.id, by_staff, status = ?ticket.status, "Ticket reply added.");
      let mut guard = ctx_data.write();
      guard.message = Some(message);
      guard.ticket = Some(ticket);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("notify_ticket_owner", |ctx_data: ContextData<TicketReplyCtxData>| {
    Box::pin(async move {
      let (app_state, ticket) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), guard.ticket.clone())
      };
      let Some(ticket) = ticket else {
        return Ok::<_, AppError>(PipelineControl::Continue);
      };
      let owner_email: String = sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
        .bind(ticket.user_id)
        .fetch_one(&app_state.db_pool)
        .await?;
      let (subject, html) = common_steps::ticket_reply_message(&ticket.subject, ticket.id);
      let sent = common_steps::notify(&app_state, &owner_email, subject, html).await;
      ctx_data.write().owner_notified = sent;
      Ok(PipelineControl::Continue)
    })
  });

  p
}

pub fn register_ticket_pipelines(workflows: &Arc<Workflows<AppError>>) {
  workflows.register_pipeline(build_open_ticket_pipeline());
  workflows.register_pipeline(build_ticket_reply_pipeline());
  info!("Ticket pipelines registered.");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::user::Role;
  use crate::pipelines::contexts::{OpenTicketInput, TicketReplyInput};
  use crate::state::AppState;
  use uuid::Uuid;

  #[test]
  fn replies_move_the_ticket_along() {
    assert_eq!(status_after_reply(TicketStatus::Open, true), TicketStatus::InProgress);
    assert_eq!(status_after_reply(TicketStatus::Open, false), TicketStatus::Open);
    assert_eq!(status_after_reply(TicketStatus::Resolved, false), TicketStatus::Open);
    assert_eq!(status_after_reply(TicketStatus::Resolved, true), TicketStatus::Resolved);
    assert_eq!(status_after_reply(TicketStatus::InProgress, true), TicketStatus::InProgress);
  }

  #[tokio::test]
  async fn short_subject_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::for_tests(dir.path());
    let ctx = ContextData::new(OpenTicketCtxData {
      app_state: state.clone(),
      user_id: Uuid::new_v4(),
      input: OpenTicketInput {
        subject: "  hi ".into(),
        body: "My parcel never arrived.".into(),
        attachment_url: None,
      },
      ticket: None,
      support_notified: false,
    });
    let err = state.workflows.run(ctx).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m.contains("subject")), "{:?}", err);
  }

  #[tokio::test]
  async fn blank_reply_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::for_tests(dir.path());
    let ctx = ContextData::new(TicketReplyCtxData {
      app_state: state.clone(),
      ticket_id: Uuid::new_v4(),
      author_id: Uuid::new_v4(),
      author_role: Role::Customer,
      input: TicketReplyInput {
        body: "   ".into(),
        attachment_url: None,
      },
      ticket: None,
      message: None,
      owner_notified: false,
    });
    let err = state.workflows.run(ctx).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
  }
}

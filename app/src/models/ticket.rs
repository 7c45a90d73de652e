// storefront/src/models/ticket.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "ticket_status_enum", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
  Open,
  InProgress,
  Resolved,
  Closed,
}

impl TicketStatus {
  pub fn accepts_replies(&self) -> bool {
    !matches!(self, TicketStatus::Closed)
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Ticket {
  pub id: Uuid,
  pub user_id: Uuid,
  pub subject: String,
  pub status: TicketStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TicketMessage {
  pub id: Uuid,
  pub ticket_id: Uuid,
  pub author_id: Uuid,
  pub body: String,
  pub attachment_url: Option<String>,
  pub is_staff: bool,
  pub created_at: DateTime<Utc>,
}

pub const TICKET_COLUMNS: &str = "id, user_id, subject, status, created_at, updated_at";
pub const MESSAGE_COLUMNS: &str = "id, ticket_id, author_id, body, attachment_url, is_staff, created_at";

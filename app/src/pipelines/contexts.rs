// storefront/src/pipelines/contexts.rs

//! Data structs the workflows run over. Handlers receive them wrapped in
//! `shopflow::ContextData`.

use crate::models::cart_item::{CartItem, CartLineRow};
use crate::models::product::{Product, Variation};
use crate::models::ticket::{Ticket, TicketMessage};
use crate::models::user::{Role, User};
use crate::pricing::Totals;
use crate::services::orders::Settlement;
use crate::services::payment::PaymentIntent;
use crate::state::AppState;
use actix_web::web::Bytes;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

// --- Auth ---

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignupInput {
  #[validate(email(message = "must be a valid email address"))]
  pub email: String,
  #[validate(length(min = 8, max = 128, message = "must be 8 to 128 characters"))]
  pub password: String,
  #[validate(length(min = 1, max = 80, message = "must be 1 to 80 characters"))]
  pub name: String,
}

#[derive(Clone)]
pub struct SignupCtxData {
  pub app_state: AppState,
  pub input: SignupInput,
  pub created_user: Option<User>,
  pub welcome_email_sent: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SigninInput {
  #[validate(email(message = "must be a valid email address"))]
  pub email: String,
  #[validate(length(min = 1, message = "is required"))]
  pub password: String,
}

#[derive(Clone)]
pub struct SigninCtxData {
  pub app_state: AppState,
  pub input: SigninInput,
  pub user: Option<User>,
  pub session_token: Option<String>,
}

// --- Cart ---

#[derive(Clone)]
pub struct AddToCartCtxData {
  pub app_state: AppState,
  pub user_id: Uuid,
  pub product_id: Uuid,
  pub variation_id: Option<Uuid>,
  pub quantity: i32,
  pub product: Option<Product>,
  pub variation: Option<Variation>,
  pub updated_cart_item: Option<CartItem>,
}

// --- Checkout & payments ---

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub user_id: Uuid,
  pub lines: Vec<CartLineRow>,
  pub customer: Option<User>,
  pub totals: Option<Totals>,
  pub order_id: Option<Uuid>,
  pub payment_intent: Option<PaymentIntent>,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, user_id: Uuid) -> Self {
    Self {
      app_state,
      user_id,
      lines: Vec::new(),
      customer: None,
      totals: None,
      order_id: None,
      payment_intent: None,
    }
  }
}

/// Payment-intent event after parsing; only the fields routing needs.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
  pub id: String,
  #[serde(rename = "type")]
  pub event_type: String,
  pub data: PaymentEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEventData {
  pub object: PaymentEventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEventObject {
  pub id: String,
  #[serde(default)]
  pub metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAction {
  Fulfil,
  MarkFailed,
  Ignore,
}

#[derive(Clone)]
pub struct WebhookCtxData {
  pub app_state: AppState,
  pub source: String,
  pub raw_payload: Bytes,
  pub signature_header: Option<String>,
  pub event: Option<PaymentEvent>,
  pub action: Option<WebhookAction>,
  pub affected_order_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct FulfilOrderCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub settlement: Option<Settlement>,
  pub confirmation_sent: bool,
}

// --- Support tickets ---

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OpenTicketInput {
  #[validate(length(min = 3, max = 120, message = "must be 3 to 120 characters"))]
  pub subject: String,
  #[validate(length(min = 1, max = 5000, message = "must be 1 to 5000 characters"))]
  pub body: String,
  #[validate(url(message = "must be a URL"))]
  pub attachment_url: Option<String>,
}

#[derive(Clone)]
pub struct OpenTicketCtxData {
  pub app_state: AppState,
  pub user_id: Uuid,
  pub input: OpenTicketInput,
  pub ticket: Option<Ticket>,
  pub support_notified: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TicketReplyInput {
  #[validate(length(min = 1, max = 5000, message = "must be 1 to 5000 characters"))]
  pub body: String,
  #[validate(url(message = "must be a URL"))]
  pub attachment_url: Option<String>,
}

#[derive(Clone)]
pub struct TicketReplyCtxData {
  pub app_state: AppState,
  pub ticket_id: Uuid,
  pub author_id: Uuid,
  pub author_role: Role,
  pub input: TicketReplyInput,
  pub ticket: Option<Ticket>,
  pub message: Option<TicketMessage>,
  pub owner_notified: bool,
}

// --- Notifications ---

#[derive(Clone)]
pub struct NotificationCtxData {
  pub app_state: AppState,
  pub recipient_email: String,
  pub subject: String,
  pub html_body: String,
  pub message_id: Option<String>,
}

// storefront/src/services/mod.rs

pub mod auth_service;
pub mod blob_store;
pub mod catalog;
pub mod mailer;
pub mod order_status;
pub mod orders;
pub mod payment;
pub mod webhook_signature;

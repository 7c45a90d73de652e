// storefront/src/models/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "user_role_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Admin,
  Manager,
  Editor,
  Customer,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::Admin => "admin",
      Role::Manager => "manager",
      Role::Editor => "editor",
      Role::Customer => "customer",
    }
  }

  pub fn is_staff(&self) -> bool {
    matches!(self, Role::Admin | Role::Manager)
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "admin" => Ok(Role::Admin),
      "manager" => Ok(Role::Manager),
      "editor" => Ok(Role::Editor),
      "customer" => Ok(Role::Customer),
      other => Err(format!("unknown role '{}'", other)),
    }
  }
}

/// Membership tier, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "membership_tier_enum", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
  Bronze,
  Silver,
  Gold,
  Platinum,
}

impl Default for Tier {
  fn default() -> Self {
    Tier::Bronze
  }
}

impl fmt::Display for Tier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Tier::Bronze => "BRONZE",
      Tier::Silver => "SILVER",
      Tier::Gold => "GOLD",
      Tier::Platinum => "PLATINUM",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
  pub id: Uuid,
  pub email: String,
  #[serde(skip_serializing)]
  pub password_hash: String,
  pub name: String,
  pub role: Role,
  pub tier: Tier,
  pub avatar_url: Option<String>,
  pub background_url: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

pub const USER_COLUMNS: &str =
  "id, email, password_hash, name, role, tier, avatar_url, background_url, created_at, updated_at";

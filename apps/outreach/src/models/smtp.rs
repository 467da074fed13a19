use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::text_enum;

text_enum!(SmtpStatus {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
});

/// One per tenant. The password column only ever holds ciphertext and is
/// never serialized out.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SmtpAccountRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub host: String,
    pub port: i32,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub encrypted_password: String,
    pub use_tls: bool,
    pub use_ssl: bool,
    pub from_name: Option<String>,
    pub status: SmtpStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSmtpAccount {
    pub tenant_id: Uuid,
    pub email: String,
    pub host: String,
    pub port: i32,
    pub username: String,
    pub encrypted_password: String,
    pub use_tls: bool,
    pub use_ssl: bool,
    pub from_name: Option<String>,
}

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::crypto::EncryptionService;
use crate::errors::AppError;
use crate::models::smtp::{NewSmtpAccount, SmtpAccountRow, SmtpStatus};
use crate::store::Store;

/// Emitted after an account row has been written.
#[derive(Debug, Clone, PartialEq)]
pub struct SmtpAccountChanged {
    pub account_id: Uuid,
    pub tenant_id: Uuid,
}

pub trait SmtpAccountListener: Send + Sync {
    fn on_account_changed(&self, event: &SmtpAccountChanged);
}

/// SMTP settings as submitted by the client. The password is plaintext here
/// and nowhere else.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpAccountRequest {
    pub email: String,
    pub host: String,
    pub port: i32,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub use_ssl: bool,
    pub from_name: Option<String>,
}

pub struct SmtpAccountService {
    store: Arc<dyn Store>,
    crypto: Arc<EncryptionService>,
    listeners: Vec<Arc<dyn SmtpAccountListener>>,
}

impl SmtpAccountService {
    pub fn new(store: Arc<dyn Store>, crypto: Arc<EncryptionService>) -> Self {
        Self {
            store,
            crypto,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn SmtpAccountListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Creates or replaces the tenant's account, storing the password
    /// encrypted, and leaves it ACTIVE.
    pub async fn upsert(
        &self,
        tenant_id: Uuid,
        req: SmtpAccountRequest,
    ) -> Result<SmtpAccountRow, AppError> {
        validate(&req)?;
        let encrypted_password = self.crypto.encrypt(&req.password)?;

        let row = self
            .store
            .upsert_smtp_account(NewSmtpAccount {
                tenant_id,
                email: req.email.trim().to_string(),
                host: req.host.trim().to_string(),
                port: req.port,
                username: req.username,
                encrypted_password,
                use_tls: req.use_tls,
                use_ssl: req.use_ssl,
                from_name: req.from_name.filter(|n| !n.trim().is_empty()),
            })
            .await?;

        info!("SMTP account {} saved for tenant {tenant_id}", row.id);
        self.notify(&row);
        Ok(row)
    }

    pub async fn get(&self, tenant_id: Uuid) -> Result<SmtpAccountRow, AppError> {
        self.store
            .get_smtp_account(tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No SMTP account configured".to_string()))
    }

    pub async fn deactivate(&self, tenant_id: Uuid) -> Result<SmtpAccountRow, AppError> {
        let row = self
            .store
            .set_smtp_status(tenant_id, SmtpStatus::Inactive)
            .await?
            .ok_or_else(|| AppError::NotFound("No SMTP account configured".to_string()))?;
        info!("SMTP account {} deactivated", row.id);
        self.notify(&row);
        Ok(row)
    }

    fn notify(&self, row: &SmtpAccountRow) {
        let event = SmtpAccountChanged {
            account_id: row.id,
            tenant_id: row.tenant_id,
        };
        for listener in &self.listeners {
            listener.on_account_changed(&event);
        }
    }
}

fn validate(req: &SmtpAccountRequest) -> Result<(), AppError> {
    let required = [
        ("email", &req.email),
        ("host", &req.host),
        ("username", &req.username),
        ("password", &req.password),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{field} is required")));
        }
    }
    if !(1..=65535).contains(&req.port) {
        return Err(AppError::Validation(
            "port must be within [1, 65535]".to_string(),
        ));
    }
    Ok(())
}

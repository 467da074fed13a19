use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};
use uuid::Uuid;

use crate::crypto::EncryptionService;
use crate::mail::sender::SenderFactory;
use crate::mail::smtp_accounts::{SmtpAccountChanged, SmtpAccountListener};
use crate::mail::{MailError, MailTransport};
use crate::models::smtp::SmtpAccountRow;

/// Process-wide memo of prepared transports keyed by SMTP account id.
///
/// Construction happens under the map lock, so concurrent callers for the
/// same account get the same instance and the factory runs once. Entries are
/// evicted when the account changes.
pub struct MailSenderCache {
    factory: Arc<dyn SenderFactory>,
    crypto: Arc<EncryptionService>,
    senders: Mutex<HashMap<Uuid, Arc<dyn MailTransport>>>,
}

impl MailSenderCache {
    pub fn new(factory: Arc<dyn SenderFactory>, crypto: Arc<EncryptionService>) -> Self {
        Self {
            factory,
            crypto,
            senders: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, account: &SmtpAccountRow) -> Result<Arc<dyn MailTransport>, MailError> {
        let mut senders = self
            .senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(sender) = senders.get(&account.id) {
            return Ok(Arc::clone(sender));
        }

        let password = self.crypto.decrypt(&account.encrypted_password)?;
        let sender = self.factory.build(account, &password)?;
        senders.insert(account.id, Arc::clone(&sender));
        info!(
            "Mail sender created for SMTP account {} ({} cached)",
            account.id,
            senders.len()
        );
        Ok(sender)
    }

    pub fn evict(&self, account_id: Uuid) -> bool {
        let removed = self
            .senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&account_id)
            .is_some();
        if removed {
            debug!("Evicted mail sender for SMTP account {account_id}");
        }
        removed
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl SmtpAccountListener for MailSenderCache {
    fn on_account_changed(&self, event: &SmtpAccountChanged) {
        self.evict(event.account_id);
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::debug;

use crate::mail::{compose, MailError, MailTransport, OutgoingEmail};
use crate::models::smtp::SmtpAccountRow;

const SMTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds a ready-to-use transport for one SMTP account. Called by the
/// sender cache at most once per account until it is invalidated.
pub trait SenderFactory: Send + Sync {
    fn build(
        &self,
        account: &SmtpAccountRow,
        password: &str,
    ) -> Result<Arc<dyn MailTransport>, MailError>;
}

pub struct LettreSenderFactory;

impl SenderFactory for LettreSenderFactory {
    fn build(
        &self,
        account: &SmtpAccountRow,
        password: &str,
    ) -> Result<Arc<dyn MailTransport>, MailError> {
        let port = u16::try_from(account.port)
            .map_err(|_| MailError::Setup(format!("port {} out of range", account.port)))?;

        // Implicit TLS wins over STARTTLS when both are set.
        let tls = if account.use_ssl || account.use_tls {
            let params = TlsParameters::new(account.host.clone())
                .map_err(|e| MailError::Setup(e.to_string()))?;
            if account.use_ssl {
                Tls::Wrapper(params)
            } else {
                Tls::Required(params)
            }
        } else {
            Tls::None
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&account.host)
            .port(port)
            .tls(tls)
            .credentials(Credentials::new(account.username.clone(), password.to_string()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        debug!(
            "Built SMTP transport for {}:{} (tls={}, ssl={})",
            account.host, port, account.use_tls, account.use_ssl
        );
        Ok(Arc::new(SmtpMailTransport { transport }))
    }
}

pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let message = compose(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(())
    }
}

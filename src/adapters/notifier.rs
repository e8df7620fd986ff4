use crate::domain::{
    BoxFuture,
    error::ServiceError,
    notification::{Notification, Notifier},
};

/// Writes each notification as a structured log line. Stands in for a mail
/// relay until one is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), ServiceError>> {
        Box::pin(async move {
            match notification {
                Notification::RequestCreated {
                    request_id,
                    title,
                    email,
                    locale,
                } => tracing::info!(
                    %request_id, %title, email = email.as_deref(), %locale,
                    "notify: request created"
                ),
                Notification::NewRequestAlert { request_id, title } => {
                    tracing::info!(%request_id, %title, "notify: new request alert")
                }
                Notification::ProposalUploaded {
                    request_id,
                    title,
                    email,
                    locale,
                } => tracing::info!(
                    %request_id, %title, email = email.as_deref(), %locale,
                    "notify: proposal uploaded"
                ),
                Notification::PaymentReceipt {
                    payment_id,
                    request_id,
                    email,
                    amount,
                    currency,
                } => tracing::info!(
                    %payment_id, %request_id, %email, %amount, %currency,
                    "notify: payment receipt"
                ),
            }
            Ok(())
        })
    }
}

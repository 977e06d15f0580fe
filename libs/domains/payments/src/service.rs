use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::bank::PaymentGateway;
use crate::callback::CallbackNotifier;
use crate::error::{PaymentError, PaymentResult};
use crate::models::{NewPayment, Outcome, PaymentEnvelope, PaymentStatus};
use crate::repository::PaymentRepository;

/// Service layer owning the payment lifecycle
///
/// One call to [`process_payment`](Self::process_payment) records the order
/// as PROCESSING, debits the bank, commits the terminal status and notifies
/// the merchant when a callback URL was given.
pub struct PaymentService<R, B, N> {
    repository: Arc<R>,
    bank: Arc<B>,
    notifier: Arc<N>,
}

impl<R, B, N> PaymentService<R, B, N>
where
    R: PaymentRepository,
    B: PaymentGateway,
    N: CallbackNotifier,
{
    pub fn new(repository: R, bank: B, notifier: N) -> Self {
        Self {
            repository: Arc::new(repository),
            bank: Arc::new(bank),
            notifier: Arc::new(notifier),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Run one processing attempt for `envelope`
    ///
    /// `Err` is reserved for failures of the service's own storage; every
    /// bank answer is expressed as an [`Outcome`].
    #[instrument(skip(self, envelope), fields(order_id = %envelope.order_id, amount = envelope.amount))]
    pub async fn process_payment(&self, envelope: &PaymentEnvelope) -> PaymentResult<Outcome> {
        info!(requested_status = %envelope.status, "Processing payment");

        if let Some(existing) = self.repository.find_by_order_id(&envelope.order_id).await? {
            warn!(status = %existing.status, "Order already recorded");
            return Ok(Outcome::Duplicate);
        }

        match self
            .repository
            .create_processing(NewPayment::new(&envelope.order_id, envelope.amount))
            .await
        {
            Ok(_) => {}
            Err(PaymentError::DuplicateOrder(_)) => {
                warn!("Lost insert race for order");
                return Ok(Outcome::Duplicate);
            }
            Err(e) => return Err(e),
        }

        match self.bank.debit(&envelope.order_id, envelope.amount).await {
            Ok(()) => {
                self.repository
                    .update_status(&envelope.order_id, PaymentStatus::Success)
                    .await?;
                info!("Payment succeeded");

                self.notify(envelope, PaymentStatus::Success).await;
                Ok(Outcome::Success)
            }
            Err(bank_error) => {
                error!(error = %bank_error, "Bank debit failed");
                self.repository
                    .update_status(&envelope.order_id, PaymentStatus::Failed)
                    .await?;

                self.notify(envelope, PaymentStatus::Failed).await;
                if bank_error.is_permanent() {
                    Ok(Outcome::PermanentFailure(bank_error.to_string()))
                } else {
                    Ok(Outcome::TransientFailure(bank_error.to_string()))
                }
            }
        }
    }

    async fn notify(&self, envelope: &PaymentEnvelope, status: PaymentStatus) {
        if let Some(url) = envelope.callback_url.as_deref() {
            self.notifier.notify(url, &envelope.order_id, status).await;
        }
    }
}

impl<R, B, N> Clone for PaymentService<R, B, N> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            bank: Arc::clone(&self.bank),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

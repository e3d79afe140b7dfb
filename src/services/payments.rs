//! Deposit, withdrawal and callback orchestration.
//!
//! Every entry point returns an `Outcome` or an `AppError`; the HTTP layer
//! only decodes requests and encodes these.

use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;

use super::cache::{transaction_key, user_key, Cache};
use super::lock::{fingerprint, LockGuard, LockManager};
use super::publisher::Publisher;
use crate::domain::{
    NewTransaction, Transaction, TransactionStatus, TransactionType, Transition, TransitionError,
    User,
};
use crate::error::AppError;
use crate::gateways::{GatewaySelector, PaymentProcessor};
use crate::outcome::Outcome;
use crate::ports::{RepositoryError, TransactionRepository};
use crate::schemas::{CallbackRequest, DataFormat, DepositRequest, WithdrawalRequest};

const ALREADY_FINALISED: &str = "Transaction already finalised";

pub fn deposit_callback_url(base_url: &str, transaction_id: i64) -> String {
    format!(
        "{}/api/v1/callback/deposits/{}",
        base_url.trim_end_matches('/'),
        transaction_id
    )
}

pub fn withdrawal_callback_url(base_url: &str, transaction_id: i64) -> String {
    format!(
        "{}/api/v1/callback/withdrawals/{}",
        base_url.trim_end_matches('/'),
        transaction_id
    )
}

#[derive(Clone)]
pub struct PaymentService {
    repository: Arc<dyn TransactionRepository>,
    selector: GatewaySelector,
    locks: LockManager,
    cache: Cache,
    publisher: Publisher,
    base_url: String,
}

impl PaymentService {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        selector: GatewaySelector,
        locks: LockManager,
        cache: Cache,
        publisher: Publisher,
        base_url: String,
    ) -> Self {
        Self {
            repository,
            selector,
            locks,
            cache,
            publisher,
            base_url,
        }
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub async fn handle_deposit(
        &self,
        mut request: DepositRequest,
        format: DataFormat,
    ) -> Result<Outcome, AppError> {
        request.validate()?;

        let user = self.load_user(request.user_id).await?;
        let gateway = self.selector.select(user.country.id).await?;

        let lock_key = fingerprint(
            TransactionType::Deposit,
            &request.amount,
            request.user_id,
            &request.currency,
            gateway.name(),
        );
        let guard = self.locks.acquire(&lock_key).await?;
        let service = self.clone();
        let (transaction, session) = detach(async move {
            let created = service
                .create_deposit(&request, &user, gateway.as_ref())
                .await;
            release(guard).await;
            created
        })
        .await?;

        tracing::info!(
            transaction_id = transaction.id,
            user_id = transaction.user_id,
            gateway = %transaction.gateway_name,
            "deposit initiated"
        );

        self.cache
            .save_or_warn(&transaction_key(transaction.id), &transaction)
            .await;
        self.publisher
            .publish_or_warn(transaction.id, &session, format)
            .await;

        Ok(Outcome::ok("Success").with_data(session))
    }

    async fn create_deposit(
        &self,
        request: &DepositRequest,
        user: &User,
        gateway: &dyn PaymentProcessor,
    ) -> Result<(Transaction, Value), AppError> {
        let transaction = self
            .repository
            .create_transaction(NewTransaction::deposit(
                request.amount.clone(),
                request.currency.clone(),
                request.user_id,
                gateway.name().to_string(),
                user.country.name.clone(),
            ))
            .await?;

        let callback_url = deposit_callback_url(&self.base_url, transaction.id);
        match gateway
            .generate_deposit_session(&transaction, &callback_url)
            .await
        {
            Ok(session) => Ok((transaction, session)),
            Err(e) => {
                tracing::error!(
                    transaction_id = transaction.id,
                    gateway = gateway.name(),
                    error = %e,
                    "failed to generate deposit checkout session"
                );
                self.finalise(&transaction, TransactionStatus::Failed).await?;
                Err(e.into())
            }
        }
    }

    pub async fn handle_withdrawal(
        &self,
        mut request: WithdrawalRequest,
        format: DataFormat,
    ) -> Result<Outcome, AppError> {
        request.validate()?;

        let account = self.repository.get_user_account(request.user_id).await?;
        if account.balance < request.amount {
            return Err(AppError::Validation(
                "You do not have sufficient balance".to_string(),
            ));
        }

        let gateway = self
            .selector
            .resolve_live(&request.payment_gateway_name)
            .await?;
        let user = self.load_user(request.user_id).await?;

        let lock_key = fingerprint(
            TransactionType::Withdrawal,
            &request.amount,
            request.user_id,
            &account.currency,
            gateway.name(),
        );
        let guard = self.locks.acquire(&lock_key).await?;
        let service = self.clone();
        let transaction = detach(async move {
            let created = service
                .create_withdrawal(&request, &account.currency, &user, gateway.as_ref())
                .await;
            release(guard).await;
            created
        })
        .await?;

        tracing::info!(
            transaction_id = transaction.id,
            user_id = transaction.user_id,
            gateway = %transaction.gateway_name,
            "withdrawal registered"
        );

        self.cache
            .save_or_warn(&transaction_key(transaction.id), &transaction)
            .await;
        self.publisher
            .publish_or_warn(transaction.id, &transaction, format)
            .await;

        Ok(
            Outcome::ok("Your withdrawal has been registered and will be processed shortly")
                .with_data(json!(transaction)),
        )
    }

    /// Debits at initiation. The conditional debit is the authoritative
    /// balance check; the earlier read only gives a fast rejection.
    async fn create_withdrawal(
        &self,
        request: &WithdrawalRequest,
        currency: &str,
        user: &User,
        gateway: &dyn PaymentProcessor,
    ) -> Result<Transaction, AppError> {
        let debit = -request.amount.clone();
        self.repository
            .update_user_balance(request.user_id, &debit)
            .await?;

        let created = self
            .repository
            .create_transaction(NewTransaction::withdrawal(
                request.amount.clone(),
                currency.to_string(),
                request.user_id,
                gateway.name().to_string(),
                user.country.name.clone(),
            ))
            .await;

        let transaction = match created {
            Ok(transaction) => transaction,
            Err(e) => {
                // Put the money back; there is no transaction to reconcile against.
                if let Err(credit_err) = self
                    .repository
                    .update_user_balance(request.user_id, &request.amount)
                    .await
                {
                    tracing::error!(
                        alert = true,
                        user_id = request.user_id,
                        amount = %request.amount,
                        error = %credit_err,
                        "withdrawal debit could not be reversed"
                    );
                }
                return Err(e.into());
            }
        };

        let callback_url = withdrawal_callback_url(&self.base_url, transaction.id);
        if let Err(e) = gateway
            .register_withdrawal(&transaction, &callback_url, &request.receiving_account)
            .await
        {
            tracing::error!(
                transaction_id = transaction.id,
                gateway = gateway.name(),
                error = %e,
                "failed to register withdrawal"
            );
            self.finalise(&transaction, TransactionStatus::Failed).await?;
            return Err(e.into());
        }

        Ok(transaction)
    }

    pub async fn handle_deposit_callback(
        &self,
        transaction_id: i64,
        request: CallbackRequest,
        format: DataFormat,
    ) -> Result<Outcome, AppError> {
        self.handle_callback(TransactionType::Deposit, transaction_id, request, format)
            .await
    }

    pub async fn handle_withdrawal_callback(
        &self,
        transaction_id: i64,
        request: CallbackRequest,
        format: DataFormat,
    ) -> Result<Outcome, AppError> {
        self.handle_callback(TransactionType::Withdrawal, transaction_id, request, format)
            .await
    }

    async fn handle_callback(
        &self,
        kind: TransactionType,
        transaction_id: i64,
        request: CallbackRequest,
        format: DataFormat,
    ) -> Result<Outcome, AppError> {
        if request.transaction_id != transaction_id {
            return Err(AppError::Validation(
                "transaction_id does not match the callback URL".to_string(),
            ));
        }
        let status = request.parsed_status()?;

        let transaction = self.load_transaction(transaction_id).await?;
        if transaction.kind != kind {
            return Err(AppError::Validation(format!(
                "Transaction {} is not a {}",
                transaction_id, kind
            )));
        }

        let next = match transaction.status.transition(status) {
            Ok(Transition::Apply(next)) => next,
            Ok(Transition::AlreadyFinal(current)) => {
                tracing::info!(transaction_id, status = %current, "duplicate callback ignored");
                return Ok(already_finalised(current));
            }
            Err(TransitionError::BackToPending) => {
                return Err(AppError::Validation(
                    TransitionError::BackToPending.to_string(),
                ))
            }
        };

        if !self.finalise(&transaction, next).await? {
            // The cached copy was stale: someone else already settled it.
            self.cache
                .delete_or_warn(&transaction_key(transaction_id))
                .await;
            tracing::info!(transaction_id, "callback raced with an earlier one; ignored");
            return Ok(Outcome::ok(ALREADY_FINALISED));
        }

        self.cache
            .delete_or_warn(&transaction_key(transaction_id))
            .await;

        let updated = Transaction {
            status: next,
            ..transaction
        };
        self.publisher
            .publish_or_warn(updated.id, &updated, format)
            .await;

        let message = match kind {
            TransactionType::Deposit => "Deposit transaction status updated successfully",
            TransactionType::Withdrawal => "Withdrawal transaction status updated successfully",
        };
        Ok(Outcome::ok(message).with_data(json!(updated)))
    }

    /// Persist `pending -> next` and apply the balance rule. Returns `false`
    /// when the transaction was no longer pending, in which case nothing
    /// changed.
    async fn finalise(
        &self,
        transaction: &Transaction,
        next: TransactionStatus,
    ) -> Result<bool, AppError> {
        let applied = self
            .repository
            .update_transaction_status(transaction.id, next)
            .await?;
        if !applied {
            return Ok(false);
        }

        tracing::info!(
            transaction_id = transaction.id,
            kind = %transaction.kind,
            status = %next,
            "transaction finalised"
        );

        if let Some(delta) = balance_delta(transaction, next) {
            if let Err(e) = self
                .repository
                .update_user_balance(transaction.user_id, &delta)
                .await
            {
                tracing::error!(
                    alert = true,
                    transaction_id = transaction.id,
                    user_id = transaction.user_id,
                    amount = %delta,
                    error = %e,
                    "status persisted but balance not reconciled"
                );
                return Err(AppError::Inconsistent {
                    transaction_id: transaction.id,
                    reason: e.to_string(),
                });
            }
        }

        Ok(true)
    }

    async fn load_user(&self, user_id: i64) -> Result<User, AppError> {
        let key = user_key(user_id);
        match self.cache.get::<User>(&key).await {
            Ok(Some(user)) => return Ok(user),
            Ok(None) => {}
            Err(e) => tracing::warn!(user_id, error = %e, "user cache read failed"),
        }

        let user = self
            .repository
            .get_user_by_id(user_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound(_) => AppError::NotFound("User not found".to_string()),
                other => other.into(),
            })?;
        self.cache.save_or_warn(&key, &user).await;
        Ok(user)
    }

    async fn load_transaction(&self, transaction_id: i64) -> Result<Transaction, AppError> {
        let key = transaction_key(transaction_id);
        match self.cache.get::<Transaction>(&key).await {
            Ok(Some(transaction)) => return Ok(transaction),
            Ok(None) => {}
            Err(e) => tracing::warn!(transaction_id, error = %e, "transaction cache read failed"),
        }

        let transaction = self
            .repository
            .get_transaction_by_id(transaction_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound(_) => {
                    AppError::NotFound("Transaction not found".to_string())
                }
                other => other.into(),
            })?;
        self.cache.save_or_warn(&key, &transaction).await;
        Ok(transaction)
    }
}

/// Deposits credit on success; withdrawals were debited at initiation and
/// are credited back on failure.
fn balance_delta(transaction: &Transaction, next: TransactionStatus) -> Option<BigDecimal> {
    match (transaction.kind, next) {
        (TransactionType::Deposit, TransactionStatus::Success)
        | (TransactionType::Withdrawal, TransactionStatus::Failed) => {
            Some(transaction.amount.clone())
        }
        _ => None,
    }
}

fn already_finalised(current: TransactionStatus) -> Outcome {
    Outcome::ok(ALREADY_FINALISED).with_data(json!({ "status": current }))
}

/// Runs a critical section on its own task so it completes and releases
/// its lock even when the request future is dropped mid-flight.
async fn detach<T, F>(section: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(section).await.map_err(|e| {
        tracing::error!(error = %e, "critical section task failed");
        AppError::Internal(format!("critical section task failed: {}", e))
    })?
}

async fn release(guard: LockGuard) {
    let key = guard.key().to_string();
    if let Err(e) = guard.release().await {
        tracing::warn!(lock = %key, error = %e, "failed to release lock");
    }
}

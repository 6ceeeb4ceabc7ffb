//! Wallet engine: balance primitives, deposits, withdrawals and accounts.
//!
//! Every balance change is one [`LedgerStore`] primitive. Reads go through
//! [`ReadRetry`]; mutations are never retried here, because a mutation that
//! failed ambiguously may already have been applied.

use std::sync::Arc;

use utoipa::ToSchema;

use crate::domain::{
    Account, AccountId, EntryId, EntryKind, EntryStatus, IdempotencyKey, JoinId, LedgerEntry,
};
use crate::error::GatewayError;
use crate::persistence::{
    AppendOutcome, CreditOutcome, DebitOutcome, DebitRecord, DeleteAccountOutcome,
    DepositTransition, EntryLocator, HoldOutcome, LedgerStore, PlainCreditOutcome,
    ReadRetry,
};
use crate::service::payment::PaymentVerifier;

/// Most entries returned by one history request.
pub const MAX_HISTORY: usize = 50;

/// Smallest accepted manual deposit reference length.
const MIN_REFERENCE_LEN: usize = 5;

/// Minimum amounts accepted by the wallet.
#[derive(Debug, Clone, Copy)]
pub struct WalletLimits {
    /// Smallest deposit.
    pub min_deposit: u64,
    /// Smallest withdrawal.
    pub min_withdrawal: u64,
}

/// Gateway callback data proving a payment happened.
#[derive(Debug, Clone)]
pub struct PaymentProof {
    /// Gateway's payment reference.
    pub payment_ref: String,
    /// Hex HMAC over `order_ref|payment_ref`.
    pub signature: String,
}

/// Admin verdict on a pending deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Credit the deposit.
    Approve,
    /// Refuse the deposit.
    Reject,
}

/// Admin change to a wallet balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletAdjustment {
    /// Credit the amount and record a `bonus` entry.
    Add(u64),
    /// Overwrite the balance.
    Set(u64),
}

/// Result of a deposit verification.
#[derive(Debug, Clone)]
pub struct DepositReceipt {
    /// The deposit entry as stored.
    pub entry: LedgerEntry,
    /// Balance after the call.
    pub balance: u64,
    /// `false` when the deposit had already been credited earlier.
    pub credited: bool,
}

/// Atomic balance primitives plus the deposit and withdrawal flows.
#[derive(Debug)]
pub struct WalletEngine {
    store: Arc<dyn LedgerStore>,
    verifier: Arc<dyn PaymentVerifier>,
    retry: ReadRetry,
    limits: WalletLimits,
}

impl WalletEngine {
    /// Creates a wallet engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        verifier: Arc<dyn PaymentVerifier>,
        retry: ReadRetry,
        limits: WalletLimits,
    ) -> Self {
        Self {
            store,
            verifier,
            retry,
            limits,
        }
    }

    /// Returns the configured limits.
    #[must_use]
    pub const fn limits(&self) -> WalletLimits {
        self.limits
    }

    // ── Primitives ───────────────────────────────────────────────────────

    /// Loads an account.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccountNotFound`] or a persistence failure.
    pub async fn account(&self, id: AccountId) -> Result<Account, GatewayError> {
        self.retry
            .run("get_account", || self.store.get_account(id))
            .await?
            .ok_or(GatewayError::AccountNotFound(id))
    }

    /// Debits `amount` if the balance covers it, writing `record` in the
    /// same step. Returns the new balance.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InsufficientFunds`] (nothing changed),
    /// [`GatewayError::AccountNotFound`] or a persistence failure.
    pub async fn debit_if_sufficient(
        &self,
        id: AccountId,
        amount: u64,
        record: DebitRecord,
    ) -> Result<u64, GatewayError> {
        match self.store.debit_if_sufficient(id, amount, record).await? {
            DebitOutcome::Applied { new_balance } => {
                tracing::debug!(account_id = %id, amount, new_balance, "debit applied");
                Ok(new_balance)
            }
            DebitOutcome::InsufficientFunds { balance } => {
                tracing::debug!(account_id = %id, amount, balance, "debit refused");
                Err(GatewayError::InsufficientFunds {
                    balance,
                    required: amount,
                })
            }
            DebitOutcome::AccountNotFound => Err(GatewayError::AccountNotFound(id)),
        }
    }

    /// Credits `amount` with no ledger entry. Returns the new balance.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccountNotFound`] or a persistence failure.
    pub async fn credit(&self, id: AccountId, amount: u64) -> Result<u64, GatewayError> {
        match self.store.credit(id, amount).await? {
            PlainCreditOutcome::Applied { new_balance } => Ok(new_balance),
            PlainCreditOutcome::AccountNotFound => Err(GatewayError::AccountNotFound(id)),
        }
    }

    /// Appends an entry without touching the balance.
    ///
    /// # Errors
    ///
    /// [`GatewayError::DuplicateExternalReference`] when the reference or key
    /// is taken, [`GatewayError::AccountNotFound`] or a persistence failure.
    pub async fn record_ledger_entry(&self, entry: LedgerEntry) -> Result<(), GatewayError> {
        let account_id = entry.account_id;
        match self.store.append_entry(entry).await? {
            AppendOutcome::Appended => Ok(()),
            AppendOutcome::DuplicateExternalReference | AppendOutcome::DuplicateIdempotencyKey => {
                Err(GatewayError::DuplicateExternalReference)
            }
            AppendOutcome::AccountNotFound => Err(GatewayError::AccountNotFound(account_id)),
        }
    }

    /// Settles a charge hold into its entry-fee entry.
    ///
    /// # Errors
    ///
    /// Persistence failures only.
    pub async fn settle_hold(
        &self,
        id: JoinId,
        entry: LedgerEntry,
    ) -> Result<HoldOutcome, GatewayError> {
        Ok(self.store.settle_hold(id, entry).await?)
    }

    /// Releases a charge hold back to the wallet.
    ///
    /// # Errors
    ///
    /// Persistence failures only.
    pub async fn release_hold(&self, id: JoinId) -> Result<HoldOutcome, GatewayError> {
        Ok(self.store.release_hold(id).await?)
    }

    /// Returns `true` if the entry-fee for `join` has been recorded.
    ///
    /// # Errors
    ///
    /// Persistence failures only.
    pub async fn entry_fee_recorded(&self, join: JoinId) -> Result<bool, GatewayError> {
        let key = IdempotencyKey::entry_fee(join);
        let found = self
            .retry
            .run("find_entry_fee", || {
                self.store
                    .find_entry(EntryLocator::IdempotencyKey(key.clone()))
            })
            .await?;
        Ok(found.is_some())
    }

    /// An account's entries, newest first, at most [`MAX_HISTORY`].
    ///
    /// # Errors
    ///
    /// Persistence failures only.
    pub async fn history(
        &self,
        id: AccountId,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, GatewayError> {
        let limit = limit.clamp(1, MAX_HISTORY);
        Ok(self
            .retry
            .run("list_entries", || self.store.list_entries(id, limit))
            .await?)
    }

    // ── Deposits ─────────────────────────────────────────────────────────

    fn check_deposit_amount(&self, amount: u64) -> Result<(), GatewayError> {
        if amount < self.limits.min_deposit {
            return Err(GatewayError::InvalidRequest(format!(
                "minimum deposit is {}",
                self.limits.min_deposit
            )));
        }
        Ok(())
    }

    /// Opens a gateway deposit: records a `pending` entry whose external
    /// reference is a fresh order reference.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidRequest`] below the minimum,
    /// [`GatewayError::AccountNotFound`] or a persistence failure.
    pub async fn create_deposit_order(
        &self,
        account_id: AccountId,
        amount: u64,
    ) -> Result<LedgerEntry, GatewayError> {
        self.check_deposit_amount(amount)?;
        let order_ref = format!("order_{}", uuid::Uuid::new_v4().simple());
        let entry = LedgerEntry::new(account_id, EntryKind::Deposit, amount, EntryStatus::Pending)
            .with_external_ref(order_ref)
            .with_description("Deposit via payment gateway");
        self.record_ledger_entry(entry.clone()).await?;
        tracing::info!(%account_id, amount, order_ref = ?entry.external_ref, "deposit order created");
        Ok(entry)
    }

    /// Verifies a gateway callback and credits the matching pending deposit.
    ///
    /// Calling this again for an already credited order succeeds without
    /// crediting a second time.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidSignature`], [`GatewayError::EntryNotFound`],
    /// [`GatewayError::InvalidRequest`] when the order belongs to someone
    /// else or carries another amount, [`GatewayError::AlreadyProcessed`]
    /// for a rejected order, or a persistence failure.
    pub async fn verify_and_credit_deposit(
        &self,
        order_ref: &str,
        proof: PaymentProof,
        account_id: AccountId,
        amount: u64,
    ) -> Result<DepositReceipt, GatewayError> {
        if !self
            .verifier
            .verify_signature(order_ref, &proof.payment_ref, &proof.signature)
        {
            tracing::warn!(%account_id, order_ref, "payment signature rejected");
            return Err(GatewayError::InvalidSignature);
        }

        let locator = EntryLocator::ExternalRef(order_ref.to_string());
        let pending = self
            .retry
            .run("find_deposit", || self.store.find_entry(locator.clone()))
            .await?
            .ok_or_else(|| GatewayError::EntryNotFound(order_ref.to_string()))?;
        if pending.kind != EntryKind::Deposit
            || pending.account_id != account_id
            || pending.amount != amount
        {
            return Err(GatewayError::InvalidRequest(
                "order does not match account or amount".to_string(),
            ));
        }

        match self
            .store
            .complete_pending_deposit(locator, Some(proof.payment_ref), None)
            .await?
        {
            DepositTransition::Completed { entry, new_balance } => {
                tracing::info!(%account_id, amount, order_ref, "deposit credited");
                Ok(DepositReceipt {
                    entry,
                    balance: new_balance,
                    credited: true,
                })
            }
            DepositTransition::NotPending { entry } if entry.status == EntryStatus::Completed => {
                tracing::debug!(%account_id, order_ref, "deposit already credited");
                let balance = self.account(account_id).await?.balance;
                Ok(DepositReceipt {
                    entry,
                    balance,
                    credited: false,
                })
            }
            DepositTransition::NotPending { entry } | DepositTransition::Rejected { entry } => {
                Err(GatewayError::AlreadyProcessed(entry.id))
            }
            DepositTransition::NotFound => Err(GatewayError::EntryNotFound(order_ref.to_string())),
        }
    }

    /// Records a manual (UPI) deposit awaiting admin review.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidRequest`] for a short reference or small
    /// amount, [`GatewayError::DuplicateExternalReference`] for a reused
    /// reference, [`GatewayError::AccountNotFound`] or a persistence failure.
    pub async fn submit_deposit(
        &self,
        account_id: AccountId,
        amount: u64,
        external_ref: &str,
    ) -> Result<LedgerEntry, GatewayError> {
        self.check_deposit_amount(amount)?;
        let reference = external_ref.trim();
        if reference.chars().count() < MIN_REFERENCE_LEN {
            return Err(GatewayError::InvalidRequest(format!(
                "transaction reference must be at least {MIN_REFERENCE_LEN} characters"
            )));
        }
        let entry = LedgerEntry::new(account_id, EntryKind::Deposit, amount, EntryStatus::Pending)
            .with_external_ref(reference)
            .with_description("UPI deposit");
        if let Err(e) = self.record_ledger_entry(entry.clone()).await {
            if matches!(e, GatewayError::DuplicateExternalReference) {
                tracing::warn!(%account_id, reference, "duplicate deposit reference");
            }
            return Err(e);
        }
        tracing::info!(%account_id, amount, entry_id = %entry.id, "manual deposit submitted");
        Ok(entry)
    }

    /// Approves or rejects a pending deposit.
    ///
    /// # Errors
    ///
    /// [`GatewayError::EntryNotFound`], [`GatewayError::AlreadyProcessed`]
    /// or a persistence failure.
    pub async fn review_deposit(
        &self,
        entry_id: EntryId,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<LedgerEntry, GatewayError> {
        let outcome = match decision {
            ReviewDecision::Approve => {
                self.store
                    .complete_pending_deposit(EntryLocator::Id(entry_id), None, notes)
                    .await?
            }
            ReviewDecision::Reject => self.store.reject_pending_deposit(entry_id, notes).await?,
        };
        match outcome {
            DepositTransition::Completed { entry, new_balance } => {
                tracing::info!(%entry_id, account_id = %entry.account_id, new_balance, "deposit approved");
                Ok(entry)
            }
            DepositTransition::Rejected { entry } => {
                tracing::info!(%entry_id, account_id = %entry.account_id, "deposit rejected");
                Ok(entry)
            }
            DepositTransition::NotPending { .. } => Err(GatewayError::AlreadyProcessed(entry_id)),
            DepositTransition::NotFound => Err(GatewayError::EntryNotFound(entry_id.to_string())),
        }
    }

    /// Every deposit awaiting review, newest first.
    ///
    /// # Errors
    ///
    /// Persistence failures only.
    pub async fn pending_deposits(&self) -> Result<Vec<LedgerEntry>, GatewayError> {
        Ok(self
            .retry
            .run("list_pending_deposits", || self.store.list_pending_deposits())
            .await?)
    }

    // ── Withdrawals and adjustments ──────────────────────────────────────

    /// Debits the amount and records a `pending` withdrawal in one step.
    /// Returns the entry and the new balance.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidRequest`], [`GatewayError::InsufficientFunds`],
    /// [`GatewayError::AccountNotFound`] or a persistence failure.
    pub async fn request_withdrawal(
        &self,
        account_id: AccountId,
        amount: u64,
        destination: &str,
    ) -> Result<(LedgerEntry, u64), GatewayError> {
        if amount < self.limits.min_withdrawal {
            return Err(GatewayError::InvalidRequest(format!(
                "minimum withdrawal is {}",
                self.limits.min_withdrawal
            )));
        }
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "withdrawal destination is required".to_string(),
            ));
        }
        let entry = LedgerEntry::new(
            account_id,
            EntryKind::Withdrawal,
            amount,
            EntryStatus::Pending,
        )
        .with_destination(destination)
        .with_description(format!("Withdrawal to {destination}"));
        let balance = self
            .debit_if_sufficient(account_id, amount, DebitRecord::Entry(entry.clone()))
            .await?;
        tracing::info!(%account_id, amount, balance, "withdrawal requested");
        Ok((entry, balance))
    }

    /// Applies an admin adjustment. `request_id` makes an `Add` retry-safe.
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidRequest`] for a zero credit,
    /// [`GatewayError::AccountNotFound`] or a persistence failure.
    pub async fn adjust(
        &self,
        account_id: AccountId,
        adjustment: WalletAdjustment,
        request_id: Option<uuid::Uuid>,
    ) -> Result<u64, GatewayError> {
        match adjustment {
            WalletAdjustment::Add(0) => Err(GatewayError::InvalidRequest(
                "amount must be positive".to_string(),
            )),
            WalletAdjustment::Add(amount) => {
                let mut entry =
                    LedgerEntry::new(account_id, EntryKind::Bonus, amount, EntryStatus::Completed)
                        .with_description("Admin credit");
                if let Some(request_id) = request_id {
                    entry = entry.with_idempotency_key(IdempotencyKey::adjustment(request_id));
                }
                match self.store.credit_with_entry(entry).await? {
                    CreditOutcome::Applied { new_balance } => {
                        tracing::info!(%account_id, amount, new_balance, "wallet credited by admin");
                        Ok(new_balance)
                    }
                    CreditOutcome::AlreadyApplied => Ok(self.account(account_id).await?.balance),
                    CreditOutcome::AccountNotFound => Err(GatewayError::AccountNotFound(account_id)),
                }
            }
            WalletAdjustment::Set(balance) => {
                let balance = self
                    .store
                    .set_balance(account_id, balance)
                    .await?
                    .ok_or(GatewayError::AccountNotFound(account_id))?;
                tracing::info!(%account_id, balance, "wallet balance overwritten by admin");
                Ok(balance)
            }
        }
    }

    // ── Accounts ─────────────────────────────────────────────────────────

    /// Creates an account, optionally with an opening credit.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidRequest`] for an empty name or a persistence
    /// failure.
    pub async fn create_account(
        &self,
        display_name: &str,
        opening_balance: u64,
    ) -> Result<Account, GatewayError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "display name is required".to_string(),
            ));
        }
        let account = Account::new(AccountId::new(), display_name);
        let id = account.id;
        if !self.store.insert_account(account).await? {
            return Err(GatewayError::Internal(format!("account id {id} collided")));
        }
        if opening_balance > 0 {
            let entry = LedgerEntry::new(
                id,
                EntryKind::Bonus,
                opening_balance,
                EntryStatus::Completed,
            )
            .with_description("Opening balance");
            self.store.credit_with_entry(entry).await?;
        }
        tracing::info!(account_id = %id, opening_balance, "account created");
        self.account(id).await
    }

    /// All accounts, newest first.
    ///
    /// # Errors
    ///
    /// Persistence failures only.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, GatewayError> {
        Ok(self
            .retry
            .run("list_accounts", || self.store.list_accounts())
            .await?)
    }

    /// Deletes an account and its ledger. Returns the number of entries
    /// removed with it.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Conflict`] while a join charge is unresolved,
    /// [`GatewayError::AccountNotFound`] or a persistence failure.
    pub async fn delete_account(&self, id: AccountId) -> Result<usize, GatewayError> {
        match self.store.delete_account(id).await? {
            DeleteAccountOutcome::Deleted { entries_removed } => {
                tracing::info!(account_id = %id, entries_removed, "account deleted");
                Ok(entries_removed)
            }
            DeleteAccountOutcome::HasOpenHolds => Err(GatewayError::Conflict(
                "account has an unresolved match charge".to_string(),
            )),
            DeleteAccountOutcome::NotFound => Err(GatewayError::AccountNotFound(id)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::MatchId;
    use crate::persistence::MemoryLedgerStore;
    use crate::service::payment::HmacPaymentVerifier;

    const KEY: &str = "gateway-key";

    fn engine() -> WalletEngine {
        WalletEngine::new(
            Arc::new(MemoryLedgerStore::new()),
            Arc::new(HmacPaymentVerifier::new(KEY)),
            ReadRetry::none(),
            WalletLimits {
                min_deposit: 10,
                min_withdrawal: 100,
            },
        )
    }

    async fn funded(engine: &WalletEngine, balance: u64) -> AccountId {
        let Ok(account) = engine.create_account("ace", balance).await else {
            panic!("account creation failed");
        };
        account.id
    }

    fn proof(order_ref: &str, payment_ref: &str) -> PaymentProof {
        PaymentProof {
            payment_ref: payment_ref.to_string(),
            signature: HmacPaymentVerifier::new(KEY).sign(order_ref, payment_ref),
        }
    }

    #[tokio::test]
    async fn opening_balance_is_recorded() {
        let engine = engine();
        let id = funded(&engine, 40).await;
        let Ok(account) = engine.account(id).await else {
            panic!("account missing");
        };
        assert_eq!(account.balance, 40);
        let Ok(history) = engine.history(id, 10).await else {
            panic!("history failed");
        };
        assert_eq!(history.len(), 1);
        assert_eq!(history.first().map(|e| e.kind), Some(EntryKind::Bonus));
    }

    #[tokio::test]
    async fn verified_deposit_credits_exactly_once() {
        let engine = engine();
        let id = funded(&engine, 0).await;
        let Ok(order) = engine.create_deposit_order(id, 50).await else {
            panic!("order failed");
        };
        let Some(order_ref) = order.external_ref.clone() else {
            panic!("order has no reference");
        };

        let Ok(first) = engine
            .verify_and_credit_deposit(&order_ref, proof(&order_ref, "pay_1"), id, 50)
            .await
        else {
            panic!("first verification failed");
        };
        assert!(first.credited);
        assert_eq!(first.balance, 50);

        let Ok(second) = engine
            .verify_and_credit_deposit(&order_ref, proof(&order_ref, "pay_1"), id, 50)
            .await
        else {
            panic!("replayed verification failed");
        };
        assert!(!second.credited);
        assert_eq!(second.balance, 50);

        let Ok(account) = engine.account(id).await else {
            panic!("account missing");
        };
        assert_eq!(account.total_deposited, 50);
    }

    #[tokio::test]
    async fn bad_signature_credits_nothing() {
        let engine = engine();
        let id = funded(&engine, 0).await;
        let Ok(order) = engine.create_deposit_order(id, 50).await else {
            panic!("order failed");
        };
        let order_ref = order.external_ref.unwrap_or_default();
        let forged = PaymentProof {
            payment_ref: "pay_1".to_string(),
            signature: "00".repeat(32),
        };
        let result = engine
            .verify_and_credit_deposit(&order_ref, forged, id, 50)
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidSignature)));

        let mismatched = engine
            .verify_and_credit_deposit(&order_ref, proof(&order_ref, "pay_1"), id, 500)
            .await;
        assert!(matches!(mismatched, Err(GatewayError::InvalidRequest(_))));
        assert_eq!(engine.account(id).await.map(|a| a.balance).ok(), Some(0));
    }

    #[tokio::test]
    async fn manual_deposit_validation_and_duplicates() {
        let engine = engine();
        let id = funded(&engine, 0).await;
        assert!(matches!(
            engine.submit_deposit(id, 50, " ab ").await,
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(matches!(
            engine.submit_deposit(id, 5, "UPI123456").await,
            Err(GatewayError::InvalidRequest(_))
        ));
        tokio_test::assert_ok!(engine.submit_deposit(id, 50, "UPI123456").await);
        assert!(matches!(
            engine.submit_deposit(id, 50, "  UPI123456 ").await,
            Err(GatewayError::DuplicateExternalReference)
        ));
    }

    #[tokio::test]
    async fn review_is_one_shot() {
        let engine = engine();
        let id = funded(&engine, 0).await;
        let Ok(entry) = engine.submit_deposit(id, 75, "UPI777777").await else {
            panic!("submit failed");
        };
        let Ok(pending) = engine.pending_deposits().await else {
            panic!("listing failed");
        };
        assert_eq!(pending.len(), 1);

        let Ok(approved) = engine
            .review_deposit(entry.id, ReviewDecision::Approve, Some("ok".to_string()))
            .await
        else {
            panic!("approval failed");
        };
        assert_eq!(approved.status, EntryStatus::Completed);
        assert_eq!(approved.admin_notes.as_deref(), Some("ok"));

        let again = engine
            .review_deposit(entry.id, ReviewDecision::Reject, None)
            .await;
        assert!(matches!(again, Err(GatewayError::AlreadyProcessed(_))));
        assert_eq!(engine.account(id).await.map(|a| a.balance).ok(), Some(75));
    }

    #[tokio::test]
    async fn withdrawal_debits_with_pending_entry() {
        let engine = engine();
        let id = funded(&engine, 150).await;
        assert!(matches!(
            engine.request_withdrawal(id, 50, "ace@upi").await,
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(matches!(
            engine.request_withdrawal(id, 200, "ace@upi").await,
            Err(GatewayError::InsufficientFunds {
                balance: 150,
                required: 200
            })
        ));
        let Ok((entry, balance)) = engine.request_withdrawal(id, 120, "ace@upi").await else {
            panic!("withdrawal failed");
        };
        assert_eq!(balance, 30);
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.destination.as_deref(), Some("ace@upi"));
    }

    #[tokio::test]
    async fn adjustments_add_and_set() {
        let engine = engine();
        let id = funded(&engine, 10).await;
        let request = uuid::Uuid::new_v4();
        assert_eq!(
            engine
                .adjust(id, WalletAdjustment::Add(25), Some(request))
                .await
                .ok(),
            Some(35)
        );
        assert_eq!(
            engine
                .adjust(id, WalletAdjustment::Add(25), Some(request))
                .await
                .ok(),
            Some(35)
        );
        assert_eq!(
            engine.adjust(id, WalletAdjustment::Set(7), None).await.ok(),
            Some(7)
        );
        assert!(matches!(
            engine
                .adjust(AccountId::new(), WalletAdjustment::Set(7), None)
                .await,
            Err(GatewayError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_account_removes_ledger() {
        let engine = engine();
        let id = funded(&engine, 10).await;
        assert_eq!(engine.delete_account(id).await.ok(), Some(1));
        assert!(matches!(
            engine.account(id).await,
            Err(GatewayError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn plain_credit_needs_an_account() {
        let engine = engine();
        let id = funded(&engine, 5).await;
        assert_eq!(engine.credit(id, 10).await.ok(), Some(15));
        let missing = AccountId::new();
        assert!(matches!(
            engine.credit(missing, 10).await,
            Err(GatewayError::AccountNotFound(a)) if a == missing
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn interleaved_debits_and_credits_conserve_balance() {
        let store = Arc::new(MemoryLedgerStore::new());
        let engine = Arc::new(WalletEngine::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            Arc::new(HmacPaymentVerifier::new(KEY)),
            ReadRetry::none(),
            WalletLimits {
                min_deposit: 10,
                min_withdrawal: 100,
            },
        ));
        let id = funded(&engine, 100).await;

        let mut tasks = Vec::new();
        for i in 0..120_u64 {
            let engine = Arc::clone(&engine);
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                match i % 3 {
                    0 => {
                        let record = DebitRecord::Entry(LedgerEntry::new(
                            id,
                            EntryKind::Withdrawal,
                            7,
                            EntryStatus::Pending,
                        ));
                        match engine.debit_if_sufficient(id, 7, record).await {
                            Ok(_) => -7,
                            Err(GatewayError::InsufficientFunds { .. }) => 0,
                            Err(e) => panic!("debit failed: {e}"),
                        }
                    }
                    1 => {
                        let Ok(_) = engine.credit(id, 3).await else {
                            panic!("credit failed");
                        };
                        3
                    }
                    _ => {
                        let key =
                            IdempotencyKey::refund(MatchId::new(), id, JoinId::new());
                        let refund =
                            LedgerEntry::new(id, EntryKind::Refund, 5, EntryStatus::Completed)
                                .with_idempotency_key(key);
                        let Ok(CreditOutcome::Applied { .. }) =
                            store.credit_with_entry(refund).await
                        else {
                            panic!("keyed credit failed");
                        };
                        5
                    }
                }
            }));
        }

        let mut net: i64 = 100;
        let mut debits = 0;
        for task in tasks {
            let Ok(delta) = task.await else {
                panic!("task panicked");
            };
            if delta < 0 {
                debits += 1;
            }
            net += delta;
        }

        let Ok(account) = engine.account(id).await else {
            panic!("account missing");
        };
        assert_eq!(i64::try_from(account.balance).ok(), Some(net));
        assert!(debits > 0);

        let Ok(entries) = store.list_entries(id, 500).await else {
            panic!("history failed");
        };
        let withdrawals = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Withdrawal)
            .count();
        assert_eq!(withdrawals, debits);
    }
}

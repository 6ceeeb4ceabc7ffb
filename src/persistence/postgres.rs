//! PostgreSQL implementation of the ledger store.
//!
//! Balance checks are conditional updates (`... WHERE balance >= $2`), and
//! roster mutations lock the match row with `SELECT ... FOR UPDATE` before
//! counting seats. Every primitive that touches more than one row runs in a
//! single transaction, so it either commits completely or not at all.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::models::{
    AccountRow, EntryRow, HoldRow, MatchRow, ParticipantRow, amount_from_db, amount_to_db,
};
use super::{
    AppendOutcome, CreditOutcome, DebitOutcome, DebitRecord, DeleteAccountOutcome,
    DepositTransition, EntryLocator, HoldOutcome, LedgerStore, MatchFilter, MatchPatch,
    PlainCreditOutcome, ReleaseOutcome, ReserveOutcome, StoreError, StoreFuture, TransitionOutcome, UpdateOutcome,
};
use crate::config::GatewayConfig;
use crate::domain::{
    Account, AccountId, ChargeHold, EntryId, EntryKind, EntryStatus, JoinId, LedgerEntry, Match,
    MatchId, MatchStatus, Participant,
};

const ACCOUNT_COLUMNS: &str =
    "id, display_name, balance, total_deposited, total_winnings, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, account_id, kind, amount, status, external_ref, idempotency_key, \
     related_match_id, description, payment_ref, destination, admin_notes, created_at, updated_at";

const MATCH_COLUMNS: &str = "id, title, map, mode, entry_fee, prize_pool, per_kill_bonus, \
     capacity, scheduled_time, status, room_id, room_password, created_by, created_at, updated_at";

const PARTICIPANT_COLUMNS: &str = "match_id, account_id, display_name, seat, joined_at";

/// PostgreSQL-backed [`LedgerStore`] using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool from the configuration and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database is unreachable and
    /// [`StoreError::Migration`] if the schema cannot be brought up to date.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(
            max_connections = config.database_max_connections,
            "postgres ledger store ready"
        );
        Ok(Self::new(pool))
    }
}

/// Maps a unique-constraint violation on `ledger_entries` to its outcome.
fn entry_conflict(e: &sqlx::Error) -> Option<AppendOutcome> {
    let sqlx::Error::Database(db) = e else {
        return None;
    };
    if db.is_foreign_key_violation() {
        return Some(AppendOutcome::AccountNotFound);
    }
    if !db.is_unique_violation() {
        return None;
    }
    match db.constraint() {
        Some(c) if c.contains("idempotency_key") => Some(AppendOutcome::DuplicateIdempotencyKey),
        _ => Some(AppendOutcome::DuplicateExternalReference),
    }
}

async fn insert_entry(conn: &mut PgConnection, entry: &LedgerEntry) -> Result<(), sqlx::Error> {
    let amount = i64::try_from(entry.amount).unwrap_or(i64::MAX);
    sqlx::query(
        "INSERT INTO ledger_entries (id, account_id, kind, amount, status, external_ref, \
         idempotency_key, related_match_id, description, payment_ref, destination, admin_notes, \
         created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(entry.id.as_uuid())
    .bind(entry.account_id.as_uuid())
    .bind(entry.kind.as_str())
    .bind(amount)
    .bind(entry.status.as_str())
    .bind(entry.external_ref.as_deref())
    .bind(entry.idempotency_key.as_ref().map(|k| k.as_str()))
    .bind(entry.related_match_id.map(|m| *m.as_uuid()))
    .bind(&entry.description)
    .bind(entry.payment_ref.as_deref())
    .bind(entry.destination.as_deref())
    .bind(entry.admin_notes.as_deref())
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn load_entry(
    conn: &mut PgConnection,
    locator: &EntryLocator,
    for_update: bool,
) -> Result<Option<LedgerEntry>, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = match locator {
        EntryLocator::Id(id) => {
            sqlx::query_as::<_, EntryRow>(&format!(
                "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1{lock}"
            ))
            .bind(id.as_uuid())
            .fetch_optional(conn)
            .await?
        }
        EntryLocator::ExternalRef(r) => {
            sqlx::query_as::<_, EntryRow>(&format!(
                "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE external_ref = $1{lock}"
            ))
            .bind(r)
            .fetch_optional(conn)
            .await?
        }
        EntryLocator::IdempotencyKey(k) => {
            sqlx::query_as::<_, EntryRow>(&format!(
                "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE idempotency_key = $1{lock}"
            ))
            .bind(k.as_str())
            .fetch_optional(conn)
            .await?
        }
    };
    row.map(LedgerEntry::try_from).transpose()
}

async fn load_match(
    conn: &mut PgConnection,
    id: Uuid,
    for_update: bool,
) -> Result<Option<Match>, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let Some(row) = sqlx::query_as::<_, MatchRow>(&format!(
        "SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1{lock}"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };
    let roster = load_roster(conn, id).await?;
    row.into_match(roster).map(Some)
}

async fn load_roster(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Vec<ParticipantRow>, StoreError> {
    Ok(sqlx::query_as::<_, ParticipantRow>(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM match_participants WHERE match_id = $1 ORDER BY seq"
    ))
    .bind(id)
    .fetch_all(conn)
    .await?)
}

async fn insert_participant(
    conn: &mut PgConnection,
    match_id: Uuid,
    p: &Participant,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO match_participants (match_id, account_id, display_name, seat, joined_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(match_id)
    .bind(p.account_id.as_uuid())
    .bind(&p.display_name)
    .bind(p.seat.as_uuid())
    .bind(p.joined_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn write_match(conn: &mut PgConnection, m: &Match) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE matches SET title = $2, map = $3, mode = $4, entry_fee = $5, prize_pool = $6, \
         per_kill_bonus = $7, capacity = $8, scheduled_time = $9, status = $10, room_id = $11, \
         room_password = $12, updated_at = $13 WHERE id = $1",
    )
    .bind(m.id.as_uuid())
    .bind(&m.spec.title)
    .bind(&m.spec.map)
    .bind(&m.spec.mode)
    .bind(amount_to_db(m.spec.entry_fee)?)
    .bind(amount_to_db(m.spec.prize_pool)?)
    .bind(amount_to_db(m.spec.per_kill_bonus)?)
    .bind(i32::try_from(m.spec.capacity).unwrap_or(i32::MAX))
    .bind(m.spec.scheduled_time)
    .bind(m.status.as_str())
    .bind(&m.room.room_id)
    .bind(&m.room.room_password)
    .bind(m.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

fn count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

impl LedgerStore for PostgresLedgerStore {
    fn insert_account(&self, account: Account) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO accounts (id, display_name, balance, total_deposited, \
                 total_winnings, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(account.id.as_uuid())
            .bind(&account.display_name)
            .bind(amount_to_db(account.balance)?)
            .bind(amount_to_db(account.total_deposited)?)
            .bind(amount_to_db(account.total_winnings)?)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn get_account(&self, id: AccountId) -> StoreFuture<'_, Option<Account>> {
        Box::pin(async move {
            sqlx::query_as::<_, AccountRow>(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
            ))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
        })
    }

    fn list_accounts(&self) -> StoreFuture<'_, Vec<Account>> {
        Box::pin(async move {
            sqlx::query_as::<_, AccountRow>(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at DESC"
            ))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
        })
    }

    fn delete_account(&self, id: AccountId) -> StoreFuture<'_, DeleteAccountOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let locked: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
                    .bind(id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            if locked.is_none() {
                return Ok(DeleteAccountOutcome::NotFound);
            }
            let holds: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM charge_holds WHERE account_id = $1")
                    .bind(id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await?;
            if holds > 0 {
                return Ok(DeleteAccountOutcome::HasOpenHolds);
            }
            let removed = sqlx::query("DELETE FROM ledger_entries WHERE account_id = $1")
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await?
                .rows_affected();
            sqlx::query("DELETE FROM accounts WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(DeleteAccountOutcome::Deleted {
                entries_removed: usize::try_from(removed).unwrap_or(usize::MAX),
            })
        })
    }

    fn debit_if_sufficient(
        &self,
        id: AccountId,
        amount: u64,
        record: DebitRecord,
    ) -> StoreFuture<'_, DebitOutcome> {
        Box::pin(async move {
            let amount_db = amount_to_db(amount)?;
            let mut tx = self.pool.begin().await?;
            let updated: Option<i64> = sqlx::query_scalar(
                "UPDATE accounts SET balance = balance - $2, updated_at = NOW() \
                 WHERE id = $1 AND balance >= $2 RETURNING balance",
            )
            .bind(id.as_uuid())
            .bind(amount_db)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(new_balance) = updated else {
                let current: Option<i64> =
                    sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
                        .bind(id.as_uuid())
                        .fetch_optional(&mut *tx)
                        .await?;
                return Ok(match current {
                    Some(balance) => DebitOutcome::InsufficientFunds {
                        balance: amount_from_db(balance)?,
                    },
                    None => DebitOutcome::AccountNotFound,
                });
            };

            match &record {
                DebitRecord::Hold(hold) => {
                    sqlx::query(
                        "INSERT INTO charge_holds (id, account_id, match_id, amount, created_at) \
                         VALUES ($1, $2, $3, $4, $5)",
                    )
                    .bind(hold.id.as_uuid())
                    .bind(id.as_uuid())
                    .bind(hold.match_id.as_uuid())
                    .bind(amount_db)
                    .bind(hold.created_at)
                    .execute(&mut *tx)
                    .await?;
                }
                DebitRecord::Entry(entry) => {
                    if let Err(e) = insert_entry(&mut tx, entry).await {
                        return Err(match entry_conflict(&e) {
                            Some(_) => StoreError::Corrupt(format!(
                                "debit entry {} collides with an existing reference",
                                entry.id
                            )),
                            None => e.into(),
                        });
                    }
                }
            }
            tx.commit().await?;
            Ok(DebitOutcome::Applied {
                new_balance: amount_from_db(new_balance)?,
            })
        })
    }

    fn credit(&self, id: AccountId, amount: u64) -> StoreFuture<'_, PlainCreditOutcome> {
        Box::pin(async move {
            let updated: Option<i64> = sqlx::query_scalar(
                "UPDATE accounts SET balance = balance + $2, updated_at = NOW() \
                 WHERE id = $1 RETURNING balance",
            )
            .bind(id.as_uuid())
            .bind(amount_to_db(amount)?)
            .fetch_optional(&self.pool)
            .await?;
            match updated {
                Some(balance) => Ok(PlainCreditOutcome::Applied {
                    new_balance: amount_from_db(balance)?,
                }),
                None => Ok(PlainCreditOutcome::AccountNotFound),
            }
        })
    }

    fn credit_with_entry(&self, entry: LedgerEntry) -> StoreFuture<'_, CreditOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let updated: Option<i64> = sqlx::query_scalar(
                "UPDATE accounts SET balance = balance + $2, \
                 total_winnings = total_winnings + CASE WHEN $3 THEN $2 ELSE 0 END, \
                 updated_at = NOW() WHERE id = $1 RETURNING balance",
            )
            .bind(entry.account_id.as_uuid())
            .bind(amount_to_db(entry.amount)?)
            .bind(entry.kind == EntryKind::Winnings)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(new_balance) = updated else {
                return Ok(CreditOutcome::AccountNotFound);
            };
            if let Err(e) = insert_entry(&mut tx, &entry).await {
                // dropping the transaction rolls the credit back
                return match entry_conflict(&e) {
                    Some(_) => Ok(CreditOutcome::AlreadyApplied),
                    None => Err(e.into()),
                };
            }
            tx.commit().await?;
            Ok(CreditOutcome::Applied {
                new_balance: amount_from_db(new_balance)?,
            })
        })
    }

    fn set_balance(&self, id: AccountId, balance: u64) -> StoreFuture<'_, Option<u64>> {
        Box::pin(async move {
            let updated: Option<i64> = sqlx::query_scalar(
                "UPDATE accounts SET balance = $2, updated_at = NOW() WHERE id = $1 \
                 RETURNING balance",
            )
            .bind(id.as_uuid())
            .bind(amount_to_db(balance)?)
            .fetch_optional(&self.pool)
            .await?;
            updated.map(amount_from_db).transpose()
        })
    }

    fn append_entry(&self, entry: LedgerEntry) -> StoreFuture<'_, AppendOutcome> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            match insert_entry(&mut conn, &entry).await {
                Ok(()) => Ok(AppendOutcome::Appended),
                Err(e) => entry_conflict(&e).ok_or_else(|| e.into()),
            }
        })
    }

    fn find_entry(&self, locator: EntryLocator) -> StoreFuture<'_, Option<LedgerEntry>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            load_entry(&mut conn, &locator, false).await
        })
    }

    fn list_entries(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> StoreFuture<'_, Vec<LedgerEntry>> {
        Box::pin(async move {
            sqlx::query_as::<_, EntryRow>(&format!(
                "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE account_id = $1 \
                 ORDER BY created_at DESC LIMIT $2"
            ))
            .bind(account_id.as_uuid())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
        })
    }

    fn list_pending_deposits(&self) -> StoreFuture<'_, Vec<LedgerEntry>> {
        Box::pin(async move {
            sqlx::query_as::<_, EntryRow>(&format!(
                "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
                 WHERE kind = 'deposit' AND status = 'pending' ORDER BY created_at DESC"
            ))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
        })
    }

    fn complete_pending_deposit(
        &self,
        locator: EntryLocator,
        payment_ref: Option<String>,
        admin_notes: Option<String>,
    ) -> StoreFuture<'_, DepositTransition> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let Some(entry) = load_entry(&mut tx, &locator, true).await? else {
                return Ok(DepositTransition::NotFound);
            };
            if entry.kind != EntryKind::Deposit {
                return Ok(DepositTransition::NotFound);
            }
            if entry.status != EntryStatus::Pending {
                return Ok(DepositTransition::NotPending { entry });
            }

            let row = sqlx::query_as::<_, EntryRow>(&format!(
                "UPDATE ledger_entries SET status = 'completed', \
                 payment_ref = COALESCE($2, payment_ref), \
                 admin_notes = COALESCE($3, admin_notes), updated_at = NOW() \
                 WHERE id = $1 RETURNING {ENTRY_COLUMNS}"
            ))
            .bind(entry.id.as_uuid())
            .bind(payment_ref)
            .bind(admin_notes)
            .fetch_one(&mut *tx)
            .await?;

            let balance: Option<i64> = sqlx::query_scalar(
                "UPDATE accounts SET balance = balance + $2, \
                 total_deposited = total_deposited + $2, updated_at = NOW() \
                 WHERE id = $1 RETURNING balance",
            )
            .bind(entry.account_id.as_uuid())
            .bind(amount_to_db(entry.amount)?)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(balance) = balance else {
                return Err(StoreError::Corrupt(format!(
                    "deposit {} references missing account {}",
                    entry.id, entry.account_id
                )));
            };
            tx.commit().await?;
            Ok(DepositTransition::Completed {
                entry: LedgerEntry::try_from(row)?,
                new_balance: amount_from_db(balance)?,
            })
        })
    }

    fn reject_pending_deposit(
        &self,
        id: EntryId,
        admin_notes: Option<String>,
    ) -> StoreFuture<'_, DepositTransition> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let Some(entry) = load_entry(&mut tx, &EntryLocator::Id(id), true).await? else {
                return Ok(DepositTransition::NotFound);
            };
            if entry.kind != EntryKind::Deposit {
                return Ok(DepositTransition::NotFound);
            }
            if entry.status != EntryStatus::Pending {
                return Ok(DepositTransition::NotPending { entry });
            }
            let row = sqlx::query_as::<_, EntryRow>(&format!(
                "UPDATE ledger_entries SET status = 'rejected', admin_notes = $2, \
                 updated_at = NOW() WHERE id = $1 RETURNING {ENTRY_COLUMNS}"
            ))
            .bind(id.as_uuid())
            .bind(admin_notes)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(DepositTransition::Rejected {
                entry: LedgerEntry::try_from(row)?,
            })
        })
    }

    fn settle_hold(&self, id: JoinId, entry: LedgerEntry) -> StoreFuture<'_, HoldOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let held: Option<i64> =
                sqlx::query_scalar("DELETE FROM charge_holds WHERE id = $1 RETURNING amount")
                    .bind(id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(held) = held else {
                return Ok(HoldOutcome::HoldMissing);
            };
            let mut entry = entry;
            entry.amount = amount_from_db(held)?;
            insert_entry(&mut tx, &entry).await?;
            tx.commit().await?;
            Ok(HoldOutcome::Settled {
                amount: entry.amount,
            })
        })
    }

    fn release_hold(&self, id: JoinId) -> StoreFuture<'_, HoldOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let removed: Option<(Uuid, i64)> = sqlx::query_as(
                "DELETE FROM charge_holds WHERE id = $1 RETURNING account_id, amount",
            )
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
            let Some((account_id, amount)) = removed else {
                return Ok(HoldOutcome::HoldMissing);
            };
            let balance: i64 = sqlx::query_scalar(
                "UPDATE accounts SET balance = balance + $2, updated_at = NOW() \
                 WHERE id = $1 RETURNING balance",
            )
            .bind(account_id)
            .bind(amount)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(HoldOutcome::Released {
                new_balance: amount_from_db(balance)?,
            })
        })
    }

    fn list_holds(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<ChargeHold>> {
        Box::pin(async move {
            sqlx::query_as::<_, HoldRow>(
                "SELECT id, account_id, match_id, amount, created_at FROM charge_holds \
                 WHERE created_at < $1 ORDER BY created_at",
            )
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(ChargeHold::try_from)
            .collect()
        })
    }

    fn insert_match(&self, m: Match) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "INSERT INTO matches (id, title, map, mode, entry_fee, prize_pool, \
                 per_kill_bonus, capacity, scheduled_time, status, room_id, room_password, \
                 created_by, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            )
            .bind(m.id.as_uuid())
            .bind(&m.spec.title)
            .bind(&m.spec.map)
            .bind(&m.spec.mode)
            .bind(amount_to_db(m.spec.entry_fee)?)
            .bind(amount_to_db(m.spec.prize_pool)?)
            .bind(amount_to_db(m.spec.per_kill_bonus)?)
            .bind(i32::try_from(m.spec.capacity).unwrap_or(i32::MAX))
            .bind(m.spec.scheduled_time)
            .bind(m.status.as_str())
            .bind(&m.room.room_id)
            .bind(&m.room.room_password)
            .bind(m.created_by.map(|a| *a.as_uuid()))
            .bind(m.created_at)
            .bind(m.updated_at)
            .execute(&mut *tx)
            .await?;
            for p in &m.roster {
                insert_participant(&mut tx, *m.id.as_uuid(), p).await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }

    fn get_match(&self, id: MatchId) -> StoreFuture<'_, Option<Match>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            load_match(&mut conn, *id.as_uuid(), false).await
        })
    }

    fn list_matches(&self, filter: MatchFilter) -> StoreFuture<'_, Vec<Match>> {
        Box::pin(async move {
            let statuses: Option<Vec<String>> = filter
                .statuses
                .as_ref()
                .map(|s| s.iter().map(|st| st.as_str().to_string()).collect());
            let rows = sqlx::query_as::<_, MatchRow>(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches \
                 WHERE ($1::text[] IS NULL OR status = ANY($1)) \
                 AND ($2::uuid IS NULL OR EXISTS (SELECT 1 FROM match_participants p \
                      WHERE p.match_id = matches.id AND p.account_id = $2)) \
                 ORDER BY scheduled_time"
            ))
            .bind(statuses)
            .bind(filter.participant.map(|a| *a.as_uuid()))
            .fetch_all(&self.pool)
            .await?;

            let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
            let mut rosters: HashMap<Uuid, Vec<ParticipantRow>> = HashMap::new();
            for p in sqlx::query_as::<_, ParticipantRow>(&format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM match_participants \
                 WHERE match_id = ANY($1) ORDER BY seq"
            ))
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?
            {
                rosters.entry(p.match_id).or_default().push(p);
            }

            rows.into_iter()
                .map(|row| {
                    let roster = rosters.remove(&row.id).unwrap_or_default();
                    row.into_match(roster)
                })
                .collect()
        })
    }

    fn update_match(&self, id: MatchId, patch: MatchPatch) -> StoreFuture<'_, UpdateOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let Some(mut m) = load_match(&mut tx, *id.as_uuid(), true).await? else {
                return Ok(UpdateOutcome::NotFound);
            };
            if let Err(rejected) = patch.apply(&mut m) {
                return Ok(rejected);
            }
            write_match(&mut tx, &m).await?;
            tx.commit().await?;
            Ok(UpdateOutcome::Updated(Box::new(m)))
        })
    }

    fn reserve_seat(
        &self,
        id: MatchId,
        participant: Participant,
    ) -> StoreFuture<'_, ReserveOutcome> {
        Box::pin(async move {
            let match_id = *id.as_uuid();
            let mut tx = self.pool.begin().await?;
            let locked: Option<(String, i32)> =
                sqlx::query_as("SELECT status, capacity FROM matches WHERE id = $1 FOR UPDATE")
                    .bind(match_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some((status, capacity)) = locked else {
                return Ok(ReserveOutcome::MatchNotFound);
            };
            if status != MatchStatus::Upcoming.as_str() {
                return Ok(ReserveOutcome::MatchNotOpen);
            }
            let (seated, joined): (i64, bool) = sqlx::query_as(
                "SELECT COUNT(*), COALESCE(BOOL_OR(account_id = $2), FALSE) \
                 FROM match_participants WHERE match_id = $1",
            )
            .bind(match_id)
            .bind(participant.account_id.as_uuid())
            .fetch_one(&mut *tx)
            .await?;
            if joined {
                return Ok(ReserveOutcome::AlreadyJoined);
            }
            if seated >= i64::from(capacity) {
                return Ok(ReserveOutcome::MatchFull);
            }
            insert_participant(&mut tx, match_id, &participant).await?;
            sqlx::query("UPDATE matches SET updated_at = NOW() WHERE id = $1")
                .bind(match_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(ReserveOutcome::Reserved {
                participant_count: count(seated).saturating_add(1),
            })
        })
    }

    fn release_seat(
        &self,
        id: MatchId,
        account_id: AccountId,
        seat: Option<JoinId>,
    ) -> StoreFuture<'_, ReleaseOutcome> {
        Box::pin(async move {
            let match_id = *id.as_uuid();
            let mut tx = self.pool.begin().await?;
            let locked: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM matches WHERE id = $1 FOR UPDATE")
                    .bind(match_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if locked.is_none() {
                return Ok(ReleaseOutcome::MatchNotFound);
            }
            let removed = sqlx::query_as::<_, ParticipantRow>(&format!(
                "DELETE FROM match_participants WHERE match_id = $1 AND account_id = $2 \
                 AND ($3::uuid IS NULL OR seat = $3) RETURNING {PARTICIPANT_COLUMNS}"
            ))
            .bind(match_id)
            .bind(account_id.as_uuid())
            .bind(seat.map(|s| *s.as_uuid()))
            .fetch_optional(&mut *tx)
            .await?;
            let Some(removed) = removed else {
                return Ok(ReleaseOutcome::NotAParticipant);
            };
            let remaining: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM match_participants WHERE match_id = $1")
                    .bind(match_id)
                    .fetch_one(&mut *tx)
                    .await?;
            sqlx::query("UPDATE matches SET updated_at = NOW() WHERE id = $1")
                .bind(match_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(ReleaseOutcome::Released {
                participant: Participant::from(removed),
                participant_count: count(remaining),
            })
        })
    }

    fn release_all_seats(&self, id: MatchId) -> StoreFuture<'_, Option<Vec<Participant>>> {
        Box::pin(async move {
            let match_id = *id.as_uuid();
            let mut tx = self.pool.begin().await?;
            let locked: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM matches WHERE id = $1 FOR UPDATE")
                    .bind(match_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if locked.is_none() {
                return Ok(None);
            }
            let snapshot = load_roster(&mut tx, match_id).await?;
            sqlx::query("DELETE FROM match_participants WHERE match_id = $1")
                .bind(match_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE matches SET updated_at = NOW() WHERE id = $1")
                .bind(match_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(Some(snapshot.into_iter().map(Participant::from).collect()))
        })
    }

    fn transition_status(
        &self,
        id: MatchId,
        next: MatchStatus,
    ) -> StoreFuture<'_, TransitionOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let Some(mut m) = load_match(&mut tx, *id.as_uuid(), true).await? else {
                return Ok(TransitionOutcome::NotFound);
            };
            let previous = m.status;
            if !previous.can_transition_to(next) {
                return Ok(TransitionOutcome::Rejected { current: previous });
            }
            m.status = next;
            m.updated_at = Utc::now();
            write_match(&mut tx, &m).await?;
            tx.commit().await?;
            Ok(TransitionOutcome::Changed {
                previous,
                current: Box::new(m),
            })
        })
    }

    fn delete_match(&self, id: MatchId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM matches WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
    }
}

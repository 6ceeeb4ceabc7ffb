//! Database row types and their mapping into the domain model.
//!
//! Amounts are `BIGINT` in the schema and `u64` in the domain; conversions
//! fail with [`StoreError::Corrupt`] instead of wrapping.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::StoreError;
use crate::domain::{
    Account, AccountId, ChargeHold, EntryId, IdempotencyKey, JoinId, LedgerEntry, Match,
    MatchId, MatchSpec, Participant, RoomCredentials,
};

/// Converts a domain amount into its column value.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] when the amount exceeds `i64::MAX`.
pub fn amount_to_db(amount: u64) -> Result<i64, StoreError> {
    i64::try_from(amount).map_err(|_| StoreError::Corrupt(format!("amount {amount} out of range")))
}

/// Converts a column value into a domain amount.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] for negative values.
pub fn amount_from_db(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative amount {value}")))
}

fn parse<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T, StoreError> {
    raw.parse().map_err(StoreError::Corrupt)
}

/// A row from the `accounts` table.
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    /// Account id.
    pub id: Uuid,
    /// Display name.
    pub display_name: String,
    /// Balance.
    pub balance: i64,
    /// Completed deposits total.
    pub total_deposited: i64,
    /// Winnings total.
    pub total_winnings: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: AccountId::from_uuid(row.id),
            display_name: row.display_name,
            balance: amount_from_db(row.balance)?,
            total_deposited: amount_from_db(row.total_deposited)?,
            total_winnings: amount_from_db(row.total_winnings)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `ledger_entries` table.
#[derive(Debug, Clone, FromRow)]
pub struct EntryRow {
    /// Entry id.
    pub id: Uuid,
    /// Owning account.
    pub account_id: Uuid,
    /// Entry kind.
    pub kind: String,
    /// Amount.
    pub amount: i64,
    /// Entry status.
    pub status: String,
    /// External reference.
    pub external_ref: Option<String>,
    /// Idempotency key.
    pub idempotency_key: Option<String>,
    /// Related match.
    pub related_match_id: Option<Uuid>,
    /// Description.
    pub description: String,
    /// Gateway payment reference.
    pub payment_ref: Option<String>,
    /// Payout destination.
    pub destination: Option<String>,
    /// Reviewer notes.
    pub admin_notes: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: EntryId::from_uuid(row.id),
            account_id: AccountId::from_uuid(row.account_id),
            kind: parse(&row.kind)?,
            amount: amount_from_db(row.amount)?,
            status: parse(&row.status)?,
            external_ref: row.external_ref,
            idempotency_key: row.idempotency_key.map(IdempotencyKey::from_raw),
            related_match_id: row.related_match_id.map(MatchId::from_uuid),
            description: row.description,
            payment_ref: row.payment_ref,
            destination: row.destination,
            admin_notes: row.admin_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `charge_holds` table.
#[derive(Debug, Clone, FromRow)]
pub struct HoldRow {
    /// Join attempt id.
    pub id: Uuid,
    /// Debited account.
    pub account_id: Uuid,
    /// Match being joined.
    pub match_id: Uuid,
    /// Amount held.
    pub amount: i64,
    /// Debit timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<HoldRow> for ChargeHold {
    type Error = StoreError;

    fn try_from(row: HoldRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: JoinId::from_uuid(row.id),
            account_id: AccountId::from_uuid(row.account_id),
            match_id: MatchId::from_uuid(row.match_id),
            amount: amount_from_db(row.amount)?,
            created_at: row.created_at,
        })
    }
}

/// A row from the `matches` table, without its roster.
#[derive(Debug, Clone, FromRow)]
pub struct MatchRow {
    /// Match id.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Map.
    pub map: String,
    /// Mode.
    pub mode: String,
    /// Entry fee.
    pub entry_fee: i64,
    /// Prize pool.
    pub prize_pool: i64,
    /// Per-kill bonus.
    pub per_kill_bonus: i64,
    /// Capacity.
    pub capacity: i32,
    /// Scheduled start.
    pub scheduled_time: DateTime<Utc>,
    /// Lifecycle state.
    pub status: String,
    /// Room id.
    pub room_id: String,
    /// Room password.
    pub room_password: String,
    /// Creating admin.
    pub created_by: Option<Uuid>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl MatchRow {
    /// Assembles the aggregate from this row and its participants in join order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if a column holds an unmappable value.
    pub fn into_match(self, roster: Vec<ParticipantRow>) -> Result<Match, StoreError> {
        let capacity = u32::try_from(self.capacity)
            .map_err(|_| StoreError::Corrupt(format!("capacity {} out of range", self.capacity)))?;
        Ok(Match {
            id: MatchId::from_uuid(self.id),
            spec: MatchSpec {
                title: self.title,
                map: self.map,
                mode: self.mode,
                entry_fee: amount_from_db(self.entry_fee)?,
                prize_pool: amount_from_db(self.prize_pool)?,
                per_kill_bonus: amount_from_db(self.per_kill_bonus)?,
                capacity,
                scheduled_time: self.scheduled_time,
            },
            status: parse(&self.status)?,
            roster: roster.into_iter().map(Participant::from).collect(),
            room: RoomCredentials {
                room_id: self.room_id,
                room_password: self.room_password,
            },
            created_by: self.created_by.map(AccountId::from_uuid),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// A row from the `match_participants` table.
#[derive(Debug, Clone, FromRow)]
pub struct ParticipantRow {
    /// Match the seat belongs to.
    pub match_id: Uuid,
    /// Seated account.
    pub account_id: Uuid,
    /// Roster display name.
    pub display_name: String,
    /// Join attempt that produced the seat.
    pub seat: Uuid,
    /// Reservation timestamp.
    pub joined_at: DateTime<Utc>,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Self {
            account_id: AccountId::from_uuid(row.account_id),
            display_name: row.display_name,
            seat: JoinId::from_uuid(row.seat),
            joined_at: row.joined_at,
        }
    }
}

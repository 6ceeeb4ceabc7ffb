//! Domain layer: aggregates, ledger records, notifications and policy.
//!
//! Accounts and matches are independent aggregates. Participants live
//! inside a match's roster and reference accounts by identity only; ledger
//! entries reference matches weakly, so a match may be deleted after an
//! entry mentioning it was written.

pub mod account;
pub mod event_bus;
pub mod ids;
pub mod ledger_entry;
pub mod match_entry;
pub mod match_event;
pub mod policy;

pub use account::Account;
pub use event_bus::EventBus;
pub use ids::{AccountId, EntryId, JoinId, MatchId};
pub use ledger_entry::{
    ChargeHold, EntryKind, EntryStatus, IdempotencyKey, LedgerEntry, RefundReason,
};
pub use match_entry::{
    Match, MatchSpec, MatchStatus, MatchSummary, Participant, RoomCredentials,
};
pub use match_event::MatchEvent;
pub use policy::{Action, Actor, Role};

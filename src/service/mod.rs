//! Service layer: business logic orchestration.
//!
//! [`WalletEngine`] and [`MatchCapacityEngine`] wrap the store's atomic
//! primitives. [`JoinCoordinator`] and [`RefundCoordinator`] compose them
//! into multi-step operations with compensation, [`MatchService`] drives
//! the match lifecycle, and [`ReconciliationSweep`] repairs whatever an
//! interrupted operation left behind. Committed state changes are
//! announced through the [`crate::domain::EventBus`].

pub mod capacity;
pub mod identity;
pub mod join;
pub mod match_admin;
pub mod payment;
pub mod reconcile;
pub mod refund;
pub mod wallet;

pub use capacity::MatchCapacityEngine;
pub use identity::{IdentityProvider, SharedSecretIdentity};
pub use join::{JoinCoordinator, JoinReceipt};
pub use match_admin::MatchService;
pub use payment::{HmacPaymentVerifier, PaymentVerifier};
pub use reconcile::{ReconciliationSweep, SweepReport};
pub use refund::{RefundCoordinator, RefundReport};
pub use wallet::{
    DepositReceipt, PaymentProof, ReviewDecision, WalletAdjustment, WalletEngine, WalletLimits,
};

//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::domain::EventBus;
use crate::persistence::LedgerStore;
use crate::service::{
    HmacPaymentVerifier, IdentityProvider, JoinCoordinator, MatchCapacityEngine, MatchService,
    ReconciliationSweep, RefundCoordinator, SharedSecretIdentity, WalletEngine, WalletLimits,
};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Balances, deposits, withdrawals and accounts.
    pub wallet: Arc<WalletEngine>,
    /// Match lifecycle and listings.
    pub matches: Arc<MatchService>,
    /// Paid joins.
    pub joins: Arc<JoinCoordinator>,
    /// Invariant repair, run on demand or on an interval.
    pub sweep: Arc<ReconciliationSweep>,
    /// Bearer token resolution.
    pub identity: Arc<dyn IdentityProvider>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
    /// Loaded configuration.
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    /// Wires every service over `store`.
    #[must_use]
    pub fn build(store: Arc<dyn LedgerStore>, config: GatewayConfig) -> Self {
        let retry = config.read_retry();
        let event_bus = EventBus::new(config.event_bus_capacity);

        let wallet = Arc::new(WalletEngine::new(
            Arc::clone(&store),
            Arc::new(HmacPaymentVerifier::new(config.payment_key_secret.as_bytes())),
            retry,
            WalletLimits {
                min_deposit: config.min_deposit,
                min_withdrawal: config.min_withdrawal,
            },
        ));
        let capacity = Arc::new(MatchCapacityEngine::new(Arc::clone(&store), retry));
        let refunds = Arc::new(RefundCoordinator::new(Arc::clone(&store), retry));
        let joins = Arc::new(JoinCoordinator::new(
            Arc::clone(&wallet),
            Arc::clone(&capacity),
            event_bus.clone(),
            config.join_step_timeout(),
        ));
        let matches = Arc::new(MatchService::new(
            Arc::clone(&store),
            capacity,
            Arc::clone(&refunds),
            event_bus.clone(),
            config.room_reveal_window(),
        ));
        let sweep = Arc::new(ReconciliationSweep::new(
            store,
            refunds,
            retry,
            config.reconcile_grace(),
        ));

        Self {
            wallet,
            matches,
            joins,
            sweep,
            identity: Arc::new(SharedSecretIdentity::new(config.identity_secret.as_bytes())),
            event_bus,
            config: Arc::new(config),
        }
    }
}

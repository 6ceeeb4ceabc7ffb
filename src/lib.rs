//! # arena-gateway
//!
//! REST API and WebSocket gateway for a tournament platform's wallet
//! ledger and match-entry capacity.
//!
//! Players hold a wallet balance and pay an entry fee to take a seat in a
//! match of fixed capacity. The gateway guarantees that a fee is charged
//! if and only if a seat is held, that no match is ever overfilled, and
//! that every refund is credited exactly once, under any interleaving of
//! concurrent requests.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)           bearer auth, DTOs, OpenAPI
//!     ├── WS Handler (ws/)               per-match event topics
//!     │
//!     ├── JoinCoordinator (service/)     debit → reserve → settle, with compensation
//!     ├── MatchService (service/)        lifecycle, refunds on cancel/delete
//!     ├── WalletEngine (service/)        deposits, withdrawals, adjustments
//!     ├── ReconciliationSweep (service/) repairs interrupted operations
//!     ├── EventBus (domain/)
//!     │
//!     └── LedgerStore (persistence/)     in-memory or PostgreSQL
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;

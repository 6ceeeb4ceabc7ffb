//! Data Transfer Objects for REST request/response serialization.
//!
//! Amounts are plain JSON integers in the smallest currency unit.

pub mod admin_dto;
pub mod common_dto;
pub mod match_dto;
pub mod wallet_dto;

pub use admin_dto::*;
pub use common_dto::*;
pub use match_dto::*;
pub use wallet_dto::*;

//! Off-chain ring-matching settlement simulator core.
//!
//! Given a batch of orders bundled into rings by a miner, this crate
//! determines fill amounts, computes fees/burns/rebates/margin, emits the
//! token transfers a consensus implementation would produce on-chain, and
//! verifies the settlement's invariants end to end. See [`domain::settlement`]
//! for the entry point, [`SettlementEngine::simulate`].
//!
//! Deserialization of the raw miner blob, cryptographic primitives, and
//! on-chain state reads are out of scope; they are abstracted behind the
//! [`chain_view::ChainView`], [`chain_view::Hasher`], and
//! [`chain_view::SignatureVerifier`] traits.

pub mod address;
pub mod big_int;
pub mod chain_view;
pub mod config;
pub mod domain;
pub mod report;
pub mod token;

pub use {
    address::Address,
    big_int::BigInt,
    chain_view::{ChainView, Hasher, SignatureVerifier},
    config::Config,
    domain::{
        all_or_none::AllOrNoneResolver,
        balances::BalanceBook,
        order::{OrderInfo, OrderValidator, Spendable},
        ring::{Participation, Ring},
        settlement::SettlementEngine,
    },
    report::SimulatorReport,
    token::TokenType,
};

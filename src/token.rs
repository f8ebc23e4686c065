//! The closed set of token types this crate settles transfers for.

use serde::{Deserialize, Serialize};

/// `ERC20` is fungible and ignores tranche (uses [`crate::Address::ZERO`]).
/// `ERC1400` is partitioned: each balance lives in a named tranche, and
/// transfers may be redirected to a different destination tranche as
/// dictated by the token's `canSend` check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TokenType {
    Erc20,
    Erc1400,
}

impl TokenType {
    pub fn is_erc1400(self) -> bool {
        matches!(self, TokenType::Erc1400)
    }
}

//! 20-byte addresses, keyed and rendered as 32-byte zero-padded hex, matching
//! how the EVM pads an `address` into a `bytes32` storage slot.

use {
    derive_more::{From, Into},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// A 20-byte identifier: an owner, a token, a broker, or (for ERC1400) a
/// tranche tag. The all-zero address is the canonical "no tranche / default"
/// marker used for ERC20 legs and for "no wallet".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Renders as a 32-byte zero-padded hex string, e.g.
    /// `0x000000000000000000000000aaaa...`, the canonical key form used by
    /// [`crate::BalanceBook`] and hash assembly.
    pub fn to_padded_hex(&self) -> String {
        let mut padded = [0u8; 32];
        padded[12..].copy_from_slice(&self.0);
        format!("0x{}", hex::encode(padded))
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 20]>::try_from(bytes).ok().map(Address)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_padded_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_padded_hex())
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::ZERO
    }
}

/// An ERC1400 tranche tag. Structurally identical to [`Address`]; the zero
/// tranche means "not applicable" for fungible (ERC20) tokens.
pub type Tranche = Address;

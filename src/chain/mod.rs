//! Chain identity registry: display name, BIP-32 derivation path and
//! signature curve per supported chain.

mod chain;

pub use chain::{Chain, ChainInfo, CurveKind};

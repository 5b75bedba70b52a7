use std::{convert::Infallible, error::Error, fmt, str::FromStr};

use bytes::BytesMut;
use postgres_types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use serde::{Deserialize, Serialize};

/// Signature scheme a vault uses to derive keys for a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveKind {
    Ecdsa,
    Eddsa,
    /// Curve of a chain this build does not recognise.
    Unknown,
}

/// Static registry entry for a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainInfo {
    pub name: &'static str,
    pub derivation_path: &'static str,
    pub curve: CurveKind,
}

/// Supported chains.
///
/// The persisted form is the string identifier returned by [`Chain::as_str`].
/// Identifiers this build does not know round-trip through [`Chain::Unknown`]
/// unchanged, so stored balances of newer chains are never lost.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Chain {
    ThorChain,
    Solana,
    Ethereum,
    Avalanche,
    Bsc,
    Bitcoin,
    BitcoinCash,
    Litecoin,
    Dogecoin,
    Gaia,
    Kujira,
    Dash,
    MayaChain,
    Arbitrum,
    Base,
    Optimism,
    Polygon,
    Blast,
    Cronos,
    Sui,
    Polkadot,
    Zksync,
    Dydx,
    Ton,
    Terra,
    TerraClassic,
    Xrp,
    Osmosis,
    Noble,
    Tron,
    Akash,
    Zcash,
    Unknown(String),
}

const EVM_PATH: &str = "m/44'/60'/0'/0/0";
const COSMOS_PATH: &str = "m/44'/118'/0'/0/0";

impl Chain {
    /// Every chain known to this build, in registry order.
    pub fn all() -> &'static [Chain] {
        use Chain::*;
        &[
            ThorChain,
            Solana,
            Ethereum,
            Avalanche,
            Bsc,
            Bitcoin,
            BitcoinCash,
            Litecoin,
            Dogecoin,
            Gaia,
            Kujira,
            Dash,
            MayaChain,
            Arbitrum,
            Base,
            Optimism,
            Polygon,
            Blast,
            Cronos,
            Sui,
            Polkadot,
            Zksync,
            Dydx,
            Ton,
            Terra,
            TerraClassic,
            Xrp,
            Osmosis,
            Noble,
            Tron,
            Akash,
            Zcash,
        ]
    }

    /// Registry entry for this chain. The match is exhaustive: a new variant
    /// does not build until it has an entry here.
    pub fn info(&self) -> ChainInfo {
        use CurveKind::{Ecdsa, Eddsa};

        let (name, derivation_path, curve) = match self {
            Chain::ThorChain => ("THORChain", "m/44'/931'/0'/0/0", Ecdsa),
            Chain::Solana => ("Solana", "", Eddsa),
            Chain::Ethereum => ("Ethereum", EVM_PATH, Ecdsa),
            Chain::Avalanche => ("Avalanche", EVM_PATH, Ecdsa),
            Chain::Bsc => ("BSC", EVM_PATH, Ecdsa),
            Chain::Bitcoin => ("Bitcoin", "m/84'/0'/0'/0/0", Ecdsa),
            Chain::BitcoinCash => ("BitcoinCash", "m/44'/145'/0'/0/0", Ecdsa),
            Chain::Litecoin => ("Litecoin", "m/84'/2'/0'/0/0", Ecdsa),
            Chain::Dogecoin => ("Dogecoin", "m/44'/3'/0'/0/0", Ecdsa),
            Chain::Gaia => ("Cosmos", COSMOS_PATH, Ecdsa),
            Chain::Kujira => ("Kujira", COSMOS_PATH, Ecdsa),
            Chain::Dash => ("Dash", "m/44'/5'/0'/0/0", Ecdsa),
            Chain::MayaChain => ("MayaChain", "m/44'/931'/0'/0/0", Ecdsa),
            Chain::Arbitrum => ("Arbitrum", EVM_PATH, Ecdsa),
            Chain::Base => ("Base", EVM_PATH, Ecdsa),
            Chain::Optimism => ("Optimism", EVM_PATH, Ecdsa),
            Chain::Polygon => ("Polygon", EVM_PATH, Ecdsa),
            Chain::Blast => ("Blast", EVM_PATH, Ecdsa),
            Chain::Cronos => ("CronosChain", EVM_PATH, Ecdsa),
            Chain::Sui => ("Sui", "", Eddsa),
            Chain::Polkadot => ("Polkadot", "", Eddsa),
            Chain::Zksync => ("Zksync", EVM_PATH, Ecdsa),
            Chain::Dydx => ("Dydx", COSMOS_PATH, Ecdsa),
            Chain::Ton => ("TON", "", Eddsa),
            Chain::Terra => ("Terra", "m/44'/330'/0'/0/0", Ecdsa),
            Chain::TerraClassic => ("TerraClassic", "m/44'/330'/0'/0/0", Ecdsa),
            Chain::Xrp => ("XRP", "m/44'/144'/0'/0/0", Ecdsa),
            Chain::Osmosis => ("Osmosis", COSMOS_PATH, Ecdsa),
            Chain::Noble => ("Noble", COSMOS_PATH, Ecdsa),
            Chain::Tron => ("Tron", "m/44'/195'/0'/0/0", Ecdsa),
            Chain::Akash => ("Akash", COSMOS_PATH, Ecdsa),
            Chain::Zcash => ("Zcash", "m/44'/133'/0'/0/0", Ecdsa),
            Chain::Unknown(_) => {
                return ChainInfo {
                    name: "UNKNOWN",
                    derivation_path: "",
                    curve: CurveKind::Unknown,
                }
            },
        };

        ChainInfo {
            name,
            derivation_path,
            curve,
        }
    }

    /// Resolve a persisted identifier. Never fails: unrecognised identifiers
    /// become [`Chain::Unknown`].
    pub fn from_name(name: &str) -> Self {
        Self::all()
            .iter()
            .find(|chain| chain.info().name == name)
            .cloned()
            .unwrap_or_else(|| Chain::Unknown(name.to_string()))
    }

    /// Stable external identifier.
    pub fn as_str(&self) -> &str {
        match self {
            Chain::Unknown(raw) => raw,
            known => known.info().name,
        }
    }

    pub fn derivation_path(&self) -> &'static str {
        self.info().derivation_path
    }

    pub fn curve(&self) -> CurveKind {
        self.info().curve
    }

    pub fn is_eddsa(&self) -> bool {
        self.curve() == CurveKind::Eddsa
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Chain::Unknown(_))
    }

    pub fn is_evm(&self) -> bool {
        matches!(
            self,
            Chain::Ethereum
                | Chain::Avalanche
                | Chain::Bsc
                | Chain::Base
                | Chain::Arbitrum
                | Chain::Optimism
                | Chain::Polygon
                | Chain::Blast
                | Chain::Cronos
                | Chain::Zksync
        )
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Chain::from_name(s))
    }
}

impl From<String> for Chain {
    fn from(value: String) -> Self {
        Chain::from_name(&value)
    }
}

impl From<Chain> for String {
    fn from(value: Chain) -> Self {
        match value {
            Chain::Unknown(raw) => raw,
            known => known.info().name.to_string(),
        }
    }
}

impl ToSql for Chain {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        self.as_str().to_sql(ty, out)
    }

    fn accepts(ty: &Type) -> bool {
        <&str as ToSql>::accepts(ty)
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Chain {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let name = <&str as FromSql>::from_sql(ty, raw)?;
        Ok(Chain::from_name(name))
    }

    fn accepts(ty: &Type) -> bool {
        <&str as FromSql>::accepts(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_known_chain_round_trips() {
        for chain in Chain::all() {
            assert!(chain.is_known());
            assert_eq!(&Chain::from_name(chain.as_str()), chain);
        }
    }

    #[test]
    fn test_registry_names_are_unique() {
        let mut names: Vec<&str> = Chain::all().iter().map(|c| c.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Chain::all().len());
    }

    #[test]
    fn test_unknown_chain_is_preserved() {
        let chain = Chain::from_name("Hyperliquid");
        assert_eq!(chain, Chain::Unknown("Hyperliquid".to_string()));
        assert_eq!(chain.as_str(), "Hyperliquid");
        assert_eq!(chain.curve(), CurveKind::Unknown);
        assert_eq!(chain.derivation_path(), "");
        assert_eq!(String::from(chain), "Hyperliquid");
    }

    #[test]
    fn test_original_identifiers() {
        assert_eq!(Chain::from_name("BSC"), Chain::Bsc);
        assert_eq!(Chain::from_name("Cosmos"), Chain::Gaia);
        assert_eq!(Chain::from_name("TON"), Chain::Ton);
        assert_eq!(Chain::from_name("CronosChain"), Chain::Cronos);
        // Lookups are case sensitive, like the persisted data
        assert!(!Chain::from_name("bsc").is_known());
    }

    #[test]
    fn test_curves_and_paths() {
        for chain in [Chain::Solana, Chain::Sui, Chain::Polkadot, Chain::Ton] {
            assert!(chain.is_eddsa());
            assert_eq!(chain.derivation_path(), "");
        }
        assert_eq!(Chain::Bitcoin.derivation_path(), "m/84'/0'/0'/0/0");
        assert_eq!(Chain::Arbitrum.derivation_path(), EVM_PATH);
        assert_eq!(Chain::Ethereum.curve(), CurveKind::Ecdsa);
        assert_eq!(Chain::all().iter().filter(|c| c.is_evm()).count(), 10);
    }

    #[test]
    fn test_serde_uses_identifier() {
        let json = serde_json::to_string(&vec![Chain::Bsc, Chain::Unknown("Foo".into())]).unwrap();
        assert_eq!(json, r#"["BSC","Foo"]"#);
        let back: Vec<Chain> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Chain::Bsc, Chain::Unknown("Foo".into())]);
    }
}

pub mod balance_fetcher;
pub mod evm_provider;
pub mod handler;
pub mod points;
pub mod provider;

pub use balance_fetcher::{BalanceFetcher, ChainFetchResult, ChainOutcome, FetchReport};
pub use evm_provider::EvmBalanceProvider;
pub use handler::TaskDispatcher;
pub use points::{compute_points, PointsBreakdown, PointsCalculator, PointsWeights};
pub use provider::{BalanceGateway, BalanceProvider, ChainBalances, TokenBalance};

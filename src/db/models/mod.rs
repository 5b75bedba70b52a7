mod balance;
mod coin;
mod dead_letter;
mod season;
mod vault;

pub use balance::{unix_now, Balance, PositionSnapshot, Price, PricedBalance};
pub use coin::Coin;
pub use dead_letter::DeadLetter;
pub use season::{Season, SeasonCalendar, SeasonPhase, SeasonStats};
pub use vault::Vault;

pub mod close_seasons;
pub mod refresh_balances;

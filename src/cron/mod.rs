mod jobs;
mod scheduler;

pub use jobs::refresh_balances::RefreshSummary;
pub use scheduler::CronScheduler;

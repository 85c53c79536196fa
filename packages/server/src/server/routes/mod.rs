// HTTP routes
pub mod cron;
pub mod health;
pub mod jobs;

pub use cron::*;
pub use health::*;
pub use jobs::*;

pub mod capital;
pub mod exit;
pub mod scenario;
pub mod scenarios;
pub mod schedule;
pub mod waterfall;

pub mod booking;
pub mod database;
pub mod ledger;
pub mod providers;
pub mod reconciliation;
pub mod schedule;

pub mod cache;
pub mod ledger;
pub mod window;

pub mod gallery_store;
pub mod ledger;

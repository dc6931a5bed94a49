pub mod billing_ledger;
pub mod catalog;
pub mod customer;
pub mod subscription;
pub mod usage;
pub mod webhook;

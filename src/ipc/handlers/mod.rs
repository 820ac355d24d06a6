pub mod auth;
pub mod backup_exchange;
pub mod core;
pub mod invoices;
pub mod payments;
pub mod results;
pub mod students;

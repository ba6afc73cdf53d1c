pub mod checkout;
pub mod config;
pub mod menu;

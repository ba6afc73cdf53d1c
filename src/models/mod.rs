pub mod checkout;
pub mod config;
pub mod detection;
pub mod item;
pub mod menu;
pub mod region;

pub mod config_handler;
pub mod harvest;
pub mod login;
pub mod status;

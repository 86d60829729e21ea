pub mod core;
#[cfg(feature = "intake")]
pub mod intake;
pub mod kb;
pub mod main_module;
pub mod notify;
pub mod security;
pub mod tasks;
pub mod tickets;
pub mod users;

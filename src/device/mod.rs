pub mod adapter;
pub mod btle;
pub mod constants;
pub mod coordinator;
pub mod mailbox;
pub mod registry;
pub mod service;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

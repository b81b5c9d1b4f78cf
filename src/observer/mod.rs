pub mod console;
pub mod hub;

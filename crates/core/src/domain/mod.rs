pub mod actor;
pub mod quote;

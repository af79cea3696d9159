pub mod gateway;
pub mod vault;

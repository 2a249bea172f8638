pub mod agent;
pub mod assembler;
pub mod config;
pub mod error;
pub mod gateway;
pub mod index;
pub mod runtime;
pub mod test_utils;
pub mod tools;
pub mod types;

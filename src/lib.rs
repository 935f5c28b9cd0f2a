pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod naming;
pub mod store;
pub mod tasks;
pub mod transform;

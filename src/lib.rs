pub mod cache;
pub mod config;
pub mod error;
pub mod evolution;
pub mod http;
pub mod migrate;
pub mod output;
pub mod pagination;
pub mod process;
pub mod source;
pub mod value;

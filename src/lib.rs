pub mod cache;
pub mod config;
pub mod exec;
pub mod llm;
pub mod phase;
pub mod pipeline;
pub mod schema;
pub mod store;
pub mod util;
pub mod validate;

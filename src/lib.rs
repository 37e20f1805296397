// Library interface for webctl
// The binaries, benchmarks and integration tests all go through these modules

pub mod lexer;
pub mod expand;
pub mod variables;
pub mod events;
pub mod builtins;
pub mod runtime;
pub mod request;
pub mod ipc;
pub mod daemon;
pub mod extio;
pub mod config;
pub mod signal;
pub mod error;

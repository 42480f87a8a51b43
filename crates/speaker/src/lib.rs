pub mod cli;
pub mod config;
pub mod inspect;
pub mod runtime;
pub mod sink;

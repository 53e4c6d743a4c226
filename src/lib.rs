pub mod cli;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod reload;
pub mod sink;
pub mod source;
pub mod storage;

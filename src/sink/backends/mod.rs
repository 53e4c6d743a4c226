//! HTTP delivery backends.
//!
//! Every backend exposes `build(&SinkEndpoint)` so the registry can keep a
//! plain table of constructors.

pub mod clickhouse;
pub mod elasticsearch;
pub mod fluentbit;
pub mod graylog;
pub mod loki;
pub mod victorialogs;

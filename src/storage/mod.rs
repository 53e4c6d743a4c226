pub mod replay;
pub mod wal;

pub use replay::{replay_wal, ReplayOutcome};
pub use wal::{DiskWal, WalError, WalRecord};

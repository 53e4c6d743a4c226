pub mod backpressure;
pub mod batch;
pub mod channel;
pub mod dispatcher;
pub mod rate_limit;

pub use backpressure::{BackpressureMonitor, OverflowPolicy};
pub use batch::BatchBuffer;
pub use channel::{intake_queue, IntakeReceiver, IntakeSender};
pub use dispatcher::{ControlSender, DispatchStats, Dispatcher, DispatcherCommand};
pub use rate_limit::TokenBucket;

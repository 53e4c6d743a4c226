pub mod backends;
pub mod http;
pub mod registry;
pub mod traits;

pub use registry::{deliver, SinkRegistry};
pub use traits::{Sink, SinkError};

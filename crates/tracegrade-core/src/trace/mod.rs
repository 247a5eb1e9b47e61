pub mod builder;
pub mod events;

pub use builder::TraceBuilder;
pub use events::StreamEvent;

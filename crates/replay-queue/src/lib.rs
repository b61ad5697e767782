pub mod cancellation;
pub mod coordinator;
pub mod event;

pub use cancellation::CancellationToken;
pub use coordinator::{ReplayQueueCoordinator, StreamKind};
pub use event::ReplayEvent;

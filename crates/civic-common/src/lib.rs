pub mod errors;
pub mod events;
pub mod id;
pub mod notifications;
pub mod types;

pub use errors::{ConfigError, StartupError};
pub use events::{EventBus, StartupEvent};
pub use id::{new_correlation_id, ScopeId};
pub use notifications::{Notification, NotificationLevel, NotificationQueue};
pub use types::StartupPhase;

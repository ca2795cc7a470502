//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod auth;
mod doctor;
pub mod logging;
pub mod migration;
pub mod navigation;
mod profile;
pub mod session;

pub use auth::{user_message, AuthFlow, AuthService, SignUpForm, PASSWORD_RESET_SENT};
pub use doctor::{CheckResult, CheckStatus, DoctorResult, DoctorService, DoctorSummary};
pub use logging::{EntryPoint, LogEntry, LogEvent, LogStats, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use navigation::{guard, Access, Route};
pub use profile::{ProfileService, FEATURED_PET_MAX_ATTEMPTS};
pub use session::{SessionConsumer, SessionListener, SessionPublisher};

//! Business logic for accounts, tenancy, invitations and notifications.

mod auth;
mod cache;
mod database;
mod dispatcher;
mod email;
pub mod error;
mod invitations;
mod memory;
pub mod metrics;
mod organizations;
mod password_reset;
mod queue;
mod roles;
pub mod store;
mod tokens;
mod verification;
mod worker;

pub use auth::AuthService;
pub use cache::{CacheStore, MemoryCache, RedisService};
pub use database::Database;
pub use dispatcher::{DispatchOutcome, NotificationDispatcher};
pub use email::{EmailKind, Mailer, MockMailer, SentEmail, SmtpMailer};
pub use error::ServiceError;
pub use invitations::{AcceptOutcome, InvitationLinks, InvitationService};
pub use memory::MemoryStore;
pub use organizations::{check_subdomain_format, OrganizationService, RESERVED_SUBDOMAINS};
pub use password_reset::PasswordResetService;
pub use queue::{MemoryQueue, NotificationQueue, RedisQueue, Reservation};
pub use roles::RoleResolver;
pub use store::{
    AccessTokenStore, InvitationStore, OrganizationStore, PasswordResetStore, Store, UserStore,
};
pub use tokens::{IssuedToken, RoleFreshness, TokenService};
pub use verification::EmailVerifier;
pub use worker::{NotificationWorker, WorkOutcome, WorkerSettings};

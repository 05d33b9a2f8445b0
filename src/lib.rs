#![doc = include_str!("../README.md")]

pub mod abort;
pub mod auth;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
mod gate;
pub mod hint;
pub mod metrics;
#[cfg(feature = "middleware")]
pub mod middleware;
pub mod rbac;
mod refresh;
pub mod routes;
pub mod session;
mod throttle;
pub mod traits;
pub mod types;

// Re-exports for convenient access
pub use auth::RegisterRequest;
pub use client::{ApiClient, ApiResponse, RequestOptions};
pub use config::{ClientConfig, FeatureFlags, RouteConfig};
pub use error::{CancelReason, Error};
pub use hint::{JarHintStore, MemoryHintStore};
pub use metrics::{ApiMetrics, MetricsWindow};
pub use rbac::{RolePolicy, is_student_role};
pub use refresh::RefreshReason;
pub use session::{SessionController, SessionSnapshot};
pub use throttle::Visibility;
pub use traits::{Navigator, NoopQueryCache, QueryCache, SessionHintStore, SessionObserver};
pub use types::{AccessToken, LifecycleStatus, Role, User, UserId};

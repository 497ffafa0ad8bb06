#![doc = include_str!("../README.md")]

pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod navigation;
pub mod session;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use client::{ApiResponse, AuthClient};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use guard::{AuthenticatedLoginPolicy, GuardDecision, RouteGuard};
pub use navigation::{ChannelNavigator, Navigator, NoopNavigator, routes};
pub use session::{AuthState, SessionManager};
pub use store::{FileStore, MemoryStore, TokenStore, clear_auth_keys, keys};
pub use types::{AuthResponse, RefreshResponse, Role, Session, TokenPair, User, UserId};

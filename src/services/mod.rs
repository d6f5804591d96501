//! Domain services the handlers delegate to.

pub mod auth;
pub mod email;
pub mod webfetch;

pub use auth::AuthService;
pub use email::EmailService;
pub use webfetch::{FetchRequest, FetchResult, WebFetchService};

//! Row types and their request/response counterparts.

mod api_key;
mod user;

pub use api_key::*;
pub use user::*;

//! Infrastructure shared by every integration suite: the in-process app
//! harness and canned upstream pages for the fetch tests.

pub mod fixtures;

pub use fixtures::*;
pub use test_app::*;

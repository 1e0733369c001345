//! Error plumbing shared across the codequest crates: the [`FromMessage`]
//! trait and the [`impl_context!`] macro that gives each crate its own
//! `Context` extension for `Result` and `Option`.

pub mod error;

pub use error::FromMessage;

//! Core value types shared by every layer of the crate.
//!
//! - [`value`]: SQL value representation with typed NULLs

pub mod value;

pub use value::{EnumValue, SqlNullType, SqlValue};

#![allow(async_fn_in_trait)]
pub mod auth;
pub mod catalog;
pub mod collection;
pub mod driver;
mod error;
pub mod fetcher;
pub mod filter;
mod report;
pub mod selection;

pub use error::{Error, ErrorKind, Result};

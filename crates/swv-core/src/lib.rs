#![doc = include_str!("../README.md")]

mod cached;
mod chain;
mod client;
mod datum;
mod error;
mod forked;
mod frame;
mod promise;
mod session;
mod transport;
mod value;

pub use cached::*;
pub use chain::*;
pub use client::*;
pub use datum::*;
pub use error::*;
pub use forked::*;
pub use frame::*;
pub use promise::*;
pub use session::*;
pub use transport::*;
pub use value::*;

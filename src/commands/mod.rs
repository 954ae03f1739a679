//! Command implementations for the locsync CLI.
//!
//! Each submodule backs one subcommand:
//!
//! - [`watch`] - Follow the live location table until interrupted
//! - [`send`] - Publish a single position
//! - [`config`] - Inspect and edit the configuration file

pub mod config;
pub mod send;
pub mod watch;

#[doc(inline)]
pub use send::send;
#[doc(inline)]
pub use watch::watch;

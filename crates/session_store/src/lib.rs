// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A concurrent, typed, in-process session store.
//!
//! [`SessionStore`] maps byte-string keys to values of any `Send + Sync` type. Each entry
//! carries a sliding expiration window: it stays alive for as long as it keeps being read
//! within the store's TTL, and is reclaimed once it goes quiet.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use session_store::SessionStore;
//! use tick::Clock;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> session_store::Result<()> {
//! let store = SessionStore::builder(Clock::new_tokio())
//!     .ttl(Duration::from_secs(30 * 60))
//!     .build();
//!
//! let reclaimer = store.start_reclamation()?;
//!
//! store.put("session:7f3a", String::from("alice"))?;
//! let user = store.get::<String>("session:7f3a")?;
//! assert_eq!(user.as_str(), "alice");
//!
//! reclaimer.shutdown();
//! reclaimer.join().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Expiration and reclamation
//!
//! An entry expires once more than the TTL has elapsed since it was last written or
//! successfully read. Expired entries are never returned: a lookup that finds one evicts
//! it and reports [`ErrorKind::Expired`].
//!
//! Entries nobody touches again are removed by sweeps. [`SessionStore::sweep`] runs one
//! on demand; [`SessionStore::start_reclamation`] spawns a Tokio task that sweeps
//! periodically and also as soon as the store has grown by half since the previous sweep,
//! so bursts of new sessions do not have to wait for the timer.
//!
//! # Type safety
//!
//! The value type is chosen per call. Reading or deleting a key with a type other than
//! the one stored fails with [`ErrorKind::TypeMismatch`] and leaves the entry untouched.
//!
//! # Time
//!
//! All timing goes through a [`tick::Clock`]. Tests can drive time deterministically with
//! `tick::ClockControl`.

pub mod error;

mod builder;
mod entry;
mod key_value;
mod population;
mod reclaimer;
mod runtime;
mod store;
mod telemetry;

#[cfg(test)]
mod testing;

pub use builder::SessionStoreBuilder;
pub use entry::SharedValue;
pub use error::{Error, ErrorKind, Result};
pub use key_value::KeyValue;
pub use reclaimer::Reclaimer;
pub use store::{SessionStore, SweepReport};

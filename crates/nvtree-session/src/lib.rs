//! Session lifecycle and command surface of the nvtree storage engine.
//!
//! A [`Session`] owns one pool buffer, one item tree and its bindings to
//! storage devices. It walks a small state machine:
//!
//! ```text
//! Uninitialized --init--> Initialized --load--> Loaded <--> Mutating --save--> Saved
//!                              ^                                                  |
//!                              +---------------------- erase ---------------------+
//! any --close--> Closed
//! ```
//!
//! Two engines share the same persisted bytes:
//!
//! - the full engine ([`Session::load`], [`Session::add`], [`Session::save`], ...)
//!   materialises the whole tree and re-packs it on save;
//! - the lite engine ([`Session::lite_find`], [`Session::lite_update`]) reads
//!   and patches the verified image in the pool buffer without building a
//!   tree.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nvtree_session::{Session, SessionConfig};
//! use nvtree_store::{DeviceSet, RamMirror};
//! use nvtree_types::{BackendKind, Value};
//!
//! let devices = Arc::new(DeviceSet::new());
//! devices.insert(0, Box::new(RamMirror::new(8192))).unwrap();
//!
//! let mut session = Session::new(SessionConfig::default(), devices.clone()).unwrap();
//! session.init().unwrap();
//! let net = session.add_group(None, "net").unwrap();
//! session.add_value(Some(net), "mtu", Value::U16(1500)).unwrap();
//! session.save(BackendKind::Ram, 0).unwrap();
//!
//! let mut other = Session::new(SessionConfig::default(), devices).unwrap();
//! other.init().unwrap();
//! other.load(BackendKind::Ram, 0).unwrap();
//! let (mtu, _) = other.find("net.mtu").unwrap();
//! assert_eq!(other.read(mtu).unwrap(), Some(Value::U16(1500)));
//! ```

pub mod config;
mod device;
pub mod error;
mod image;
pub mod session;

pub use config::{BaseOffsets, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use session::{LiteHit, LoadStatus, Session, SessionState};

//! An async ICMP echo engine that pings a fixed set of endpoints on a timer.
//!
//! All requests share one raw socket. A background task reads every inbound
//! ICMP message and matches echo replies, as well as destination unreachable
//! errors quoting one of our requests, back to the waiting probe. Each attempt
//! ends as exactly one of success, timeout or failure and is reported to the
//! registered [`ReplyHandler`]s.
//!
//! Raw sockets usually need elevated privileges (`CAP_NET_RAW` on Linux).
//!
//! ## Example
//! Following example pings the endpoints given on the command line and prints every outcome.
//! ```rust,no_run
#![doc = include_str!("../demos/ping.rs")]
//! ```

pub mod config;
pub mod error;
pub mod observer;
pub mod packet;
pub mod pinger;
pub mod probe;

pub(crate) mod constants;
pub(crate) mod correlation;
pub(crate) mod receiver;
pub(crate) mod socket;

pub use config::{Network, PingerConfig, PingerConfigBuilder};
pub use error::{Error, ProbeError, Result};
pub use observer::{LogHandler, ReplyHandler};
pub use pinger::Pinger;
pub use probe::{Endpoint, Outcome};

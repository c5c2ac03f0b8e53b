//! calc-relay
//!
//! A line-delimited JSON compute service over TCP, with two modes:
//!
//! - `calc`: a restricted arithmetic evaluator (allow-listed constants and
//!   functions only, no general eval)
//! - `gpt`: a delegated chat completion call
//!
//! The compute server is authoritative and keeps its own LRU cache. The
//! optional proxy sits between clients and the server, replays cached
//! responses with `meta.from_cache = true` and forwards misses over one
//! upstream connection per client.
//!
//! # Wire protocol
//!
//! ```text
//! -> {"mode":"calc","data":{"expr":"2+2"},"options":{"cache":true}}
//! <- {"ok":true,"result":4.0,"meta":{"from_cache":false,"took_ms":0}}
//! <- {"ok":false,"error":"Bad request: unknown mode"}
//! ```

pub mod cache;
pub mod calc;
pub mod cli;
pub mod completion;
pub mod config;
pub mod net;
pub mod protocol;
pub mod proxy;
pub mod server;
pub mod shutdown;
pub mod telemetry;

pub use cache::LruStore;
pub use config::EnvConfig;
pub use proxy::ProxyHandler;
pub use server::ComputeHandler;
pub use shutdown::{ShutdownCoordinator, ShutdownResult};

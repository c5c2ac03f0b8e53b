//! Client side of the protocol: one-shot requests and the interactive loop.
//!
//! ```bash
//! calc-relay client --mode calc --expr "2**10"
//! calc-relay client --port 5554 --mode gpt --prompt "hello" --no-cache
//! calc-relay client            # interactive
//! ```

pub mod client;
pub mod interactive;

pub use client::{build_request, ClientError, RelayClient, DEFAULT_CLIENT_TIMEOUT};
pub use interactive::interactive;

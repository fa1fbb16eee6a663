//! Debugger-driven repair loop.
//!
//! A decision service is shown where a program stopped and asks for debugger
//! commands, source windows, patches, rebuilds and restarts until the program
//! exits cleanly, the service gives up, or the turn limit is reached.
//!
//! - **[`core`]**: Pure, deterministic logic (fragment merging, intent
//!   decoding, patch synthesis and application, the transaction state machine).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (gdb, the chat-completions service,
//!   git, builds, logs on disk). Traits at the seams allow scripted fakes.
//!
//! Orchestration modules ([`aggregator`], [`dispatch`], [`apply_engine`],
//! [`session`]) coordinate the two to implement the `run` command.

pub mod aggregator;
pub mod apply_engine;
pub mod core;
pub mod dispatch;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

//! Runner lifecycle and inference driving
//!
//! - Runner: activation state machine around a backend
//! - ActiveRunner: scope guard that deactivates on drop
//! - Harness: runs several runners over shared inputs into a `RunResults`

mod guard;
mod harness;
mod leak;
mod runner;
mod validate;

pub use guard::ActiveRunner;
pub use harness::Harness;
pub use leak::active_runners;
pub use runner::Runner;
pub use validate::check_feed;

//! Rewrites PHP theme sources so function declarations are wrapped in
//! `function_exists` guards and can be included more than once.
//!
//! The text transformation lives in [`guard`] and [`callsite`]; the
//! [`batch`] module drives it over files on disk.

pub mod batch;
pub mod callsite;
pub mod cli;
pub mod config;
pub mod error;
pub mod guard;
pub mod scanner;
pub mod targets;
pub mod telemetry;

pub use callsite::{CallSiteGuard, CallSiteOutcome, guard_call_sites};
pub use error::{GuardError, GuardResult};
pub use guard::{
    GuardOptions, GuardOutcome, GuardTransformer, guard_declarations, is_already_guarded,
};
pub use scanner::{BlockScanner, BraceCounter};
pub use targets::Targets;

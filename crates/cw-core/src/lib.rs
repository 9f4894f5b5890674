//! cw-core: foundation shared by every casework crate.
//!
//! Contains:
//! - guard (root containment for every filesystem path)
//! - case (case identity and inventory records)
//! - names (user-chosen case names)
//! - sanitize (control-character escaping for logs and messages)
//! - error (shared error types)

pub mod case;
pub mod error;
pub mod guard;
pub mod names;
pub mod sanitize;

pub use case::{Case, CaseId, UNCATEGORIZED};
pub use error::{CaseIdError, GuardError, GuardResult, NameError};
pub use guard::{PathGuard, is_contained, resolve};
pub use names::CaseName;
pub use sanitize::{Sanitized, escape_control};

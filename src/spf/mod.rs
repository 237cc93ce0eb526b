//! Sender Policy Framework (RFC 7208): record parsing, formatting and evaluation.

pub mod budget;
pub mod error;
pub mod eval;
pub mod lookup;
pub mod mechanism;
pub mod permitted;
pub mod record;
pub mod types;

pub use budget::{Budget, EvalLimits};
pub use error::{SpfError, SpfParseError};
pub use eval::{SpfEvaluator, SpfVerdict};
pub use mechanism::{Mechanism, MechanismKind};
pub use record::{Modifier, SpfRecord, Term};
pub use types::{Qualifier, SpfResult};

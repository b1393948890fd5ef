//! # Trap Handling
//!
//! - **`classifier`**: maps raw trap numbers onto the closed [`classifier::TrapKind`]
//!   taxonomy and trap kinds onto event categories and severities.
//! - **`payload`**: typed views of the opaque trap payload and the decoder
//!   seam used by the context resolver.

/// Trap-number classification and severity lookup.
pub mod classifier;
/// Trap payload decoding.
pub mod payload;

pub use classifier::{classify, severity_for, SeverityOverrides, TrapKind};
pub use payload::{DecodeError, StlPayloadDecoder, SwitchPKeyRecord, SysGuidChange, TrapPayloadDecoder};

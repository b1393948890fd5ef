//! # Trap Classifier
//!
//! Pure mapping from a notice's numeric trap code to a [`TrapKind`], and from a
//! trap kind to its [`EventCategory`]. Unknown codes classify as
//! [`TrapKind::Unsupported`]; they are never an error.
//!
//! Severity is the category default unless the session supplied an override.
//! Overrides are held in [`SeverityOverrides`], an atomically swapped map:
//! configuration replaces it wholesale and readers always see either the old
//! or the new map, never a partial one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::model::event::{EventCategory, Severity};

/// Session-local codes the transport synthesizes for connection changes.
/// They sit above the range used by subnet management traps.
pub const TRAP_FE_CONNECTION_LOST: u16 = 0xFF01;
/// Fabric executive connection established.
pub const TRAP_FE_CONNECTION_ESTABLISH: u16 = 0xFF02;
/// Subnet manager connection lost.
pub const TRAP_SM_CONNECTION_LOST: u16 = 0xFF03;
/// Subnet manager connection established.
pub const TRAP_SM_CONNECTION_ESTABLISH: u16 = 0xFF04;

/// A classified trap. Each known kind maps to exactly one trap number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrapKind {
    /// Trap 64.
    GidNowInService,
    /// Trap 65.
    GidOutOfService,
    /// Trap 66.
    AddMulticastGroup,
    /// Trap 67.
    DelMulticastGroup,
    /// Trap 128: a switch port changed state.
    LinkPortChangeState,
    /// Trap 129: local link integrity threshold reached.
    LinkIntegrity,
    /// Trap 130: excessive buffer overruns.
    BufferOverrun,
    /// Trap 131: flow control update watchdog fired.
    FlowWatchdog,
    /// Trap 144: capability mask or node description changed.
    ChangeCapability,
    /// Trap 145: system image GUID changed.
    ChangeSysGuid,
    /// Trap 256.
    BadMKey,
    /// Trap 257.
    BadPKey,
    /// Trap 258.
    BadQKey,
    /// Trap 259: bad P_Key seen at a switch external port.
    SwitchBadPKey,
    /// Trap 2048.
    LinkWidthDowngrade,
    /// Synthesized by the transport.
    FeConnectionLost,
    /// Synthesized by the transport.
    FeConnectionEstablish,
    /// Synthesized by the transport.
    SmConnectionLost,
    /// Synthesized by the transport.
    SmConnectionEstablish,
    /// A code outside the known set. Carries the raw number for logging.
    Unsupported(u16),
}

/// Classifies a raw trap number.
pub fn classify(code: u16) -> TrapKind {
    match code {
        64 => TrapKind::GidNowInService,
        65 => TrapKind::GidOutOfService,
        66 => TrapKind::AddMulticastGroup,
        67 => TrapKind::DelMulticastGroup,
        128 => TrapKind::LinkPortChangeState,
        129 => TrapKind::LinkIntegrity,
        130 => TrapKind::BufferOverrun,
        131 => TrapKind::FlowWatchdog,
        144 => TrapKind::ChangeCapability,
        145 => TrapKind::ChangeSysGuid,
        256 => TrapKind::BadMKey,
        257 => TrapKind::BadPKey,
        258 => TrapKind::BadQKey,
        259 => TrapKind::SwitchBadPKey,
        2048 => TrapKind::LinkWidthDowngrade,
        TRAP_FE_CONNECTION_LOST => TrapKind::FeConnectionLost,
        TRAP_FE_CONNECTION_ESTABLISH => TrapKind::FeConnectionEstablish,
        TRAP_SM_CONNECTION_LOST => TrapKind::SmConnectionLost,
        TRAP_SM_CONNECTION_ESTABLISH => TrapKind::SmConnectionEstablish,
        other => TrapKind::Unsupported(other),
    }
}

impl TrapKind {
    /// The numeric code this kind was classified from.
    pub fn code(self) -> u16 {
        match self {
            TrapKind::GidNowInService => 64,
            TrapKind::GidOutOfService => 65,
            TrapKind::AddMulticastGroup => 66,
            TrapKind::DelMulticastGroup => 67,
            TrapKind::LinkPortChangeState => 128,
            TrapKind::LinkIntegrity => 129,
            TrapKind::BufferOverrun => 130,
            TrapKind::FlowWatchdog => 131,
            TrapKind::ChangeCapability => 144,
            TrapKind::ChangeSysGuid => 145,
            TrapKind::BadMKey => 256,
            TrapKind::BadPKey => 257,
            TrapKind::BadQKey => 258,
            TrapKind::SwitchBadPKey => 259,
            TrapKind::LinkWidthDowngrade => 2048,
            TrapKind::FeConnectionLost => TRAP_FE_CONNECTION_LOST,
            TrapKind::FeConnectionEstablish => TRAP_FE_CONNECTION_ESTABLISH,
            TrapKind::SmConnectionLost => TRAP_SM_CONNECTION_LOST,
            TrapKind::SmConnectionEstablish => TRAP_SM_CONNECTION_ESTABLISH,
            TrapKind::Unsupported(code) => code,
        }
    }

    /// False only for [`TrapKind::Unsupported`].
    pub fn is_supported(self) -> bool {
        !matches!(self, TrapKind::Unsupported(_))
    }

    /// The user-facing category, or `None` for unsupported traps.
    pub fn category(self) -> Option<EventCategory> {
        let category = match self {
            TrapKind::GidNowInService => EventCategory::PortActive,
            TrapKind::GidOutOfService => EventCategory::PortInactive,
            TrapKind::AddMulticastGroup | TrapKind::DelMulticastGroup => EventCategory::MulticastChange,
            TrapKind::LinkPortChangeState | TrapKind::ChangeCapability | TrapKind::ChangeSysGuid => {
                EventCategory::TopologyChange
            }
            TrapKind::LinkIntegrity
            | TrapKind::BufferOverrun
            | TrapKind::FlowWatchdog
            | TrapKind::LinkWidthDowngrade => EventCategory::LinkIntegrity,
            TrapKind::BadMKey | TrapKind::BadPKey | TrapKind::BadQKey | TrapKind::SwitchBadPKey => {
                EventCategory::SecurityViolation
            }
            TrapKind::FeConnectionLost => EventCategory::FeConnectionLost,
            TrapKind::FeConnectionEstablish => EventCategory::FeConnectionEstablished,
            TrapKind::SmConnectionLost => EventCategory::SmConnectionLost,
            TrapKind::SmConnectionEstablish => EventCategory::SmConnectionEstablished,
            TrapKind::Unsupported(_) => return None,
        };
        Some(category)
    }

    /// Kinds whose effect reaches the nodes on the other end of the
    /// affected links. Their neighbours get their own cache update.
    pub fn affects_neighbors(self) -> bool {
        matches!(
            self,
            TrapKind::LinkPortChangeState | TrapKind::GidNowInService | TrapKind::GidOutOfService
        )
    }
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrapKind::Unsupported(code) => write!(f, "UNSUPPORTED({})", code),
            other => write!(f, "{:?}({})", other, other.code()),
        }
    }
}

/// Returns the override for `category` if one is configured, else its default.
pub fn severity_for(category: EventCategory, overrides: &HashMap<EventCategory, Severity>) -> Severity {
    overrides
        .get(&category)
        .copied()
        .unwrap_or_else(|| category.default_severity())
}

/// # Severity Overrides
///
/// Copy-on-write table of per-category severities. `replace` swaps in a new
/// map; `snapshot` hands out the current one.
#[derive(Debug, Default)]
pub struct SeverityOverrides {
    current: ArcSwap<HashMap<EventCategory, Severity>>,
}

impl SeverityOverrides {
    /// Starts from `initial`; an empty map means defaults everywhere.
    pub fn new(initial: HashMap<EventCategory, Severity>) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Replaces the whole table.
    pub fn replace(&self, rules: HashMap<EventCategory, Severity>) {
        self.current.store(Arc::new(rules));
    }

    /// The table as it is right now.
    pub fn snapshot(&self) -> Arc<HashMap<EventCategory, Severity>> {
        self.current.load_full()
    }

    /// Severity for `category` under the current table.
    pub fn severity_for(&self, category: EventCategory) -> Severity {
        severity_for(category, &self.current.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_codes_round_trip_through_code() {
        for code in [64u16, 65, 66, 67, 128, 129, 130, 131, 144, 145, 256, 257, 258, 259, 2048] {
            let kind = classify(code);
            assert!(kind.is_supported(), "code {} should be supported", code);
            assert_eq!(kind.code(), code);
        }
        assert_eq!(classify(TRAP_SM_CONNECTION_LOST), TrapKind::SmConnectionLost);
    }

    #[test]
    fn test_unknown_code_is_unsupported_not_a_failure() {
        let kind = classify(9999);
        assert_eq!(kind, TrapKind::Unsupported(9999));
        assert_eq!(kind.category(), None);
        assert_eq!(kind.to_string(), "UNSUPPORTED(9999)");
    }

    #[test]
    fn test_classification_is_idempotent() {
        for code in [0u16, 64, 128, 259, 0xFF02, u16::MAX] {
            assert_eq!(classify(code), classify(code));
        }
    }

    #[test]
    fn test_categories() {
        assert_eq!(TrapKind::LinkIntegrity.category(), Some(EventCategory::LinkIntegrity));
        assert_eq!(TrapKind::SwitchBadPKey.category(), Some(EventCategory::SecurityViolation));
        assert_eq!(TrapKind::GidOutOfService.category(), Some(EventCategory::PortInactive));
        assert!(TrapKind::LinkPortChangeState.affects_neighbors());
        assert!(!TrapKind::BadPKey.affects_neighbors());
    }

    #[test]
    fn test_override_takes_precedence_and_reverts() {
        let overrides = SeverityOverrides::default();
        assert_eq!(overrides.severity_for(EventCategory::LinkIntegrity), Severity::Warning);

        overrides.replace(HashMap::from([(EventCategory::LinkIntegrity, Severity::Critical)]));
        assert_eq!(overrides.severity_for(EventCategory::LinkIntegrity), Severity::Critical);
        assert_eq!(overrides.severity_for(EventCategory::PortActive), Severity::Info);

        overrides.replace(HashMap::new());
        assert_eq!(overrides.severity_for(EventCategory::LinkIntegrity), Severity::Warning);
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_replace() {
        let overrides = SeverityOverrides::new(HashMap::from([(EventCategory::PortActive, Severity::Error)]));
        let held = overrides.snapshot();
        overrides.replace(HashMap::new());
        assert_eq!(severity_for(EventCategory::PortActive, &held), Severity::Error);
        assert!(overrides.snapshot().is_empty());
    }
}

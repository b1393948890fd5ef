//! Fabric fixture: the domains, topology and pending notices the daemon
//! serves from memory.

use anyhow::{Context, Result};
use notice_core::{DomainSnapshot, MemoryFabric, MemoryPerformanceMonitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

fn default_sweep() -> u32 {
    2
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricFixture {
    #[serde(default = "default_sweep")]
    pub sweep_interval_secs: u32,
    pub domains: BTreeMap<String, DomainSnapshot>,
}

impl FabricFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading fixture {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing fixture {}", path.display()))
    }

    /// Seeds `fabric` and returns the domain names plus a monitor with the
    /// fixture's sweep interval.
    pub fn install(self, fabric: &MemoryFabric) -> (Vec<String>, MemoryPerformanceMonitor) {
        let names: Vec<String> = self.domains.keys().cloned().collect();
        for (name, snapshot) in self.domains {
            fabric.add_domain(&name, snapshot);
        }
        (names, MemoryPerformanceMonitor::new(self.sweep_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notice_core::NoticeStatus;

    #[test]
    fn test_bundled_fixture_installs() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/fabric.json");
        let fixture = FabricFixture::load(&path).unwrap();
        let fabric = MemoryFabric::new();
        let (names, _monitor) = fixture.install(&fabric);
        assert_eq!(names, fabric.domains());
        assert!(!names.is_empty());
        let pending = fabric.notices(&names[0]);
        assert!(pending.iter().all(|n| n.status == NoticeStatus::Received));
    }

    #[test]
    fn test_missing_fixture_has_context() {
        let err = FabricFixture::load(Path::new("/no/fixture.json")).unwrap_err();
        assert!(err.to_string().contains("reading fixture"));
    }
}

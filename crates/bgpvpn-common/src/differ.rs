//! Attribute-level differences between two BGPVPN snapshots.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::error::{DriverError, DriverResult};
use crate::types::Bgpvpn;

/// Attributes whose change never requires a metadata update.
pub const ATTRIBUTES_TO_IGNORE: [&str; 3] = ["name", "tenant_id", "project_id"];

/// Keys added, removed or changed between an old and a new snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BgpvpnDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub changed: BTreeSet<String>,
}

impl BgpvpnDiff {
    /// Computes the difference between `old` and `new`.
    ///
    /// Unset optional attributes are absent from a snapshot, so setting one
    /// shows up as `added` and unsetting it as `removed`.
    pub fn between(old: &Bgpvpn, new: &Bgpvpn) -> DriverResult<Self> {
        let old = to_object(old)?;
        let new = to_object(new)?;

        let mut diff = Self::default();
        for (key, value) in &new {
            match old.get(key) {
                None => {
                    diff.added.insert(key.clone());
                }
                Some(previous) if previous != value => {
                    diff.changed.insert(key.clone());
                }
                Some(_) => {}
            }
        }
        for key in old.keys() {
            if !new.contains_key(key) {
                diff.removed.insert(key.clone());
            }
        }
        Ok(diff)
    }

    /// Union of added, removed and changed keys
    pub fn moving_keys(&self) -> BTreeSet<String> {
        self.added
            .iter()
            .chain(&self.removed)
            .chain(&self.changed)
            .cloned()
            .collect()
    }

    /// Moving keys that affect the EVPN metadata
    pub fn significant_keys(&self) -> BTreeSet<String> {
        self.moving_keys()
            .into_iter()
            .filter(|k| !ATTRIBUTES_TO_IGNORE.contains(&k.as_str()))
            .collect()
    }

    /// Returns true if nothing but cosmetic attributes moved
    pub fn is_cosmetic(&self) -> bool {
        self.significant_keys().is_empty()
    }
}

fn to_object(bgpvpn: &Bgpvpn) -> DriverResult<Map<String, Value>> {
    match serde_json::to_value(bgpvpn) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DriverError::malformed(
            "bgpvpn",
            format!("expected an object, got {}", other),
        )),
        Err(e) => Err(DriverError::malformed("bgpvpn", e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Bgpvpn {
        Bgpvpn::new("v1", "l3")
            .with_name("blue")
            .with_vni(100)
            .with_route_targets(["65000:1"])
            .with_network("n1")
    }

    #[test]
    fn test_identical() {
        let diff = BgpvpnDiff::between(&base(), &base()).unwrap();
        assert!(diff.moving_keys().is_empty());
        assert!(diff.is_cosmetic());
    }

    #[test]
    fn test_rename_is_cosmetic() {
        let new = base().with_name("green").with_project("p2");
        let diff = BgpvpnDiff::between(&base(), &new).unwrap();
        assert_eq!(
            diff.changed,
            ["name", "project_id", "tenant_id"]
                .iter()
                .map(|s| s.to_string())
                .collect::<BTreeSet<String>>()
        );
        assert!(diff.is_cosmetic());
    }

    #[test]
    fn test_changed_route_targets() {
        let new = base().with_route_targets(["65000:2"]);
        let diff = BgpvpnDiff::between(&base(), &new).unwrap();
        assert!(diff.changed.contains("route_targets"));
        assert!(!diff.is_cosmetic());
    }

    #[test]
    fn test_added_and_removed_optional() {
        let old = base();
        let new = base().with_local_pref(200);
        let diff = BgpvpnDiff::between(&old, &new).unwrap();
        assert!(diff.added.contains("local_pref"));

        let diff = BgpvpnDiff::between(&new, &old).unwrap();
        assert!(diff.removed.contains("local_pref"));
        assert_eq!(diff.significant_keys().len(), 1);
    }

    #[test]
    fn test_association_change_is_significant() {
        let new = base().with_router("r1");
        let diff = BgpvpnDiff::between(&base(), &new).unwrap();
        assert!(diff.changed.contains("routers"));
        assert!(!diff.is_cosmetic());
    }
}

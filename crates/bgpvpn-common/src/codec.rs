//! Metadata codec.
//!
//! Maps a [`Bgpvpn`] snapshot to the flat string map stored in a logical
//! switch's `external_ids`, and back. No I/O happens here.

use std::collections::BTreeMap;

use crate::error::{DriverError, DriverResult};
use crate::keys::*;
use crate::types::{Bgpvpn, BgpvpnType, OVN_DRIVER_NAME};

/// Key/value attribute bag of a metadata object.
pub type ExternalIds = BTreeMap<String, String>;

/// EVPN configuration recovered from an attribute bag.
///
/// List attributes absent from the bag decode as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvpnConfig {
    pub vpn_type: BgpvpnType,
    pub vni: u32,
    pub bgp_as: Option<String>,
    pub route_targets: Vec<String>,
    pub import_targets: Vec<String>,
    pub export_targets: Vec<String>,
    pub route_distinguishers: Vec<String>,
    pub local_pref: Option<u32>,
}

/// Builds the EVPN attribute bag for a BGPVPN.
///
/// Fails only if the BGPVPN carries no VNI.
pub fn build(bgpvpn: &Bgpvpn) -> DriverResult<ExternalIds> {
    let vni = bgpvpn
        .vni
        .ok_or_else(|| DriverError::missing_attribute(OVN_DRIVER_NAME, EVPN_VNI))?;

    let mut ids = ExternalIds::new();
    ids.insert(EVPN_TYPE.to_string(), bgpvpn.vpn_type.clone());
    ids.insert(EVPN_VNI.to_string(), vni.to_string());

    if let Some(bgp_as) = bgp_as(&bgpvpn.route_targets) {
        ids.insert(EVPN_BGP_AS.to_string(), bgp_as.to_string());
    }

    for (key, values) in [
        (EVPN_ROUTE_TARGETS, &bgpvpn.route_targets),
        (EVPN_IMPORT_TARGETS, &bgpvpn.import_targets),
        (EVPN_EXPORT_TARGETS, &bgpvpn.export_targets),
        (EVPN_ROUTE_DISTINGUISHERS, &bgpvpn.route_distinguishers),
    ] {
        if !values.is_empty() {
            ids.insert(key.to_string(), encode_list(key, values)?);
        }
    }

    if let Some(local_pref) = bgpvpn.local_pref {
        ids.insert(EVPN_LOCAL_PREF.to_string(), local_pref.to_string());
    }

    Ok(ids)
}

/// Decodes EVPN configuration from an attribute bag.
///
/// Returns `Ok(None)` when no VNI is present (not configured). Unrelated keys
/// are ignored. A malformed list or local preference is an error.
pub fn parse(ids: &ExternalIds) -> DriverResult<Option<EvpnConfig>> {
    let Some(raw_vni) = ids.get(EVPN_VNI) else {
        return Ok(None);
    };

    let vpn_type = match ids.get(EVPN_TYPE) {
        Some(raw) => raw
            .parse::<BgpvpnType>()
            .map_err(|_| DriverError::malformed(EVPN_TYPE, format!("unknown type '{}'", raw)))?,
        None => BgpvpnType::L3,
    };

    let local_pref = ids
        .get(EVPN_LOCAL_PREF)
        .map(|raw| {
            raw.parse::<u32>()
                .map_err(|e| DriverError::malformed(EVPN_LOCAL_PREF, e.to_string()))
        })
        .transpose()?;

    Ok(Some(EvpnConfig {
        vpn_type,
        vni: raw_vni.parse().unwrap_or(0),
        bgp_as: ids.get(EVPN_BGP_AS).cloned(),
        route_targets: decode_list(ids, EVPN_ROUTE_TARGETS)?,
        import_targets: decode_list(ids, EVPN_IMPORT_TARGETS)?,
        export_targets: decode_list(ids, EVPN_EXPORT_TARGETS)?,
        route_distinguishers: decode_list(ids, EVPN_ROUTE_DISTINGUISHERS)?,
        local_pref,
    }))
}

/// Returns every key [`build`] may write, for exhaustive clearing.
pub fn key_set() -> &'static [&'static str] {
    &EVPN_KEYS
}

/// Returns the EVPN subset of an attribute bag.
pub fn evpn_subset(ids: &ExternalIds) -> ExternalIds {
    ids.iter()
        .filter(|(k, _)| EVPN_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Returns true if the bag carries EVPN configuration, i.e. a VNI.
///
/// Matches [`parse`]: a bag without `vni` is not configured, whatever other
/// keys it holds.
pub fn is_configured(ids: &ExternalIds) -> bool {
    ids.contains_key(EVPN_VNI)
}

fn bgp_as(route_targets: &[String]) -> Option<&str> {
    route_targets
        .first()
        .and_then(|rt| rt.split_once(':'))
        .map(|(asn, _)| asn)
}

fn encode_list(key: &str, values: &[String]) -> DriverResult<String> {
    serde_json::to_string(values).map_err(|e| DriverError::malformed(key, e.to_string()))
}

fn decode_list(ids: &ExternalIds, key: &str) -> DriverResult<Vec<String>> {
    match ids.get(key) {
        Some(raw) => {
            serde_json::from_str(raw).map_err(|e| DriverError::malformed(key, e.to_string()))
        }
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(pairs: &[(&str, &str)]) -> ExternalIds {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_build_minimal() {
        let vpn = Bgpvpn::new("v1", "l3")
            .with_vni(5000)
            .with_route_targets(["65000:1"]);

        assert_eq!(
            build(&vpn).unwrap(),
            ids(&[
                ("type", "l3"),
                ("vni", "5000"),
                ("route_targets", "[\"65000:1\"]"),
                ("bgp_as", "65000"),
            ])
        );
    }

    #[test]
    fn test_build_full() {
        let vpn = Bgpvpn::new("v1", "l2")
            .with_vni(100)
            .with_route_targets(["64512:10", "64512:11"])
            .with_import_targets(["64512:20"])
            .with_export_targets(["64512:30"])
            .with_route_distinguishers(["10.0.0.1:5"])
            .with_local_pref(0);

        let built = build(&vpn).unwrap();
        assert_eq!(built.get("bgp_as").map(String::as_str), Some("64512"));
        assert_eq!(
            built.get("route_targets").map(String::as_str),
            Some("[\"64512:10\",\"64512:11\"]")
        );
        assert_eq!(
            built.get("route_distinguishers").map(String::as_str),
            Some("[\"10.0.0.1:5\"]")
        );
        assert_eq!(built.get("local_pref").map(String::as_str), Some("0"));
        assert_eq!(built.len(), 8);
    }

    #[test]
    fn test_build_skips_empty_lists() {
        let vpn = Bgpvpn::new("v1", "l3").with_vni(7);
        let built = build(&vpn).unwrap();
        assert_eq!(built, ids(&[("type", "l3"), ("vni", "7")]));
        assert!(!built.contains_key("import_targets"));
        assert!(!built.contains_key("bgp_as"));
        assert!(!built.contains_key("local_pref"));
    }

    #[test]
    fn test_build_bgp_as_requires_colon() {
        let vpn = Bgpvpn::new("v1", "l3")
            .with_vni(7)
            .with_route_targets(["garbage"]);
        let built = build(&vpn).unwrap();
        assert!(!built.contains_key("bgp_as"));
        assert!(built.contains_key("route_targets"));
    }

    #[test]
    fn test_build_bgp_as_ip_form() {
        let vpn = Bgpvpn::new("v1", "l3")
            .with_vni(7)
            .with_route_targets(["192.0.2.1:100"]);
        let built = build(&vpn).unwrap();
        assert_eq!(built.get("bgp_as").map(String::as_str), Some("192.0.2.1"));
    }

    #[test]
    fn test_build_requires_vni() {
        let vpn = Bgpvpn::new("v1", "l3");
        assert!(matches!(
            build(&vpn),
            Err(DriverError::MissingRequiredAttribute { .. })
        ));
    }

    #[test]
    fn test_parse_round_trip() {
        let vpn = Bgpvpn::new("v1", "L3")
            .with_vni(16_777_215)
            .with_route_targets(["65000:1", "65000:2"])
            .with_export_targets(["65000:3"])
            .with_local_pref(4_294_967_295);

        let config = parse(&build(&vpn).unwrap()).unwrap().unwrap();
        assert_eq!(config.vpn_type, BgpvpnType::L3);
        assert_eq!(config.vni, 16_777_215);
        assert_eq!(config.route_targets, vpn.route_targets);
        assert_eq!(config.export_targets, vpn.export_targets);
        assert!(config.import_targets.is_empty());
        assert_eq!(config.local_pref, Some(4_294_967_295));
        assert_eq!(config.bgp_as.as_deref(), Some("65000"));
    }

    #[test]
    fn test_parse_not_configured() {
        let bag = ids(&[("neutron:network_name", "private"), ("type", "l3")]);
        assert_eq!(parse(&bag).unwrap(), None);
    }

    #[test]
    fn test_parse_defaults() {
        let config = parse(&ids(&[("vni", "not-a-number")])).unwrap().unwrap();
        assert_eq!(config.vpn_type, BgpvpnType::L3);
        assert_eq!(config.vni, 0);
        assert_eq!(config.local_pref, None);
    }

    #[test]
    fn test_parse_malformed_list() {
        let bag = ids(&[("vni", "10"), ("import_targets", "[65000:1")]);
        assert!(matches!(
            parse(&bag),
            Err(DriverError::MalformedMetadata { ref key, .. }) if key == "import_targets"
        ));
    }

    #[test]
    fn test_parse_malformed_local_pref() {
        let bag = ids(&[("vni", "10"), ("local_pref", "-1")]);
        assert!(parse(&bag).is_err());
    }

    #[test]
    fn test_key_set_covers_build() {
        let vpn = Bgpvpn::new("v1", "l2")
            .with_vni(1)
            .with_route_targets(["1:1"])
            .with_import_targets(["1:2"])
            .with_export_targets(["1:3"])
            .with_route_distinguishers(["1:4"])
            .with_local_pref(1);
        for key in build(&vpn).unwrap().keys() {
            assert!(key_set().contains(&key.as_str()), "missing {}", key);
        }
        assert_eq!(key_set().len(), 8);
    }

    #[test]
    fn test_evpn_subset() {
        let bag = ids(&[
            ("neutron:network_name", "private"),
            ("vni", "10"),
            ("type", "l3"),
        ]);
        assert_eq!(evpn_subset(&bag), ids(&[("type", "l3"), ("vni", "10")]));
        assert!(is_configured(&bag));
        assert!(!is_configured(&ids(&[("neutron:revision_number", "3")])));
        assert!(!is_configured(&ids(&[("type", "router")])));
    }
}

//! Topology mirror in a Redis database.
//!
//! Each object is a hash `<TABLE>|<id>`. List-valued fields are stored as
//! JSON arrays of strings.

use std::collections::HashMap;

use async_trait::async_trait;
use bgpvpn_common::keys;
use bgpvpn_common::{Bgpvpn, DriverError, DriverResult, Port, Router, Subnet};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use super::{BgpvpnFilter, PortFilter, TopologyQuery};
use crate::config::TopologyConfig;
use crate::tables::{
    fields, TABLE_SEPARATOR, TOPO_BGPVPN_TABLE_NAME, TOPO_PORT_TABLE_NAME,
    TOPO_ROUTER_TABLE_NAME, TOPO_SUBNET_TABLE_NAME,
};

type FieldMap = HashMap<String, String>;

/// Topology queries against the mirror database.
pub struct RedisTopology {
    connection: ConnectionManager,
}

impl RedisTopology {
    pub async fn connect(config: &TopologyConfig) -> DriverResult<Self> {
        let uri = config.uri();
        let client = redis::Client::open(uri.clone())
            .map_err(|e| DriverError::topology("connect", e.to_string()))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| DriverError::topology("connect", e.to_string()))?;

        info!("Connected to topology mirror: {}", uri);
        Ok(Self { connection })
    }

    async fn fetch(&self, table: &str, id: &str) -> DriverResult<Option<FieldMap>> {
        let mut conn = self.connection.clone();
        let key = format!("{}{}{}", table, TABLE_SEPARATOR, id);
        let values: FieldMap = conn
            .hgetall(&key)
            .await
            .map_err(|e| DriverError::topology(format!("HGETALL {}", key), e.to_string()))?;
        Ok((!values.is_empty()).then_some(values))
    }

    /// Every object of `table`, sorted by id
    async fn fetch_all(&self, table: &str) -> DriverResult<Vec<(String, FieldMap)>> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}{}*", table, TABLE_SEPARATOR);
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await
            .map_err(|e| DriverError::topology(format!("KEYS {}", pattern), e.to_string()))?;

        let mut ids: Vec<String> = keys
            .iter()
            .filter_map(|k| id_from_key(table, k))
            .map(str::to_string)
            .collect();
        ids.sort_unstable();

        let mut objects = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(values) = self.fetch(table, &id).await? {
                objects.push((id, values));
            }
        }
        debug!("Read {} objects from {}", objects.len(), table);
        Ok(objects)
    }
}

fn id_from_key<'a>(table: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(table)?.strip_prefix(TABLE_SEPARATOR)
}

fn text(values: &FieldMap, field: &str) -> String {
    values.get(field).cloned().unwrap_or_default()
}

fn list(values: &FieldMap, field: &str) -> DriverResult<Vec<String>> {
    match values.get(field).map(String::as_str) {
        None | Some("") => Ok(Vec::new()),
        Some(raw) => {
            serde_json::from_str(raw).map_err(|e| DriverError::malformed(field, e.to_string()))
        }
    }
}

fn number(values: &FieldMap, field: &str) -> DriverResult<Option<u32>> {
    match values.get(field).map(String::as_str) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| DriverError::malformed(field, format!("not a number: {}", raw))),
    }
}

fn bgpvpn_from_fields(id: &str, values: &FieldMap) -> DriverResult<Bgpvpn> {
    Ok(Bgpvpn {
        id: id.to_string(),
        name: text(values, fields::NAME),
        vpn_type: text(values, keys::EVPN_TYPE),
        vni: number(values, keys::EVPN_VNI)?,
        route_targets: list(values, keys::EVPN_ROUTE_TARGETS)?,
        import_targets: list(values, keys::EVPN_IMPORT_TARGETS)?,
        export_targets: list(values, keys::EVPN_EXPORT_TARGETS)?,
        route_distinguishers: list(values, keys::EVPN_ROUTE_DISTINGUISHERS)?,
        local_pref: number(values, keys::EVPN_LOCAL_PREF)?,
        networks: list(values, fields::NETWORKS)?,
        routers: list(values, fields::ROUTERS)?,
        ports: list(values, fields::PORTS)?,
        project_id: text(values, fields::PROJECT_ID),
        tenant_id: text(values, fields::TENANT_ID),
    })
}

fn port_from_fields(id: &str, values: &FieldMap) -> DriverResult<Port> {
    Ok(Port {
        id: id.to_string(),
        network_id: text(values, fields::NETWORK_ID),
        device_id: text(values, fields::DEVICE_ID),
        device_owner: text(values, fields::DEVICE_OWNER),
        subnet_ids: list(values, fields::SUBNET_IDS)?,
    })
}

fn router_from_fields(id: &str, values: &FieldMap) -> Router {
    Router {
        id: id.to_string(),
        name: text(values, fields::NAME),
    }
}

fn subnet_from_fields(id: &str, values: &FieldMap) -> Subnet {
    Subnet {
        id: id.to_string(),
        network_id: text(values, fields::NETWORK_ID),
    }
}

#[async_trait]
impl TopologyQuery for RedisTopology {
    async fn get_router(&self, router_id: &str) -> DriverResult<Option<Router>> {
        Ok(self
            .fetch(TOPO_ROUTER_TABLE_NAME, router_id)
            .await?
            .map(|v| router_from_fields(router_id, &v)))
    }

    async fn list_ports(&self, filter: &PortFilter) -> DriverResult<Vec<Port>> {
        let mut ports = Vec::new();
        for (id, values) in self.fetch_all(TOPO_PORT_TABLE_NAME).await? {
            let port = port_from_fields(&id, &values)?;
            if filter.matches(&port) {
                ports.push(port);
            }
        }
        Ok(ports)
    }

    async fn get_subnet(&self, subnet_id: &str) -> DriverResult<Option<Subnet>> {
        Ok(self
            .fetch(TOPO_SUBNET_TABLE_NAME, subnet_id)
            .await?
            .map(|v| subnet_from_fields(subnet_id, &v)))
    }

    async fn get_bgpvpn(&self, bgpvpn_id: &str) -> DriverResult<Option<Bgpvpn>> {
        self.fetch(TOPO_BGPVPN_TABLE_NAME, bgpvpn_id)
            .await?
            .map(|v| bgpvpn_from_fields(bgpvpn_id, &v))
            .transpose()
    }

    async fn list_bgpvpns(&self, filter: &BgpvpnFilter) -> DriverResult<Vec<Bgpvpn>> {
        let mut bgpvpns = Vec::new();
        for (id, values) in self.fetch_all(TOPO_BGPVPN_TABLE_NAME).await? {
            let bgpvpn = bgpvpn_from_fields(&id, &values)?;
            if filter.matches(&bgpvpn) {
                bgpvpns.push(bgpvpn);
            }
        }
        Ok(bgpvpns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_bgpvpn_from_fields() {
        let values = map(&[
            ("name", "blue"),
            ("type", "l3"),
            ("vni", "5000"),
            ("route_targets", r#"["65000:1"]"#),
            ("networks", r#"["n1","n2"]"#),
            ("routers", ""),
            ("project_id", "p1"),
            ("tenant_id", "p1"),
        ]);
        let vpn = bgpvpn_from_fields("v1", &values).unwrap();
        assert_eq!(
            vpn,
            Bgpvpn::new("v1", "l3")
                .with_name("blue")
                .with_vni(5000)
                .with_route_targets(["65000:1"])
                .with_network("n1")
                .with_network("n2")
                .with_project("p1")
        );
    }

    #[test]
    fn test_bgpvpn_bad_fields() {
        let values = map(&[("type", "l3"), ("vni", "many")]);
        assert!(matches!(
            bgpvpn_from_fields("v1", &values),
            Err(DriverError::MalformedMetadata { .. })
        ));

        let values = map(&[("type", "l3"), ("networks", "n1,n2")]);
        assert!(bgpvpn_from_fields("v1", &values).is_err());
    }

    #[test]
    fn test_port_from_fields() {
        let values = map(&[
            ("network_id", "n1"),
            ("device_id", "r1"),
            ("device_owner", "network:router_interface"),
            ("subnet_ids", r#"["s1"]"#),
        ]);
        let port = port_from_fields("p1", &values).unwrap();
        assert_eq!(port, Port::router_interface("p1", "r1", "n1", "s1"));
    }

    #[test]
    fn test_id_from_key() {
        assert_eq!(id_from_key("PORT", "PORT|p1"), Some("p1"));
        assert_eq!(id_from_key("PORT", "ROUTER|r1"), None);
    }
}

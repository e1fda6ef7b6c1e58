//! Redis metadata backend.
//!
//! A logical switch `<name>` of table `<table>` is stored as two hashes:
//!
//! - `<table>|<name>` holding the row columns (`_uuid`, `name`)
//! - `<table>|<name>|external_ids` holding the attribute bag
//!
//! Transactions run as a Lua script so the existence check and every key
//! operation execute atomically on the server.

use std::collections::HashMap;

use async_trait::async_trait;
use bgpvpn_common::codec::ExternalIds;
use bgpvpn_common::{DriverError, DriverResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, instrument};

use super::{ExternalIdsOp, LogicalSwitch, MetadataBackend};
use crate::config::StoreConfig;
use crate::tables::{fields, EXTERNAL_IDS_SUFFIX, TABLE_SEPARATOR};

const OP_SET: &str = "set";
const OP_REMOVE: &str = "del";

/// Aborts with 0 if the row is gone or was recreated under a new uuid.
const TRANSACT_SCRIPT: &str = r#"
if redis.call('exists', KEYS[1]) == 0 then
    return 0
end
if ARGV[1] ~= '' and redis.call('hget', KEYS[1], '_uuid') ~= ARGV[1] then
    return 0
end
for i = 2, #ARGV, 3 do
    if ARGV[i] == 'set' then
        redis.call('hset', KEYS[2], ARGV[i + 1], ARGV[i + 2])
    else
        redis.call('hdel', KEYS[2], ARGV[i + 1])
    end
end
return 1
"#;

/// Metadata backend on a Redis database.
pub struct RedisBackend {
    connection: ConnectionManager,
    table_name: String,
}

impl RedisBackend {
    /// Connects to the database described by `config`.
    pub async fn connect(config: &StoreConfig) -> DriverResult<Self> {
        let uri = config.uri();
        let client = redis::Client::open(uri.clone())
            .map_err(|e| DriverError::store_transaction(&uri, e.to_string()))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| DriverError::store_transaction(&uri, e.to_string()))?;

        info!(
            "Connected to metadata store: {} (table={})",
            uri, config.table_name
        );

        Ok(Self {
            connection,
            table_name: config.table_name.clone(),
        })
    }

    fn row_key(&self, name: &str) -> String {
        row_key(&self.table_name, name)
    }
}

fn row_key(table: &str, name: &str) -> String {
    format!("{}{}{}", table, TABLE_SEPARATOR, name)
}

fn external_ids_key(table: &str, name: &str) -> String {
    format!(
        "{}{}{}",
        row_key(table, name),
        TABLE_SEPARATOR,
        EXTERNAL_IDS_SUFFIX
    )
}

/// Row name of a row key, `None` for external_ids hashes and foreign keys
fn name_from_key<'a>(table: &str, key: &'a str) -> Option<&'a str> {
    let name = key.strip_prefix(table)?.strip_prefix(TABLE_SEPARATOR)?;
    (!name.contains(TABLE_SEPARATOR)).then_some(name)
}

/// Flattens ops into script arguments: `op, key, value` per operation
fn script_args(uuid: &str, ops: &[ExternalIdsOp]) -> Vec<String> {
    let mut args = Vec::with_capacity(1 + ops.len() * 3);
    args.push(uuid.to_string());
    for op in ops {
        match op {
            ExternalIdsOp::Set { key, value } => {
                args.extend([OP_SET.to_string(), key.clone(), value.clone()]);
            }
            ExternalIdsOp::Remove { key } => {
                args.extend([OP_REMOVE.to_string(), key.clone(), String::new()]);
            }
        }
    }
    args
}

#[async_trait]
impl MetadataBackend for RedisBackend {
    #[instrument(skip(self))]
    async fn lookup(&self, logical_name: &str) -> DriverResult<Option<LogicalSwitch>> {
        let mut conn = self.connection.clone();
        let err =
            |e: redis::RedisError| DriverError::store_transaction(logical_name, e.to_string());

        let row: HashMap<String, String> = conn
            .hgetall(self.row_key(logical_name))
            .await
            .map_err(err)?;
        if row.is_empty() {
            return Ok(None);
        }

        let external_ids: ExternalIds = conn
            .hgetall(external_ids_key(&self.table_name, logical_name))
            .await
            .map_err(err)?;

        Ok(Some(LogicalSwitch {
            uuid: row.get(fields::UUID).cloned().unwrap_or_default(),
            name: logical_name.to_string(),
            external_ids,
        }))
    }

    #[instrument(skip(self, row, ops), fields(logical_switch = %row.name, ops = ops.len()))]
    async fn transact(&self, row: &LogicalSwitch, ops: &[ExternalIdsOp]) -> DriverResult<()> {
        let mut conn = self.connection.clone();
        let script = redis::Script::new(TRANSACT_SCRIPT);

        let committed: i64 = script
            .key(self.row_key(&row.name))
            .key(external_ids_key(&self.table_name, &row.name))
            .arg(script_args(&row.uuid, ops))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| DriverError::store_transaction(&row.name, e.to_string()))?;

        if committed == 0 {
            return Err(DriverError::store_transaction(
                &row.name,
                "row no longer exists",
            ));
        }
        debug!("external_ids transaction committed");
        Ok(())
    }

    async fn list_rows(&self) -> DriverResult<Vec<LogicalSwitch>> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}{}*", self.table_name, TABLE_SEPARATOR);
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await
            .map_err(|e| DriverError::store_transaction(&pattern, e.to_string()))?;

        let mut names: Vec<&str> = keys
            .iter()
            .filter_map(|k| name_from_key(&self.table_name, k))
            .collect();
        names.sort_unstable();

        let mut rows = Vec::with_capacity(names.len());
        for name in names {
            if let Some(row) = self.lookup(name).await? {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

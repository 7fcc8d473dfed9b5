// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The metadata repository.
//!
//! All catalog reads and writes go through [`MetadataStorage`], which owns
//! the injected session for one logical caller. The repository recovers
//! locally from the transient read-only window after a failover (bounded
//! retry) and wraps multi-statement cascades in a transaction so no partial
//! state is ever observable from another session.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use mysql_async::Value;
use tokio::time;
use tracing::{debug, info, warn};

use crate::models::{
    Cluster, Document, HostInfo, Instance, InstanceRecord, ReplicaSet, TopologyType,
};
use crate::schema::{METADATA_SCHEMA, METADATA_SCHEMA_DDL};
use crate::session::{ResultSet, SqlSession};
use crate::{
    credentials, quote_literal, MetadataError, CR_SERVER_GONE_ERROR, ER_DUP_ENTRY,
    ER_NO_SUCH_TABLE, ER_OPTION_PREVENTS_STATEMENT,
};

/// How many times to attempt a statement that keeps failing because the
/// server is super-read-only.
pub const MAX_READ_ONLY_RETRIES: usize = 10;

const READ_ONLY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Catalog repository over a single injected session.
#[derive(Debug)]
pub struct MetadataStorage {
    session: Box<dyn SqlSession>,
}

impl MetadataStorage {
    pub fn new(session: Box<dyn SqlSession>) -> Self {
        Self { session }
    }

    /// Executes one statement on the session.
    ///
    /// A connection-level failure is fatal and reported as
    /// [`MetadataError::Inaccessible`]; there is no point retrying on a dead
    /// session. When `retry_on_read_only` is set, a statement rejected with
    /// server error 1290 (super_read_only enforced, the usual state right
    /// after a failover while a new primary is promoted) is retried after a
    /// one second pause, up to [`MAX_READ_ONLY_RETRIES`] attempts in total;
    /// when the attempts are exhausted the server error propagates.
    ///
    /// When `redacted` is supplied it is what appears in the log instead of
    /// the statement text; secret-bearing statements must pass one.
    pub async fn execute_sql_with(
        &mut self,
        sql: &str,
        retry_on_read_only: bool,
        redacted: Option<&str>,
    ) -> Result<ResultSet, MetadataError> {
        debug!(sql = redacted.unwrap_or(sql), "executing metadata statement");
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.session.execute(sql).await {
                Ok(result) => return Ok(result),
                Err(mysql_async::Error::Server(e))
                    if retry_on_read_only
                        && e.code == ER_OPTION_PREVENTS_STATEMENT
                        && attempts < MAX_READ_ONLY_RETRIES =>
                {
                    info!("metadata server is super-read-only ({}); retrying in 1s", e);
                    time::sleep(READ_ONLY_RETRY_DELAY).await;
                }
                Err(e) => return Err(classify(e)),
            }
        }
    }

    pub async fn execute_sql(&mut self, sql: &str) -> Result<ResultSet, MetadataError> {
        self.execute_sql_with(sql, false, None).await
    }

    /// Runs `f` inside a transaction: all of its statements become visible to
    /// other sessions atomically, or not at all. On error the transaction is
    /// rolled back (best effort; the original error wins) and the error is
    /// returned. Nesting is not supported.
    pub async fn transact<T, F>(&mut self, f: F) -> Result<T, MetadataError>
    where
        T: Send,
        F: for<'a> FnOnce(&'a mut MetadataStorage) -> BoxFuture<'a, Result<T, MetadataError>>,
    {
        self.execute_sql("START TRANSACTION").await?;
        match f(self).await {
            Ok(value) => {
                self.execute_sql("COMMIT").await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.execute_sql("ROLLBACK").await {
                    warn!(
                        error = %rollback_err,
                        "rollback failed after aborted metadata transaction"
                    );
                }
                Err(e)
            }
        }
    }

    /// Reports whether the catalog schema exists. The one catalog read that
    /// does not itself require the schema.
    pub async fn schema_exists(&mut self) -> Result<bool, MetadataError> {
        let result = self
            .execute_sql(&format!(
                "SELECT SCHEMA_NAME FROM information_schema.schemata \
                 WHERE SCHEMA_NAME = {}",
                quote_literal(METADATA_SCHEMA)
            ))
            .await?;
        Ok(result.first().is_some())
    }

    /// Creates the catalog schema if it is absent. Idempotent.
    pub async fn create_schema(&mut self) -> Result<(), MetadataError> {
        if self.schema_exists().await? {
            // TODO: check the recorded schema version here and migrate once
            // a second version of the catalog model exists.
            return Ok(());
        }
        for stmt in METADATA_SCHEMA_DDL {
            self.execute_sql(stmt).await?;
        }
        Ok(())
    }

    pub async fn drop_schema(&mut self) -> Result<(), MetadataError> {
        self.execute_sql(&format!("DROP DATABASE {}", METADATA_SCHEMA))
            .await?;
        Ok(())
    }

    async fn require_schema(&mut self) -> Result<(), MetadataError> {
        if self.schema_exists().await? {
            Ok(())
        } else {
            Err(MetadataError::SchemaMissing)
        }
    }

    /// Looks up a cluster id by name. Returns 0 when no such cluster exists;
    /// the engine never generates 0 for an AUTO_INCREMENT id.
    pub async fn get_cluster_id(&mut self, cluster_name: &str) -> Result<u64, MetadataError> {
        self.require_schema().await?;
        let result = self
            .execute_sql(&format!(
                "SELECT cluster_id FROM {}.clusters WHERE cluster_name = {}",
                METADATA_SCHEMA,
                quote_literal(cluster_name)
            ))
            .await?;
        Ok(result.first().and_then(|row| value_to_u64(&row[0])).unwrap_or(0))
    }

    /// Looks up the owning cluster id of a replica set. Returns 0 when the
    /// replica set is unknown.
    pub async fn get_cluster_id_for_replicaset(
        &mut self,
        rs_id: u64,
    ) -> Result<u64, MetadataError> {
        self.require_schema().await?;
        let result = self
            .execute_sql(&format!(
                "SELECT cluster_id FROM {}.replicasets WHERE replicaset_id = {}",
                METADATA_SCHEMA, rs_id
            ))
            .await?;
        Ok(result.first().and_then(|row| value_to_u64(&row[0])).unwrap_or(0))
    }

    pub async fn cluster_exists(&mut self, cluster_name: &str) -> Result<bool, MetadataError> {
        Ok(self.get_cluster_id(cluster_name).await? != 0)
    }

    /// Inserts a cluster row and assigns the generated id back onto
    /// `cluster`. A name collision is reported as
    /// [`MetadataError::DuplicateName`], classified on the server's duplicate
    /// entry error code rather than its message text.
    pub async fn insert_cluster(&mut self, cluster: &mut Cluster) -> Result<(), MetadataError> {
        self.require_schema().await?;
        let stmt = format!(
            "INSERT INTO {}.clusters (cluster_name, description, options, attributes) \
             VALUES ({}, {}, {}, {})",
            METADATA_SCHEMA,
            quote_literal(&cluster.name),
            quote_literal(&cluster.description),
            quote_literal(&document_to_json(&cluster.options)),
            quote_literal(&document_to_json(&cluster.attributes)),
        );
        let result = match self.execute_sql(&stmt).await {
            Ok(result) => result,
            Err(MetadataError::Sql(mysql_async::Error::Server(e)))
                if e.code == ER_DUP_ENTRY =>
            {
                debug!("a cluster with the name '{}' already exists", cluster.name);
                return Err(MetadataError::DuplicateName(cluster.name.clone()));
            }
            Err(e) => return Err(e),
        };
        cluster.id = result.last_insert_id.unwrap_or(0);
        Ok(())
    }

    /// Inserts a replica set row, assigns the generated id back onto
    /// `replicaset`, and points the owning cluster's default replica set at
    /// it when `is_default` is set. An adopted replica set (taken over from a
    /// pre-existing topology rather than created fresh) is stamped with an
    /// `adopted` attribute.
    pub async fn insert_replicaset(
        &mut self,
        replicaset: &mut ReplicaSet,
        is_default: bool,
        is_adopted: bool,
    ) -> Result<(), MetadataError> {
        let attributes = if is_adopted {
            "JSON_OBJECT('adopted', 'true')".to_string()
        } else {
            quote_literal("{}")
        };
        let result = self
            .execute_sql(&format!(
                "INSERT INTO {}.replicasets \
                 (cluster_id, replicaset_type, topology_type, replicaset_name, active, attributes) \
                 VALUES ({}, 'gr', {}, {}, 1, {})",
                METADATA_SCHEMA,
                replicaset.cluster_id,
                quote_literal(replicaset.topology_type.as_str()),
                quote_literal(&replicaset.name),
                attributes,
            ))
            .await?;
        replicaset.id = result.last_insert_id.unwrap_or(0);
        if is_adopted {
            replicaset
                .attributes
                .insert("adopted".into(), serde_json::Value::String("true".into()));
        }

        if is_default {
            self.execute_sql(&format!(
                "UPDATE {}.clusters SET default_replicaset = {} WHERE cluster_id = {}",
                METADATA_SCHEMA, replicaset.id, replicaset.cluster_id
            ))
            .await?;
        }
        Ok(())
    }

    /// Registers a host, or returns the id of the existing registration. A
    /// host is identified by its name or by a non-empty IP address, so
    /// re-registering is idempotent. The insert path retries on read-only:
    /// host registration is exactly the kind of write that races a failover.
    pub async fn insert_host(&mut self, host: &HostInfo) -> Result<u64, MetadataError> {
        let result = self
            .execute_sql(&format!(
                "SELECT host_id, host_name, ip_address FROM {}.hosts \
                 WHERE host_name = {} OR (ip_address <> '' AND ip_address = {})",
                METADATA_SCHEMA,
                quote_literal(&host.host_name),
                quote_literal(&host.ip_address),
            ))
            .await?;
        if let Some(host_id) = result.first().and_then(|row| value_to_u64(&row[0])) {
            info!(
                "found host entry {} in metadata for host {} ({})",
                host_id, host.host_name, host.ip_address
            );
            return Ok(host_id);
        }

        let stmt = format!(
            "INSERT INTO {}.hosts (host_name, ip_address, location) VALUES ({}, {}, {})",
            METADATA_SCHEMA,
            quote_literal(&host.host_name),
            quote_literal(&host.ip_address),
            quote_literal(&host.location),
        );
        let result = self.execute_sql_with(&stmt, true, None).await?;
        Ok(result.last_insert_id.unwrap_or(0))
    }

    /// Registers an instance on a replica set, building its three-endpoint
    /// addresses document.
    pub async fn insert_instance(
        &mut self,
        instance: &Instance,
        host_id: u64,
        rs_id: u64,
    ) -> Result<(), MetadataError> {
        self.execute_sql(&format!(
            "INSERT INTO {}.instances \
             (host_id, replicaset_id, mysql_server_uuid, instance_name, role, addresses, attributes) \
             VALUES ({}, {}, {}, {}, {}, \
             JSON_OBJECT('mysqlClassic', {}, 'mysqlX', {}, 'grLocal', {}), {})",
            METADATA_SCHEMA,
            host_id,
            rs_id,
            quote_literal(&instance.server_uuid),
            quote_literal(&instance.label),
            quote_literal(&instance.role),
            quote_literal(&instance.endpoint),
            quote_literal(&instance.xendpoint),
            quote_literal(&instance.grendpoint),
            quote_literal(&document_to_json(&instance.attributes)),
        ))
        .await?;
        Ok(())
    }

    /// Removes an instance, matched on its classic protocol endpoint.
    pub async fn remove_instance(&mut self, instance_address: &str) -> Result<(), MetadataError> {
        self.execute_sql(&format!(
            "DELETE FROM {}.instances WHERE addresses->>'$.mysqlClassic' = {}",
            METADATA_SCHEMA,
            quote_literal(instance_address)
        ))
        .await?;
        Ok(())
    }

    /// Drops a cluster. The cluster must exist and must have no replica sets
    /// left.
    pub async fn drop_cluster(&mut self, cluster_name: &str) -> Result<(), MetadataError> {
        self.require_schema().await?;
        let cluster_id = self.get_cluster_id(cluster_name).await?;
        if cluster_id == 0 {
            return Err(MetadataError::UnknownCluster(cluster_name.to_string()));
        }

        let result = self
            .execute_sql(&format!(
                "SELECT replicaset_id FROM {}.replicasets WHERE cluster_id = {}",
                METADATA_SCHEMA, cluster_id
            ))
            .await?;
        if result.first().is_some() {
            return Err(MetadataError::PreconditionFailed(format!(
                "the cluster with the name '{}' is not empty",
                cluster_name
            )));
        }

        self.execute_sql(&format!(
            "DELETE FROM {}.clusters WHERE cluster_id = {}",
            METADATA_SCHEMA, cluster_id
        ))
        .await?;
        Ok(())
    }

    /// True iff no replica set of the cluster carries a name other than
    /// `"default"`.
    pub async fn cluster_has_default_replicaset_only(
        &mut self,
        cluster_name: &str,
    ) -> Result<bool, MetadataError> {
        self.require_schema().await?;
        let cluster_id = self.get_cluster_id(cluster_name).await?;
        let result = self
            .execute_sql(&format!(
                "SELECT COUNT(*) AS count FROM {}.replicasets \
                 WHERE cluster_id = {} AND replicaset_name <> 'default'",
                METADATA_SCHEMA, cluster_id
            ))
            .await?;
        Ok(count_of(&result) == 0)
    }

    pub async fn is_cluster_empty(&mut self, cluster_id: u64) -> Result<bool, MetadataError> {
        let result = self
            .execute_sql(&format!(
                "SELECT COUNT(*) AS count FROM {}.replicasets WHERE cluster_id = {}",
                METADATA_SCHEMA, cluster_id
            ))
            .await?;
        Ok(count_of(&result) == 0)
    }

    /// Drops a replica set: its instances are deleted, the row itself is
    /// deleted, and if it was the owning cluster's default replica set that
    /// reference is nulled out. One transaction; a mid-cascade failure leaves
    /// the catalog exactly as it was.
    pub async fn drop_replicaset(&mut self, rs_id: u64) -> Result<(), MetadataError> {
        self.require_schema().await?;
        self.transact(move |this| {
            async move {
                let result = this
                    .execute_sql(&format!(
                        "SELECT replicaset_name FROM {}.replicasets WHERE replicaset_id = {}",
                        METADATA_SCHEMA, rs_id
                    ))
                    .await?;
                let rs_name = result
                    .first()
                    .and_then(|row| value_to_string(&row[0]))
                    .unwrap_or_default();

                if rs_name == "default" {
                    let cluster_id = this.get_cluster_id_for_replicaset(rs_id).await?;
                    this.execute_sql(&format!(
                        "UPDATE {}.clusters SET default_replicaset = NULL WHERE cluster_id = {}",
                        METADATA_SCHEMA, cluster_id
                    ))
                    .await?;
                }

                this.execute_sql(&format!(
                    "DELETE FROM {}.instances WHERE replicaset_id = {}",
                    METADATA_SCHEMA, rs_id
                ))
                .await?;
                this.execute_sql(&format!(
                    "DELETE FROM {}.replicasets WHERE replicaset_id = {}",
                    METADATA_SCHEMA, rs_id
                ))
                .await?;
                Ok(())
            }
            .boxed()
        })
        .await
    }

    pub async fn disable_replicaset(&mut self, rs_id: u64) -> Result<(), MetadataError> {
        self.require_schema().await?;
        self.execute_sql(&format!(
            "UPDATE {}.replicasets SET active = 0 WHERE replicaset_id = {}",
            METADATA_SCHEMA, rs_id
        ))
        .await?;
        Ok(())
    }

    pub async fn is_replicaset_active(&mut self, rs_id: u64) -> Result<bool, MetadataError> {
        self.require_schema().await?;
        let result = self
            .execute_sql(&format!(
                "SELECT active FROM {}.replicasets WHERE replicaset_id = {}",
                METADATA_SCHEMA, rs_id
            ))
            .await?;
        Ok(result.first().and_then(|row| value_to_u64(&row[0])) == Some(1))
    }

    /// Reads the replication group identifier off the live engine.
    pub async fn get_replicaset_group_name(&mut self) -> Result<Option<String>, MetadataError> {
        let result = self
            .execute_sql("SELECT @@group_replication_group_name")
            .await?;
        Ok(result.first().and_then(|row| value_to_string(&row[0])))
    }

    /// Persists the replication group identifier onto the replica set's
    /// attributes, both in the catalog and on the in-memory record.
    pub async fn set_replicaset_group_name(
        &mut self,
        replicaset: &mut ReplicaSet,
        group_name: &str,
    ) -> Result<(), MetadataError> {
        self.execute_sql(&format!(
            "UPDATE {}.replicasets \
             SET attributes = JSON_SET(attributes, '$.group_replication_group_name', {}) \
             WHERE replicaset_id = {}",
            METADATA_SCHEMA,
            quote_literal(group_name),
            replicaset.id
        ))
        .await?;
        replicaset.attributes.insert(
            "group_replication_group_name".into(),
            serde_json::Value::String(group_name.into()),
        );
        Ok(())
    }

    pub async fn get_replicaset(&mut self, rs_id: u64) -> Result<ReplicaSet, MetadataError> {
        self.require_schema().await?;
        let result = self
            .execute_sql(&format!(
                "SELECT replicaset_name, topology_type, cluster_id, active, attributes \
                 FROM {}.replicasets WHERE replicaset_id = {}",
                METADATA_SCHEMA, rs_id
            ))
            .await?;
        let row = match result.first() {
            Some(row) => row,
            None => return Err(MetadataError::UnknownReplicaSet(rs_id)),
        };
        let topology_type = value_to_string(&row[1])
            .as_deref()
            .and_then(|tag| tag.parse().ok())
            .unwrap_or(TopologyType::SinglePrimary);
        Ok(ReplicaSet {
            id: rs_id,
            cluster_id: value_to_u64(&row[2]).unwrap_or(0),
            name: value_to_string(&row[0]).unwrap_or_default(),
            topology_type,
            active: value_to_u64(&row[3]) == Some(1),
            attributes: value_to_document(&row[4]),
        })
    }

    /// Runs the shared cluster query with one WHERE condition and builds a
    /// [`Cluster`] from the row, if any. A failure caused by the catalog
    /// table itself being missing is reported as
    /// [`MetadataError::SchemaMissing`] rather than surfaced raw.
    async fn get_cluster_matching(
        &mut self,
        condition: &str,
    ) -> Result<Option<Cluster>, MetadataError> {
        let stmt = format!(
            "SELECT cluster_id, cluster_name, default_replicaset, description, options, attributes \
             FROM {}.clusters WHERE {}",
            METADATA_SCHEMA, condition
        );
        let result = match self.execute_sql(&stmt).await {
            Ok(result) => result,
            Err(MetadataError::Sql(mysql_async::Error::Server(e)))
                if e.code == ER_NO_SUCH_TABLE =>
            {
                debug!("metadata schema does not exist");
                return Err(MetadataError::SchemaMissing);
            }
            Err(e) => return Err(e),
        };
        let row = match result.first() {
            Some(row) => row,
            None => return Ok(None),
        };
        Ok(Some(Cluster {
            id: value_to_u64(&row[0]).unwrap_or(0),
            name: value_to_string(&row[1]).unwrap_or_default(),
            default_replicaset: value_to_u64(&row[2]),
            description: value_to_string(&row[3]).unwrap_or_default(),
            options: value_to_document(&row[4]),
            attributes: value_to_document(&row[5]),
        }))
    }

    pub async fn get_cluster(&mut self, cluster_name: &str) -> Result<Cluster, MetadataError> {
        let condition = format!("cluster_name = {}", quote_literal(cluster_name));
        self.get_cluster_matching(&condition)
            .await?
            .ok_or_else(|| MetadataError::UnknownCluster(cluster_name.to_string()))
    }

    /// The cluster whose attributes carry the `default` flag, if any.
    pub async fn get_default_cluster(&mut self) -> Result<Option<Cluster>, MetadataError> {
        self.get_cluster_matching("attributes->'$.default' = true")
            .await
    }

    pub async fn has_default_cluster(&mut self) -> Result<bool, MetadataError> {
        if !self.schema_exists().await? {
            return Ok(false);
        }
        let result = self
            .execute_sql(&format!(
                "SELECT cluster_id FROM {}.clusters WHERE attributes->'$.default' = true",
                METADATA_SCHEMA
            ))
            .await?;
        Ok(result.first().is_some())
    }

    pub async fn is_replicaset_empty(&mut self, rs_id: u64) -> Result<bool, MetadataError> {
        let result = self
            .execute_sql(&format!(
                "SELECT COUNT(*) AS count FROM {}.instances WHERE replicaset_id = {}",
                METADATA_SCHEMA, rs_id
            ))
            .await?;
        Ok(count_of(&result) == 0)
    }

    pub async fn is_instance_on_replicaset(
        &mut self,
        rs_id: u64,
        address: &str,
    ) -> Result<bool, MetadataError> {
        let result = self
            .execute_sql(&format!(
                "SELECT COUNT(*) AS count FROM {}.instances \
                 WHERE replicaset_id = {} AND addresses->>'$.mysqlClassic' = {}",
                METADATA_SCHEMA,
                rs_id,
                quote_literal(address)
            ))
            .await?;
        Ok(count_of(&result) == 1)
    }

    /// Classic endpoint of an ONLINE member of the replica set, found by
    /// joining the catalog against the engine's live group membership view.
    /// This is how a caller locates a reachable node when the node it was
    /// configured with may be gone.
    pub async fn get_seed_instance(&mut self, rs_id: u64) -> Result<Option<String>, MetadataError> {
        self.require_schema().await?;
        let result = self
            .execute_sql(&format!(
                "SELECT JSON_UNQUOTE(i.addresses->'$.mysqlClassic') AS address \
                 FROM performance_schema.replication_group_members g \
                 JOIN {}.instances i ON g.member_id = i.mysql_server_uuid \
                 WHERE g.member_state = 'ONLINE' AND i.replicaset_id = {}",
                METADATA_SCHEMA, rs_id
            ))
            .await?;
        Ok(result.first().and_then(|row| value_to_string(&row[0])))
    }

    /// Every instance registered on the replica set.
    pub async fn get_replicaset_instances(
        &mut self,
        rs_id: u64,
    ) -> Result<Vec<InstanceRecord>, MetadataError> {
        let result = self
            .execute_sql(&format!(
                "SELECT mysql_server_uuid, instance_name, role, \
                 JSON_UNQUOTE(JSON_EXTRACT(addresses, '$.mysqlClassic')) AS host \
                 FROM {}.instances WHERE replicaset_id = {}",
                METADATA_SCHEMA, rs_id
            ))
            .await?;
        Ok(instance_records(&result))
    }

    /// The subset of the replica set's instances that the engine's live
    /// membership view reports as ONLINE.
    pub async fn get_replicaset_online_instances(
        &mut self,
        rs_id: u64,
    ) -> Result<Vec<InstanceRecord>, MetadataError> {
        let result = self
            .execute_sql(&format!(
                "SELECT mysql_server_uuid, instance_name, role, \
                 JSON_UNQUOTE(JSON_EXTRACT(addresses, '$.mysqlClassic')) AS host \
                 FROM performance_schema.replication_group_members g \
                 JOIN {}.instances i ON g.member_id = i.mysql_server_uuid \
                 WHERE g.member_state = 'ONLINE' AND replicaset_id = {}",
                METADATA_SCHEMA, rs_id
            ))
            .await?;
        Ok(instance_records(&result))
    }

    /// Generates a replication account and creates it on the server, inside
    /// a transaction. The account is replicated to every member of the
    /// replica set, so a joining instance can connect to any of them for
    /// recovery. Returns `(username, password)`; the CREATE USER statement is
    /// logged with the password starred out.
    pub async fn create_repl_account(&mut self) -> Result<(String, String), MetadataError> {
        let password = credentials::generate_password(credentials::PASSWORD_LENGTH);
        let username = credentials::replication_account_name();

        let drop_stmt = format!("DROP USER IF EXISTS {}", username);
        // The password alphabet contains no quote or backslash characters,
        // so it can be embedded in the literal unchanged.
        let create_stmt = format!(
            "CREATE USER IF NOT EXISTS {} IDENTIFIED BY '{}'",
            username, password
        );
        let create_redacted = format!(
            "CREATE USER IF NOT EXISTS {} IDENTIFIED BY '{}'",
            username,
            "*".repeat(password.len())
        );
        let grant_stmt = format!("GRANT REPLICATION SLAVE ON *.* TO {}", username);

        self.transact(move |this| {
            async move {
                this.execute_sql(&drop_stmt).await?;
                this.execute_sql_with(&create_stmt, false, Some(&create_redacted))
                    .await?;
                this.execute_sql(&grant_stmt).await?;
                Ok(())
            }
            .boxed()
        })
        .await?;

        Ok((username, password))
    }
}

/// Sorts a session error into the caller-facing taxonomy: connection-level
/// failures become [`MetadataError::Inaccessible`], everything else passes
/// through for the caller (or a more specific classifier) to interpret.
fn classify(e: mysql_async::Error) -> MetadataError {
    match e {
        mysql_async::Error::Server(ref server) if server.code == CR_SERVER_GONE_ERROR => {
            debug!("the cluster metadata is inaccessible: {}", server);
            MetadataError::Inaccessible(e)
        }
        mysql_async::Error::Driver(_) | mysql_async::Error::Io(_) => {
            debug!("the cluster metadata is inaccessible: {}", e);
            MetadataError::Inaccessible(e)
        }
        other => MetadataError::Sql(other),
    }
}

fn count_of(result: &ResultSet) -> u64 {
    result
        .first()
        .and_then(|row| value_to_u64(&row[0]))
        .unwrap_or(0)
}

fn instance_records(result: &ResultSet) -> Vec<InstanceRecord> {
    result
        .rows
        .iter()
        .map(|row| InstanceRecord {
            server_uuid: value_to_string(&row[0]).unwrap_or_default(),
            label: value_to_string(&row[1]).unwrap_or_default(),
            role: value_to_string(&row[2]).unwrap_or_default(),
            classic_address: value_to_string(&row[3]).unwrap_or_default(),
        })
        .collect()
}

fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Int(i) => u64::try_from(*i).ok(),
        Value::UInt(u) => Some(*u),
        // The text protocol returns numeric columns as bytes.
        Value::Bytes(b) => std::str::from_utf8(b).ok()?.parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::Int(i) => Some(i.to_string()),
        Value::UInt(u) => Some(u.to_string()),
        _ => None,
    }
}

fn value_to_document(value: &Value) -> Document {
    match value {
        Value::Bytes(b) => serde_json::from_slice(b).unwrap_or_default(),
        _ => Document::new(),
    }
}

fn document_to_json(document: &Document) -> String {
    serde_json::Value::Object(document.clone()).to_string()
}

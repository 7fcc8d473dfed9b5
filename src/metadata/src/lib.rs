// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Durable storage for the cluster topology metadata.
//!
//! The metadata catalog records the *intended* replication topology of a
//! managed cluster: which clusters exist, which replica sets belong to them,
//! and which server instances belong to each replica set. The catalog lives
//! in a fixed-name schema on one of the managed servers itself, so every
//! operation here has to tolerate the brief read-only window that follows a
//! failover while a new primary is being promoted.

mod session;
pub use session::{MySqlSession, ResultSet, SqlSession};

mod storage;
pub use storage::{MetadataStorage, MAX_READ_ONLY_RETRIES};

mod models;
pub use models::{
    Cluster, Document, HostInfo, Instance, InstanceRecord, ReplicaSet, TopologyType,
};

pub mod schema;
pub use schema::{METADATA_SCHEMA, METADATA_SCHEMA_DDL};

mod credentials;
pub use credentials::{generate_password, replication_account_name, PASSWORD_LENGTH};

/// Errors surfaced by the metadata repository.
///
/// Engine error text is only used internally to classify a failure; what a
/// caller sees is one of these categorized, human-readable conditions.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The session to the metadata server is dead. Fatal to the current
    /// operation; never retried.
    #[error("the cluster metadata is inaccessible")]
    Inaccessible(#[source] mysql_async::Error),
    #[error("metadata schema does not exist")]
    SchemaMissing,
    #[error("a cluster with the name '{0}' already exists")]
    DuplicateName(String),
    #[error("the cluster with the name '{0}' does not exist")]
    UnknownCluster(String),
    #[error("unknown replica set {0}")]
    UnknownReplicaSet(u64),
    /// An invariant check failed before the operation ran, e.g. dropping a
    /// cluster that still has replica sets.
    #[error("{0}")]
    PreconditionFailed(String),
    /// Any other engine error, propagated unchanged.
    #[error(transparent)]
    Sql(#[from] mysql_async::Error),
}

// https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html#error_er_option_prevents_statement
// Raised for any statement rejected while the server is super_read_only,
// which is the normal state of a member right after a failover.
pub const ER_OPTION_PREVENTS_STATEMENT: u16 = 1290;

// https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html#error_er_dup_entry
pub const ER_DUP_ENTRY: u16 = 1062;

// https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html#error_er_no_such_table
pub const ER_NO_SUCH_TABLE: u16 = 1146;

// https://dev.mysql.com/doc/mysql-errors/8.0/en/client-error-reference.html#error_cr_server_gone_error
pub const CR_SERVER_GONE_ERROR: u16 = 2006;

/// Quotes MySQL identifiers. [See MySQL quote_identifier()](https://github.com/mysql/mysql-sys/blob/master/functions/quote_identifier.sql)
pub fn quote_identifier(identifier: &str) -> String {
    let mut escaped = identifier.replace("`", "``");
    escaped.insert(0, '`');
    escaped.push('`');
    escaped
}

/// Quotes a string value for direct inclusion in a statement.
///
/// The session seam takes whole statements rather than statements plus
/// parameters, so values are escaped here. NO_BACKSLASH_ESCAPES is not
/// supported on the metadata session.
pub fn quote_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('\'');
    for c in value.chars() {
        match c {
            '\'' => escaped.push_str("''"),
            '\\' => escaped.push_str("\\\\"),
            c => escaped.push(c),
        }
    }
    escaped.push('\'');
    escaped
}

#[cfg(test)]
mod tests {
    use super::{quote_identifier, quote_literal};

    #[test]
    fn test_identifier_quoting() {
        let expected = vec!["`a`", "`naughty``sql`", "```;naughty;sql;```"];
        let input = ["a", "naughty`sql", "`;naughty;sql;`"]
            .iter()
            .map(|raw_str| quote_identifier(raw_str))
            .collect::<Vec<_>>();
        assert_eq!(expected, input);
    }

    #[test]
    fn test_literal_quoting() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal(r"back\slash"), r"'back\\slash'");
        assert_eq!(quote_literal(""), "''");
    }
}

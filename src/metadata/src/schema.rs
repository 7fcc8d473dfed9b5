// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The catalog schema.
//!
//! The DDL is carried as an ordered sequence of independent statements, not
//! one blob split on a textual delimiter, so a `;` inside string or comment
//! content can never corrupt the split. `create_schema` executes them in
//! order; statements must not assume a session default database.

/// Name of the fixed catalog schema. Its existence is the precondition for
/// every catalog operation except schema creation itself.
pub const METADATA_SCHEMA: &str = "gradmin_cluster_metadata";

/// The full catalog DDL, in execution order.
pub const METADATA_SCHEMA_DDL: &[&str] = &[
    "CREATE DATABASE gradmin_cluster_metadata",
    "CREATE TABLE gradmin_cluster_metadata.clusters (
        cluster_id INT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
        cluster_name VARCHAR(40) NOT NULL,
        default_replicaset INT UNSIGNED,
        description TEXT,
        options JSON,
        attributes JSON,
        UNIQUE KEY cluster_name (cluster_name)
    ) CHARACTER SET utf8mb4",
    "CREATE TABLE gradmin_cluster_metadata.replicasets (
        replicaset_id INT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
        cluster_id INT UNSIGNED NOT NULL,
        replicaset_type VARCHAR(20) NOT NULL,
        topology_type VARCHAR(20) NOT NULL,
        replicaset_name VARCHAR(40) NOT NULL,
        active TINYINT(1) NOT NULL,
        attributes JSON,
        FOREIGN KEY (cluster_id)
            REFERENCES gradmin_cluster_metadata.clusters (cluster_id)
    ) CHARACTER SET utf8mb4",
    "ALTER TABLE gradmin_cluster_metadata.clusters
        ADD FOREIGN KEY (default_replicaset)
        REFERENCES gradmin_cluster_metadata.replicasets (replicaset_id)",
    "CREATE TABLE gradmin_cluster_metadata.hosts (
        host_id INT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
        host_name VARCHAR(256),
        ip_address VARCHAR(45),
        location VARCHAR(256) NOT NULL
    ) CHARACTER SET utf8mb4",
    "CREATE TABLE gradmin_cluster_metadata.instances (
        instance_id INT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
        host_id INT UNSIGNED NOT NULL,
        replicaset_id INT UNSIGNED NOT NULL,
        mysql_server_uuid VARCHAR(40) NOT NULL,
        instance_name VARCHAR(256) NOT NULL,
        role VARCHAR(20),
        addresses JSON,
        attributes JSON,
        UNIQUE KEY mysql_server_uuid (mysql_server_uuid),
        FOREIGN KEY (host_id)
            REFERENCES gradmin_cluster_metadata.hosts (host_id),
        FOREIGN KEY (replicaset_id)
            REFERENCES gradmin_cluster_metadata.replicasets (replicaset_id)
    ) CHARACTER SET utf8mb4",
];

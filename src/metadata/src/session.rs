// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The session seam between the repository and the server.
//!
//! The repository never talks to `mysql_async` directly; it goes through
//! [`SqlSession`] so tests can substitute a scripted session and so no
//! process-wide "current session" singleton is ever needed. A handle is
//! injected when the repository is constructed and shared by every call on
//! that repository.

use std::fmt::Debug;

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Value};

/// The subset of a result a metadata operation cares about: the raw rows and
/// the generated id, if any.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub rows: Vec<Vec<Value>>,
    pub last_insert_id: Option<u64>,
    pub affected_rows: u64,
}

impl ResultSet {
    /// Returns the first row, if the result has one.
    pub fn first(&self) -> Option<&Vec<Value>> {
        self.rows.first()
    }
}

/// A single session to the metadata server.
///
/// Statements issued on one session are executed in submission order, which
/// the transaction scope in the repository relies on.
#[async_trait]
pub trait SqlSession: Debug + Send {
    /// Executes one statement and drains its result completely.
    async fn execute(&mut self, sql: &str) -> Result<ResultSet, mysql_async::Error>;
}

/// A [`SqlSession`] backed by a live `mysql_async` connection.
#[derive(Debug)]
pub struct MySqlSession {
    conn: Conn,
}

impl MySqlSession {
    pub fn new(conn: Conn) -> Self {
        Self { conn }
    }

    pub async fn disconnect(self) -> Result<(), mysql_async::Error> {
        self.conn.disconnect().await
    }
}

#[async_trait]
impl SqlSession for MySqlSession {
    async fn execute(&mut self, sql: &str) -> Result<ResultSet, mysql_async::Error> {
        let rows: Vec<mysql_async::Row> = self.conn.query(sql).await?;
        Ok(ResultSet {
            rows: rows.into_iter().map(|row| row.unwrap()).collect(),
            last_insert_id: self.conn.last_insert_id(),
            affected_rows: self.conn.affected_rows(),
        })
    }
}

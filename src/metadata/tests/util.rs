// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A scripted session for driving the repository without a server.
//!
//! Responses are consumed in statement order; once the script runs dry every
//! further statement succeeds with an empty result. Every statement text is
//! recorded for assertions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mysql_async::{ServerError, Value};

use gradmin_metadata::{ResultSet, SqlSession, METADATA_SCHEMA};

type Responses = Arc<Mutex<VecDeque<Result<ResultSet, mysql_async::Error>>>>;
type Statements = Arc<Mutex<Vec<String>>>;

/// Test-side handle on a [`ScriptedSession`] that has been handed to the
/// repository.
pub struct Script {
    responses: Responses,
    statements: Statements,
}

impl Script {
    pub fn push_ok(&self, result: ResultSet) {
        self.responses.lock().unwrap().push_back(Ok(result));
    }

    pub fn push_err(&self, err: mysql_async::Error) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[derive(Debug)]
struct ScriptedSession {
    responses: Responses,
    statements: Statements,
}

#[async_trait]
impl SqlSession for ScriptedSession {
    async fn execute(&mut self, sql: &str) -> Result<ResultSet, mysql_async::Error> {
        self.statements.lock().unwrap().push(sql.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ResultSet::default()))
    }
}

pub fn scripted() -> (Script, Box<dyn SqlSession>) {
    let responses: Responses = Arc::default();
    let statements: Statements = Arc::default();
    let session = ScriptedSession {
        responses: Arc::clone(&responses),
        statements: Arc::clone(&statements),
    };
    (
        Script {
            responses,
            statements,
        },
        Box::new(session),
    )
}

pub fn bytes(s: &str) -> Value {
    Value::Bytes(s.as_bytes().to_vec())
}

pub fn row(values: Vec<Value>) -> ResultSet {
    ResultSet {
        rows: vec![values],
        ..Default::default()
    }
}

pub fn rows(rows: Vec<Vec<Value>>) -> ResultSet {
    ResultSet {
        rows,
        ..Default::default()
    }
}

pub fn insert_id(id: u64) -> ResultSet {
    ResultSet {
        last_insert_id: Some(id),
        ..Default::default()
    }
}

/// The response `schema_exists` sees when the catalog schema is present.
pub fn schema_row() -> ResultSet {
    row(vec![bytes(METADATA_SCHEMA)])
}

pub fn server_error(code: u16, message: &str) -> mysql_async::Error {
    mysql_async::Error::Server(ServerError {
        code,
        message: message.into(),
        state: "HY000".into(),
    })
}

/// Captured log output, for asserting what does (and does not) reach the
/// log.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Installs a debug-level subscriber writing into the returned capture, in
/// effect until the returned guard is dropped.
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer({
            let capture = capture.clone();
            move || capture.clone()
        })
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

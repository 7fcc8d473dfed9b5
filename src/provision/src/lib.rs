// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Driver for the external cluster provisioning tool.
//!
//! Topology-changing intents (bootstrap a replica set, join or remove a
//! member, manage local sandbox instances) are carried out by an external
//! provisioning executable. This crate translates each intent into an
//! invocation of that executable and its structured output back into a
//! caller-facing result. It deliberately does not interpret *why* a topology
//! change failed and it never retries: blindly re-driving a membership change
//! is unsafe without first re-checking the catalog and the live membership,
//! which is the calling orchestration's job.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

mod interface;
pub use interface::ProvisioningInterface;

/// Errors in driving the provisioning process itself.
///
/// Problems the tool *reports* (as opposed to problems running the tool) are
/// not errors at this level; they come back in
/// [`ProvisionOutcome::errors`].
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The executable could not be launched. Fatal to the call, never
    /// retried.
    #[error("failed to launch provisioning tool '{command}'")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// The tool emitted a structured line that could not be decoded.
    #[error("provisioning tool produced malformed output: {0}")]
    MalformedOutput(String),
    /// I/O failure while feeding the tool or draining its output.
    #[error("error communicating with provisioning tool")]
    Io(#[from] std::io::Error),
}

/// Severity tag on a structured line of provisioning tool output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
    #[serde(other)]
    Other,
}

impl MessageKind {
    pub fn is_error(&self) -> bool {
        matches!(self, MessageKind::Error | MessageKind::Fatal)
    }
}

/// One structured record reported by the provisioning tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub msg: String,
}

/// Result of one provisioning operation: the tool's exit status plus every
/// error record it reported. A non-zero status is always returned alongside
/// whatever errors were parsed, never swallowed.
#[derive(Debug, Clone, Default)]
pub struct ProvisionOutcome {
    /// Process exit status; 0 is success.
    pub status: i32,
    pub errors: Vec<ProvisionMessage>,
}

impl ProvisionOutcome {
    pub fn success(&self) -> bool {
        self.status == 0 && self.errors.is_empty()
    }
}

/// Connection coordinates of one server instance. Passwords travel
/// separately, over the tool's stdin, and are never part of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceTarget {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl InstanceTarget {
    pub fn new(user: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for InstanceTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// TLS material for connecting to an instance. Every entry is optional; an
/// absent entry simply adds no flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

impl TlsOptions {
    /// Expands the present entries into `{prefix}-ca=`, `{prefix}-cert=` and
    /// `{prefix}-key=` flags. The prefix distinguishes the joining instance's
    /// material from the peer's.
    fn append_args(&self, prefix: &str, args: &mut Vec<String>) {
        if let Some(ca) = &self.ca {
            args.push(format!("{}-ca={}", prefix, ca.display()));
        }
        if let Some(cert) = &self.cert {
            args.push(format!("{}-cert={}", prefix, cert.display()));
        }
        if let Some(key) = &self.key {
            args.push(format!("{}-key={}", prefix, key.display()));
        }
    }
}

/// Requested SSL mode for group replication channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disabled,
    Preferred,
    Required,
    VerifyCa,
    VerifyIdentity,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disabled => "DISABLED",
            SslMode::Preferred => "PREFERRED",
            SslMode::Required => "REQUIRED",
            SslMode::VerifyCa => "VERIFY_CA",
            SslMode::VerifyIdentity => "VERIFY_IDENTITY",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for creating a local disposable sandbox instance.
#[derive(Debug, Clone, Default)]
pub struct SandboxOptions {
    pub port: u16,
    /// X protocol port; defaults inside the tool when absent.
    pub xport: Option<u16>,
    pub sandbox_dir: PathBuf,
    /// Extra my.cnf option lines to apply to the sandbox.
    pub mycnf_options: Vec<String>,
    pub ignore_ssl_error: bool,
}

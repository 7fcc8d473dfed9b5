// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Invocation of the provisioning executable.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::{debug, error, info, warn};

use crate::{
    InstanceTarget, MessageKind, ProvisionError, ProvisionMessage, ProvisionOutcome,
    SandboxOptions, SslMode, TlsOptions,
};

/// Handle on the external provisioning tool.
///
/// One operation maps to one subprocess invocation. The driver blocks until
/// the child exits and its output is drained in full; it applies no timeout
/// of its own, so a caller that needs one must enforce it around the call.
#[derive(Debug)]
pub struct ProvisioningInterface {
    command: PathBuf,
    verbose: u8,
}

impl ProvisioningInterface {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            verbose: 0,
        }
    }

    /// Controls how much of the tool's own diagnostic stream is echoed to
    /// the log. 0 echoes structured warnings only; 1 and up also echo
    /// informational records, raw output lines and stderr; each further
    /// level adds a `--verbose` flag to the tool itself.
    pub fn set_verbose(&mut self, verbose: u8) {
        self.verbose = verbose;
    }

    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    /// Validates that an instance is fit to join or operate in a replica
    /// set.
    pub async fn check(
        &self,
        instance: &InstanceTarget,
        password: &str,
        tls: &TlsOptions,
        cnf_path: Option<&Path>,
        update: bool,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let mut args = vec![format!("--instance={}", instance)];
        tls.append_args("--ssl", &mut args);
        if let Some(path) = cnf_path {
            args.push(format!("--defaults-file={}", path.display()));
        }
        if update {
            args.push("--update".into());
        }
        self.execute("check", args, &[password.into()]).await
    }

    pub async fn create_sandbox(
        &self,
        options: &SandboxOptions,
        root_password: &str,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let mut args = sandbox_args(options.port, &options.sandbox_dir);
        if let Some(xport) = options.xport {
            args.push(format!("--xport={}", xport));
        }
        for opt in &options.mycnf_options {
            args.push(format!("--opt={}", opt));
        }
        if options.ignore_ssl_error {
            args.push("--ignore-ssl-error".into());
        }
        self.execute("sandbox-create", args, &[root_password.into()])
            .await
    }

    pub async fn delete_sandbox(
        &self,
        port: u16,
        sandbox_dir: &Path,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        self.execute("sandbox-delete", sandbox_args(port, sandbox_dir), &[])
            .await
    }

    pub async fn kill_sandbox(
        &self,
        port: u16,
        sandbox_dir: &Path,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        self.execute("sandbox-kill", sandbox_args(port, sandbox_dir), &[])
            .await
    }

    pub async fn stop_sandbox(
        &self,
        port: u16,
        sandbox_dir: &Path,
        root_password: &str,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        self.execute(
            "sandbox-stop",
            sandbox_args(port, sandbox_dir),
            &[root_password.into()],
        )
        .await
    }

    pub async fn start_sandbox(
        &self,
        port: u16,
        sandbox_dir: &Path,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        self.execute("sandbox-start", sandbox_args(port, sandbox_dir), &[])
            .await
    }

    /// Bootstraps a new replica set on a single instance.
    #[allow(clippy::too_many_arguments)]
    pub async fn start_replicaset(
        &self,
        instance: &InstanceTarget,
        tls: &TlsOptions,
        repl_user: &str,
        super_user_password: &str,
        repl_user_password: &str,
        multi_primary: bool,
        ssl_mode: SslMode,
        ip_allowlist: &str,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let args = start_replicaset_args(instance, tls, repl_user, multi_primary, ssl_mode, ip_allowlist);
        self.execute(
            "start-replicaset",
            args,
            &[super_user_password.into(), repl_user_password.into()],
        )
        .await
    }

    /// Adds an instance to an existing replica set, seeded from `peer`.
    #[allow(clippy::too_many_arguments)]
    pub async fn join_replicaset(
        &self,
        instance: &InstanceTarget,
        tls: &TlsOptions,
        repl_user: &str,
        peer: &InstanceTarget,
        peer_tls: &TlsOptions,
        super_user_password: &str,
        repl_user_password: &str,
        ssl_mode: SslMode,
        ip_allowlist: &str,
        group_seeds: &str,
        skip_repl_user: bool,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let args = join_replicaset_args(
            instance,
            tls,
            repl_user,
            peer,
            peer_tls,
            ssl_mode,
            ip_allowlist,
            group_seeds,
            skip_repl_user,
        );
        self.execute(
            "join-replicaset",
            args,
            &[super_user_password.into(), repl_user_password.into()],
        )
        .await
    }

    /// Removes an instance from its replica set.
    pub async fn leave_replicaset(
        &self,
        instance: &InstanceTarget,
        tls: &TlsOptions,
        super_user_password: &str,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let mut args = vec![format!("--instance={}", instance)];
        tls.append_args("--ssl", &mut args);
        self.execute("leave-replicaset", args, &[super_user_password.into()])
            .await
    }

    /// Spawns one invocation of the tool and blocks until it exits.
    ///
    /// Secrets go to the child's stdin, one per line, never into argv; the
    /// argv only carries a `--stdin-pw` marker per secret so the tool knows
    /// how many lines to read.
    async fn execute(
        &self,
        operation: &str,
        args: Vec<String>,
        secrets: &[String],
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let mut cmd = Command::new(&self.command);
        cmd.arg(operation);
        cmd.args(&args);
        for _ in secrets {
            cmd.arg("--stdin-pw");
        }
        for _ in 0..self.verbose {
            cmd.arg("--verbose");
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(
            command = %self.command.display(),
            operation,
            "launching provisioning tool"
        );
        let mut child = cmd.spawn().map_err(|source| ProvisionError::Launch {
            command: self.command.display().to_string(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let mut payload = secrets.join("\n");
            if !payload.is_empty() {
                payload.push('\n');
            }
            // The child may exit without reading its stdin; that is its
            // prerogative, not an I/O failure of ours.
            match stdin.write_all(payload.as_bytes()).await {
                Ok(()) => {
                    let _ = stdin.shutdown().await;
                }
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
        }

        let stdout = child.stdout.take().expect("stdout is piped");
        let stderr = child.stderr.take().expect("stderr is piped");
        let (errors, stderr_text) =
            tokio::join!(drain_stdout(stdout, self.verbose), drain_stderr(stderr));
        // Reap the child before reporting any output error, so a failed
        // invocation never leaves an unwaited process behind.
        let status = child.wait().await?;
        let errors = errors?;
        if self.verbose >= 1 {
            for line in stderr_text?.lines() {
                info!("provisioning tool: {}", line);
            }
        }

        let status = status.code().unwrap_or(-1);
        if status != 0 {
            debug!(status, "provisioning tool exited with failure");
        }
        Ok(ProvisionOutcome { status, errors })
    }
}

/// Arguments shared by every sandbox operation.
fn sandbox_args(port: u16, sandbox_dir: &Path) -> Vec<String> {
    vec![
        format!("--port={}", port),
        format!("--sandbox-dir={}", sandbox_dir.display()),
    ]
}

fn start_replicaset_args(
    instance: &InstanceTarget,
    tls: &TlsOptions,
    repl_user: &str,
    multi_primary: bool,
    ssl_mode: SslMode,
    ip_allowlist: &str,
) -> Vec<String> {
    let mut args = vec![format!("--instance={}", instance)];
    tls.append_args("--ssl", &mut args);
    args.push(format!("--replication-user={}", repl_user));
    if multi_primary {
        args.push("--multi-primary".into());
    } else {
        args.push("--single-primary".into());
    }
    args.push(format!("--ssl-mode={}", ssl_mode));
    args.push(format!("--ip-whitelist={}", ip_allowlist));
    args
}

#[allow(clippy::too_many_arguments)]
fn join_replicaset_args(
    instance: &InstanceTarget,
    tls: &TlsOptions,
    repl_user: &str,
    peer: &InstanceTarget,
    peer_tls: &TlsOptions,
    ssl_mode: SslMode,
    ip_allowlist: &str,
    group_seeds: &str,
    skip_repl_user: bool,
) -> Vec<String> {
    let mut args = vec![format!("--instance={}", instance)];
    tls.append_args("--ssl", &mut args);
    args.push(format!("--peer-instance={}", peer));
    peer_tls.append_args("--peer-ssl", &mut args);
    args.push(format!("--replication-user={}", repl_user));
    args.push(format!("--ssl-mode={}", ssl_mode));
    args.push(format!("--ip-whitelist={}", ip_allowlist));
    args.push(format!("--group-seeds={}", group_seeds));
    if skip_repl_user {
        args.push("--skip-replication-user".into());
    }
    args
}

/// Reads the tool's stdout to the end, returning the structured error
/// records it reported. Other structured records and raw lines are echoed to
/// the log according to `verbose`.
async fn drain_stdout(
    stdout: ChildStdout,
    verbose: u8,
) -> Result<Vec<ProvisionMessage>, ProvisionError> {
    let mut errors = Vec::new();
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.starts_with('{') {
            let message: ProvisionMessage = serde_json::from_str(trimmed)
                .map_err(|_| ProvisionError::MalformedOutput(line.clone()))?;
            if message.kind.is_error() {
                error!("provisioning tool: {}", message.msg);
                errors.push(message);
            } else if message.kind == MessageKind::Warning {
                warn!("provisioning tool: {}", message.msg);
            } else if verbose >= 1 {
                info!("provisioning tool: {}", message.msg);
            }
        } else if verbose >= 1 && !trimmed.is_empty() {
            info!("provisioning tool: {}", trimmed);
        }
    }
    Ok(errors)
}

async fn drain_stderr(stderr: ChildStderr) -> Result<String, ProvisionError> {
    let mut text = String::new();
    BufReader::new(stderr).read_to_string(&mut text).await?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> InstanceTarget {
        InstanceTarget::new("root", "db1.example.com", 3306)
    }

    fn peer() -> InstanceTarget {
        InstanceTarget::new("root", "db2.example.com", 3306)
    }

    #[test]
    fn test_join_args_carry_no_secrets() {
        let args = join_replicaset_args(
            &target(),
            &TlsOptions::default(),
            "rpl_user",
            &peer(),
            &TlsOptions::default(),
            SslMode::Required,
            "10.0.0.0/8",
            "db2.example.com:33061",
            false,
        );
        assert_eq!(
            args,
            vec![
                "--instance=root@db1.example.com:3306",
                "--peer-instance=root@db2.example.com:3306",
                "--replication-user=rpl_user",
                "--ssl-mode=REQUIRED",
                "--ip-whitelist=10.0.0.0/8",
                "--group-seeds=db2.example.com:33061",
            ]
        );
    }

    #[test]
    fn test_join_args_skip_repl_user() {
        let args = join_replicaset_args(
            &target(),
            &TlsOptions::default(),
            "rpl_user",
            &peer(),
            &TlsOptions::default(),
            SslMode::Preferred,
            "AUTOMATIC",
            "",
            true,
        );
        assert!(args.contains(&"--skip-replication-user".to_string()));
    }

    #[test]
    fn test_tls_args_use_role_prefix() {
        let tls = TlsOptions {
            ca: Some("/certs/ca.pem".into()),
            cert: Some("/certs/cert.pem".into()),
            key: None,
        };
        let mut args = Vec::new();
        tls.append_args("--peer-ssl", &mut args);
        assert_eq!(
            args,
            vec!["--peer-ssl-ca=/certs/ca.pem", "--peer-ssl-cert=/certs/cert.pem"]
        );
    }

    #[test]
    fn test_start_replicaset_args_topology_flag() {
        let single = start_replicaset_args(
            &target(),
            &TlsOptions::default(),
            "rpl_user",
            false,
            SslMode::Required,
            "AUTOMATIC",
        );
        assert!(single.contains(&"--single-primary".to_string()));
        let multi = start_replicaset_args(
            &target(),
            &TlsOptions::default(),
            "rpl_user",
            true,
            SslMode::Required,
            "AUTOMATIC",
        );
        assert!(multi.contains(&"--multi-primary".to_string()));
    }

    #[test]
    fn test_sandbox_args() {
        let args = sandbox_args(3310, Path::new("/tmp/sandboxes"));
        assert_eq!(args, vec!["--port=3310", "--sandbox-dir=/tmp/sandboxes"]);
    }

    #[test]
    fn test_message_parsing() {
        let msg: ProvisionMessage =
            serde_json::from_str(r#"{"type": "ERROR", "msg": "group replication not started"}"#)
                .unwrap();
        assert_eq!(msg.kind, MessageKind::Error);
        assert!(msg.kind.is_error());

        let msg: ProvisionMessage =
            serde_json::from_str(r#"{"type": "WARNING", "msg": "ssl disabled"}"#).unwrap();
        assert!(!msg.kind.is_error());

        let msg: ProvisionMessage =
            serde_json::from_str(r#"{"type": "NOTE", "msg": "something new"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Other);
    }
}

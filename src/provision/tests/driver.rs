// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tempfile::TempDir;

use gradmin_provision::{
    InstanceTarget, MessageKind, ProvisionError, ProvisioningInterface, TlsOptions,
};

/// Writes an executable shell script standing in for the provisioning tool.
fn stub(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn target() -> InstanceTarget {
    InstanceTarget::new("root", "db1.example.com", 3306)
}

#[tokio::test]
async fn test_launch_failure_is_fatal() {
    let driver = ProvisioningInterface::new("/nonexistent/provisioning-tool");
    let err = driver
        .leave_replicaset(&target(), &TlsOptions::default(), "pw")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Launch { .. }));
}

#[tokio::test]
async fn test_structured_errors_and_status_pass_through() -> Result<(), anyhow::Error> {
    let dir = TempDir::new()?;
    let tool = stub(
        &dir,
        "fail-tool",
        r#"cat > /dev/null
echo '{"type": "INFO", "msg": "connecting to instance"}'
echo '{"type": "ERROR", "msg": "group replication cannot be started"}'
exit 3"#,
    );
    let driver = ProvisioningInterface::new(tool);
    let outcome = driver
        .leave_replicaset(&target(), &TlsOptions::default(), "pw")
        .await?;
    assert_eq!(outcome.status, 3);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].kind, MessageKind::Error);
    assert_eq!(outcome.errors[0].msg, "group replication cannot be started");
    assert!(!outcome.success());
    Ok(())
}

#[tokio::test]
async fn test_success_collects_no_errors() -> Result<(), anyhow::Error> {
    let dir = TempDir::new()?;
    let tool = stub(
        &dir,
        "ok-tool",
        r#"cat > /dev/null
echo '{"type": "INFO", "msg": "instance checked"}'
echo 'plain progress output'
exit 0"#,
    );
    let driver = ProvisioningInterface::new(tool);
    let outcome = driver
        .check(&target(), "pw", &TlsOptions::default(), None, false)
        .await?;
    assert_eq!(outcome.status, 0);
    assert!(outcome.errors.is_empty());
    assert!(outcome.success());
    Ok(())
}

#[tokio::test]
async fn test_secrets_travel_via_stdin_only() -> Result<(), anyhow::Error> {
    let dir = TempDir::new()?;
    // Exits 9 if the secret shows up anywhere in argv, 7 if it does not
    // arrive on stdin, 0 otherwise.
    let tool = stub(
        &dir,
        "stdin-tool",
        r#"for a in "$@"; do
    if [ "$a" = "sekrit" ]; then exit 9; fi
done
read pw
if [ "$pw" != "sekrit" ]; then exit 7; fi
exit 0"#,
    );
    let driver = ProvisioningInterface::new(tool);
    let outcome = driver
        .leave_replicaset(&target(), &TlsOptions::default(), "sekrit")
        .await?;
    assert_eq!(outcome.status, 0, "secret leaked into argv or missed stdin");
    Ok(())
}

#[tokio::test]
async fn test_malformed_structured_output() -> Result<(), anyhow::Error> {
    let dir = TempDir::new()?;
    let tool = stub(
        &dir,
        "bad-tool",
        r#"cat > /dev/null
echo '{not json at all}'
exit 0"#,
    );
    let driver = ProvisioningInterface::new(tool);
    let err = driver
        .start_sandbox(3310, dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::MalformedOutput(_)));
    Ok(())
}

// The child is still waited on when its output cannot be decoded; the decode
// error is reported over the exit status, not masked by it.
#[tokio::test]
async fn test_malformed_output_from_failing_child() -> Result<(), anyhow::Error> {
    let dir = TempDir::new()?;
    let tool = stub(
        &dir,
        "bad-exit-tool",
        r#"cat > /dev/null
echo '{not json at all}'
echo 'giving up' >&2
exit 4"#,
    );
    let driver = ProvisioningInterface::new(tool);
    let err = driver
        .start_sandbox(3310, dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::MalformedOutput(_)));
    Ok(())
}

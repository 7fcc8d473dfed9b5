// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Replication account credential generation.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::Rng;

/// Length of generated replication passwords.
pub const PASSWORD_LENGTH: usize = 16;

/// MySQL user names (without the host part) are limited to 32 characters.
const MAX_USER_LENGTH: usize = 32;

const ACCOUNT_PREFIX: &str = "gradmin_cluster_rplusr";

// The quote and backslash characters are deliberately absent so generated
// passwords can be embedded in a quoted SQL literal unchanged.
const PASSWORD_ALPHABET: &[u8] =
    b"1234567890abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ~@#%$^&*()-_=+]}[{|;:.>,</?";

/// Generates a random password from the fixed alphabet, using OS randomness.
pub fn generate_password(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..PASSWORD_ALPHABET.len());
            char::from(PASSWORD_ALPHABET[idx])
        })
        .collect()
}

/// Derives a unique replication account name: the fixed prefix, truncated so
/// that prefix plus millisecond timestamp fits the engine's 32-character user
/// name limit, with the wildcard host part appended.
///
/// TODO: grant to the joining instance's address only, once there is a
/// reliable way to learn its externally visible name.
pub fn replication_account_name() -> String {
    let tstamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before 1970")
        .as_millis()
        .to_string();
    let keep = MAX_USER_LENGTH.saturating_sub(tstamp.len());
    let mut username = ACCOUNT_PREFIX[..keep.min(ACCOUNT_PREFIX.len())].to_string();
    username.push_str(&tstamp);
    username.push_str("@'%'");
    username
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_shape() {
        let pwd = generate_password(PASSWORD_LENGTH);
        assert_eq!(pwd.len(), PASSWORD_LENGTH);
        for c in pwd.bytes() {
            assert!(PASSWORD_ALPHABET.contains(&c), "unexpected character {:?}", c as char);
        }
        assert!(!pwd.contains('\''));
        assert!(!pwd.contains('\\'));
    }

    #[test]
    fn test_account_name_fits_user_limit() {
        let name = replication_account_name();
        let user = name.strip_suffix("@'%'").expect("wildcard host suffix");
        assert!(user.len() <= MAX_USER_LENGTH, "user part too long: {}", user);
        assert!(user.starts_with("gradmin_cluster"));
    }
}

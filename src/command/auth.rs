//! MD5 challenge/response authentication, mirroring `mongo_cmd_authenticate`
//! / `mongo_pass_digest` / `digest2hex` in `original_source/src/mongo.c`.
//! The structural shape (get a server nonce, hash it with credentials, send
//! it back) follows `zero-mysql`'s `auth_mysql_native_password` in
//! `src/protocol/connection/handshake.rs`, swapped from SHA1 to the MD5
//! primitive this protocol actually uses.

use bson::doc;
use md5::{Digest, Md5};

use crate::command::helpers::run_command;
use crate::error::{Error, Result};
use crate::sync::conn::Conn;

fn hex_digest(input: &[u8]) -> String {
    let digest = Md5::digest(input);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// `MD5(user ":mongo:" pass)`, the password digest stored server-side and
/// used as an input to the nonce-based challenge response.
pub fn password_digest(user: &str, password: &str) -> String {
    hex_digest(format!("{user}:mongo:{password}").as_bytes())
}

/// Runs `{getnonce: 1}` then `{authenticate: 1, user, nonce, key}` where
/// `key = MD5(nonce + user + MD5(user ":mongo:" pass))`.
pub fn authenticate(conn: &mut Conn, db: &str, user: &str, password: &str) -> Result<()> {
    let nonce_reply = run_command(conn, db, &doc! {"getnonce": 1})?;
    let nonce = nonce_reply
        .get_str("nonce")
        .map_err(|_| Error::Command("getnonce response missing 'nonce'".to_string()))?
        .to_string();

    let digest = password_digest(user, password);
    let key = hex_digest(format!("{nonce}{user}{digest}").as_bytes());

    run_command(
        conn,
        db,
        &doc! {
            "authenticate": 1,
            "user": user,
            "nonce": nonce,
            "key": key,
        },
    )?;
    Ok(())
}

/// Upserts `<db>.system.users` keyed by `{user}` with `$set: {pwd: digest}`,
/// mirroring `mongo_cmd_add_user`.
pub fn add_user(conn: &mut Conn, db: &str, user: &str, password: &str) -> Result<()> {
    let digest = password_digest(user, password);
    let full_collection_name = format!("{db}.system.users");
    conn.update(
        &full_collection_name,
        &doc! {"user": user},
        &doc! {"$set": {"pwd": digest}},
        crate::constant::UpdateFlags::UPSERT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_digest_is_stable() {
        let digest = password_digest("alice", "hunter2");
        assert_eq!(digest.len(), 32);
        assert_eq!(digest, password_digest("alice", "hunter2"));
        assert_ne!(digest, password_digest("alice", "other"));
    }
}

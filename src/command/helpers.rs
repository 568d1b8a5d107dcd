//! Server-command helpers built on top of `Conn::query`, mirroring
//! `mongo_run_command` / `mongo_simple_int_command` / `mongo_simple_str_command`
//! / `mongo_cmd_ismaster` / `mongo_count` / `mongo_cmd_get_last_error` in
//! `original_source/src/mongo.c`.

use bson::{doc, Document};

use crate::constant::QueryFlags;
use crate::error::{Error, Result};
use crate::sync::conn::Conn;

/// Fetches a single matching document and deep-copies it out of the reply
/// before any cursor state backing it is dropped. Mirrors `mongo_find_one`,
/// whose `bson_copy(out, &cursor->current)` before `mongo_cursor_destroy`
/// is the origin of spec.md §4.F's "deep-copy before teardown" rule; here
/// the reply's `Vec<Document>` is already owned, so simply moving the
/// first element out achieves the same thing without a second allocation.
pub fn find_one(
    conn: &mut Conn,
    full_collection_name: &str,
    query: &Document,
    return_field_selector: Option<&Document>,
) -> Result<Option<Document>> {
    let reply = conn.query(
        full_collection_name,
        QueryFlags::empty(),
        0,
        -1,
        query,
        return_field_selector,
    )?;
    conn.kill_cursors(&[reply.reply_header.cursor_id]);
    Ok(reply.documents.into_iter().next())
}

/// Runs `command` against `<db>.$cmd` and returns the single reply
/// document, deep-copied out of the reply buffer the way `mongo_find_one`
/// copies its result before tearing its cursor down (spec.md §4.F).
pub fn run_command(conn: &mut Conn, db: &str, command: &Document) -> Result<Document> {
    let full_collection_name = format!("{db}.$cmd");
    let reply = conn.query(
        &full_collection_name,
        QueryFlags::empty(),
        0,
        -1,
        command,
        None,
    )?;
    reply
        .documents
        .into_iter()
        .next()
        .ok_or_else(|| Error::Command(format!("no response to command on {db}")))
}

/// Runs `command` and returns whether its `ok` field is truthy.
fn simple_command_ok(conn: &mut Conn, db: &str, command: &Document) -> Result<Document> {
    let result = run_command(conn, db, command)?;
    let ok = result
        .get("ok")
        .map(|v| match v {
            bson::Bson::Double(d) => *d != 0.0,
            bson::Bson::Int32(i) => *i != 0,
            bson::Bson::Int64(i) => *i != 0,
            bson::Bson::Boolean(b) => *b,
            _ => false,
        })
        .unwrap_or(false);
    if ok {
        Ok(result)
    } else {
        let message = result
            .get_str("errmsg")
            .unwrap_or("command failed")
            .to_string();
        Err(Error::Command(message))
    }
}

/// `{cmd: 1}` style command returning only the `ok` flag, e.g. `dropDatabase`.
pub fn simple_int_command(conn: &mut Conn, db: &str, cmd: &str, arg: i32) -> Result<()> {
    simple_command_ok(conn, db, &doc! { cmd: arg }).map(|_| ())
}

/// `{cmd: "value"}` style command, e.g. `{drop: "collection"}`.
pub fn simple_str_command(conn: &mut Conn, db: &str, cmd: &str, value: &str) -> Result<()> {
    simple_command_ok(conn, db, &doc! { cmd: value }).map(|_| ())
}

pub fn drop_database(conn: &mut Conn, db: &str) -> Result<()> {
    simple_int_command(conn, db, "dropDatabase", 1)
}

pub fn drop_collection(conn: &mut Conn, db: &str, collection: &str) -> Result<()> {
    simple_str_command(conn, db, "drop", collection)
}

/// `{ismaster: 1}` against the `admin` database.
pub fn is_master(conn: &mut Conn) -> Result<bool> {
    let result = run_command(conn, "admin", &doc! {"ismaster": 1})?;
    Ok(result.get_bool("ismaster").unwrap_or(false))
}

/// `{count: <collection>, [query: <query>]}`, omitting `query` when empty,
/// matching the original's `bson_size(query) > 5` check.
pub fn count(conn: &mut Conn, db: &str, collection: &str, query: Option<&Document>) -> Result<i64> {
    let mut command = doc! { "count": collection };
    if let Some(query) = query {
        if !query.is_empty() {
            command.insert("query", query.clone());
        }
    }
    let result = run_command(conn, db, &command)?;
    result
        .get("n")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .ok_or_else(|| Error::Command("count response missing 'n'".to_string()))
}

/// Runs `{getlasterror: 1}` and `{getpreverror: 1}`, returning whether the
/// previous operation succeeded (true iff the `err` field is null or
/// absent), per spec.md §4.G.
///
/// The original C helper (`mongo_cmd_get_error_helper`) computes the
/// opposite-sounding `haserror` flag (true when `err` is *not* null) and
/// returns that as-is from `mongo_cmd_get_last_error`; spec.md's own
/// wording is explicit that this crate's `get_last_error` should return
/// true for "no error", so the polarity is inverted here relative to the
/// original. Recorded as a deliberate decision in DESIGN.md.
fn error_helper(conn: &mut Conn, db: &str, cmd: &str) -> Result<bool> {
    let result = run_command(conn, db, &doc! { cmd: 1 })?;
    let has_error = !matches!(result.get("err"), None | Some(bson::Bson::Null));
    Ok(!has_error)
}

pub fn get_last_error(conn: &mut Conn, db: &str) -> Result<bool> {
    error_helper(conn, db, "getlasterror")
}

pub fn get_prev_error(conn: &mut Conn, db: &str) -> Result<bool> {
    error_helper(conn, db, "getpreverror")
}

pub fn reset_error(conn: &mut Conn, db: &str) -> Result<()> {
    simple_int_command(conn, db, "reseterror", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_command_omits_empty_query() {
        let mut command = doc! { "count": "widgets" };
        let empty = Document::new();
        if !empty.is_empty() {
            command.insert("query", empty.clone());
        }
        assert_eq!(command, doc! { "count": "widgets" });
    }
}

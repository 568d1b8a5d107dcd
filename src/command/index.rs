//! Index creation, mirroring `mongo_create_index` / `mongo_create_simple_index`
//! in `original_source/src/mongo.c`: insert a descriptor document into
//! `<db>.system.indexes` and confirm with `getlasterror`.

use bson::{doc, Document};

use crate::command::helpers::get_last_error;
use crate::constant::InsertFlags;
use crate::error::{Error, Result};
use crate::sync::conn::Conn;

/// Builds the conventional index name: a leading `_` followed by each key
/// field name concatenated with no separator, truncated to 254 bytes, as
/// `mongo_create_index` does (`name[255] = {'_'}` then appends each field).
fn default_index_name(key: &Document) -> String {
    let mut name = String::from("_");
    for (field, _) in key.iter() {
        name.push_str(field.as_str());
    }
    name.truncate(254);
    name
}

/// `full_collection_name` is `<db>.<collection>`; `key` describes the
/// index fields (e.g. `{"a": 1, "b": -1}`).
pub fn create_index(conn: &mut Conn, full_collection_name: &str, key: &Document) -> Result<()> {
    create_index_with_options(conn, full_collection_name, key, false)
}

/// As [`create_index`], additionally marking the index `unique`. GridFS's
/// `{files_id:1, n:1}` chunk index needs this (`gridfs_init`).
pub fn create_index_with_options(
    conn: &mut Conn,
    full_collection_name: &str,
    key: &Document,
    unique: bool,
) -> Result<()> {
    create_index_full(conn, full_collection_name, key, unique, false)
}

/// Full form accepting both options spec.md §4.I names: `unique` and
/// `dropDups` (drop documents that would otherwise violate the new
/// unique constraint, rather than failing the index build).
pub fn create_index_full(
    conn: &mut Conn,
    full_collection_name: &str,
    key: &Document,
    unique: bool,
    drop_dups: bool,
) -> Result<()> {
    let db = full_collection_name
        .split_once('.')
        .map(|(db, _)| db)
        .ok_or_else(|| Error::BadArg(format!("'{full_collection_name}' is not db.collection")))?
        .to_string();

    let mut index_doc = doc! {
        "ns": full_collection_name,
        "key": key.clone(),
        "name": default_index_name(key),
    };
    if unique {
        index_doc.insert("unique", true);
    }
    if drop_dups {
        index_doc.insert("dropDups", true);
    }

    let indexes_namespace = format!("{db}.system.indexes");
    conn.insert(&indexes_namespace, &[index_doc], InsertFlags::empty())?;

    if get_last_error(conn, &db)? {
        Ok(())
    } else {
        Err(Error::Command(format!(
            "create_index failed for {full_collection_name}"
        )))
    }
}

/// Shorthand for a single-field index, e.g. `create_simple_index(conn, "db.coll", "name", 1)`.
pub fn create_simple_index(
    conn: &mut Conn,
    full_collection_name: &str,
    field: &str,
    direction: i32,
) -> Result<()> {
    create_index(conn, full_collection_name, &doc! { field: direction })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_index_name_joins_fields() {
        let key = doc! {"a": 1, "b": -1};
        assert_eq!(default_index_name(&key), "_ab");
    }

    #[test]
    fn default_index_name_prefixes_single_field() {
        let key = doc! {"filename": 1};
        assert_eq!(default_index_name(&key), "_filename");
    }

    #[test]
    fn default_index_name_truncates_to_254() {
        let long_field = "x".repeat(300);
        let key = doc! { long_field: 1 };
        assert_eq!(default_index_name(&key).len(), 254);
    }
}

use bson::Document;

use crate::error::Result;
use crate::sync::conn::Conn;

/// A streaming result set, transparently issuing `get_more` as the caller
/// walks past the documents already buffered and sending `kill_cursors`
/// when dropped before exhaustion.
///
/// Grounded in `original_source/src/mongo.c`'s `mongo_cursor_next` /
/// `mongo_cursor_get_more` / `mongo_cursor_destroy`, restructured as an
/// owning `Iterator` the way `zero-mysql::protocol::command::query::Query`
/// is a step-driven state machine the connection drives to completion.
///
/// On a network failure during `get_more` the cursor is left terminal but
/// still owned (`cursor_id` forced to 0, buffered documents dropped) so
/// `Drop` never re-sends `kill_cursors` for a cursor id the server may
/// already consider dead — this resolves spec.md §9's "caller must not
/// double-free" concern structurally rather than by caller contract.
pub struct Cursor<'a> {
    conn: &'a mut Conn,
    full_collection_name: String,
    batch_size: i32,
    cursor_id: i64,
    buffered: std::vec::IntoIter<Document>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(
        conn: &'a mut Conn,
        full_collection_name: String,
        batch_size: i32,
        cursor_id: i64,
        documents: Vec<Document>,
    ) -> Self {
        Self {
            conn,
            full_collection_name,
            batch_size,
            cursor_id,
            buffered: documents.into_iter(),
        }
    }

    /// True once no more documents are buffered and the server-side cursor
    /// has been exhausted (`cursor_id == 0`).
    pub fn is_exhausted(&self) -> bool {
        self.buffered.as_slice().is_empty() && self.cursor_id == 0
    }

    fn fetch_more(&mut self) -> Result<()> {
        match self
            .conn
            .get_more(&self.full_collection_name, self.batch_size, self.cursor_id)
        {
            Ok(reply) => {
                self.cursor_id = reply.reply_header.cursor_id;
                self.buffered = reply.documents.into_iter();
                Ok(())
            }
            Err(err) => {
                self.cursor_id = 0;
                self.buffered = Vec::new().into_iter();
                Err(err)
            }
        }
    }
}

impl<'a> Iterator for Cursor<'a> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(doc) = self.buffered.next() {
            return Some(Ok(doc));
        }
        if self.cursor_id == 0 {
            return None;
        }
        match self.fetch_more() {
            Ok(()) => self.buffered.next().map(Ok),
            Err(err) => Some(Err(err)),
        }
    }
}

impl<'a> Drop for Cursor<'a> {
    fn drop(&mut self) {
        if self.cursor_id != 0 {
            self.conn.kill_cursors(&[self.cursor_id]);
        }
    }
}

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use bson::Document;
use log::{debug, warn};

use crate::constant::{DeleteFlags, InsertFlags, QueryFlags, UpdateFlags};
use crate::error::{Error, Result};
use crate::opts::{Endpoint, Opts};
use crate::protocol::op::{
    build_delete, build_get_more, build_insert, build_kill_cursors, build_query, build_update,
};
use crate::protocol::reply::Reply;
use crate::sync::cursor::Cursor;
use crate::sync::stream::Stream;

/// Which configured endpoint a connection is currently attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// A blocking connection to one endpoint of a document-database server,
/// optionally with a second endpoint to fail over to.
///
/// Grounded in `zero-mysql::sync::Conn`: a stream plus a broken-connection
/// flag, with every operation routed through a `check_error` wrapper so a
/// network or protocol failure poisons the connection instead of silently
/// leaving it half-written. The replica-pair reconnect/master-probe logic
/// mirrors `original_source/src/mongo.c`'s `mongo_connect_pair` and
/// `mongo_reconnect`.
pub struct Conn {
    stream: Stream,
    opts: Opts,
    side: Side,
    is_broken: bool,
    next_request_id: AtomicI32,
}

impl Conn {
    /// Connects to `opts.left`, or if unreachable or not master and
    /// `opts.right` is set, falls over to the other endpoint.
    pub fn connect(opts: Opts) -> Result<Self> {
        let (stream, side) = Self::connect_best(&opts)?;
        let mut conn = Self {
            stream,
            opts,
            side,
            is_broken: false,
            next_request_id: AtomicI32::new(1),
        };
        conn.authenticate_if_configured()?;
        Ok(conn)
    }

    fn connect_best(opts: &Opts) -> Result<(Stream, Side)> {
        let left = Self::try_connect_endpoint(&opts.left, opts);
        match (&left, &opts.right) {
            (Ok(_), _) => Ok((left?, Side::Left)),
            (Err(_), Some(right)) => {
                warn!("left endpoint {} unreachable, trying right", opts.left);
                let stream = Self::try_connect_endpoint(right, opts)?;
                Ok((stream, Side::Right))
            }
            (Err(err), None) => Err(err),
        }
    }

    fn try_connect_endpoint(endpoint: &Endpoint, opts: &Opts) -> Result<Stream> {
        debug!("connecting to {endpoint}");
        let mut stream = Stream::connect(endpoint, opts.connect_timeout, opts.tcp_nodelay)?;
        stream.set_read_timeout(Some(opts.op_timeout))?;
        stream.set_write_timeout(Some(opts.op_timeout))?;
        Ok(stream)
    }

    fn authenticate_if_configured(&mut self) -> Result<()> {
        if let (Some(user), Some(password)) = (self.opts.user.clone(), self.opts.password.clone())
        {
            let db = self
                .opts
                .db
                .clone()
                .unwrap_or_else(|| "admin".to_string());
            crate::command::auth::authenticate(self, &db, &user, &password)?;
        }
        Ok(())
    }

    /// Full reconnect cycle, mirroring `mongo_reconnect`: disconnect (by
    /// dropping the old stream), then for a single endpoint just reconnect,
    /// for a pair try the current side first and probe `ismaster`, swapping
    /// to the other side on failure or on a non-master answer.
    pub fn reconnect(&mut self) -> Result<()> {
        self.is_broken = false;

        let current = match self.side {
            Side::Left => &self.opts.left,
            Side::Right => self.opts.right.as_ref().unwrap_or(&self.opts.left),
        };

        match Self::try_connect_endpoint(current, &self.opts) {
            Ok(stream) => {
                self.stream = stream;
                if self.opts.right.is_some() {
                    match crate::command::helpers::is_master(self) {
                        Ok(true) => return self.authenticate_if_configured(),
                        Ok(false) => {
                            warn!("{current} is reachable but not master, swapping endpoints");
                        }
                        Err(err) => {
                            warn!("ismaster probe failed on {current}: {err}");
                        }
                    }
                } else {
                    return self.authenticate_if_configured();
                }
            }
            Err(err) => {
                if self.opts.right.is_none() {
                    return Err(err);
                }
                warn!("reconnect to {current} failed: {err}");
            }
        }

        let other = match self.side {
            Side::Left => self.opts.right.clone().ok_or(Error::NotMaster)?,
            Side::Right => self.opts.left.clone(),
        };
        self.side = match self.side {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        };
        self.stream = Self::try_connect_endpoint(&other, &self.opts)?;

        // Mirrors `mongo_reconnect`'s post-swap probe: reconnecting to the
        // other endpoint is not enough on its own, it must also report
        // itself as master, or the whole pair is reachable but master-less.
        match crate::command::helpers::is_master(self) {
            Ok(true) => self.authenticate_if_configured(),
            Ok(false) => {
                warn!("{other} is reachable but not master after swap");
                Err(Error::NotMaster)
            }
            Err(err) => Err(err),
        }
    }

    pub fn is_broken(&self) -> bool {
        self.is_broken
    }

    /// Which configured endpoint this connection is currently attached to.
    pub fn side(&self) -> Side {
        self.side
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    pub fn next_request_id(&self) -> i32 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    fn check_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_conn_broken() {
                self.is_broken = true;
            }
        }
        result
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.stream.write_all(message)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Reads one complete `OP_REPLY` message: header first to learn the
    /// total length, then the rest of the message.
    fn recv(&mut self) -> Result<Reply> {
        let mut header_buf = [0u8; crate::constant::HEADER_SIZE];
        self.stream.read_exact(&mut header_buf)?;
        let message_length = crate::protocol::primitive::read_i32(&header_buf, 0)? as usize;

        if !(crate::constant::MIN_REPLY_SIZE..=crate::constant::MAX_REPLY_SIZE)
            .contains(&message_length)
        {
            return Err(Error::Protocol(format!(
                "reply length {message_length} out of bounds"
            )));
        }

        let mut body = vec![0u8; message_length];
        body[..crate::constant::HEADER_SIZE].copy_from_slice(&header_buf);
        self.stream
            .read_exact(&mut body[crate::constant::HEADER_SIZE..])?;
        Reply::parse(&body)
    }

    /// Sends a message and reads the single reply that answers it.
    pub fn call(&mut self, message: &[u8]) -> Result<Reply> {
        let result = self.send(message).and_then(|()| self.recv());
        self.check_error(result)
    }

    pub fn insert(
        &mut self,
        full_collection_name: &str,
        documents: &[Document],
        flags: InsertFlags,
    ) -> Result<()> {
        let id = self.next_request_id();
        let msg = build_insert(id, flags, full_collection_name, documents)?;
        let result = self.send(&msg);
        self.check_error(result)
    }

    pub fn update(
        &mut self,
        full_collection_name: &str,
        selector: &Document,
        update: &Document,
        flags: UpdateFlags,
    ) -> Result<()> {
        let id = self.next_request_id();
        let msg = build_update(id, flags, full_collection_name, selector, update)?;
        let result = self.send(&msg);
        self.check_error(result)
    }

    pub fn delete(
        &mut self,
        full_collection_name: &str,
        selector: &Document,
        flags: DeleteFlags,
    ) -> Result<()> {
        let id = self.next_request_id();
        let msg = build_delete(id, flags, full_collection_name, selector)?;
        let result = self.send(&msg);
        self.check_error(result)
    }

    pub fn query(
        &mut self,
        full_collection_name: &str,
        flags: QueryFlags,
        number_to_skip: i32,
        number_to_return: i32,
        query: &Document,
        return_field_selector: Option<&Document>,
    ) -> Result<Reply> {
        let id = self.next_request_id();
        let msg = build_query(
            id,
            flags,
            full_collection_name,
            number_to_skip,
            number_to_return,
            query,
            return_field_selector,
        )?;
        self.call(&msg)
    }

    /// Issues an `OP_QUERY` and wraps the first batch in a streaming
    /// [`Cursor`] that transparently issues `get_more` as the caller walks
    /// past it. Mirrors `mongo_find`, the component-F entry point named in
    /// spec.md §4.F.
    pub fn find(
        &mut self,
        full_collection_name: &str,
        flags: QueryFlags,
        number_to_skip: i32,
        number_to_return: i32,
        query: &Document,
        return_field_selector: Option<&Document>,
    ) -> Result<Cursor<'_>> {
        let reply = self.query(
            full_collection_name,
            flags,
            number_to_skip,
            number_to_return,
            query,
            return_field_selector,
        )?;
        Ok(Cursor::new(
            self,
            full_collection_name.to_string(),
            number_to_return,
            reply.reply_header.cursor_id,
            reply.documents,
        ))
    }

    pub fn get_more(
        &mut self,
        full_collection_name: &str,
        number_to_return: i32,
        cursor_id: i64,
    ) -> Result<Reply> {
        let id = self.next_request_id();
        let msg = build_get_more(id, full_collection_name, number_to_return, cursor_id)?;
        self.call(&msg)
    }

    /// Best-effort: a failed `kill_cursors` send is logged, never returned,
    /// matching spec.md §4.F ("failures here are logged, not propagated").
    pub fn kill_cursors(&mut self, cursor_ids: &[i64]) {
        if cursor_ids.is_empty() || cursor_ids.iter().all(|&id| id == 0) {
            return;
        }
        let id = self.next_request_id();
        match build_kill_cursors(id, cursor_ids) {
            Ok(msg) => {
                if let Err(err) = self.send(&msg) {
                    warn!("failed to send kill_cursors: {err}");
                    self.is_broken = true;
                }
            }
            Err(err) => warn!("failed to build kill_cursors message: {err}"),
        }
    }

    pub fn set_op_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.opts.op_timeout = timeout;
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        Ok(())
    }
}

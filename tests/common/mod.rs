//! Test-only fake servers. No real document-database server is available
//! to run integration tests against (the teacher crate's dev-dependency
//! equivalent, a real `mysql`/`mysql_async` server, has no analogue for
//! this protocol), so these harnesses speak just enough of the wire
//! protocol to drive real `Conn`/`GridFile` code paths end-to-end.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bson::{doc, Bson, Document};
use docgram::constant::{OpCode, HEADER_SIZE};
use docgram::protocol::header::MessageHeader;
use docgram::protocol::primitive::{read_cstring, read_i32, read_i64};

pub struct IncomingMessage {
    pub op_code: OpCode,
    pub body: Vec<u8>,
}

/// Reads one full wire message off `stream`.
pub fn read_message(stream: &mut TcpStream) -> IncomingMessage {
    let mut header_buf = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header_buf).expect("read header");
    let header = MessageHeader::parse(&header_buf).expect("parse header");
    let body_len = header.message_length as usize - HEADER_SIZE;
    let mut body = vec![0u8; body_len];
    stream.read_exact(&mut body).expect("read body");
    IncomingMessage {
        op_code: header.op_code().expect("known opcode"),
        body,
    }
}

/// Like [`read_message`], but returns `None` once the peer closes the
/// connection instead of panicking, so a server loop can exit cleanly.
fn try_read_message(stream: &mut TcpStream) -> Option<IncomingMessage> {
    let mut header_buf = [0u8; HEADER_SIZE];
    if stream.read_exact(&mut header_buf).is_err() {
        return None;
    }
    let header = MessageHeader::parse(&header_buf).ok()?;
    let body_len = header.message_length as usize - HEADER_SIZE;
    let mut body = vec![0u8; body_len];
    stream.read_exact(&mut body).ok()?;
    Some(IncomingMessage {
        op_code: header.op_code().ok()?,
        body,
    })
}

/// Writes a minimal `OP_REPLY`: no query failure, the given cursor id and
/// documents.
pub fn write_reply(stream: &mut TcpStream, cursor_id: i64, documents: &[Document]) {
    let mut body = Vec::new();
    body.extend_from_slice(&0i32.to_le_bytes()); // response flags
    body.extend_from_slice(&cursor_id.to_le_bytes());
    body.extend_from_slice(&0i32.to_le_bytes()); // starting from
    body.extend_from_slice(&(documents.len() as i32).to_le_bytes());
    for doc in documents {
        doc.to_writer(&mut body).expect("encode document");
    }
    let total_len = (body.len() + HEADER_SIZE) as i32;
    let mut msg = Vec::new();
    MessageHeader::new(total_len, 1, 1, OpCode::Reply).write_to(&mut msg);
    msg.extend_from_slice(&body);
    stream.write_all(&msg).expect("write reply");
    stream.flush().expect("flush reply");
}

pub struct ParsedQuery {
    pub full_collection_name: String,
    pub number_to_return: i32,
    pub query: Document,
}

pub fn parse_query_body(body: &[u8]) -> ParsedQuery {
    let _flags = read_i32(body, 0).unwrap();
    let (full_collection_name, mut offset) = read_cstring(body, 4).unwrap();
    let full_collection_name = full_collection_name.to_string();
    let _number_to_skip = read_i32(body, offset).unwrap();
    offset += 4;
    let number_to_return = read_i32(body, offset).unwrap();
    offset += 4;
    let mut cursor = std::io::Cursor::new(&body[offset..]);
    let query = Document::from_reader(&mut cursor).unwrap();
    ParsedQuery {
        full_collection_name,
        number_to_return,
        query,
    }
}

pub struct ParsedUpdate {
    pub full_collection_name: String,
    pub selector: Document,
    pub update: Document,
}

pub fn parse_update_body(body: &[u8]) -> ParsedUpdate {
    let (full_collection_name, offset) = read_cstring(body, 4).unwrap();
    let full_collection_name = full_collection_name.to_string();
    let offset = offset + 4; // flags
    let mut cursor = std::io::Cursor::new(&body[offset..]);
    let selector = Document::from_reader(&mut cursor).unwrap();
    let update = Document::from_reader(&mut cursor).unwrap();
    ParsedUpdate {
        full_collection_name,
        selector,
        update,
    }
}

pub struct ParsedDelete {
    pub full_collection_name: String,
    pub selector: Document,
}

pub fn parse_delete_body(body: &[u8]) -> ParsedDelete {
    let (full_collection_name, offset) = read_cstring(body, 4).unwrap();
    let full_collection_name = full_collection_name.to_string();
    let offset = offset + 4; // flags
    let mut cursor = std::io::Cursor::new(&body[offset..]);
    let selector = Document::from_reader(&mut cursor).unwrap();
    ParsedDelete {
        full_collection_name,
        selector,
    }
}

pub struct ParsedInsert {
    pub full_collection_name: String,
    pub documents: Vec<Document>,
}

pub fn parse_insert_body(body: &[u8]) -> ParsedInsert {
    let (full_collection_name, offset) = read_cstring(body, 4).unwrap();
    let full_collection_name = full_collection_name.to_string();
    let mut documents = Vec::new();
    let mut cursor = std::io::Cursor::new(&body[offset..]);
    while let Ok(doc) = Document::from_reader(&mut cursor) {
        documents.push(doc);
    }
    ParsedInsert {
        full_collection_name,
        documents,
    }
}

pub fn parse_get_more_cursor_id(body: &[u8]) -> i64 {
    let (_ns, offset) = read_cstring(body, 4).unwrap();
    let offset = offset + 4; // number_to_return
    read_i64(body, offset).unwrap()
}

/// An in-memory stand-in for one `mongod`-like node: tracks a `.files`
/// collection, a `.chunks` collection (keyed by `n`, for a single
/// `files_id`) and answers `$cmd` queries (`getlasterror`/`getpreverror`/
/// `ismaster`/`count`) well enough to drive `GridStore`/`GridFile` and the
/// plain command helpers end-to-end.
pub struct GridFakeServer {
    pub host: String,
    pub port: u16,
    pub chunks: Arc<Mutex<HashMap<i64, Vec<u8>>>>,
    pub files: Arc<Mutex<Vec<Document>>>,
    handle: Option<JoinHandle<()>>,
}

impl GridFakeServer {
    /// Starts the server and spawns the single-connection accept loop.
    /// `is_master` controls the canned answer to `{ismaster: 1}`, letting
    /// a replica-pair test stand this node up as the non-master side.
    pub fn start(is_master: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let chunks = Arc::new(Mutex::new(HashMap::new()));
        let files = Arc::new(Mutex::new(Vec::new()));
        let chunks_for_thread = chunks.clone();
        let files_for_thread = files.clone();

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = match listener.accept() {
                Ok(pair) => pair,
                Err(_) => return,
            };
            loop {
                let msg = match try_read_message(&mut stream) {
                    Some(msg) => msg,
                    None => break,
                };
                handle_message(
                    &mut stream,
                    msg,
                    &chunks_for_thread,
                    &files_for_thread,
                    is_master,
                );
            }
        });

        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
            chunks,
            files,
            handle: Some(handle),
        }
    }

    /// Blocks until the accept loop has exited (the client disconnected or
    /// the test is done), so assertions made after this call observe a
    /// fully drained server.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A node that only ever answers `{ismaster: ...}`, accepting exactly
/// `connections` sequential TCP connections (one per `Conn::connect`/
/// `Conn::reconnect` attempt a test drives against it) before its accept
/// loop exits on its own.
pub struct IsMasterServer {
    pub host: String,
    pub port: u16,
    handle: Option<JoinHandle<()>>,
}

impl IsMasterServer {
    pub fn start(is_master: bool, connections: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let handle = std::thread::spawn(move || {
            for _ in 0..connections {
                let (mut stream, _) = match listener.accept() {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                while let Some(msg) = try_read_message(&mut stream) {
                    if msg.op_code == OpCode::Query {
                        write_reply(&mut stream, 0, &[doc! {"ok": 1.0, "ismaster": is_master}]);
                        break;
                    }
                }
            }
        });

        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
            handle: Some(handle),
        }
    }

    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_message(
    stream: &mut TcpStream,
    msg: IncomingMessage,
    chunks: &Arc<Mutex<HashMap<i64, Vec<u8>>>>,
    files: &Arc<Mutex<Vec<Document>>>,
    is_master: bool,
) {
    match msg.op_code {
        OpCode::Insert => {
            let parsed = parse_insert_body(&msg.body);
            if parsed.full_collection_name.ends_with(".chunks") {
                let mut store = chunks.lock().unwrap();
                for doc in parsed.documents {
                    let n = doc.get_i64("n").unwrap();
                    let data = match doc.get("data") {
                        Some(Bson::Binary(bin)) => bin.bytes.clone(),
                        _ => Vec::new(),
                    };
                    store.insert(n, data);
                }
            } else if parsed.full_collection_name.ends_with(".files") {
                files.lock().unwrap().extend(parsed.documents);
            }
            // Inserts into `.system.indexes` need no tracking: index
            // creation is only confirmed via the following getlasterror.
        }
        OpCode::Update => {
            if msg.body.len() < 4 {
                return;
            }
            let parsed = parse_update_body(&msg.body);
            if parsed.full_collection_name.ends_with(".chunks") {
                let n = parsed.selector.get_i64("n").unwrap();
                let data = match parsed.update.get("data") {
                    Some(Bson::Binary(bin)) => bin.bytes.clone(),
                    _ => Vec::new(),
                };
                chunks.lock().unwrap().insert(n, data);
            } else if parsed.full_collection_name.ends_with(".files") {
                let mut store = files.lock().unwrap();
                let id = parsed.selector.get("_id").cloned();
                store.retain(|doc| doc.get("_id") != id.as_ref());
                store.push(parsed.update.clone());
            }
        }
        OpCode::Delete => {
            let parsed = parse_delete_body(&msg.body);
            if parsed.full_collection_name.ends_with(".chunks") {
                let mut store = chunks.lock().unwrap();
                if let Some(Bson::Document(gte)) =
                    parsed.selector.get("n").filter(|_| parsed.selector.contains_key("n"))
                {
                    let start = gte.get_i64("$gte").unwrap_or(0);
                    store.retain(|&n, _| n < start);
                } else {
                    store.clear();
                }
            } else if parsed.full_collection_name.ends_with(".files") {
                let id = parsed.selector.get("_id").cloned();
                files.lock().unwrap().retain(|doc| doc.get("_id") != id.as_ref());
            }
        }
        OpCode::Query => {
            let parsed = parse_query_body(&msg.body);
            if parsed.full_collection_name.ends_with(".$cmd") {
                handle_command(stream, &parsed.query, is_master);
            } else if parsed.full_collection_name.ends_with(".files") {
                let store = files.lock().unwrap();
                let docs: Vec<Document> = store
                    .iter()
                    .filter(|doc| matches_selector(doc, &parsed.query))
                    .cloned()
                    .collect();
                write_reply(stream, 0, &docs);
            } else if parsed.full_collection_name.ends_with(".chunks") {
                let store = chunks.lock().unwrap();
                let mut matches: Vec<(i64, Vec<u8>)> = if let Ok(n) = parsed.query.get_i64("n") {
                    store
                        .get(&n)
                        .map(|data| vec![(n, data.clone())])
                        .unwrap_or_default()
                } else if let Some(Bson::Document(gte)) = parsed
                    .query
                    .get("n")
                    .filter(|_| parsed.query.contains_key("n"))
                {
                    let start = gte.get_i64("$gte").unwrap_or(0);
                    let mut found: Vec<_> = store
                        .iter()
                        .filter(|(&n, _)| n >= start)
                        .map(|(&n, data)| (n, data.clone()))
                        .collect();
                    found.sort_by_key(|(n, _)| *n);
                    found
                } else {
                    Vec::new()
                };
                drop(store);
                if parsed.number_to_return > 0 {
                    matches.truncate(parsed.number_to_return as usize);
                }
                let docs: Vec<Document> = matches
                    .into_iter()
                    .map(|(n, data)| {
                        doc! {
                            "files_id": 1,
                            "n": n,
                            "data": Bson::Binary(bson::Binary {
                                subtype: bson::spec::BinarySubtype::Generic,
                                bytes: data,
                            }),
                        }
                    })
                    .collect();
                write_reply(stream, 0, &docs);
            } else {
                write_reply(stream, 0, &[]);
            }
        }
        _ => {}
    }
}

fn matches_selector(doc: &Document, selector: &Document) -> bool {
    selector.iter().all(|(k, v)| doc.get(k) == Some(v))
}

fn handle_command(stream: &mut TcpStream, command: &Document, is_master: bool) {
    if command.contains_key("getlasterror") || command.contains_key("getpreverror") {
        write_reply(stream, 0, &[doc! {"ok": 1.0, "err": Bson::Null}]);
    } else if command.contains_key("ismaster") {
        write_reply(
            stream,
            0,
            &[doc! {"ok": 1.0, "ismaster": is_master}],
        );
    } else if command.contains_key("count") {
        write_reply(stream, 0, &[doc! {"ok": 1.0, "n": 0i64}]);
    } else {
        write_reply(stream, 0, &[doc! {"ok": 1.0}]);
    }
}

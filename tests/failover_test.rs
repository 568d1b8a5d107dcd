//! Replica-pair failover: the left endpoint refuses the TCP connection
//! outright, so `Conn::connect` must fall over to the right endpoint and
//! attach there.

mod common;

use std::net::TcpListener;

use docgram::error::Error;
use docgram::opts::{Endpoint, Opts};
use docgram::sync::{Conn, Side};

use common::{GridFakeServer, IsMasterServer};

#[test]
fn connect_falls_over_to_the_right_endpoint_when_left_refuses() {
    // Reserve a port, then drop the listener so nothing answers it —
    // guarantees ECONNREFUSED rather than a timeout.
    let reserved = TcpListener::bind("127.0.0.1:0").expect("bind");
    let left = Endpoint::new("127.0.0.1", reserved.local_addr().expect("addr").port());
    drop(reserved);

    let right_server = GridFakeServer::start(true);
    let right = Endpoint::new(right_server.host.clone(), right_server.port);

    let conn = Conn::connect(Opts::pair(left, right)).expect("connect via right");
    assert_eq!(conn.side(), Side::Right);
    assert!(!conn.is_broken());

    drop(conn);
    right_server.join();
}

#[test]
fn reconnect_returns_not_master_when_both_endpoints_refuse_the_role() {
    // `left` accepts two sequential connections: `Conn::connect`'s initial
    // (quiet) attach, then `reconnect`'s own fresh connection it probes
    // `ismaster` on before swapping. `right` only ever sees the post-swap
    // probe.
    let left_server = IsMasterServer::start(false, 2);
    let right_server = IsMasterServer::start(false, 1);
    let left = Endpoint::new(left_server.host.clone(), left_server.port);
    let right = Endpoint::new(right_server.host.clone(), right_server.port);

    let mut conn = Conn::connect(Opts::pair(left, right)).expect("connect via left");
    assert_eq!(conn.side(), Side::Left);

    let err = conn.reconnect().expect_err("neither endpoint is master");
    assert!(matches!(err, Error::NotMaster));

    drop(conn);
    left_server.join();
    right_server.join();
}

//! Connection lifecycle tests: admission, latched unregistration, the idle
//! reaper, and the listener's fast allow-list rejection.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use nfs_tundra::config::{AllowedIp, ServerConfig};
use nfs_tundra::connection::ConnectionTracker;
use nfs_tundra::tcp::{NfsTcp, NfsTcpListener};

use support::MemFs;

fn peer(n: u16) -> std::net::SocketAddr {
    format!("127.0.0.1:{n}").parse().unwrap()
}

#[test]
fn tracker_enforces_the_admission_cap() {
    let tracker = ConnectionTracker::new(2);
    let a = tracker.try_register(peer(1000)).expect("first");
    let _b = tracker.try_register(peer(1001)).expect("second");
    assert!(tracker.try_register(peer(1002)).is_none(), "cap reached");
    assert_eq!(tracker.count(), 2);

    tracker.unregister(&a);
    assert_eq!(tracker.count(), 1);
    assert!(tracker.try_register(peer(1003)).is_some(), "slot freed");
}

#[test]
fn unregister_is_latched() {
    let tracker = ConnectionTracker::new(0);
    let record = tracker.try_register(peer(2000)).expect("register");
    assert_eq!(tracker.count(), 1);
    // handler exit, reaper and shutdown may all race to unregister
    assert!(tracker.unregister(&record));
    assert!(!tracker.unregister(&record));
    assert!(!tracker.unregister(&record));
    assert_eq!(tracker.count(), 0);
}

#[test]
fn reap_idle_selects_only_idle_connections() {
    let tracker = ConnectionTracker::new(0);
    let idle = tracker.try_register(peer(3000)).expect("idle conn");
    let busy = tracker.try_register(peer(3001)).expect("busy conn");

    std::thread::sleep(Duration::from_millis(80));
    busy.touch(tracker.epoch());
    let reaped = tracker.reap_idle(Duration::from_millis(50));
    assert_eq!(reaped, 1);
    // only the idle record was asked to close
    drop(idle);
}

#[tokio::test]
async fn idle_connection_is_closed_by_the_reaper() {
    let backend = Arc::new(MemFs::new());
    let config = ServerConfig {
        idle_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let listener = Arc::new(
        NfsTcpListener::bind("127.0.0.1:0", backend, config).await.expect("bind"),
    );
    let port = listener.get_listen_port();
    let server = listener.clone();
    tokio::spawn(async move {
        let _ = server.handle_forever().await;
    });

    let mut socket = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
    // send nothing: the reaper must close us within idle_timeout plus one
    // reaper period plus margin
    let mut buf = [0_u8; 16];
    let read = timeout(Duration::from_secs(3), socket.read(&mut buf))
        .await
        .expect("connection was not closed in time")
        .expect("read");
    assert_eq!(read, 0, "server closed the idle connection");

    // the registry must drain back to zero
    timeout(Duration::from_secs(2), async {
        while listener.tracker().count() != 0 {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("connection count must return to zero");
}

#[tokio::test]
async fn listener_rejects_peers_outside_the_allow_list() {
    let backend = Arc::new(MemFs::new());
    let config = ServerConfig {
        allowed_ips: vec![AllowedIp::parse("10.0.0.0/8").unwrap()],
        ..Default::default()
    };
    let listener = Arc::new(
        NfsTcpListener::bind("127.0.0.1:0", backend, config).await.expect("bind"),
    );
    let port = listener.get_listen_port();
    let server = listener.clone();
    tokio::spawn(async move {
        let _ = server.handle_forever().await;
    });

    let mut socket = TcpStream::connect(("127.0.0.1", port)).await.expect("tcp connect");
    let mut buf = [0_u8; 16];
    let read = timeout(Duration::from_secs(2), socket.read(&mut buf))
        .await
        .expect("server should close immediately")
        .expect("read");
    assert_eq!(read, 0, "loopback peer is outside the allow-list");
    assert_eq!(listener.tracker().count(), 0, "rejected peer is never registered");
}

#[tokio::test]
async fn accept_cycle_leaves_connection_count_unchanged() {
    let backend = Arc::new(MemFs::new());
    let listener = Arc::new(
        NfsTcpListener::bind("127.0.0.1:0", backend, ServerConfig::default())
            .await
            .expect("bind"),
    );
    let port = listener.get_listen_port();
    let server = listener.clone();
    tokio::spawn(async move {
        let _ = server.handle_forever().await;
    });

    assert_eq!(listener.tracker().count(), 0);
    for _ in 0..3 {
        let socket = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
        // wait until the server has registered us
        timeout(Duration::from_secs(2), async {
            while listener.tracker().count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registration");
        drop(socket);
        timeout(Duration::from_secs(2), async {
            while listener.tracker().count() != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("count must return to zero after peer close");
    }
}

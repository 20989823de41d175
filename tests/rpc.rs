//! RPC dispatcher tests: framing limits, program routing errors,
//! authentication denials and retransmission suppression.

mod support;

use std::io::Cursor;

use tokio::io::AsyncWriteExt;

use nfs_tundra::config::{AllowedIp, ServerConfig, SquashMode};
use nfs_tundra::protocol::rpc::{read_record, MAX_RPC_RECORD_LENGTH};
use nfs_tundra::xdr::{self, deserialize, nfs3, Serialize};

use support::TestServer;

fn accepted_body(reply: &[u8]) -> xdr::rpc::accept_body {
    let msg = deserialize::<xdr::rpc::rpc_msg>(&mut Cursor::new(reply.to_vec())).expect("reply");
    match msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_ACCEPTED(accepted)) => {
            accepted.reply_data
        }
        other => panic!("expected MSG_ACCEPTED, got {other:?}"),
    }
}

fn denied_body(reply: &[u8]) -> xdr::rpc::rejected_reply {
    let msg = deserialize::<xdr::rpc::rpc_msg>(&mut Cursor::new(reply.to_vec())).expect("reply");
    match msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_DENIED(rejected)) => rejected,
        other => panic!("expected MSG_DENIED, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_program_is_prog_unavail() {
    let server = TestServer::new(ServerConfig::default());
    let record = server.call_bytes(server.next_xid(), 100999, 1, 0, &());
    let reply = server.process(&record).await.expect("reply");
    assert!(matches!(accepted_body(&reply), xdr::rpc::accept_body::PROG_UNAVAIL));
}

#[tokio::test]
async fn wrong_nfs_version_is_prog_mismatch() {
    let server = TestServer::new(ServerConfig::default());
    let record =
        server.call_bytes(server.next_xid(), nfs3::PROGRAM, nfs3::VERSION + 1, 0, &());
    let reply = server.process(&record).await.expect("reply");
    match accepted_body(&reply) {
        xdr::rpc::accept_body::PROG_MISMATCH(info) => {
            assert_eq!(info.low, nfs3::VERSION);
            assert_eq!(info.high, nfs3::VERSION);
        }
        other => panic!("expected PROG_MISMATCH, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_procedure_is_proc_unavail() {
    let server = TestServer::new(ServerConfig::default());
    let record = server.call_bytes(server.next_xid(), nfs3::PROGRAM, nfs3::VERSION, 99, &());
    let reply = server.process(&record).await.expect("reply");
    assert!(matches!(accepted_body(&reply), xdr::rpc::accept_body::PROC_UNAVAIL));
}

#[tokio::test]
async fn short_arguments_are_garbage_args() {
    let server = TestServer::new(ServerConfig::default());
    // GETATTR with no file handle behind the header
    let record = server.call_bytes(server.next_xid(), nfs3::PROGRAM, nfs3::VERSION, 1, &());
    let reply = server.process(&record).await.expect("reply");
    assert!(matches!(accepted_body(&reply), xdr::rpc::accept_body::GARBAGE_ARGS));
}

#[tokio::test]
async fn oversize_string_argument_is_garbage_args() {
    let server = TestServer::new(ServerConfig::default());
    let root = server.mount_root().await;
    // hand-build LOOKUP args with a poisoned name length
    let mut args = Vec::new();
    root.serialize(&mut args).unwrap();
    args.extend_from_slice(&0xFFFF_FFFF_u32.to_be_bytes());
    let record = server.call_bytes(server.next_xid(), nfs3::PROGRAM, nfs3::VERSION, 3, &());
    let mut record = record;
    record.extend_from_slice(&args);
    let reply = server.process(&record).await.expect("reply");
    assert!(matches!(accepted_body(&reply), xdr::rpc::accept_body::GARBAGE_ARGS));
}

#[tokio::test]
async fn rpc_version_other_than_two_is_denied() {
    let server = TestServer::new(ServerConfig::default());
    let call = xdr::rpc::call_body {
        rpcvers: 3,
        prog: nfs3::PROGRAM,
        vers: nfs3::VERSION,
        proc: 0,
        cred: xdr::rpc::opaque_auth::default(),
        verf: xdr::rpc::opaque_auth::default(),
    };
    let msg = xdr::rpc::rpc_msg { xid: 5, body: xdr::rpc::rpc_body::CALL(call) };
    let mut record = Vec::new();
    msg.serialize(&mut record).unwrap();
    let reply = server.process(&record).await.expect("reply");
    assert!(matches!(denied_body(&reply), xdr::rpc::rejected_reply::RPC_MISMATCH(_)));
}

#[tokio::test]
async fn malformed_auth_sys_credential_is_denied_badcred() {
    let server = TestServer::new(ServerConfig::default());
    let call = xdr::rpc::call_body {
        rpcvers: 2,
        prog: nfs3::PROGRAM,
        vers: nfs3::VERSION,
        proc: 0,
        cred: xdr::rpc::opaque_auth {
            flavor: xdr::rpc::auth_flavor::AUTH_SYS,
            // too short to hold even the stamp
            body: vec![1, 2],
        },
        verf: xdr::rpc::opaque_auth::default(),
    };
    let msg = xdr::rpc::rpc_msg { xid: 6, body: xdr::rpc::rpc_body::CALL(call) };
    let mut record = Vec::new();
    msg.serialize(&mut record).unwrap();
    let reply = server.process(&record).await.expect("reply");
    match denied_body(&reply) {
        xdr::rpc::rejected_reply::AUTH_ERROR(stat) => {
            assert_eq!(stat, xdr::rpc::auth_stat::AUTH_BADCRED);
        }
        other => panic!("expected AUTH_ERROR, got {other:?}"),
    }
}

#[tokio::test]
async fn peer_outside_allow_list_is_denied() {
    let mut config = ServerConfig::default();
    config.allowed_ips = vec![AllowedIp::parse("10.0.0.0/8").unwrap()];
    let server = TestServer::with_client(config, "192.168.1.9:50000");
    let record = server.call_bytes(server.next_xid(), nfs3::PROGRAM, nfs3::VERSION, 0, &());
    let reply = server.process(&record).await.expect("reply");
    assert!(matches!(
        denied_body(&reply),
        xdr::rpc::rejected_reply::AUTH_ERROR(xdr::rpc::auth_stat::AUTH_TOOWEAK)
    ));
}

#[tokio::test]
async fn peer_inside_allow_list_is_served() {
    let mut config = ServerConfig::default();
    config.allowed_ips = vec![AllowedIp::parse("10.0.0.0/8").unwrap()];
    let server = TestServer::with_client(config, "10.1.2.3:50000");
    let record = server.call_bytes(server.next_xid(), nfs3::PROGRAM, nfs3::VERSION, 0, &());
    let reply = server.process(&record).await.expect("reply");
    assert!(matches!(accepted_body(&reply), xdr::rpc::accept_body::SUCCESS));
}

#[tokio::test]
async fn secure_mode_requires_privileged_source_port() {
    let mut config = ServerConfig::default();
    config.secure = true;
    let server = TestServer::with_client(config, "127.0.0.1:2048");
    let record = server.call_bytes(server.next_xid(), nfs3::PROGRAM, nfs3::VERSION, 0, &());
    let reply = server.process(&record).await.expect("reply");
    assert!(matches!(
        denied_body(&reply),
        xdr::rpc::rejected_reply::AUTH_ERROR(xdr::rpc::auth_stat::AUTH_TOOWEAK)
    ));

    let mut config = ServerConfig::default();
    config.secure = true;
    let server = TestServer::with_client(config, "127.0.0.1:1023");
    let record = server.call_bytes(server.next_xid(), nfs3::PROGRAM, nfs3::VERSION, 0, &());
    let reply = server.process(&record).await.expect("reply");
    assert!(matches!(accepted_body(&reply), xdr::rpc::accept_body::SUCCESS));
}

#[tokio::test]
async fn retransmitted_xid_is_dropped() {
    let server = TestServer::new(ServerConfig::default());
    let xid = server.next_xid();
    let record = server.call_bytes(xid, nfs3::PROGRAM, nfs3::VERSION, 0, &());
    assert!(server.process(&record).await.is_some());
    assert!(server.process(&record).await.is_none(), "retransmission must be dropped");
}

#[test]
fn dedup_journal_expires_answered_calls() {
    use nfs_tundra::protocol::rpc::CallDedup;
    use std::time::Duration;

    let dedup = CallDedup::new(Duration::from_millis(40));
    assert!(dedup.begin(7));
    assert!(!dedup.begin(7), "in-flight duplicate is refused");
    dedup.complete(7);
    assert!(!dedup.begin(7), "answered call is refused within retention");

    std::thread::sleep(Duration::from_millis(60));
    assert!(dedup.begin(8), "new xid admitted");
    assert!(dedup.begin(7), "expired xid is admitted again");
    assert_eq!(dedup.len(), 2, "only the live xids remain journaled");
}

#[tokio::test]
async fn root_squash_rewrites_root_credentials() {
    let mut config = ServerConfig::default();
    config.squash = SquashMode::Root;
    let server = TestServer::new(config);
    let peer = server.context.client_addr;
    let cred = xdr::rpc::opaque_auth {
        flavor: xdr::rpc::auth_flavor::AUTH_SYS,
        body: {
            let auth = xdr::rpc::auth_sys {
                stamp: 1,
                machinename: b"client".to_vec(),
                uid: 0,
                gid: 0,
                gids: vec![],
            };
            let mut buf = Vec::new();
            auth.serialize(&mut buf).unwrap();
            buf
        },
    };
    let creds = nfs_tundra::protocol::rpc::authenticate(&cred, peer, &server.context.config)
        .expect("authenticated");
    assert_eq!(creds.uid, 65534);
    assert_eq!(creds.gid, 65534);
}

#[tokio::test]
async fn rejects_oversized_rpc_fragment() {
    let (mut client, mut server_end) = tokio::io::duplex(64);

    let oversized = MAX_RPC_RECORD_LENGTH + 1;
    let fragment_header = (1_u32 << 31) | (oversized as u32);
    client
        .write_all(&fragment_header.to_be_bytes())
        .await
        .expect("write fragment header");

    let err = read_record(&mut server_end).await.expect_err("expected oversize error");
    assert!(err.to_string().contains("exceeds max"), "unexpected error: {err:?}");
}

#[tokio::test]
async fn fragmented_record_is_reassembled_and_processed() {
    let server = TestServer::new(ServerConfig::default());
    let (mut client, mut server_end) = tokio::io::duplex(4096);

    let xid = server.next_xid();
    let record = server.call_bytes(xid, nfs3::PROGRAM, nfs3::VERSION, 0, &());
    let (first, second) = record.split_at(record.len() / 2);

    let header = first.len() as u32; // high bit clear: more fragments follow
    client.write_all(&header.to_be_bytes()).await.unwrap();
    client.write_all(first).await.unwrap();
    let header = (1_u32 << 31) | second.len() as u32;
    client.write_all(&header.to_be_bytes()).await.unwrap();
    client.write_all(second).await.unwrap();

    let reassembled = read_record(&mut server_end)
        .await
        .expect("record read")
        .expect("record present");
    assert_eq!(reassembled, record, "fragments must concatenate to the original record");

    let reply = server.process(&reassembled).await.expect("reply");
    let msg = deserialize::<xdr::rpc::rpc_msg>(&mut Cursor::new(reply)).expect("reply msg");
    assert_eq!(msg.xid, xid);
}

#[tokio::test]
async fn end_of_stream_at_record_boundary_is_clean() {
    let (client, mut server_end) = tokio::io::duplex(64);
    drop(client);
    let result = read_record(&mut server_end).await.expect("clean eof");
    assert!(result.is_none());
}

#[tokio::test]
async fn end_of_stream_inside_a_record_is_an_error() {
    let (mut client, mut server_end) = tokio::io::duplex(64);
    // a last-fragment header promising 16 bytes, then only 4 arrive
    let fragment_header = (1_u32 << 31) | 16_u32;
    client.write_all(&fragment_header.to_be_bytes()).await.unwrap();
    client.write_all(&[0_u8; 4]).await.unwrap();
    drop(client);
    assert!(read_record(&mut server_end).await.is_err());
}

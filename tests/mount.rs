//! MOUNT protocol tests: MNT, DUMP, UMNT, UMNTALL and EXPORT.

mod support;

use std::io::Cursor;

use nfs_tundra::config::{AllowedIp, ServerConfig};
use nfs_tundra::xdr::{self, deserialize, mount, nfs3};

use support::TestServer;

async fn mount_call(
    server: &TestServer,
    proc: u32,
    args: &impl xdr::Serialize,
) -> Cursor<Vec<u8>> {
    let xid = server.next_xid();
    let record = server.call_bytes(xid, mount::PROGRAM, mount::VERSION, proc, args);
    let reply = server.process(&record).await.expect("mount reply");
    let mut cursor = Cursor::new(reply);
    let header = deserialize::<xdr::rpc::rpc_msg>(&mut cursor).expect("header");
    assert_eq!(header.xid, xid);
    cursor
}

#[tokio::test]
async fn mnt_returns_root_handle_and_auth_flavors() {
    let server = TestServer::new(ServerConfig::default());
    let path: mount::dirpath = "/".into();
    let mut rest = mount_call(&server, 1, &path).await;
    let status = deserialize::<mount::mountstat3>(&mut rest).expect("status");
    assert_eq!(status, mount::mountstat3::MNT3_OK);
    let res = deserialize::<mount::mountres3_ok>(&mut rest).expect("resok");
    assert_eq!(res.fhandle.len(), 8, "this server mints 8-byte handles");
    assert_eq!(res.auth_flavors, vec![0, 1], "AUTH_NONE and AUTH_SYS");

    // the returned handle resolves
    let fh = nfs3::nfs_fh3 { data: res.fhandle };
    let (status, _) = server.nfs_call(1, &fh).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
}

#[tokio::test]
async fn mnt_of_subdirectory_resolves_and_unknown_path_is_noent() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_dir("/exports");
    let path: mount::dirpath = "/exports".into();
    let mut rest = mount_call(&server, 1, &path).await;
    let status = deserialize::<mount::mountstat3>(&mut rest).expect("status");
    assert_eq!(status, mount::mountstat3::MNT3_OK);

    let path: mount::dirpath = "/missing".into();
    let mut rest = mount_call(&server, 1, &path).await;
    let status = deserialize::<mount::mountstat3>(&mut rest).expect("status");
    assert_eq!(status, mount::mountstat3::MNT3ERR_NOENT);
}

#[tokio::test]
async fn dump_lists_mounts_and_umnt_removes_them() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_dir("/a");
    server.backend.add_dir("/b");

    for export in ["/a", "/b"] {
        let path: mount::dirpath = export.into();
        let mut rest = mount_call(&server, 1, &path).await;
        let status = deserialize::<mount::mountstat3>(&mut rest).expect("status");
        assert_eq!(status, mount::mountstat3::MNT3_OK);
    }
    assert_eq!(server.context.mounts.len(), 2);

    // DUMP reflects both records
    let mut rest = mount_call(&server, 2, &()).await;
    let mut listed = Vec::new();
    while deserialize::<bool>(&mut rest).expect("list flag") {
        let body = deserialize::<mount::mountbody>(&mut rest).expect("mountbody");
        listed.push(body.ml_directory.to_string());
    }
    assert_eq!(listed.len(), 2);
    assert!(listed.contains(&"/a".to_string()));
    assert!(listed.contains(&"/b".to_string()));

    // UMNT drops one record, UMNTALL the rest
    let path: mount::dirpath = "/a".into();
    let _ = mount_call(&server, 3, &path).await;
    assert_eq!(server.context.mounts.len(), 1);

    let _ = mount_call(&server, 4, &()).await;
    assert!(server.context.mounts.is_empty());
}

#[tokio::test]
async fn umnt_does_not_revoke_handles() {
    let server = TestServer::new(ServerConfig::default());
    let root = server.mount_root().await;

    let path: mount::dirpath = "/".into();
    let _ = mount_call(&server, 3, &path).await;

    // NFS is stateless: the handle still works after UMNT
    let (status, _) = server.nfs_call(1, &root).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
}

#[tokio::test]
async fn export_reports_the_export_and_its_allow_list() {
    let mut config = ServerConfig::default();
    config.allowed_ips = vec![
        AllowedIp::parse("10.0.0.0/8").unwrap(),
        AllowedIp::parse("127.0.0.1").unwrap(),
    ];
    let server = TestServer::with_client(config, "10.2.3.4:700");

    let mut rest = mount_call(&server, 5, &()).await;
    let more = deserialize::<bool>(&mut rest).expect("list flag");
    assert!(more);
    let node = deserialize::<mount::exportnode>(&mut rest).expect("exportnode");
    assert_eq!(node.ex_dir.to_string(), "/");
    let groups: Vec<String> = node.ex_groups.iter().map(|g| g.to_string()).collect();
    assert_eq!(groups, vec!["10.0.0.0/8".to_string(), "127.0.0.1".to_string()]);
    let more = deserialize::<bool>(&mut rest).expect("terminator");
    assert!(!more);
}

#[tokio::test]
async fn unknown_mount_procedure_is_proc_unavail() {
    let server = TestServer::new(ServerConfig::default());
    let xid = server.next_xid();
    let record = server.call_bytes(xid, mount::PROGRAM, mount::VERSION, 42, &());
    let reply = server.process(&record).await.expect("reply");
    let msg = deserialize::<xdr::rpc::rpc_msg>(&mut Cursor::new(reply)).expect("header");
    match msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_ACCEPTED(accepted)) => {
            assert!(matches!(accepted.reply_data, xdr::rpc::accept_body::PROC_UNAVAIL));
        }
        other => panic!("expected MSG_ACCEPTED, got {other:?}"),
    }
}

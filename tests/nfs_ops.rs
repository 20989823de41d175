//! End-to-end NFSv3 procedure tests through the RPC dispatcher against the
//! in-memory backing filesystem.

mod support;

use nfs_tundra::xdr::{deserialize, nfs3, Serialize};

use nfs_tundra::config::ServerConfig;
use nfs_tundra::facade::VfsFacade;
use support::TestServer;

fn name(n: &str) -> nfs3::filename3 {
    n.into()
}

async fn lookup_fh(
    server: &TestServer,
    dir: &nfs3::nfs_fh3,
    child: &str,
) -> (nfs3::nfsstat3, Option<nfs3::nfs_fh3>) {
    let args = nfs3::diropargs3 { dir: dir.clone(), name: name(child) };
    let (status, mut rest) = server.nfs_call(3, &args).await;
    if status == nfs3::nfsstat3::NFS3_OK {
        let fh = deserialize::<nfs3::nfs_fh3>(&mut rest).expect("object fh");
        (status, Some(fh))
    } else {
        (status, None)
    }
}

#[tokio::test]
async fn getattr_of_mounted_root() {
    let server = TestServer::new(ServerConfig::default());
    let root = server.mount_root().await;
    let (status, mut rest) = server.nfs_call(1, &root).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let attr = deserialize::<nfs3::fattr3>(&mut rest).expect("attributes");
    assert_eq!(attr.ftype, nfs3::ftype3::NF3DIR);
    assert_eq!(server.context.stats.calls(), 1);
}

#[tokio::test]
async fn getattr_with_unknown_handle_is_stale() {
    let server = TestServer::new(ServerConfig::default());
    let bogus = nfs3::nfs_fh3 { data: 0x4242_u64.to_be_bytes().to_vec() };
    let (status, _) = server.nfs_call(1, &bogus).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_STALE);
}

#[tokio::test]
async fn getattr_with_malformed_handle_is_badhandle() {
    let server = TestServer::new(ServerConfig::default());
    let bogus = nfs3::nfs_fh3 { data: vec![1, 2, 3] };
    let (status, _) = server.nfs_call(1, &bogus).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_BADHANDLE);
}

#[tokio::test]
async fn lookup_traversal_names_are_rejected_without_backend_access() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/visible.txt", b"data");
    let root = server.mount_root().await;
    let log_before = server.backend.stat_log().len();

    for hostile in ["../../../etc/passwd", "..", ".", "a/b", "a\\b", "nul\0byte", ""] {
        let args = nfs3::diropargs3 {
            dir: root.clone(),
            name: hostile.as_bytes().into(),
        };
        let (status, _) = server.nfs_call(3, &args).await;
        assert_eq!(
            status,
            nfs3::nfsstat3::NFS3ERR_ACCES,
            "name {hostile:?} must be rejected"
        );
    }
    // the directory itself may be statted for post-op attributes, but no
    // hostile name may ever reach the backend
    let log = server.backend.stat_log();
    assert!(
        log[log_before..].iter().all(|path| path == "/"),
        "backend was consulted for a hostile name: {log:?}"
    );
}

#[tokio::test]
async fn read_offset_overflow_is_inval() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/f.txt", b"hello");
    let root = server.mount_root().await;
    let (_, fh) = lookup_fh(&server, &root, "f.txt").await;
    let args = nfs3::file::READ3args { file: fh.unwrap(), offset: u64::MAX, count: 1 };
    let (status, _) = server.nfs_call(6, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_INVAL);
}

#[tokio::test]
async fn read_count_over_transfer_size_is_inval() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/f.txt", b"hello");
    let root = server.mount_root().await;
    let (_, fh) = lookup_fh(&server, &root, "f.txt").await;
    let too_big = server.context.config.max_io_size() + 1;
    let args = nfs3::file::READ3args { file: fh.unwrap(), offset: 0, count: too_big };
    let (status, _) = server.nfs_call(6, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_INVAL);
}

#[tokio::test]
async fn read_returns_data_and_eof() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/f.txt", b"hello world");
    let root = server.mount_root().await;
    let (_, fh) = lookup_fh(&server, &root, "f.txt").await;
    let fh = fh.unwrap();

    let args = nfs3::file::READ3args { file: fh.clone(), offset: 0, count: 5 };
    let (status, mut rest) = server.nfs_call(6, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let res = deserialize::<nfs3::file::READ3resok>(&mut rest).expect("read resok");
    assert_eq!(res.data, b"hello");
    assert!(!res.eof);

    let args = nfs3::file::READ3args { file: fh, offset: 6, count: 64 };
    let (status, mut rest) = server.nfs_call(6, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let res = deserialize::<nfs3::file::READ3resok>(&mut rest).expect("read resok");
    assert_eq!(res.data, b"world");
    assert!(res.eof);
}

#[tokio::test]
async fn write_then_read_roundtrip_with_wcc() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/f.txt", b"xxxxx");
    let root = server.mount_root().await;
    let (_, fh) = lookup_fh(&server, &root, "f.txt").await;
    let fh = fh.unwrap();

    let args = nfs3::file::WRITE3args {
        file: fh.clone(),
        offset: 0,
        count: 5,
        stable: nfs3::file::stable_how::FILE_SYNC,
        data: b"hello".to_vec(),
    };
    let (status, mut rest) = server.nfs_call(7, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let res = deserialize::<nfs3::file::WRITE3resok>(&mut rest).expect("write resok");
    assert_eq!(res.count, 5);
    assert_eq!(res.committed, nfs3::file::stable_how::FILE_SYNC);
    assert!(matches!(res.file_wcc.before, nfs3::pre_op_attr::attributes(_)));
    assert!(matches!(res.file_wcc.after, nfs3::post_op_attr::attributes(_)));

    assert_eq!(server.backend.file_data("/f.txt").unwrap(), b"hello");
}

#[tokio::test]
async fn write_count_mismatch_is_garbage_args() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/f.txt", b"xxxxx");
    let root = server.mount_root().await;
    let (_, fh) = lookup_fh(&server, &root, "f.txt").await;
    let args = nfs3::file::WRITE3args {
        file: fh.unwrap(),
        offset: 0,
        count: 99,
        stable: nfs3::file::stable_how::UNSTABLE,
        data: b"short".to_vec(),
    };
    let xid = server.next_xid();
    let record = server.call_bytes(xid, nfs3::PROGRAM, nfs3::VERSION, 7, &args);
    let reply = server.process(&record).await.expect("reply");
    // accept body 4 = GARBAGE_ARGS lives at byte offset 20 of the reply
    let msg = deserialize::<nfs_tundra::xdr::rpc::rpc_msg>(&mut std::io::Cursor::new(reply))
        .expect("reply header");
    match msg.body {
        nfs_tundra::xdr::rpc::rpc_body::REPLY(
            nfs_tundra::xdr::rpc::reply_body::MSG_ACCEPTED(accepted),
        ) => {
            assert!(matches!(
                accepted.reply_data,
                nfs_tundra::xdr::rpc::accept_body::GARBAGE_ARGS
            ));
        }
        other => panic!("unexpected body {other:?}"),
    }
}

#[tokio::test]
async fn read_only_server_rejects_mutations() {
    let mut config = ServerConfig::default();
    config.read_only = true;
    let server = TestServer::new(config);
    server.backend.add_file("/f.txt", b"hello");
    let root = server.mount_root().await;
    let (_, fh) = lookup_fh(&server, &root, "f.txt").await;

    let args = nfs3::file::WRITE3args {
        file: fh.unwrap(),
        offset: 0,
        count: 2,
        stable: nfs3::file::stable_how::UNSTABLE,
        data: b"no".to_vec(),
    };
    let (status, _) = server.nfs_call(7, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_ROFS);

    let args = nfs3::file::CREATE3args {
        dirops: nfs3::diropargs3 { dir: root.clone(), name: name("new.txt") },
        how: nfs3::file::createhow3::default(),
    };
    let (status, _) = server.nfs_call(8, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_ROFS);
}

#[tokio::test]
async fn negative_lookup_is_invalidated_by_create() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_dir("/d");
    let root = server.mount_root().await;
    let (_, dir_fh) = lookup_fh(&server, &root, "d").await;
    let dir_fh = dir_fh.unwrap();

    // miss populates the negative cache
    let (status, _) = lookup_fh(&server, &dir_fh, "f").await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_NOENT);
    // a second miss is served from the negative cache (no backend stat)
    let stats_before = server.backend.stat_log().len();
    let (status, _) = lookup_fh(&server, &dir_fh, "f").await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_NOENT);
    assert_eq!(server.backend.stat_log().len(), stats_before);

    let args = nfs3::file::CREATE3args {
        dirops: nfs3::diropargs3 { dir: dir_fh.clone(), name: name("f") },
        how: nfs3::file::createhow3::default(),
    };
    let (status, _) = server.nfs_call(8, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);

    // the create must have cleared the negative entry
    let (status, fh) = lookup_fh(&server, &dir_fh, "f").await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    assert!(fh.is_some());
}

#[tokio::test]
async fn guarded_create_fails_on_existing_file() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/f.txt", b"old");
    let root = server.mount_root().await;
    let args = nfs3::file::CREATE3args {
        dirops: nfs3::diropargs3 { dir: root, name: name("f.txt") },
        how: nfs3::file::createhow3::GUARDED(nfs3::sattr3::default()),
    };
    let (status, _) = server.nfs_call(8, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_EXIST);
}

#[tokio::test]
async fn exclusive_create_is_idempotent_per_verifier() {
    let server = TestServer::new(ServerConfig::default());
    let root = server.mount_root().await;
    let verf: nfs3::createverf3 = [1, 2, 3, 4, 5, 6, 7, 8];

    let args = nfs3::file::CREATE3args {
        dirops: nfs3::diropargs3 { dir: root.clone(), name: name("x") },
        how: nfs3::file::createhow3::EXCLUSIVE(verf),
    };
    let (status, _) = server.nfs_call(8, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);

    // the retransmitted create with the same verifier succeeds
    let args = nfs3::file::CREATE3args {
        dirops: nfs3::diropargs3 { dir: root.clone(), name: name("x") },
        how: nfs3::file::createhow3::EXCLUSIVE(verf),
    };
    let (status, _) = server.nfs_call(8, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);

    // a different verifier for the same name is a conflict
    let other: nfs3::createverf3 = [9, 9, 9, 9, 9, 9, 9, 9];
    let args = nfs3::file::CREATE3args {
        dirops: nfs3::diropargs3 { dir: root, name: name("x") },
        how: nfs3::file::createhow3::EXCLUSIVE(other),
    };
    let (status, _) = server.nfs_call(8, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_EXIST);
}

#[tokio::test]
async fn setattr_guard_mismatch_is_not_sync() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/f.txt", b"hello");
    let root = server.mount_root().await;
    let (_, fh) = lookup_fh(&server, &root, "f.txt").await;

    let args = nfs3::SETATTR3args {
        object: fh.unwrap(),
        new_attributes: nfs3::sattr3 {
            mode: nfs3::set_mode3::mode(0o600),
            ..Default::default()
        },
        guard: nfs3::sattrguard3::obj_ctime(nfs3::nfstime3 { seconds: 1, nseconds: 1 }),
    };
    let (status, _) = server.nfs_call(2, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_NOT_SYNC);
}

#[tokio::test]
async fn setattr_then_getattr_observes_the_change() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/f.txt", b"hello");
    let root = server.mount_root().await;
    let (_, fh) = lookup_fh(&server, &root, "f.txt").await;
    let fh = fh.unwrap();

    let (_, mut rest) = server.nfs_call(1, &fh).await;
    let attr_before = deserialize::<nfs3::fattr3>(&mut rest).expect("attributes");

    let args = nfs3::SETATTR3args {
        object: fh.clone(),
        new_attributes: nfs3::sattr3 {
            mode: nfs3::set_mode3::mode(0o600),
            size: nfs3::set_size3::size(2),
            ..Default::default()
        },
        guard: nfs3::sattrguard3::Void,
    };
    let (status, _) = server.nfs_call(2, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);

    let (status, mut rest) = server.nfs_call(1, &fh).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let attr = deserialize::<nfs3::fattr3>(&mut rest).expect("attributes");
    assert_eq!(attr.mode, 0o600);
    assert_eq!(attr.size, 2);
    assert!(nfs_tundra::fs_util::fattr3_differ(&attr_before, &attr));
}

#[tokio::test]
async fn remove_of_directory_is_isdir_and_rmdir_of_file_is_notdir() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_dir("/d");
    server.backend.add_file("/f.txt", b"x");
    let root = server.mount_root().await;

    let args = nfs3::diropargs3 { dir: root.clone(), name: name("d") };
    let (status, _) = server.nfs_call(12, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_ISDIR);

    let args = nfs3::diropargs3 { dir: root, name: name("f.txt") };
    let (status, _) = server.nfs_call(13, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_NOTDIR);
}

#[tokio::test]
async fn rmdir_of_non_empty_directory_is_notempty() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_dir("/d");
    server.backend.add_file("/d/f", b"x");
    let root = server.mount_root().await;

    let args = nfs3::diropargs3 { dir: root, name: name("d") };
    let (status, _) = server.nfs_call(13, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_NOTEMPTY);
}

#[tokio::test]
async fn rename_moves_the_object_and_old_handle_goes_stale() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/a.txt", b"payload");
    let root = server.mount_root().await;
    let (_, old_fh) = lookup_fh(&server, &root, "a.txt").await;
    let old_fh = old_fh.unwrap();

    let args = nfs3::dir::RENAME3args {
        from: nfs3::diropargs3 { dir: root.clone(), name: name("a.txt") },
        to: nfs3::diropargs3 { dir: root.clone(), name: name("b.txt") },
    };
    let (status, _) = server.nfs_call(14, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);

    assert!(!server.backend.contains("/a.txt"));
    assert_eq!(server.backend.file_data("/b.txt").unwrap(), b"payload");

    let (status, _) = server.nfs_call(1, &old_fh).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_STALE);

    let (status, fh) = lookup_fh(&server, &root, "b.txt").await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    assert!(fh.is_some());
}

#[tokio::test]
async fn link_and_mknod_are_notsupp() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/f.txt", b"x");
    let root = server.mount_root().await;
    let (_, fh) = lookup_fh(&server, &root, "f.txt").await;

    let args = nfs3::file::LINK3args {
        file: fh.unwrap(),
        link: nfs3::diropargs3 { dir: root.clone(), name: name("l") },
    };
    let (status, _) = server.nfs_call(15, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_NOTSUPP);

    let args = nfs3::dir::MKNOD3args {
        where_dir: nfs3::diropargs3 { dir: root, name: name("fifo") },
        what: nfs3::dir::mknoddata3::FIFO(nfs3::sattr3::default()),
    };
    let (status, _) = server.nfs_call(11, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_NOTSUPP);
}

#[tokio::test]
async fn symlink_and_readlink_roundtrip() {
    let server = TestServer::new(ServerConfig::default());
    let root = server.mount_root().await;

    let args = nfs3::dir::SYMLINK3args {
        dirops: nfs3::diropargs3 { dir: root.clone(), name: name("ln") },
        symlink: nfs3::symlinkdata3 {
            symlink_attributes: nfs3::sattr3::default(),
            symlink_data: "target.txt".into(),
        },
    };
    let (status, mut rest) = server.nfs_call(10, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let res = deserialize::<nfs3::file::CREATE3resok>(&mut rest).expect("symlink resok");
    let fh = match res.obj {
        nfs3::post_op_fh3::handle(fh) => fh,
        nfs3::post_op_fh3::Void => panic!("expected a handle"),
    };

    let (status, mut rest) = server.nfs_call(5, &fh).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let _attr = deserialize::<nfs3::post_op_attr>(&mut rest).expect("post op attr");
    let target = deserialize::<nfs3::nfspath3>(&mut rest).expect("target");
    assert_eq!(target.as_ref(), b"target.txt");
}

#[tokio::test]
async fn readdir_paginates_with_cookies() {
    let server = TestServer::new(ServerConfig::default());
    for i in 0..10 {
        server.backend.add_file(&format!("/file{i:02}"), b"x");
    }
    let root = server.mount_root().await;

    let mut seen: Vec<String> = Vec::new();
    let mut cookie = 0_u64;
    let mut verifier = nfs3::cookieverf3::default();
    loop {
        let args = nfs3::dir::READDIR3args {
            dir: root.clone(),
            cookie,
            cookieverf: verifier,
            count: 300,
        };
        let (status, mut rest) = server.nfs_call(16, &args).await;
        assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
        let _dir_attr = deserialize::<nfs3::post_op_attr>(&mut rest).expect("dir attr");
        verifier = deserialize::<nfs3::cookieverf3>(&mut rest).expect("verifier");
        loop {
            let more = deserialize::<bool>(&mut rest).expect("list flag");
            if !more {
                break;
            }
            let entry = deserialize::<nfs3::dir::entry3>(&mut rest).expect("entry");
            seen.push(entry.name.to_string());
            cookie = entry.cookie;
        }
        let eof = deserialize::<bool>(&mut rest).expect("eof");
        if eof {
            break;
        }
    }
    assert_eq!(seen.len(), 10);
    let mut sorted = seen.clone();
    sorted.sort();
    assert_eq!(seen, sorted, "entries must arrive in stable order");
}

#[tokio::test]
async fn readdir_detects_directory_change_between_pages() {
    let server = TestServer::new(ServerConfig::default());
    for i in 0..6 {
        server.backend.add_file(&format!("/f{i}"), b"x");
    }
    let root = server.mount_root().await;

    let args = nfs3::dir::READDIR3args {
        dir: root.clone(),
        cookie: 0,
        cookieverf: nfs3::cookieverf3::default(),
        count: 200,
    };
    let (status, mut rest) = server.nfs_call(16, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let _dir_attr = deserialize::<nfs3::post_op_attr>(&mut rest).expect("dir attr");
    let verifier = deserialize::<nfs3::cookieverf3>(&mut rest).expect("verifier");

    // the directory changes under the client
    server.backend.touch_mtime("/");
    server.facade.attr_cache().invalidate("/");
    server.facade.dir_cache().invalidate("/");

    let args = nfs3::dir::READDIR3args {
        dir: root,
        cookie: 2,
        cookieverf: verifier,
        count: 200,
    };
    let (status, _) = server.nfs_call(16, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_BAD_COOKIE);
}

#[tokio::test]
async fn readdirplus_entries_carry_handles_and_attributes() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/data.bin", b"0123456789");
    let root = server.mount_root().await;

    let args = nfs3::dir::READDIRPLUS3args {
        dir: root,
        cookie: 0,
        cookieverf: nfs3::cookieverf3::default(),
        dircount: 1024,
        maxcount: 4096,
    };
    let (status, mut rest) = server.nfs_call(17, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let _dir_attr = deserialize::<nfs3::post_op_attr>(&mut rest).expect("dir attr");
    let _verifier = deserialize::<nfs3::cookieverf3>(&mut rest).expect("verifier");
    let more = deserialize::<bool>(&mut rest).expect("list flag");
    assert!(more);
    let entry = deserialize::<nfs3::dir::entryplus3>(&mut rest).expect("entryplus");
    assert_eq!(entry.name.to_string(), "data.bin");
    let fh = match entry.name_handle {
        nfs3::post_op_fh3::handle(fh) => fh,
        nfs3::post_op_fh3::Void => panic!("expected a handle"),
    };
    match entry.name_attributes {
        nfs3::post_op_attr::attributes(attr) => assert_eq!(attr.size, 10),
        nfs3::post_op_attr::Void => panic!("expected attributes"),
    }

    // the minted handle is immediately usable
    let (status, _) = server.nfs_call(1, &fh).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
}

#[tokio::test]
async fn fsinfo_advertises_configured_transfer_size() {
    let mut config = ServerConfig::default();
    config.transfer_size = 32 * 1024;
    let server = TestServer::new(config);
    let root = server.mount_root().await;

    let (status, mut rest) = server.nfs_call(19, &root).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let res = deserialize::<nfs3::fs::fsinfo3>(&mut rest).expect("fsinfo");
    assert_eq!(res.rtmax, 32 * 1024);
    assert_eq!(res.wtmax, 32 * 1024);
    assert_eq!(res.properties & nfs3::fs::FSF_SYMLINK, nfs3::fs::FSF_SYMLINK);
    assert_eq!(res.properties & nfs3::fs::FSF_LINK, 0);
}

#[tokio::test]
async fn pathconf_reports_name_limits() {
    let server = TestServer::new(ServerConfig::default());
    let root = server.mount_root().await;
    let (status, mut rest) = server.nfs_call(20, &root).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let res = deserialize::<nfs3::fs::PATHCONF3resok>(&mut rest).expect("pathconf");
    assert_eq!(res.name_max, 255);
    assert!(res.no_trunc);
    assert!(res.case_preserving);
}

#[tokio::test]
async fn commit_returns_a_stable_boot_verifier() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/f.txt", b"hello");
    let root = server.mount_root().await;
    let (_, fh) = lookup_fh(&server, &root, "f.txt").await;
    let fh = fh.unwrap();

    let args = nfs3::file::COMMIT3args { file: fh.clone(), offset: 0, count: 0 };
    let (status, mut rest) = server.nfs_call(21, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let first = deserialize::<nfs3::file::COMMIT3resok>(&mut rest).expect("commit resok");

    let args = nfs3::file::COMMIT3args { file: fh, offset: 0, count: 0 };
    let (status, mut rest) = server.nfs_call(21, &args).await;
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let second = deserialize::<nfs3::file::COMMIT3resok>(&mut rest).expect("commit resok");
    assert_eq!(first.verf, second.verf, "verifier is constant within one server lifetime");
    assert_eq!(first.verf, server.facade.write_verifier());
}

#[tokio::test]
async fn access_respects_read_only_flag() {
    let mut config = ServerConfig::default();
    config.read_only = true;
    let server = TestServer::new(config);
    server.backend.add_file("/f.txt", b"x");
    let root = server.mount_root().await;
    let (_, fh) = lookup_fh(&server, &root, "f.txt").await;

    let mut record = Vec::new();
    fh.unwrap().serialize(&mut record).unwrap();
    let all = nfs3::ACCESS3_READ
        | nfs3::ACCESS3_MODIFY
        | nfs3::ACCESS3_EXTEND
        | nfs3::ACCESS3_DELETE;
    let xid = server.next_xid();
    let mut call = server.call_bytes(xid, nfs3::PROGRAM, nfs3::VERSION, 4, &());
    call.extend_from_slice(&record);
    call.extend_from_slice(&all.to_be_bytes());
    let reply = server.process(&call).await.expect("reply");
    let mut cursor = std::io::Cursor::new(reply);
    let _header = deserialize::<nfs_tundra::xdr::rpc::rpc_msg>(&mut cursor).unwrap();
    let status = deserialize::<nfs3::nfsstat3>(&mut cursor).unwrap();
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK);
    let _attr = deserialize::<nfs3::post_op_attr>(&mut cursor).unwrap();
    let granted = deserialize::<u32>(&mut cursor).unwrap();
    assert_eq!(granted & nfs3::ACCESS3_READ, nfs3::ACCESS3_READ);
    assert_eq!(granted & (nfs3::ACCESS3_MODIFY | nfs3::ACCESS3_EXTEND | nfs3::ACCESS3_DELETE), 0);
}

#[tokio::test]
async fn facade_handle_count_balances_after_release_all() {
    let server = TestServer::new(ServerConfig::default());
    server.backend.add_file("/a", b"1");
    server.backend.add_file("/b", b"2");
    let root = server.mount_root().await;
    lookup_fh(&server, &root, "a").await;
    lookup_fh(&server, &root, "b").await;
    assert_eq!(server.facade.handle_count(), 3);
    server.facade.shutdown().await;
    assert_eq!(server.facade.handle_count(), 0);
}

#[tokio::test]
async fn facade_is_shareable_across_tasks() {
    // exercise concurrent lookups through one facade
    let server = TestServer::new(ServerConfig::default());
    for i in 0..8 {
        server.backend.add_file(&format!("/c{i}"), b"x");
    }
    let root = server.mount_root().await;
    let facade: std::sync::Arc<VfsFacade> = server.facade.clone();
    let root_node = facade.resolve(&root).expect("root node");

    let mut tasks = Vec::new();
    for i in 0..8 {
        let facade = facade.clone();
        let root_node = root_node.clone();
        tasks.push(tokio::spawn(async move {
            let fname: nfs3::filename3 = format!("c{i}").as_str().into();
            facade.lookup(&root_node, &fname, None).await
        }));
    }
    for task in tasks {
        let result = task.await.expect("join");
        assert!(result.is_ok());
    }
}

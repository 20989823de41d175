//! Façade-level tests: handle allocation and reuse, node-table lifetimes,
//! path sanitization, and the memory-pressure control loop.

mod support;

use std::sync::Arc;
use std::time::Duration;

use nfs_tundra::cache::{AttrCache, ReadAheadPool};
use nfs_tundra::config::{MemoryPressureConfig, ServerConfig};
use nfs_tundra::facade::{canonicalize_under_root, validate_component, HandleRegistry, NodeTable};
use nfs_tundra::limit::MemoryMonitor;
use nfs_tundra::xdr::nfs3;

use support::TestServer;

#[test]
fn handles_are_never_zero_and_count_balances() {
    let registry = HandleRegistry::new();
    let nodes = NodeTable::new();
    let root = nodes.root();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let handle = registry.allocate(root.clone(), None);
        assert_ne!(handle, 0);
        handles.push(handle);
    }
    assert_eq!(registry.count(), 16);
    for handle in &handles {
        assert!(registry.release(*handle).is_some());
    }
    assert_eq!(registry.count(), 0);
}

#[test]
fn released_handles_are_reused_smallest_first() {
    let registry = HandleRegistry::new();
    let nodes = NodeTable::new();
    let root = nodes.root();

    let h1 = registry.allocate(root.clone(), None);
    let h2 = registry.allocate(root.clone(), None);
    let h3 = registry.allocate(root.clone(), None);
    assert_eq!((h1, h2, h3), (1, 2, 3));

    registry.release(h2);
    registry.release(h1);
    // the smallest free handle wins, not the most recently released
    assert_eq!(registry.allocate(root.clone(), None), 1);
    assert_eq!(registry.allocate(root.clone(), None), 2);
    assert_eq!(registry.allocate(root, None), 4);
}

#[test]
fn registry_get_resolves_live_handles_only() {
    let registry = HandleRegistry::new();
    let nodes = NodeTable::new();
    let node = nodes.get_or_create("/some/file");
    let handle = registry.allocate(node.clone(), None);
    let resolved = registry.get(handle).expect("live handle");
    assert_eq!(resolved.path(), "/some/file");
    registry.release(handle);
    assert!(registry.get(handle).is_none());
}

#[test]
fn node_table_pins_root_and_drops_unreferenced_nodes() {
    let nodes = NodeTable::new();
    assert_eq!(nodes.root().path(), "/");
    assert_eq!(nodes.root().fileid(), nfs_tundra::facade::ROOT_FILEID);

    {
        let node = nodes.get_or_create("/tmp/x");
        assert!(nodes.get("/tmp/x").is_some());
        assert_eq!(node.fileid(), nfs_tundra::facade::fileid_for_path("/tmp/x"));
    }
    // the only strong reference is gone
    assert!(nodes.get("/tmp/x").is_none());
    assert!(nodes.get("/").is_some(), "root stays pinned");
}

#[test]
fn node_fileids_are_stable_and_nonzero() {
    let a = nfs_tundra::facade::fileid_for_path("/a/b/c");
    let b = nfs_tundra::facade::fileid_for_path("/a/b/c");
    assert_eq!(a, b);
    assert_ne!(a, 0);
    assert_ne!(a, nfs_tundra::facade::ROOT_FILEID);
}

#[test]
fn component_validation_rejects_traversal_shapes() {
    let bad: [&[u8]; 7] =
        [b"", b".", b"..", b"a/b", b"a\\b", b"nul\0", b"../etc"];
    for name in bad {
        let name: nfs3::filename3 = name.into();
        assert!(validate_component(&name).is_err(), "{name:?} must be rejected");
    }
    let good: nfs3::filename3 = "plain-name.txt".into();
    assert_eq!(validate_component(&good).unwrap(), "plain-name.txt");
}

#[test]
fn canonicalization_refuses_escapes() {
    assert_eq!(canonicalize_under_root("/a/b").as_deref(), Some("/a/b"));
    assert_eq!(canonicalize_under_root("/a//b/.").as_deref(), Some("/a/b"));
    assert_eq!(canonicalize_under_root("/a/../b").as_deref(), Some("/b"));
    assert_eq!(canonicalize_under_root("/..").as_deref(), None);
    assert_eq!(canonicalize_under_root("/a/../../etc").as_deref(), None);
    assert_eq!(canonicalize_under_root("relative").as_deref(), None);
}

#[tokio::test]
async fn handle_quota_exhaustion_is_transient() {
    let mut config = ServerConfig::default();
    config.rate_limit = Some(nfs_tundra::config::RateLimitConfig {
        max_handles_per_ip: 1,
        max_handles_global: 100,
        ..Default::default()
    });
    let server = TestServer::new(config);
    server.backend.add_file("/a", b"1");
    server.backend.add_file("/b", b"2");

    // the root handle consumes the single per-address slot
    let root = server.mount_root().await;
    let root_node = server.facade.resolve(&root).expect("root");

    let name: nfs3::filename3 = "a".into();
    let client = Some(server.context.client_addr.ip());
    let err = server
        .facade
        .lookup(&root_node, &name, client)
        .await
        .expect_err("quota is exhausted");
    assert_eq!(err, nfs3::nfsstat3::NFS3ERR_JUKEBOX);

    // an unlimited caller (no quota attribution) is unaffected
    assert!(server.facade.lookup(&root_node, &name, None).await.is_ok());
}

#[test]
fn memory_monitor_shrinks_and_restores_between_watermarks() {
    let attr_cache = Arc::new(AttrCache::new(
        100,
        Duration::from_secs(60),
        Duration::from_secs(60),
        true,
    ));
    let pool = Arc::new(ReadAheadPool::new(64, 100, 10_000));
    let config = MemoryPressureConfig {
        adapt_to_memory_pressure: true,
        high_watermark: 0.8,
        low_watermark: 0.6,
        check_interval: Duration::from_secs(10),
        shrink_step: 0.3,
    };
    let monitor = MemoryMonitor::new(config, attr_cache.clone(), pool.clone());

    for i in 0..100 {
        attr_cache.put(&format!("/f{i}"), nfs3::fattr3::default());
    }
    assert_eq!(attr_cache.len(), 100);

    // crossing the high watermark shrinks by the step and evicts
    monitor.apply_usage(0.85);
    assert_eq!(attr_cache.max_entries(), 70);
    assert_eq!(attr_cache.len(), 70);
    let (files, _) = pool.limits();
    assert_eq!(files, 70);

    // between the watermarks nothing changes
    monitor.apply_usage(0.7);
    assert_eq!(attr_cache.max_entries(), 70);

    // a second crossing shrinks again
    monitor.apply_usage(0.9);
    assert_eq!(attr_cache.max_entries(), 49);
    assert_eq!(monitor.pressure_level(), 2);

    // falling below the low watermark restores one step at a time
    monitor.apply_usage(0.5);
    assert_eq!(attr_cache.max_entries(), 70);
    monitor.apply_usage(0.5);
    assert_eq!(attr_cache.max_entries(), 100);
    assert_eq!(monitor.pressure_level(), 0);

    // restoring below zero pressure is a no-op
    monitor.apply_usage(0.5);
    assert_eq!(attr_cache.max_entries(), 100);
}

#[tokio::test]
async fn open_file_budget_is_bounded() {
    let mut config = ServerConfig::default();
    config.max_open_files = 2;
    let server = TestServer::new(config);
    for i in 0..6 {
        server.backend.add_file(&format!("/f{i}"), b"0123456789");
    }
    let root = server.mount_root().await;
    let root_node = server.facade.resolve(&root).expect("root");

    for i in 0..6 {
        let name: nfs3::filename3 = format!("f{i}").as_str().into();
        let (fh, _) = server.facade.lookup(&root_node, &name, None).await.expect("lookup");
        let node = server.facade.resolve(&fh).expect("node");
        let read = server.facade.read(&node, 0, 4).await.expect("read");
        assert_eq!(read.data, b"0123");
    }
    assert!(
        server.facade.open_file_count() <= 2,
        "open files {} exceed the configured budget",
        server.facade.open_file_count()
    );
}

use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Error;
use crate::naming::tree::DirectoryTree;
use crate::path::FsPath;
use crate::proto::StorageRef;

fn server(port: u16) -> StorageRef {
    StorageRef {
        client_addr: SocketAddr::from(([127, 0, 0, 1], port)),
        command_addr: SocketAddr::from(([127, 0, 0, 1], port + 1)),
    }
}

fn path(raw: &str) -> FsPath {
    FsPath::parse(raw).expect("valid path")
}

#[test]
fn new_tree_has_only_the_root() {
    let tree = DirectoryTree::new();
    assert!(tree.exists(&FsPath::root()));
    assert!(tree.is_directory(&FsPath::root()).expect("root is known"));
    assert!(tree.children(&FsPath::root()).expect("root is listable").is_empty());
    tree.assert_invariants();
}

#[test]
fn inserts_update_the_parent_listing() {
    let mut tree = DirectoryTree::new();
    tree.insert_directory(&path("/a")).expect("insert /a");
    tree.insert_directory(&path("/a/b")).expect("insert /a/b");
    tree.insert_file(&path("/a/b/c"), server(7000)).expect("insert /a/b/c");
    tree.insert_file(&path("/a/d"), server(7000)).expect("insert /a/d");

    assert_eq!(tree.children(&FsPath::root()).expect("list /"), vec!["a"]);
    assert_eq!(tree.children(&path("/a")).expect("list /a"), vec!["b", "d"]);
    assert!(!tree.is_directory(&path("/a/b/c")).expect("file is known"));
    assert!(matches!(tree.children(&path("/a/d")), Err(Error::NotFound(_))));
    tree.assert_invariants();
}

#[test]
fn inserts_require_a_directory_parent() {
    let mut tree = DirectoryTree::new();
    assert!(matches!(
        tree.insert_file(&path("/missing/f"), server(7000)),
        Err(Error::NotFound(_))
    ));
    tree.insert_file(&path("/f"), server(7000)).expect("insert /f");
    assert!(matches!(tree.insert_directory(&path("/f/child")), Err(Error::NotFound(_))));
    assert!(matches!(
        tree.insert_file(&path("/f"), server(7000)),
        Err(Error::IllegalArgument(_))
    ));
    tree.assert_invariants();
}

#[test]
fn ensure_directory_is_idempotent_but_refuses_files() {
    let mut tree = DirectoryTree::new();
    tree.ensure_directory(&path("/a/b")).expect("create chain");
    tree.ensure_directory(&path("/a/b")).expect("again is fine");
    tree.insert_file(&path("/a/b/f"), server(7000)).expect("insert file");
    assert!(matches!(
        tree.ensure_directory(&path("/a/b/f/deeper")),
        Err(Error::IllegalArgument(_))
    ));
    tree.assert_invariants();
}

#[test]
fn remove_takes_the_whole_subtree() {
    let mut tree = DirectoryTree::new();
    tree.ensure_directory(&path("/a/b")).expect("create chain");
    tree.insert_file(&path("/a/b/c"), server(7000)).expect("insert file");
    tree.insert_file(&path("/keep"), server(7000)).expect("insert file");

    tree.remove(&path("/a")).expect("remove subtree");
    assert!(!tree.exists(&path("/a")));
    assert!(!tree.exists(&path("/a/b/c")));
    assert!(tree.exists(&path("/keep")));
    assert_eq!(tree.children(&FsPath::root()).expect("list /"), vec!["keep"]);

    assert!(matches!(tree.remove(&path("/a")), Err(Error::NotFound(_))));
    assert!(matches!(tree.remove(&FsPath::root()), Err(Error::IllegalArgument(_))));
    tree.assert_invariants();
}

#[test]
fn files_under_collects_the_fanout_set() {
    let mut tree = DirectoryTree::new();
    tree.ensure_directory(&path("/a/b")).expect("create chain");
    tree.insert_file(&path("/a/b/c"), server(7000)).expect("insert file");
    tree.insert_file(&path("/a/d"), server(7002)).expect("insert file");
    tree.insert_file(&path("/other"), server(7000)).expect("insert file");

    let mut under: Vec<FsPath> =
        tree.files_under(&path("/a")).into_iter().map(|(file, _)| file).collect();
    under.sort();
    assert_eq!(under, vec![path("/a/b/c"), path("/a/d")]);

    let whole_file = tree.files_under(&path("/other"));
    assert_eq!(whole_file.len(), 1);
    assert_eq!(whole_file[0].1, vec![server(7000)]);
}

#[test]
fn replica_upkeep() {
    let mut tree = DirectoryTree::new();
    tree.insert_file(&path("/f"), server(7000)).expect("insert file");

    tree.add_replica(&path("/f"), server(7002)).expect("add replica");
    tree.add_replica(&path("/f"), server(7002)).expect("adding twice is a no-op");
    assert_eq!(tree.replicas(&path("/f")).expect("replicas"), vec![server(7000), server(7002)]);

    assert_eq!(tree.record_access(&path("/f")).expect("count"), 1);
    assert_eq!(tree.record_access(&path("/f")).expect("count"), 2);

    let extras = tree.demote_to_primary(&path("/f")).expect("demote");
    assert_eq!(extras, vec![server(7002)]);
    assert_eq!(tree.replicas(&path("/f")).expect("replicas"), vec![server(7000)]);
    // the demotion also reset the counter
    assert_eq!(tree.record_access(&path("/f")).expect("count"), 1);
    tree.assert_invariants();
}

#[test]
fn random_mutation_sequences_preserve_the_invariants() {
    let mut rng = StdRng::seed_from_u64(42);
    let names = ["a", "b", "c"];
    let mut candidates = Vec::new();
    for first in names {
        let one = FsPath::root().join(first).expect("valid");
        for second in names {
            let two = one.join(second).expect("valid");
            for third in names {
                candidates.push(two.join(third).expect("valid"));
            }
            candidates.push(two);
        }
        candidates.push(one);
    }

    let mut tree = DirectoryTree::new();
    for _ in 0..500 {
        let target = &candidates[rng.gen_range(0..candidates.len())];
        // Outcomes depend on the current shape; only the invariants must
        // survive every attempt.
        let _ = match rng.gen_range(0..3) {
            0 => tree.insert_file(target, server(7000)).is_ok(),
            1 => tree.insert_directory(target).is_ok(),
            _ => tree.remove(target).is_ok(),
        };
        tree.assert_invariants();
    }
}

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use fanfind::{BoundedWalker, FindError, Visitor, WalkConfig};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Records every callback.
#[derive(Default)]
struct Collect {
    paths:  Vec<PathBuf>,
    errors: Vec<FindError>,
}

impl Visitor for Collect {
    fn process(&mut self, path: &Path) {
        self.paths.push(path.to_path_buf());
    }

    fn error(&mut self, err: FindError) {
        self.errors.push(err);
    }
}

impl Collect {
    fn path_set(&self) -> BTreeSet<PathBuf> {
        self.paths.iter().cloned().collect()
    }
}

/// Everything below `root` up to `max_depth`, according to walkdir.
fn oracle(root: &Path, max_depth: usize) -> BTreeSet<PathBuf> {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .map(|e| e.unwrap().into_path())
        .collect()
}

fn touch(path: impl AsRef<Path>) {
    fs::write(path, "").unwrap();
}

/// Structure:
/// ```text
/// tmp/
///   invoice_jan.txt
///   report.txt
///   subdir/
///     invoice_mar.txt
///     nested/
///       deep.log
///   empty/
/// ```
fn setup_test_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    touch(root.join("invoice_jan.txt"));
    touch(root.join("report.txt"));
    fs::create_dir_all(root.join("subdir/nested")).unwrap();
    touch(root.join("subdir/invoice_mar.txt"));
    touch(root.join("subdir/nested/deep.log"));
    fs::create_dir(root.join("empty")).unwrap();
    dir
}

/// `root/d1/d2/.../dN`, with a file `f` in every directory.
fn setup_chain(depth: usize) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut cur = dir.path().to_path_buf();
    touch(cur.join("f"));
    for level in 1..=depth {
        cur.push(format!("d{level}"));
        fs::create_dir(&cur).unwrap();
        touch(cur.join("f"));
    }
    dir
}

fn unlimited() -> BoundedWalker {
    BoundedWalker::new(WalkConfig {
        memory_limit: None,
        depth_limit:  None,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn reports_every_entry_once() {
    let dir = setup_test_dir();
    let mut v = Collect::default();
    let stats = BoundedWalker::default().scan(dir.path(), &mut v);

    assert!(v.errors.is_empty());
    assert_eq!(v.paths.len(), 7, "no entry may be reported twice");
    assert_eq!(v.path_set(), oracle(dir.path(), usize::MAX));
    assert_eq!(stats.entries, 7);
    // root, subdir, subdir/nested, empty
    assert_eq!(stats.dirs_expanded, 4);
    assert!(stats.peak_footprint > 0);
}

#[test]
fn missing_root_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let mut v = Collect::default();
    let stats = BoundedWalker::default().scan(&missing, &mut v);

    assert!(v.paths.is_empty());
    assert_eq!(v.errors.len(), 1);
    assert!(matches!(&v.errors[0], FindError::NotFound(p) if *p == missing));
    assert!(!v.errors[0].is_recoverable());
    assert_eq!(stats.errors, 1);
}

#[test]
fn file_root_is_processed_alone() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("single.txt");
    touch(&file);
    let mut v = Collect::default();
    BoundedWalker::default().scan(&file, &mut v);

    assert_eq!(v.paths, vec![file]);
    assert!(v.errors.is_empty());
}

#[test]
fn depth_ceiling_reports_up_to_the_limit() {
    let dir = setup_chain(5);
    let mut v = Collect::default();
    let walker = BoundedWalker::new(WalkConfig {
        memory_limit: None,
        depth_limit:  Some(2),
    });
    walker.scan(dir.path(), &mut v);

    assert_eq!(v.path_set(), oracle(dir.path(), 2));
    assert_eq!(v.errors.len(), 1, "one error for the directory at the ceiling");
    match &v.errors[0] {
        FindError::DepthLimit { path, limit } => {
            assert_eq!(*path, dir.path().join("d1"));
            assert_eq!(*limit, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(v.errors[0].is_recoverable());
}

#[test]
fn depth_ceiling_one_error_per_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for top in ["a", "b"] {
        for sub in ["x", "y", "z"] {
            fs::create_dir_all(root.join(top).join(sub).join("below")).unwrap();
        }
    }
    let mut v = Collect::default();
    BoundedWalker::new(WalkConfig {
        memory_limit: None,
        depth_limit:  Some(2),
    })
    .scan(root, &mut v);

    assert_eq!(v.path_set(), oracle(root, 2));
    let mut error_dirs: Vec<_> = v.errors.iter().filter_map(|e| e.path().map(Path::to_path_buf)).collect();
    error_dirs.sort();
    assert_eq!(error_dirs, vec![root.join("a"), root.join("b")]);
}

#[test]
fn deep_chain_is_walked_without_recursion() {
    let dir = setup_chain(300);
    let mut v = Collect::default();
    let stats = unlimited().scan(dir.path(), &mut v);

    assert!(v.errors.is_empty());
    // 300 directories plus 301 files.
    assert_eq!(stats.entries, 601);
    assert_eq!(stats.dirs_expanded, 301);
}

#[test]
fn memory_ceiling_stops_growth_but_reports_listed_entries() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for name in ["a", "b", "c"] {
        fs::create_dir_all(root.join(name).join("inner")).unwrap();
    }
    touch(root.join("file.txt"));

    let mut v = Collect::default();
    let stats = BoundedWalker::new(WalkConfig {
        memory_limit: Some(1),
        depth_limit:  None,
    })
    .scan(root, &mut v);

    // The root listing is complete, nothing below it is entered.
    assert_eq!(v.path_set(), oracle(root, 1));
    assert_eq!(stats.dirs_expanded, 1);
    assert_eq!(v.errors.len(), 1);
    assert!(matches!(&v.errors[0], FindError::MemoryLimit { path, limit: 1 } if path == root));
}

#[test]
fn generous_memory_ceiling_changes_nothing() {
    let dir = setup_test_dir();
    let mut v = Collect::default();
    BoundedWalker::new(WalkConfig {
        memory_limit: Some(1 << 30),
        depth_limit:  None,
    })
    .scan(dir.path(), &mut v);

    assert!(v.errors.is_empty());
    assert_eq!(v.path_set(), oracle(dir.path(), usize::MAX));
}

/// Deletes the other top-level directory as soon as the walk first descends,
/// so one already-queued directory fails to open.
struct Vandal {
    inner:   Collect,
    root:    PathBuf,
    removed: Option<PathBuf>,
}

impl Visitor for Vandal {
    fn process(&mut self, path: &Path) {
        if self.removed.is_none() && path.parent() != Some(self.root.as_path()) {
            let entered = path.parent().unwrap().file_name().unwrap().to_owned();
            let other = if entered == "a" { "b" } else { "a" };
            let victim = self.root.join(other);
            fs::remove_dir_all(&victim).unwrap();
            self.removed = Some(victim);
        }
        self.inner.process(path);
    }

    fn error(&mut self, err: FindError) {
        self.inner.error(err);
    }
}

#[test]
fn unreadable_directory_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for name in ["a", "b"] {
        fs::create_dir(root.join(name)).unwrap();
        touch(root.join(name).join("inside.txt"));
    }
    touch(root.join("top.txt"));

    let mut v = Vandal {
        inner:   Collect::default(),
        root:    root.to_path_buf(),
        removed: None,
    };
    unlimited().scan(root, &mut v);

    let victim = v.removed.clone().expect("walk should have descended");
    let survivor = if victim.ends_with("a") { root.join("b") } else { root.join("a") };

    assert_eq!(v.inner.errors.len(), 1);
    assert!(matches!(&v.inner.errors[0], FindError::Io { path, .. } if *path == victim));

    let seen = v.inner.path_set();
    for expected in [root.join("a"), root.join("b"), root.join("top.txt"), survivor.join("inside.txt")] {
        assert!(seen.contains(&expected), "missing {}", expected.display());
    }
}

#[test]
fn permission_denied_is_reported_and_skipped() {
    use std::os::unix::fs::PermissionsExt;

    // Root bypasses directory permissions.
    if unsafe { libc::geteuid() } == 0 {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let locked = root.join("locked");
    fs::create_dir(&locked).unwrap();
    touch(locked.join("secret.txt"));
    touch(root.join("open.txt"));
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    let mut v = Collect::default();
    unlimited().scan(root, &mut v);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(v.errors.len(), 1);
    assert!(matches!(&v.errors[0], FindError::PermissionDenied(p) if *p == locked));
    let seen = v.path_set();
    assert!(seen.contains(&locked));
    assert!(seen.contains(&root.join("open.txt")));
}

#[test]
fn symlinked_directories_are_not_followed() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir(root.join("real")).unwrap();
    touch(root.join("real/file.txt"));
    std::os::unix::fs::symlink(root, root.join("real/loop")).unwrap();

    let mut v = Collect::default();
    let stats = unlimited().scan(root, &mut v);

    assert!(v.errors.is_empty());
    assert_eq!(v.path_set(), oracle(root, usize::MAX));
    assert_eq!(stats.dirs_expanded, 2);
}

/// Asks the walker to stop after a fixed number of entries.
struct StopAfter {
    seen:  usize,
    limit: usize,
}

impl Visitor for StopAfter {
    fn process(&mut self, _path: &Path) {
        self.seen += 1;
    }

    fn is_stopped(&self) -> bool {
        self.seen >= self.limit
    }
}

#[test]
fn stop_is_honoured_mid_directory() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..50 {
        touch(dir.path().join(format!("file{i}")));
    }
    let mut v = StopAfter { seen: 0, limit: 3 };
    let stats = unlimited().scan(dir.path(), &mut v);

    assert_eq!(v.seen, 3);
    assert_eq!(stats.entries, 3);
}

#[test]
fn stop_before_start_walks_nothing() {
    let dir = setup_test_dir();
    let mut v = StopAfter { seen: 0, limit: 0 };
    let stats = unlimited().scan(dir.path(), &mut v);

    assert_eq!(v.seen, 0);
    assert_eq!(stats.dirs_expanded, 0);
}

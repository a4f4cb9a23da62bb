//! File watching that turns source changes into rebuild triggers.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::coordinator::Trigger;

/// Errors that can occur while setting up file watching.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Invalid watch pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Watch root for '{pattern}' not found: {path}")]
    MissingRoot { pattern: String, path: String },

    #[error("Failed to watch {path}: {message}")]
    Backend { path: String, message: String },
}

/// The glob patterns a project is watched with, resolved against its root.
#[derive(Debug)]
pub struct WatchSet {
    root: PathBuf,
    canonical_root: PathBuf,
    patterns: Vec<String>,
    matcher: GlobSet,
    roots: BTreeMap<PathBuf, RecursiveMode>,
    ignored: Vec<PathBuf>,
}

impl WatchSet {
    /// Resolve `patterns` against `root`.
    ///
    /// Every pattern's literal directory prefix must exist.
    pub fn new(root: &Path, patterns: &[String]) -> Result<Self, WatcherError> {
        let canonical_root = root.canonicalize().map_err(|e| WatcherError::MissingRoot {
            pattern: ".".to_string(),
            path: format!("{}: {}", root.display(), e),
        })?;

        let mut builder = GlobSetBuilder::new();
        let mut roots: BTreeMap<PathBuf, RecursiveMode> = BTreeMap::new();

        for pattern in patterns {
            let invalid = |message: String| WatcherError::InvalidPattern {
                pattern: pattern.clone(),
                message,
            };

            if Path::new(pattern).is_absolute() {
                return Err(invalid("patterns must be relative to the project root".to_string()));
            }

            let (dir, mode, globs) = watch_root(pattern, &canonical_root);
            for glob in globs {
                let glob = GlobBuilder::new(&glob)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| invalid(e.to_string()))?;
                builder.add(glob);
            }

            let path = canonical_root.join(&dir);
            if !path.is_dir() {
                return Err(WatcherError::MissingRoot {
                    pattern: pattern.clone(),
                    path: path.display().to_string(),
                });
            }

            let entry = roots.entry(path).or_insert(mode);
            if mode == RecursiveMode::Recursive {
                *entry = RecursiveMode::Recursive;
            }
        }

        let matcher = builder.build().map_err(|e| WatcherError::InvalidPattern {
            pattern: patterns.join(", "),
            message: e.to_string(),
        })?;

        Ok(Self {
            root: root.to_path_buf(),
            canonical_root,
            patterns: patterns.to_vec(),
            matcher,
            roots,
            ignored: Vec::new(),
        })
    }

    /// Exclude paths (and everything below them) from matching.
    pub fn ignore(mut self, paths: &[PathBuf]) -> Self {
        for path in paths {
            let relative = self.relative(path).unwrap_or_else(|| path.clone());
            self.ignored.push(relative);
        }
        self
    }

    /// The patterns this set was built from.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Directories registered with the backend and how deep they are watched.
    pub fn roots(&self) -> impl Iterator<Item = (&Path, RecursiveMode)> {
        self.roots.iter().map(|(path, mode)| (path.as_path(), *mode))
    }

    /// Whether a change at `path` should trigger a rebuild.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(relative) = self.relative(path) else {
            return false;
        };

        if self.ignored.iter().any(|ignored| relative.starts_with(ignored)) {
            return false;
        }

        self.matcher.is_match(&relative)
    }

    fn relative(&self, path: &Path) -> Option<PathBuf> {
        if path.is_relative() {
            return Some(normalize(path));
        }
        path.strip_prefix(&self.canonical_root)
            .or_else(|_| path.strip_prefix(&self.root))
            .ok()
            .map(normalize)
    }
}

/// Directory to register for `pattern`, its depth, and the globs that match it.
fn watch_root(pattern: &str, root: &Path) -> (PathBuf, RecursiveMode, Vec<String>) {
    let components: Vec<&str> = pattern
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    // Globs are built from the cleaned form; "src/" and "./src" both mean "src"
    let pattern = components.join("/");
    if pattern.is_empty() {
        return (PathBuf::new(), RecursiveMode::Recursive, vec!["**".to_string()]);
    }
    let literal = components
        .iter()
        .take_while(|c| !c.contains(['*', '?', '[', '{']))
        .count();

    let prefix: PathBuf = components[..literal].iter().collect();
    let rest = &components[literal..];

    if rest.is_empty() {
        // A literal path: a directory is watched whole, a file through its parent
        if root.join(&prefix).is_dir() {
            let globs = vec![format!("{}/**", pattern), pattern];
            return (prefix, RecursiveMode::Recursive, globs);
        }
        let parent = prefix.parent().map(Path::to_path_buf).unwrap_or_default();
        return (parent, RecursiveMode::NonRecursive, vec![pattern]);
    }

    let mode = if rest.len() > 1 || rest.iter().any(|c| c.contains("**")) {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };

    (prefix, mode, vec![pattern])
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Whether a notify event describes a create, modify, delete or rename.
fn is_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        // Metadata-only changes (mtime/atime/chmod) are noise
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Fire `trigger` for a matching change, once `ready` is set.
///
/// Events delivered while roots are still being registered are dropped.
fn handle_event(
    res: notify::Result<notify::Event>,
    ready: &AtomicBool,
    watch_set: &WatchSet,
    trigger: &Trigger,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("File watch error: {}", e);
            return;
        }
    };

    if !ready.load(Ordering::SeqCst) || !is_change(&event.kind) {
        return;
    }

    if let Some(path) = event.paths.iter().find(|p| watch_set.matches(p)) {
        tracing::debug!("{:?}: {}", event.kind, path.display());
        trigger.fire();
    }
}

/// Watches a [`WatchSet`] and fires a [`Trigger`] for every matching change.
///
/// Events are not deduplicated here; the coordinator coalesces them.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
    ready: Arc<AtomicBool>,
}

impl ChangeWatcher {
    /// Register every root of `watch_set` with the platform backend.
    ///
    /// Nothing is triggered until all roots are registered.
    pub fn new(watch_set: WatchSet, trigger: Trigger) -> Result<Self, WatcherError> {
        let ready = Arc::new(AtomicBool::new(false));
        let watch_set = Arc::new(watch_set);

        let handler_ready = Arc::clone(&ready);
        let handler_set = Arc::clone(&watch_set);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            handle_event(res, &handler_ready, &handler_set, &trigger);
        })
        .map_err(|e| WatcherError::Backend {
            path: watch_set.root.display().to_string(),
            message: e.to_string(),
        })?;

        for (path, mode) in watch_set.roots() {
            watcher
                .watch(path, mode)
                .map_err(|e| WatcherError::Backend {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            tracing::debug!("Watching {} ({:?})", path.display(), mode);
        }

        ready.store(true, Ordering::SeqCst);
        tracing::info!("Watching {}", watch_set.patterns().join(", "));

        Ok(Self {
            _watcher: watcher,
            ready,
        })
    }

    /// Whether initial registration finished and changes now trigger rebuilds.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    use crate::coordinator::trigger_channel;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn derives_watch_roots() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();

        let (dir, mode, _) = watch_root("src/**/*", temp.path());
        assert_eq!((dir, mode), (PathBuf::from("src"), RecursiveMode::Recursive));

        let (dir, mode, _) = watch_root("kiln.toml", temp.path());
        assert_eq!((dir, mode), (PathBuf::new(), RecursiveMode::NonRecursive));

        let (dir, mode, _) = watch_root("layouts/*.html", temp.path());
        assert_eq!((dir, mode), (PathBuf::from("layouts"), RecursiveMode::NonRecursive));

        let (dir, mode, _) = watch_root("**/*.md", temp.path());
        assert_eq!((dir, mode), (PathBuf::new(), RecursiveMode::Recursive));

        let (dir, mode, globs) = watch_root("src", temp.path());
        assert_eq!((dir, mode), (PathBuf::from("src"), RecursiveMode::Recursive));
        assert_eq!(globs, vec!["src/**", "src"]);

        let (dir, mode, globs) = watch_root("./src/", temp.path());
        assert_eq!((dir, mode), (PathBuf::from("src"), RecursiveMode::Recursive));
        assert_eq!(globs, vec!["src/**", "src"]);
    }

    #[test]
    fn matches_only_watched_paths() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();

        let set = WatchSet::new(temp.path(), &patterns(&["kiln.toml", "src/**"])).unwrap();

        assert!(set.matches(Path::new("src/index.md")));
        assert!(set.matches(Path::new("src/blog/post.md")));
        assert!(set.matches(&temp.path().join("kiln.toml")));
        assert!(!set.matches(Path::new("other.toml")));
        assert!(!set.matches(Path::new("target/index.html")));
        assert!(!set.matches(Path::new("/elsewhere/src/index.md")));

        for dir in ["src/", "./src"] {
            let set = WatchSet::new(temp.path(), &patterns(&[dir])).unwrap();
            assert!(set.matches(Path::new("src/index.md")), "{} missed src/index.md", dir);
            assert!(set.matches(&temp.path().join("src/blog/post.md")));
            assert!(!set.matches(Path::new("srcs/index.md")));
        }
    }

    #[test]
    fn ignored_paths_never_match() {
        let temp = tempdir().unwrap();
        let set = WatchSet::new(temp.path(), &patterns(&["**/*"]))
            .unwrap()
            .ignore(&[temp.path().join("target"), temp.path().join(".target.staging")]);

        assert!(set.matches(Path::new("src/index.md")));
        assert!(!set.matches(&temp.path().join("target/index.html")));
        assert!(!set.matches(Path::new(".target.staging/index.html")));
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempdir().unwrap();

        let err = WatchSet::new(temp.path(), &patterns(&["layouts/**/*"])).unwrap_err();
        assert!(matches!(err, WatcherError::MissingRoot { .. }));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        let temp = tempdir().unwrap();

        let err = WatchSet::new(temp.path(), &patterns(&["src/[a"])).unwrap_err();
        assert!(matches!(err, WatcherError::InvalidPattern { .. }));

        let err = WatchSet::new(temp.path(), &patterns(&["/etc/**"])).unwrap_err();
        assert!(matches!(err, WatcherError::InvalidPattern { .. }));
    }

    #[test]
    fn ignores_metadata_events() {
        use notify::event::{CreateKind, DataChange, MetadataKind, RenameMode};

        assert!(is_change(&EventKind::Create(CreateKind::File)));
        assert!(is_change(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_change(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))));
        assert!(!is_change(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::WriteTime
        ))));
        assert!(!is_change(&EventKind::Access(notify::event::AccessKind::Any)));
    }

    #[test]
    fn drops_events_until_ready() {
        use notify::event::{CreateKind, DataChange};

        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        let set = WatchSet::new(temp.path(), &patterns(&["src/**"])).unwrap();
        let (trigger, mut rx) = trigger_channel();
        let ready = AtomicBool::new(false);

        let created = || {
            Ok(notify::Event::new(EventKind::Create(CreateKind::File))
                .add_path(temp.path().join("src/index.md")))
        };

        handle_event(created(), &ready, &set, &trigger);
        assert!(rx.try_recv().is_err(), "event before ready triggered a rebuild");

        ready.store(true, Ordering::SeqCst);
        handle_event(created(), &ready, &set, &trigger);
        assert!(rx.try_recv().is_ok());

        let unwatched = notify::Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(temp.path().join("notes.txt"));
        handle_event(Ok(unwatched), &ready, &set, &trigger);
        handle_event(Err(notify::Error::generic("backend hiccup")), &ready, &set, &trigger);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn triggers_on_file_changes() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();

        let (trigger, mut rx) = trigger_channel();
        let set = WatchSet::new(temp.path(), &patterns(&["src/**"])).unwrap();
        let watcher = ChangeWatcher::new(set, trigger).unwrap();
        assert!(watcher.is_ready());

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(src.join("index.md"), "# Created").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;
        drop(watcher);

        assert!(event.is_ok(), "timeout waiting for trigger");
        assert!(event.unwrap().is_some(), "channel should not be closed");
    }

    #[tokio::test]
    async fn ignores_unwatched_changes() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();

        let (trigger, mut rx) = trigger_channel();
        let set = WatchSet::new(temp.path(), &patterns(&["kiln.toml"])).unwrap();
        let _watcher = ChangeWatcher::new(set, trigger).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let event = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(event.is_err(), "unwatched file triggered a rebuild");

        fs::write(temp.path().join("kiln.toml"), "").unwrap();
        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;
        assert!(event.is_ok(), "timeout waiting for config trigger");
    }
}

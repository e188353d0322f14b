//! Ignore-policy gate over the workspace root's ignore files.
//!
//! The files are concatenated in configured order into one gitignore-style
//! rule set, so a later file can re-include what an earlier one excluded.
//! Until some rule content has been loaded every path is allowed. Paths are
//! resolved lexically before matching; anything outside the root is allowed.

use codebase_index_ports::{BoxFuture, IgnoreGatePort};
use codebase_index_shared::{RequestContext, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

/// Gate for one workspace root.
#[derive(Debug)]
pub struct IgnoreRuleGate {
    root: PathBuf,
    files: Vec<String>,
    rules: RwLock<Option<Gitignore>>,
}

impl IgnoreRuleGate {
    /// Gate with no rules loaded yet; call [`IgnoreGatePort::reload`] to load them.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, files: Vec<String>) -> Self {
        let root = root.into();
        Self {
            root: normalize(&root).unwrap_or(root),
            files,
            rules: RwLock::new(None),
        }
    }

    /// Workspace root governed by this gate.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True once rule content has been loaded.
    #[must_use]
    pub fn has_rules(&self) -> bool {
        self.rules.read().is_ok_and(|rules| rules.is_some())
    }

    fn relative(&self, path: &Path) -> Option<PathBuf> {
        let normalized = normalize(path)?;
        if normalized.is_relative() {
            return Some(normalized);
        }
        normalized
            .strip_prefix(&self.root)
            .ok()
            .map(Path::to_path_buf)
    }

    fn compile(&self, sources: &[(String, String)]) -> Option<Gitignore> {
        let mut builder = GitignoreBuilder::new(&self.root);
        let mut rules = 0usize;
        for (file, content) in sources {
            let from = Some(self.root.join(file));
            for line in content.lines() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                match builder.add_line(from.clone(), line) {
                    Ok(_) => rules += 1,
                    Err(error) => tracing::debug!(file, line, %error, "skipping invalid ignore rule"),
                }
            }
        }
        if rules == 0 {
            return None;
        }
        match builder.build() {
            Ok(gitignore) => Some(gitignore),
            Err(error) => {
                tracing::warn!(root = %self.root.display(), %error, "ignore rules failed to compile");
                None
            },
        }
    }
}

impl IgnoreGatePort for IgnoreRuleGate {
    fn validate_access(&self, path: &Path) -> bool {
        let Ok(rules) = self.rules.read() else {
            return true;
        };
        let Some(rules) = rules.as_ref() else {
            return true;
        };
        let Some(relative) = self.relative(path) else {
            return true;
        };
        if relative.as_os_str().is_empty() {
            return true;
        }
        let is_dir = self.root.join(&relative).is_dir();
        !rules
            .matched_path_or_any_parents(&relative, is_dir)
            .is_ignore()
    }

    fn reload(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ignore.reload")?;
            let mut sources = Vec::with_capacity(self.files.len());
            for file in &self.files {
                let path = self.root.join(file);
                match tokio::fs::read_to_string(&path).await {
                    Ok(content) => sources.push((file.clone(), content)),
                    Err(error) if error.kind() == ErrorKind::NotFound => {},
                    Err(error) => {
                        tracing::warn!(path = %path.display(), %error, "ignore file unreadable");
                    },
                }
            }

            let compiled = self.compile(&sources);
            tracing::debug!(
                root = %self.root.display(),
                files = sources.len(),
                active = compiled.is_some(),
                "ignore rules reloaded"
            );
            if let Ok(mut rules) = self.rules.write() {
                *rules = compiled;
            }
            Ok(())
        })
    }

    fn is_rule_file(&self, path: &Path) -> bool {
        let Some(relative) = self.relative(path) else {
            return false;
        };
        let mut components = relative.components();
        let (Some(first), None) = (components.next(), components.next()) else {
            return false;
        };
        self.files
            .iter()
            .any(|file| first.as_os_str() == file.as_str())
    }
}

/// Resolve `.` and `..` without touching the filesystem.
///
/// `None` when a relative path climbs above its starting point; an absolute
/// path cannot climb above its root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                if !out.pop() && out.is_relative() {
                    return None;
                }
            },
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn files() -> Vec<String> {
        vec![".gitignore".to_owned(), ".coignore".to_owned(), ".costrictignore".to_owned()]
    }

    #[tokio::test]
    async fn merged_dialects_deny_matching_paths() -> Result<()> {
        let root = tempfile::tempdir()?;
        tokio::fs::write(root.path().join(".gitignore"), "target/\n*.log\n").await?;
        tokio::fs::write(root.path().join(".coignore"), "# comment\nsecrets/**\n").await?;
        tokio::fs::write(root.path().join(".costrictignore"), "!keep.log\n").await?;
        let gate = IgnoreRuleGate::new(root.path(), files());
        gate.reload(&RequestContext::new_request()).await?;

        assert!(gate.has_rules());
        assert!(!gate.validate_access(&root.path().join("target/debug/app")));
        assert!(!gate.validate_access(&root.path().join("logs/run.log")));
        assert!(!gate.validate_access(&root.path().join("secrets/api.txt")));
        assert!(gate.validate_access(&root.path().join("keep.log")));
        assert!(gate.validate_access(&root.path().join("src/main.rs")));
        Ok(())
    }

    #[tokio::test]
    async fn paths_outside_the_root_are_allowed() -> Result<()> {
        let root = tempfile::tempdir()?;
        tokio::fs::write(root.path().join(".gitignore"), "*\n").await?;
        let gate = IgnoreRuleGate::new(root.path(), files());
        gate.reload(&RequestContext::new_request()).await?;

        let elsewhere = tempfile::tempdir()?;
        assert!(!gate.validate_access(&root.path().join("a.rs")));
        assert!(gate.validate_access(&elsewhere.path().join("a.rs")));
        Ok(())
    }

    #[tokio::test]
    async fn deleting_rule_files_reopens_the_gate() -> Result<()> {
        let root = tempfile::tempdir()?;
        let rule_file = root.path().join(".gitignore");
        tokio::fs::write(&rule_file, "*.tmp\n").await?;
        let gate = IgnoreRuleGate::new(root.path(), files());
        let ctx = RequestContext::new_request();
        gate.reload(&ctx).await?;
        assert!(!gate.validate_access(&root.path().join("x.tmp")));

        tokio::fs::remove_file(&rule_file).await?;
        gate.reload(&ctx).await?;
        assert!(!gate.has_rules());
        assert!(gate.validate_access(&root.path().join("x.tmp")));
        Ok(())
    }

    #[tokio::test]
    async fn dot_segments_are_resolved_before_matching() -> Result<()> {
        let root = tempfile::tempdir()?;
        tokio::fs::write(root.path().join(".gitignore"), "secrets/\n").await?;
        let gate = IgnoreRuleGate::new(root.path(), files());
        gate.reload(&RequestContext::new_request()).await?;

        assert!(!gate.validate_access(&root.path().join("src/../secrets/key")));
        assert!(!gate.validate_access(&root.path().join("./secrets/key")));
        assert!(gate.validate_access(&root.path().join("../secrets/key")));
        assert!(gate.validate_access(&root.path().join("src/../../elsewhere/secrets/key")));
        assert!(!gate.validate_access(Path::new("src/../secrets/key")));
        assert!(gate.validate_access(Path::new("../secrets/key")));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn rule_files_are_recognised_at_the_root_only() {
        let gate = IgnoreRuleGate::new("/ws", files());
        assert!(gate.is_rule_file(Path::new("/ws/.coignore")));
        assert!(gate.is_rule_file(Path::new("/ws/sub/../.gitignore")));
        assert!(!gate.is_rule_file(Path::new("/ws/sub/.gitignore")));
        assert!(!gate.is_rule_file(Path::new("/other/.gitignore")));
        assert!(!gate.is_rule_file(Path::new("/ws/../.gitignore")));
    }

    #[cfg(unix)]
    #[test]
    fn normalize_resolves_lexically() {
        assert_eq!(normalize(Path::new("/ws/../etc/x")), Some(PathBuf::from("/etc/x")));
        assert_eq!(normalize(Path::new("/ws/./a/../b")), Some(PathBuf::from("/ws/b")));
        assert_eq!(normalize(Path::new("/..")), Some(PathBuf::from("/")));
        assert_eq!(normalize(Path::new("a/../b")), Some(PathBuf::from("b")));
        assert_eq!(normalize(Path::new("../b")), None);
    }

    proptest! {
        #[test]
        fn gate_without_rule_files_allows_everything(path in "[a-z]{1,8}(/[a-z._]{1,8}){0,4}") {
            let gate = IgnoreRuleGate::new("/ws", files());
            prop_assert!(gate.validate_access(&Path::new("/ws").join(&path)));
            prop_assert!(gate.validate_access(Path::new(&path)));
        }
    }
}

//! Git driver backed by the `git` command-line tool.
//!
//! Mirror clones are bare repositories; queries shell out to `git` in the
//! clone directory and parse machine-readable output formats (`%x1f`-separated
//! log records, NUL-terminated `ls-tree` entries, blame porcelain).

mod parse;

use crate::{Driver, Repository};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::future::BoxFuture;
use futures::FutureExt;
use repostore_core::{
    BlameOptions, Branch, Commit, CommitId, CommitsOptions, Committer, Diff, DiffOptions, Error,
    ErrorKind, Hunk, RemoteOpts, Result, Tag, TreeEntry, TreeEntryType, VcsType,
};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::process::Command;

/// Log format producing `\x1f`-separated fields and `\x1e`-terminated
/// records: hash, author name/email/date, committer name/email/date,
/// parents, body.
const LOG_FORMAT: &str = "%H%x1f%an%x1f%ae%x1f%aI%x1f%cn%x1f%ce%x1f%cI%x1f%P%x1f%B%x1e";

/// Driver for git repositories.
#[derive(Debug)]
pub struct GitDriver;

impl GitDriver {
    /// Creates the driver.
    pub fn new() -> Self {
        Self
    }
}

impl Default for GitDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn is_bare_layout(dir: &Path) -> bool {
    dir.join("HEAD").is_file() && dir.join("objects").is_dir() && dir.join("refs").is_dir()
}

#[async_trait]
impl Driver for GitDriver {
    fn vcs_type(&self) -> VcsType {
        VcsType::parse("git").expect("static tag")
    }

    fn detect(&self, dir: &Path) -> bool {
        is_bare_layout(dir) || dir.join(".git").exists()
    }

    async fn open_mirror(&self, dir: &Path) -> Result<Arc<dyn Repository>> {
        if !dir.exists() {
            return Err(Error::not_found(format!(
                "no repository at {}",
                dir.display()
            )));
        }
        if !self.detect(dir) {
            return Err(Error::new(
                ErrorKind::Corrupt,
                format!("{} is not a git repository", dir.display()),
            ));
        }
        Ok(Arc::new(GitRepository {
            dir: dir.to_path_buf(),
        }))
    }

    async fn clone_mirror(&self, clone_url: &str, dir: &Path, opt: &RemoteOpts) -> Result<()> {
        let auth = RemoteAuth::prepare(opt)?;
        let mut cmd = Command::new("git");
        auth.apply(&mut cmd);
        cmd.arg("clone")
            .arg("--mirror")
            .arg(clone_url)
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::transport(format!("failed to spawn git clone: {e}")))?;
        if !output.status.success() {
            return Err(classify_remote_error(&String::from_utf8_lossy(
                &output.stderr,
            )));
        }
        Ok(())
    }
}

/// An opened bare git repository.
pub struct GitRepository {
    dir: PathBuf,
}

impl GitRepository {
    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::internal(format!("failed to spawn git: {e}")))?;
        if !output.status.success() {
            return Err(classify_local_error(&String::from_utf8_lossy(
                &output.stderr,
            )));
        }
        Ok(output.stdout)
    }

    async fn run_utf8(&self, args: &[&str]) -> Result<String> {
        let stdout = self.run(args).await?;
        String::from_utf8(stdout)
            .map_err(|_| Error::internal("git produced non-UTF-8 output where text was expected"))
    }

    async fn rev_parse(&self, spec: &str) -> Result<CommitId> {
        let out = self
            .run_utf8(&["rev-parse", "--verify", &format!("{spec}^{{commit}}")])
            .await?;
        CommitId::parse(out.trim())
    }

    /// Commit time of `commit`, used as the mod-time of tree entries.
    async fn commit_time(&self, commit: &CommitId) -> Result<chrono::DateTime<chrono::Utc>> {
        let out = self
            .run_utf8(&["log", "-n", "1", "--format=%cI", commit.as_str(), "--"])
            .await?;
        parse::parse_date(out.trim())
    }

    /// Lists the immediate children of tree `path` at `commit`, recursing
    /// when asked. `path` is `""` for the root tree.
    fn read_dir<'a>(
        &'a self,
        commit: &'a CommitId,
        path: String,
        recursive: bool,
        mod_time: chrono::DateTime<chrono::Utc>,
    ) -> BoxFuture<'a, Result<Vec<TreeEntry>>> {
        async move {
            let target = if path.is_empty() {
                String::new()
            } else {
                format!("{path}/")
            };
            let mut args = vec!["ls-tree", "-l", "-z", commit.as_str()];
            if !target.is_empty() {
                args.push("--");
                args.push(&target);
            }
            let out = self.run(&args).await?;
            let listed = parse::parse_ls_tree(&out, mod_time)?;

            let mut entries = Vec::with_capacity(listed.len());
            for (mut entry, full_path) in listed {
                if recursive && entry.entry_type == TreeEntryType::Dir {
                    let children = self
                        .read_dir(commit, full_path, true, mod_time)
                        .await?;
                    entry.entries = Some(children);
                }
                entries.push(entry);
            }
            TreeEntry::sort_entries(&mut entries);
            Ok(entries)
        }
        .boxed()
    }

    async fn read_blob(&self, oid: &str) -> Result<Vec<u8>> {
        self.run(&["cat-file", "blob", oid]).await
    }
}

#[async_trait]
impl Repository for GitRepository {
    fn vcs_type(&self) -> VcsType {
        VcsType::parse("git").expect("static tag")
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    async fn resolve_branch(&self, name: &str) -> Result<CommitId> {
        self.rev_parse(&format!("refs/heads/{name}")).await
    }

    async fn resolve_tag(&self, name: &str) -> Result<CommitId> {
        self.rev_parse(&format!("refs/tags/{name}")).await
    }

    async fn resolve_revision(&self, spec: &str) -> Result<CommitId> {
        self.rev_parse(spec).await
    }

    async fn get_commit(&self, id: &CommitId) -> Result<Commit> {
        let format = format!("--format={LOG_FORMAT}");
        let out = self
            .run(&["log", "-n", "1", &format, id.as_str(), "--"])
            .await?;
        parse::parse_commits(&out)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("commit {id} not found")))
    }

    async fn commits(&self, opt: &CommitsOptions) -> Result<(Vec<Commit>, u64)> {
        if opt.head.is_empty() {
            return Err(Error::invalid_argument("head commit is required"));
        }
        let format = format!("--format={LOG_FORMAT}");
        let skip = format!("--skip={}", opt.skip);
        let mut args = vec!["log", format.as_str(), skip.as_str()];
        let n_arg;
        if opt.n > 0 {
            n_arg = format!("-n{}", opt.n);
            args.push(&n_arg);
        }
        args.push(&opt.head);
        args.push("--");
        let out = self.run(&args).await?;
        let commits = parse::parse_commits(&out)?;

        let count = self
            .run_utf8(&["rev-list", "--count", &opt.head, "--"])
            .await?;
        let total: u64 = count
            .trim()
            .parse()
            .map_err(|_| Error::internal("unparseable rev-list count"))?;

        Ok((commits, total))
    }

    async fn commit_log(&self, to: &CommitId) -> Result<Vec<Commit>> {
        let format = format!("--format={LOG_FORMAT}");
        let out = self.run(&["log", &format, to.as_str(), "--"]).await?;
        parse::parse_commits(&out)
    }

    async fn committers(&self) -> Result<Vec<Committer>> {
        let out = self.run_utf8(&["shortlog", "-sne", "HEAD"]).await?;
        parse::parse_shortlog(&out)
    }

    async fn branches(&self) -> Result<Vec<Branch>> {
        let out = self
            .run_utf8(&[
                "for-each-ref",
                "--format=%(refname:short)%00%(objectname)",
                "refs/heads",
            ])
            .await?;
        let mut branches = Vec::new();
        for line in out.lines().filter(|l| !l.is_empty()) {
            let (name, oid) = line
                .split_once('\0')
                .ok_or_else(|| Error::internal("malformed for-each-ref output"))?;
            branches.push(Branch {
                name: name.to_string(),
                head: CommitId::parse(oid)?,
            });
        }
        Ok(branches)
    }

    async fn tags(&self) -> Result<Vec<Tag>> {
        let out = self
            .run_utf8(&[
                "for-each-ref",
                "--format=%(refname:short)%00%(objectname)%00%(*objectname)",
                "refs/tags",
            ])
            .await?;
        let mut tags = Vec::new();
        for line in out.lines().filter(|l| !l.is_empty()) {
            let mut fields = line.split('\0');
            let name = fields
                .next()
                .ok_or_else(|| Error::internal("malformed for-each-ref output"))?;
            let oid = fields.next().unwrap_or_default();
            let peeled = fields.next().unwrap_or_default();
            // Annotated tags carry the peeled commit in the third field.
            let commit = if peeled.is_empty() { oid } else { peeled };
            tags.push(Tag {
                name: name.to_string(),
                commit_id: CommitId::parse(commit)?,
            });
        }
        Ok(tags)
    }

    async fn tree_entry(&self, commit: &CommitId, path: &str, recursive: bool) -> Result<TreeEntry> {
        let mod_time = self.commit_time(commit).await?;
        let path = path.trim_matches('/');

        if path.is_empty() || path == "." {
            let entries = self
                .read_dir(commit, String::new(), recursive, mod_time)
                .await?;
            return Ok(TreeEntry {
                name: ".".to_string(),
                entry_type: TreeEntryType::Dir,
                size: 0,
                mod_time,
                contents: None,
                entries: Some(entries),
            });
        }

        let out = self
            .run(&["ls-tree", "-l", "-z", commit.as_str(), "--", path])
            .await?;
        let listed = parse::parse_ls_tree(&out, mod_time)?;
        let (mut entry, _) = listed.into_iter().next().ok_or_else(|| {
            Error::not_found(format!("path {path:?} not found at commit {commit}"))
        })?;

        match entry.entry_type {
            TreeEntryType::Dir => {
                let children = self
                    .read_dir(commit, path.to_string(), recursive, mod_time)
                    .await?;
                entry.entries = Some(children);
            }
            TreeEntryType::File | TreeEntryType::Symlink => {
                let spec = format!("{commit}:{path}");
                entry.contents = Some(self.read_blob(&spec).await?);
            }
        }
        Ok(entry)
    }

    async fn blame_file(&self, path: &str, opt: &BlameOptions) -> Result<Vec<Hunk>> {
        let newest = opt.newest_commit.as_deref().unwrap_or("HEAD");
        let mut args = vec!["blame", "--porcelain"];
        let line_range;
        if opt.start_line != 0 || opt.end_line != 0 {
            let start = if opt.start_line == 0 { 1 } else { opt.start_line };
            line_range = if opt.end_line == 0 {
                // An omitted end defaults to the end of the file.
                format!("-L{start},")
            } else {
                format!("-L{start},{}", opt.end_line)
            };
            args.push(&line_range);
        }
        args.push(newest);
        args.push("--");
        args.push(path);
        let out = self.run(&args).await?;
        parse::parse_blame_porcelain(&out)
    }

    async fn diff(&self, base: &CommitId, head: &CommitId, opt: &DiffOptions) -> Result<Diff> {
        let mut args = vec!["diff".to_string()];
        if opt.detect_renames {
            args.push("--find-renames".to_string());
        }
        if let Some(prefix) = &opt.orig_prefix {
            args.push(format!("--src-prefix={prefix}"));
        }
        if let Some(prefix) = &opt.new_prefix {
            args.push(format!("--dst-prefix={prefix}"));
        }
        args.push(base.to_string());
        args.push(head.to_string());
        args.push("--".to_string());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let raw = self.run_utf8(&arg_refs).await?;
        Ok(Diff { raw })
    }

    async fn merge_base(&self, a: &CommitId, b: &CommitId) -> Result<CommitId> {
        let out = self
            .run_utf8(&["merge-base", a.as_str(), b.as_str()])
            .await?;
        CommitId::parse(out.trim())
    }

    async fn update_everything(&self, opt: &RemoteOpts) -> Result<()> {
        let auth = RemoteAuth::prepare(opt)?;
        let mut cmd = Command::new("git");
        auth.apply(&mut cmd);
        let output = cmd
            .arg("remote")
            .arg("update")
            .arg("--prune")
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::transport(format!("failed to spawn git remote update: {e}")))?;
        if !output.status.success() {
            return Err(classify_remote_error(&String::from_utf8_lossy(
                &output.stderr,
            )));
        }
        Ok(())
    }
}

/// Credentials for a remote operation, prepared once and applied to the
/// command. Holds the ssh key tempfile open for the life of the command.
struct RemoteAuth {
    ssh_key: Option<NamedTempFile>,
    basic_auth: Option<String>,
}

impl RemoteAuth {
    fn prepare(opt: &RemoteOpts) -> Result<Self> {
        let ssh_key = match &opt.ssh_private_key {
            Some(key) => {
                let file = NamedTempFile::new().map_err(|e| {
                    Error::internal(format!("failed to write ssh key file: {e}"))
                })?;
                std::fs::write(file.path(), key)
                    .map_err(|e| Error::internal(format!("failed to write ssh key file: {e}")))?;
                Some(file)
            }
            None => None,
        };
        let basic_auth = match (&opt.http_user, &opt.http_password) {
            (None, None) => None,
            (user, password) => {
                let raw = format!(
                    "{}:{}",
                    user.as_deref().unwrap_or_default(),
                    password.as_deref().unwrap_or_default()
                );
                Some(BASE64.encode(raw))
            }
        };
        Ok(Self {
            ssh_key,
            basic_auth,
        })
    }

    fn apply(&self, cmd: &mut Command) {
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(key) = &self.ssh_key {
            cmd.env(
                "GIT_SSH_COMMAND",
                format!(
                    "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=no",
                    key.path().display()
                ),
            );
        }
        if let Some(auth) = &self.basic_auth {
            cmd.arg("-c")
                .arg(format!("http.extraHeader=Authorization: Basic {auth}"));
        }
    }
}

/// Classifies stderr from a remote operation (clone, fetch) into the error
/// kinds the HTTP layer maps to statuses.
fn classify_remote_error(stderr: &str) -> Error {
    let message = stderr.trim().to_string();
    if let Some(kind) = repostore_core::classify_auth_error(&message) {
        return Error::new(kind, message);
    }
    if message.contains("terminal prompts disabled")
        || message.contains("could not read Username")
        || message.contains("could not read Password")
        || message.contains("Authentication failed")
    {
        return Error::new(ErrorKind::AuthRequired, message);
    }
    if message.contains("unsupported credentials") {
        return Error::new(ErrorKind::AuthUnsupported, message);
    }
    if message.contains("Permission denied (publickey") {
        return Error::new(ErrorKind::Forbidden, message);
    }
    if message.contains("Repository not found")
        || message.contains("does not appear to be a git repository")
        || (message.contains("repository") && message.contains("not found"))
    {
        return Error::new(ErrorKind::NotFound, message);
    }
    Error::new(ErrorKind::Transport, message)
}

/// Classifies stderr from a local query into not-found vs internal.
fn classify_local_error(stderr: &str) -> Error {
    let message = stderr.trim().to_string();
    let not_found = [
        "unknown revision or path not in the working tree",
        "bad revision",
        "Not a valid object name",
        "ambiguous argument",
        "Needed a single revision",
        "no such path",
        "does not exist in",
        "bad object",
    ];
    if not_found.iter().any(|needle| message.contains(needle)) {
        return Error::new(ErrorKind::NotFound, message);
    }
    Error::internal(message)
}

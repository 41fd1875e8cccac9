//! Value types exchanged over the HTTP API.

use crate::{CommitId, FileRange, VcsType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity and timestamp of a commit author or committer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Person's name.
    pub name: String,
    /// Person's email address.
    pub email: String,
    /// When the change was authored or committed.
    pub date: DateTime<Utc>,
}

/// A single commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Canonical commit id.
    pub id: CommitId,
    /// Author of the change.
    pub author: Signature,
    /// Committer, when distinct from the author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer: Option<Signature>,
    /// Full commit message.
    pub message: String,
    /// Parent commit ids.
    #[serde(default)]
    pub parents: Vec<CommitId>,
}

/// A branch and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch name.
    pub name: String,
    /// Head commit id.
    pub head: CommitId,
}

/// A tag and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag name.
    pub name: String,
    /// Tagged commit id.
    pub commit_id: CommitId,
}

/// A committer with their commit count, as returned by the committers list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committer {
    /// Committer name.
    pub name: String,
    /// Committer email.
    pub email: String,
    /// Number of commits attributed to this identity.
    pub commits: u64,
}

/// A blame hunk: a contiguous run of lines attributed to one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    /// First line of the hunk (1-based, inclusive).
    pub start_line: u64,
    /// Last line of the hunk (1-based, inclusive).
    pub end_line: u64,
    /// First byte of the hunk.
    pub start_byte: u64,
    /// End byte of the hunk (exclusive).
    pub end_byte: u64,
    /// Commit that introduced these lines.
    pub commit_id: CommitId,
    /// Author of that commit.
    pub author: Signature,
}

/// A raw textual diff between two commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    /// Unified diff text.
    pub raw: String,
}

/// Options for the commits-list operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitsOptions {
    /// Commit to start listing from (newest).
    pub head: String,
    /// Maximum number of commits to return; 0 means no limit.
    #[serde(default)]
    pub n: u64,
    /// Number of commits to skip from the head.
    #[serde(default)]
    pub skip: u64,
}

/// Options for the blame operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlameOptions {
    /// Blame at this commit (newest bound).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest_commit: Option<String>,
    /// Ignore commits older than this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_commit: Option<String>,
    /// Restrict blame to lines at or after this one (1-based); 0 is unset.
    #[serde(default)]
    pub start_line: u64,
    /// Restrict blame to lines at or before this one; 0 is unset.
    #[serde(default)]
    pub end_line: u64,
}

/// Options for the diff operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOptions {
    /// Prefix for original-file names in the diff output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_prefix: Option<String>,
    /// Prefix for new-file names in the diff output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_prefix: Option<String>,
    /// Enable rename detection.
    #[serde(default)]
    pub detect_renames: bool,
}

/// Credentials and keys used only at clone or update time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOpts {
    /// PEM-encoded SSH private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_private_key: Option<String>,
    /// HTTP basic-auth user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_user: Option<String>,
    /// HTTP basic-auth password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_password: Option<String>,
}

/// Describes a remote source to clone a repository from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneSpec {
    /// VCS type tag of the remote.
    pub vcs_type: VcsType,
    /// URL to clone from.
    pub clone_url: String,
    /// Credentials for the remote, if any.
    #[serde(default)]
    pub remote_opts: RemoteOpts,
}

/// The kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeEntryType {
    /// A directory.
    Dir,
    /// A regular file.
    File,
    /// A symbolic link.
    Symlink,
}

/// An entry in a repository tree at some commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Entry name (final path segment).
    pub name: String,
    /// Entry kind.
    #[serde(rename = "type")]
    pub entry_type: TreeEntryType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Modification time; for VCS-backed trees this is the commit time.
    pub mod_time: DateTime<Utc>,
    /// Raw contents, present for regular files.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes"
    )]
    pub contents: Option<Vec<u8>>,
    /// Child entries, present for directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<TreeEntry>>,
}

impl TreeEntry {
    /// Sorts entries by (type, name): directories first, then files and
    /// symlinks, each group alphabetical.
    pub fn sort_entries(entries: &mut [TreeEntry]) {
        entries.sort_by(|a, b| {
            a.entry_type
                .cmp(&b.entry_type)
                .then_with(|| a.name.cmp(&b.name))
        });
    }
}

/// A file entry wrapped with the byte/line range its contents were trimmed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWithRange {
    /// The file's tree entry, contents trimmed to the range.
    #[serde(flatten)]
    pub entry: TreeEntry,
    /// The normalized range that was applied.
    #[serde(flatten)]
    pub range: FileRange,
}

/// Serializes `Option<Vec<u8>>` as a base64 string, the JSON convention for
/// binary file contents.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let opt: Option<String> = Option::deserialize(d)?;
        opt.map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

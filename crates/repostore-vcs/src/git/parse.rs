//! Parsers for the machine-readable git output formats the driver consumes.

use chrono::{DateTime, TimeZone, Utc};
use repostore_core::{
    Commit, CommitId, Committer, Error, Hunk, Result, Signature, TreeEntry, TreeEntryType,
};
use std::collections::HashMap;

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: u8 = 0x1e;

/// Parses a strict-ISO (`%aI`/`%cI`) date.
pub(super) fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::internal(format!("unparseable git date {s:?}: {e}")))
}

/// Parses `git log` output produced with [`super::LOG_FORMAT`].
pub(super) fn parse_commits(output: &[u8]) -> Result<Vec<Commit>> {
    let mut commits = Vec::new();
    for record in output.split(|&b| b == RECORD_SEP) {
        let record = String::from_utf8_lossy(record);
        let record = record.trim_matches(['\n', '\r', ' ']);
        if record.is_empty() {
            continue;
        }
        let fields: Vec<&str> = record.split(FIELD_SEP).collect();
        if fields.len() != 9 {
            return Err(Error::internal(format!(
                "malformed git log record: {} fields",
                fields.len()
            )));
        }
        let parents = fields[7]
            .split_whitespace()
            .map(CommitId::parse)
            .collect::<Result<Vec<_>>>()?;
        commits.push(Commit {
            id: CommitId::parse(fields[0])?,
            author: Signature {
                name: fields[1].to_string(),
                email: fields[2].to_string(),
                date: parse_date(fields[3])?,
            },
            committer: Some(Signature {
                name: fields[4].to_string(),
                email: fields[5].to_string(),
                date: parse_date(fields[6])?,
            }),
            message: fields[8].trim_end_matches('\n').to_string(),
            parents,
        });
    }
    Ok(commits)
}

/// Parses NUL-terminated `git ls-tree -l -z` output. Returns each entry with
/// its full tree path (needed for recursion into subdirectories).
pub(super) fn parse_ls_tree(
    output: &[u8],
    mod_time: DateTime<Utc>,
) -> Result<Vec<(TreeEntry, String)>> {
    let text = String::from_utf8_lossy(output);
    let mut entries = Vec::new();
    for record in text.split('\0') {
        if record.is_empty() {
            continue;
        }
        // <mode> <type> <oid> <size>\t<path>
        let (meta, path) = record
            .split_once('\t')
            .ok_or_else(|| Error::internal("malformed ls-tree record"))?;
        let fields: Vec<&str> = meta.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(Error::internal("malformed ls-tree record"));
        }
        let (mode, object_type, size) = (fields[0], fields[1], fields[3]);
        let entry_type = match (mode, object_type) {
            ("120000", _) => TreeEntryType::Symlink,
            (_, "tree") => TreeEntryType::Dir,
            (_, "blob") => TreeEntryType::File,
            // Submodules and other exotica are surfaced as bare files.
            _ => TreeEntryType::File,
        };
        let size: u64 = if size == "-" {
            0
        } else {
            size.parse()
                .map_err(|_| Error::internal("unparseable ls-tree size"))?
        };
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        entries.push((
            TreeEntry {
                name,
                entry_type,
                size,
                mod_time,
                contents: None,
                entries: None,
            },
            path.to_string(),
        ));
    }
    Ok(entries)
}

/// Parses `git shortlog -sne` output into committers.
pub(super) fn parse_shortlog(output: &str) -> Result<Vec<Committer>> {
    let mut committers = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (count, identity) = line
            .split_once('\t')
            .or_else(|| line.split_once(' '))
            .ok_or_else(|| Error::internal("malformed shortlog line"))?;
        let commits: u64 = count
            .trim()
            .parse()
            .map_err(|_| Error::internal("unparseable shortlog count"))?;
        let identity = identity.trim();
        let (name, email) = match identity.rsplit_once('<') {
            Some((name, email)) => (name.trim(), email.trim_end_matches('>')),
            None => (identity, ""),
        };
        committers.push(Committer {
            name: name.to_string(),
            email: email.to_string(),
            commits,
        });
    }
    Ok(committers)
}

/// Parses `git blame --porcelain` output into hunks of consecutive lines
/// attributed to the same commit. Byte offsets are cumulative over the
/// blamed content, one newline per line.
pub(super) fn parse_blame_porcelain(output: &[u8]) -> Result<Vec<Hunk>> {
    let text = String::from_utf8_lossy(output);

    struct LineRecord {
        line_no: u64,
        commit: String,
        content_len: u64,
    }

    let mut authors: HashMap<String, Signature> = HashMap::new();
    let mut pending: HashMap<String, (Option<String>, Option<String>, Option<i64>)> =
        HashMap::new();
    let mut records: Vec<LineRecord> = Vec::new();
    let mut current: Option<(String, u64)> = None;

    for line in text.split('\n') {
        if let Some(content) = line.strip_prefix('\t') {
            let (commit, line_no) = current.take().ok_or_else(|| {
                Error::internal("blame content line without a preceding header")
            })?;
            records.push(LineRecord {
                line_no,
                commit,
                content_len: content.len() as u64 + 1,
            });
            continue;
        }

        if let Some((sha, rest)) = line.split_once(' ') {
            if sha.len() == 40 && sha.bytes().all(|b| b.is_ascii_hexdigit()) {
                // <sha> <orig-line> <final-line> [<group-size>]
                let final_line = rest
                    .split_whitespace()
                    .nth(1)
                    .and_then(|s| s.parse::<u64>().ok())
                    .ok_or_else(|| Error::internal("malformed blame header"))?;
                current = Some((sha.to_string(), final_line));
                pending.entry(sha.to_string()).or_default();
                continue;
            }
        }

        if let Some((sha, _)) = &current {
            let slot = pending.entry(sha.clone()).or_default();
            if let Some(name) = line.strip_prefix("author ") {
                slot.0 = Some(name.to_string());
            } else if let Some(mail) = line.strip_prefix("author-mail ") {
                slot.1 = Some(
                    mail.trim_start_matches('<')
                        .trim_end_matches('>')
                        .to_string(),
                );
            } else if let Some(time) = line.strip_prefix("author-time ") {
                slot.2 = time.parse().ok();
            }
        }
    }

    for (sha, (name, email, time)) in pending {
        let date = time
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_default();
        authors.insert(
            sha,
            Signature {
                name: name.unwrap_or_default(),
                email: email.unwrap_or_default(),
                date,
            },
        );
    }

    records.sort_by_key(|r| r.line_no);

    let mut hunks: Vec<Hunk> = Vec::new();
    let mut offset = 0u64;
    for record in records {
        let author = authors
            .get(&record.commit)
            .cloned()
            .ok_or_else(|| Error::internal("blame commit without author metadata"))?;
        let extend = hunks
            .last()
            .map(|h| h.commit_id.as_str() == record.commit && h.end_line + 1 == record.line_no)
            .unwrap_or(false);
        if extend {
            let last = hunks.last_mut().expect("nonempty");
            last.end_line = record.line_no;
            last.end_byte += record.content_len;
        } else {
            hunks.push(Hunk {
                start_line: record.line_no,
                end_line: record.line_no,
                start_byte: offset,
                end_byte: offset + record.content_len,
                commit_id: CommitId::parse(&record.commit)?,
                author,
            });
        }
        offset += record.content_len;
    }
    Ok(hunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const SHA_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn parses_log_records() {
        let record = format!(
            "{SHA_A}\u{1f}Alice\u{1f}alice@example.com\u{1f}2024-03-01T10:00:00+00:00\u{1f}Bob\u{1f}bob@example.com\u{1f}2024-03-01T11:00:00+00:00\u{1f}{SHA_B}\u{1f}add feature\n\u{1e}\n"
        );
        let commits = parse_commits(record.as_bytes()).unwrap();
        assert_eq!(commits.len(), 1);
        let c = &commits[0];
        assert_eq!(c.id.as_str(), SHA_A);
        assert_eq!(c.author.name, "Alice");
        assert_eq!(c.committer.as_ref().unwrap().name, "Bob");
        assert_eq!(c.parents.len(), 1);
        assert_eq!(c.message, "add feature");
    }

    #[test]
    fn parses_root_commit_with_no_parents() {
        let record = format!(
            "{SHA_A}\u{1f}A\u{1f}a@x\u{1f}2024-01-01T00:00:00Z\u{1f}A\u{1f}a@x\u{1f}2024-01-01T00:00:00Z\u{1f}\u{1f}init\u{1e}"
        );
        let commits = parse_commits(record.as_bytes()).unwrap();
        assert!(commits[0].parents.is_empty());
    }

    #[test]
    fn parses_ls_tree_entries() {
        let now = Utc::now();
        let output = format!(
            "100644 blob {SHA_A}      12\tREADME.md\0040000 tree {SHA_B}       -\tsrc\0120000 blob {SHA_A}       7\tlink\0"
        );
        let entries = parse_ls_tree(output.as_bytes(), now).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0.name, "README.md");
        assert_eq!(entries[0].0.entry_type, TreeEntryType::File);
        assert_eq!(entries[0].0.size, 12);
        assert_eq!(entries[1].0.entry_type, TreeEntryType::Dir);
        assert_eq!(entries[1].0.size, 0);
        assert_eq!(entries[2].0.entry_type, TreeEntryType::Symlink);
    }

    #[test]
    fn ls_tree_keeps_full_path_for_recursion() {
        let now = Utc::now();
        let output = format!("100644 blob {SHA_A}      3\tsrc/lib.rs\0");
        let entries = parse_ls_tree(output.as_bytes(), now).unwrap();
        assert_eq!(entries[0].0.name, "lib.rs");
        assert_eq!(entries[0].1, "src/lib.rs");
    }

    #[test]
    fn parses_shortlog() {
        let committers =
            parse_shortlog("   171\tAlice <alice@example.com>\n     2\tBob <bob@example.com>\n")
                .unwrap();
        assert_eq!(committers.len(), 2);
        assert_eq!(committers[0].name, "Alice");
        assert_eq!(committers[0].email, "alice@example.com");
        assert_eq!(committers[0].commits, 171);
    }

    #[test]
    fn blame_groups_consecutive_lines_into_hunks() {
        let porcelain = format!(
            "{SHA_A} 1 1 2\nauthor Alice\nauthor-mail <alice@example.com>\nauthor-time 1700000000\nauthor-tz +0000\n\tfn main() {{\n{SHA_A} 2 2\n\t}}\n{SHA_B} 3 3 1\nauthor Bob\nauthor-mail <bob@example.com>\nauthor-time 1700000500\nauthor-tz +0000\n\t// trailer\n"
        );
        let hunks = parse_blame_porcelain(porcelain.as_bytes()).unwrap();
        assert_eq!(hunks.len(), 2);

        assert_eq!(hunks[0].commit_id.as_str(), SHA_A);
        assert_eq!(hunks[0].start_line, 1);
        assert_eq!(hunks[0].end_line, 2);
        assert_eq!(hunks[0].start_byte, 0);
        assert_eq!(hunks[0].end_byte, 14); // "fn main() {\n" + "}\n"
        assert_eq!(hunks[0].author.name, "Alice");

        assert_eq!(hunks[1].commit_id.as_str(), SHA_B);
        assert_eq!(hunks[1].start_line, 3);
        assert_eq!(hunks[1].start_byte, 14);
        assert_eq!(hunks[1].author.name, "Bob");
    }
}

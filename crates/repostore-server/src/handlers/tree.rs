//! The tree endpoint: directory listings, file contents, and ranged reads.

use crate::cache::{for_canonicality, set_cache_control};
use crate::dispatch::{json_response, parse_query, AppState};
use axum::http::request::Parts;
use axum::response::Response;
use repostore_core::{
    compute_file_range, CommitId, Error, FileWithRange, GetFileOptions, RepoId, Result,
    TreeEntryType,
};

/// `GET /{repoID}/.commits/{id}/tree/{path}`
///
/// Directories carry their immediate children sorted by (type, name), the
/// whole subtree when `full_tree` is set. Regular files carry raw contents;
/// when range options are present the payload is wrapped as a
/// `FileWithRange` with contents trimmed to the normalized range.
pub async fn tree_entry(
    state: &AppState,
    repo_id: &RepoId,
    commit_id: &CommitId,
    path: &str,
    parts: &Parts,
) -> Result<Response> {
    let opt: GetFileOptions = parse_query(parts)?;

    let handle = state.manager.open(repo_id).await?;
    let mut entry = handle
        .repo
        .tree_entry(commit_id, path, opt.full_tree)
        .await?;

    let cache = for_canonicality(commit_id.is_canonical());

    if entry.entry_type == TreeEntryType::File && opt.has_range() {
        let contents = entry
            .contents
            .take()
            .ok_or_else(|| Error::internal("file entry without contents"))?;
        let range = compute_file_range(&contents, opt)?;
        entry.contents = Some(contents[range.start_byte as usize..range.end_byte as usize].to_vec());
        let mut response = json_response(&FileWithRange { entry, range })?;
        set_cache_control(&mut response, cache);
        return Ok(response);
    }

    let mut response = json_response(&entry)?;
    set_cache_control(&mut response, cache);
    Ok(response)
}

//! Git smart-transport proxy: `info/refs`, `upload-pack`, and
//! `receive-pack` bridged to local `git` subprocesses.
//!
//! Pack requests stream: the request body is copied into the child's stdin
//! (decoded incrementally when gzip- or deflate-encoded) while the child's
//! stdout streams back as the response body. Neither body is buffered whole.

use crate::cache::{set_cache_control, NO_CACHE};
use crate::dispatch::{parse_query, AppState};
use axum::body::{Body, Bytes};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue};
use axum::response::Response;
use flate2::write::{DeflateDecoder, GzDecoder};
use futures::StreamExt;
use repostore_core::{Error, RepoId, Result};
use serde::Deserialize;
use std::io::Write;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

/// Emits a packet line: 4 lowercase-hex length characters (padded to a
/// multiple of 4) followed by the payload.
fn packet_write(payload: &str) -> Vec<u8> {
    let mut length = format!("{:x}", payload.len() + 4);
    if length.len() % 4 != 0 {
        length = "0".repeat(4 - length.len() % 4) + &length;
    }
    let mut packet = length.into_bytes();
    packet.extend_from_slice(payload.as_bytes());
    packet
}

/// The flush packet.
fn packet_flush() -> &'static [u8] {
    b"0000"
}

fn service_name(raw: Option<&str>) -> Result<&'static str> {
    match raw {
        Some("git-upload-pack") => Ok("upload-pack"),
        Some("git-receive-pack") => Ok("receive-pack"),
        other => Err(Error::invalid_argument(format!(
            "unrecognized git service {:?}",
            other.unwrap_or_default()
        ))),
    }
}

#[derive(Deserialize)]
struct InfoRefsQuery {
    service: Option<String>,
}

/// `GET /{repoID}/.git/info/refs?service={git-upload-pack|git-receive-pack}`
pub async fn info_refs(state: &AppState, repo_id: &RepoId, parts: &Parts) -> Result<Response> {
    let query: InfoRefsQuery = parse_query(parts)?;
    let service = service_name(query.service.as_deref())?;

    let handle = state.manager.open(repo_id).await?;
    let output = Command::new("git")
        .args([service, "--stateless-rpc", "--advertise-refs", "."])
        .current_dir(&handle.dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::internal(format!("failed to spawn git {service}: {e}")))?;
    if !output.status.success() {
        return Err(Error::internal(format!(
            "git {service} --advertise-refs failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let mut body = packet_write(&format!("# service=git-{service}\n"));
    body.extend_from_slice(packet_flush());
    body.extend_from_slice(&output.stdout);

    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&format!("application/x-git-{service}-advertisement"))
            .map_err(|_| Error::internal("invalid content type"))?,
    );
    set_cache_control(&mut response, NO_CACHE);
    Ok(response)
}

/// `POST /{repoID}/.git/git-{service}`: pipes the request body through the
/// service subprocess and streams its stdout back.
pub async fn service_pack(
    state: &AppState,
    repo_id: &RepoId,
    service: &str,
    parts: &Parts,
    body: Body,
) -> Result<Response> {
    let handle = state.manager.open(repo_id).await?;

    let encoding = parts
        .headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase());
    let decoder = BodyDecoder::for_encoding(encoding.as_deref())?;

    let mut child = Command::new("git")
        .args([service, "--stateless-rpc", "."])
        .current_dir(&handle.dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::internal(format!("failed to spawn git {service}: {e}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::internal("child stdin unavailable"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::internal("child stdout unavailable"))?;
    let stderr = child.stderr.take();

    if let Some(stderr) = stderr {
        let service = service.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(service = %service, line = %line, "git stderr");
            }
        });
    }

    // The pump owns the child for the whole exchange. Response chunks go
    // through the channel; when the client goes away the receiver drops,
    // the next send fails, and the pump kills the child.
    let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(8);
    tokio::spawn(run_pack_service(
        child,
        body,
        decoder,
        stdin,
        stdout,
        tx,
        service.to_string(),
    ));
    let stream =
        futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|i| (i, rx)) });

    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&format!("application/x-git-{service}-result"))
            .map_err(|_| Error::internal("invalid content type"))?,
    );
    set_cache_control(&mut response, NO_CACHE);
    Ok(response)
}

/// Owns the child for the duration of a pack exchange. The two copy legs
/// run concurrently; when either fails (the client disconnecting included)
/// the other is dropped and the child is killed rather than left to notice
/// a broken pipe on its own.
async fn run_pack_service(
    mut child: Child,
    body: Body,
    decoder: BodyDecoder,
    stdin: ChildStdin,
    stdout: ChildStdout,
    tx: mpsc::Sender<std::io::Result<Bytes>>,
    service: String,
) {
    let stdin_leg = feed_stdin(body, decoder, stdin);
    let stdout_leg = pump_stdout(stdout, tx);
    tokio::pin!(stdin_leg);
    tokio::pin!(stdout_leg);

    let outcome = tokio::select! {
        r = &mut stdout_leg => r,
        r = &mut stdin_leg => match r {
            // The request is fully fed; drain the response side.
            Ok(()) => (&mut stdout_leg).await,
            Err(e) => Err(e),
        },
    };

    match outcome {
        Ok(()) => match child.wait().await {
            Ok(status) if status.success() => {}
            Ok(status) => {
                tracing::warn!(service = %service, %status, "git service exited nonzero");
            }
            Err(e) => {
                tracing::warn!(service = %service, error = %e, "failed to reap git service");
            }
        },
        Err(reason) => {
            tracing::debug!(service = %service, %reason, "aborting git service");
            if let Err(e) = child.kill().await {
                tracing::warn!(service = %service, error = %e, "failed to kill git service");
            }
        }
    }
}

async fn feed_stdin(
    body: Body,
    mut decoder: BodyDecoder,
    mut stdin: ChildStdin,
) -> std::result::Result<(), String> {
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("request body error: {e}"))?;
        let decoded = decoder
            .push(&chunk)
            .map_err(|e| format!("request body decode error: {e}"))?;
        if !decoded.is_empty() {
            stdin
                .write_all(&decoded)
                .await
                .map_err(|e| format!("git stdin write failed: {e}"))?;
        }
    }
    if let Ok(tail) = decoder.finish() {
        if !tail.is_empty() {
            let _ = stdin.write_all(&tail).await;
        }
    }
    let _ = stdin.shutdown().await;
    Ok(())
}

async fn pump_stdout(
    stdout: ChildStdout,
    tx: mpsc::Sender<std::io::Result<Bytes>>,
) -> std::result::Result<(), String> {
    let mut stream = ReaderStream::new(stdout);
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                if tx.send(Ok(bytes)).await.is_err() {
                    return Err("client disconnected".to_string());
                }
            }
            Err(e) => {
                let reason = format!("git stdout read failed: {e}");
                let _ = tx.send(Err(e)).await;
                return Err(reason);
            }
        }
    }
    Ok(())
}

/// Incremental request-body decoder for the transparently supported
/// content encodings.
enum BodyDecoder {
    Identity,
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(DeflateDecoder<Vec<u8>>),
}

impl BodyDecoder {
    fn for_encoding(encoding: Option<&str>) -> Result<Self> {
        match encoding {
            None | Some("") | Some("identity") => Ok(BodyDecoder::Identity),
            Some("gzip") => Ok(BodyDecoder::Gzip(GzDecoder::new(Vec::new()))),
            Some("deflate") => Ok(BodyDecoder::Deflate(DeflateDecoder::new(Vec::new()))),
            Some(other) => Err(Error::invalid_argument(format!(
                "unsupported content encoding {other:?}"
            ))),
        }
    }

    fn push(&mut self, chunk: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            BodyDecoder::Identity => Ok(chunk.to_vec()),
            BodyDecoder::Gzip(decoder) => {
                decoder.write_all(chunk)?;
                decoder.flush()?;
                Ok(std::mem::take(decoder.get_mut()))
            }
            BodyDecoder::Deflate(decoder) => {
                decoder.write_all(chunk)?;
                decoder.flush()?;
                Ok(std::mem::take(decoder.get_mut()))
            }
        }
    }

    fn finish(self) -> std::io::Result<Vec<u8>> {
        match self {
            BodyDecoder::Identity => Ok(Vec::new()),
            BodyDecoder::Gzip(decoder) => decoder.finish(),
            BodyDecoder::Deflate(decoder) => decoder.finish(),
        }
    }
}

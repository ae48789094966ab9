//! The data loader.
//!
//! Performs one logical transfer over a [`Transport`]: chases redirects
//! (the transport itself performs single exchanges), enforces the
//! per-attempt timeout, streams the body to memory or to a spill file
//! according to the transfer mode, publishes progress events, collects
//! per-hop metrics, and honors cooperative cancellation with optional
//! resumable state.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::Method;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cancel::{CancelHandle, ResumeData};
use crate::cookies::SharedCookieJar;
use crate::delegate::ClientDelegate;
use crate::error::Error;
use crate::headers::HeaderStore;
use crate::metrics::{Metrics, TimeWindow, TransactionMetrics};
use crate::progress::{Progress, ProgressEvent, ProgressSink};
use crate::request::{RedirectPolicy, TransferMode};
use crate::transport::{Payload, ReplyBody, Transport, TransportReply, WireRequest};

/// Redirect chains longer than this are delivered as-is.
const MAX_REDIRECTS: u32 = 10;

/// Cap on the body bytes probed for a body-encoded redirect target.
const REDIRECT_PROBE_LIMIT: usize = 16 * 1024;

/// Result of one loader transfer. A transport failure is reported in
/// `error` with status 0 so the validator chain can decide its fate.
pub(crate) struct LoaderOutput {
    pub status: u16,
    pub headers: HeaderStore,
    pub data: Option<Bytes>,
    pub file: Option<PathBuf>,
    pub error: Option<Error>,
    pub metrics: Metrics,
    pub final_request: WireRequest,
}

/// Per-transfer options handed down by the executor.
pub(crate) struct TransferOptions<'a> {
    pub mode: TransferMode,
    pub redirect_policy: RedirectPolicy,
    pub resume: Option<&'a ResumeData>,
    pub progress: Option<&'a ProgressSink>,
    pub cancel: Option<&'a CancelHandle>,
    pub request_id: u64,
}

impl TransferOptions<'_> {
    fn publish(&self, progress: Progress) {
        if let Some(sink) = self.progress {
            sink(progress);
        }
    }
}

pub(crate) struct DataLoader {
    transport: Arc<dyn Transport>,
    cookies: Option<SharedCookieJar>,
}

impl DataLoader {
    pub(crate) fn new(transport: Arc<dyn Transport>, cookies: Option<SharedCookieJar>) -> Self {
        Self { transport, cookies }
    }

    /// Drive one logical transfer to completion.
    ///
    /// `Err` is reserved for terminal conditions (cancellation, stub
    /// not found); everything else is delivered as a [`LoaderOutput`],
    /// possibly with `error` populated.
    pub(crate) async fn fetch(
        &self,
        wire: WireRequest,
        opts: TransferOptions<'_>,
        delegate: &Arc<dyn ClientDelegate>,
    ) -> Result<LoaderOutput, Error> {
        let task_start = Instant::now();
        let mut wire = wire;
        let mut metrics = Metrics::default();

        let resuming = if let Some(resume) = opts.resume {
            wire.headers
                .set("Range", format!("bytes={}-", resume.bytes_received));
            if let Some(etag) = &resume.etag {
                wire.headers.set("If-Range", etag.clone());
            }
            true
        } else {
            false
        };

        loop {
            if let Some(cancel) = opts.cancel {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
            }

            let attempt_start = Instant::now();
            let deadline = wire.timeout.map(|timeout| attempt_start + timeout);

            let reply = match self.exchange(&wire, opts.cancel, deadline).await {
                Ok(reply) => reply,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(error @ Error::StubNotFound(_)) => return Err(error),
                Err(error) => {
                    if matches!(error, Error::MissingConnection) {
                        delegate.task_waiting_for_connectivity(opts.request_id);
                    }
                    warn!(url = %wire.url, %error, "transport failure");
                    metrics.task_interval = Some(window(task_start, Instant::now()));
                    return Ok(LoaderOutput {
                        status: 0,
                        headers: HeaderStore::new(),
                        data: None,
                        file: None,
                        error: Some(error),
                        metrics,
                        final_request: wire,
                    });
                }
            };
            let headers_at = Instant::now();

            if let Some(length) = wire.body.len() {
                if length > 0 {
                    opts.publish(Progress::new(ProgressEvent::Upload, length, Some(length)));
                }
            }

            if let Some(jar) = &self.cookies {
                jar.lock().expect("cookie jar lock poisoned").store_from_headers(
                    &wire.url,
                    reply
                        .headers
                        .iter()
                        .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
                        .map(|(_, value)| value),
                );
            }

            let status = reply.status;
            let chase = is_redirect_status(status)
                && opts.redirect_policy != RedirectPolicy::Refuse
                && metrics.redirect_count < MAX_REDIRECTS;

            let TransportReply { headers, body, .. } = reply;
            let mut body = Some(body);
            let mut probed: Option<Bytes> = None;

            if chase {
                let target = match headers.value("location") {
                    Some(location) => Some(location.to_string()),
                    None => {
                        // Stubbed redirects may carry the target in the
                        // body instead of a Location header.
                        let bytes = collect_limited(
                            body.take().expect("body consumed once"),
                            REDIRECT_PROBE_LIMIT,
                            opts.cancel,
                            deadline,
                        )
                        .await?;
                        let candidate = std::str::from_utf8(&bytes)
                            .ok()
                            .map(str::trim)
                            .filter(|text| !text.is_empty() && wire.url.join(text).is_ok())
                            .map(str::to_string);
                        probed = Some(bytes);
                        candidate
                    }
                };

                if let Some(next_url) = target.and_then(|target| wire.url.join(target.trim()).ok())
                {
                    metrics
                        .transactions
                        .push(hop_metrics(attempt_start, headers_at, Instant::now()));
                    metrics.redirect_count += 1;

                    let mut next = wire.clone();
                    next.url = next_url;
                    if opts.redirect_policy == RedirectPolicy::Follow
                        && downgrades_to_get(status, &next.method)
                    {
                        next.method = Method::GET;
                        next.body = Payload::Empty;
                        next.headers.remove("content-type");
                        next.headers.remove("content-length");
                    }
                    debug!(from = %wire.url, to = %next.url, status, "chasing redirect");
                    delegate.will_perform_redirect(opts.request_id, &next);
                    wire = next;
                    continue;
                }
                // No target recoverable; deliver the response as-is.
            }

            let body = body.unwrap_or_else(|| Box::pin(futures::stream::empty()));
            let output = self
                .deliver(
                    status,
                    headers,
                    body,
                    probed,
                    &wire,
                    &opts,
                    resuming,
                    attempt_start,
                    headers_at,
                    deadline,
                    task_start,
                    metrics,
                )
                .await?;
            return Ok(output);
        }
    }

    /// One exchange, racing the cancel handle and the attempt deadline.
    async fn exchange(
        &self,
        wire: &WireRequest,
        cancel: Option<&CancelHandle>,
        deadline: Option<Instant>,
    ) -> Result<TransportReply, Error> {
        let send = self.transport.send(wire);
        tokio::pin!(send);
        tokio::select! {
            result = &mut send => result,
            _ = cancelled_wait(cancel) => Err(Error::Cancelled),
            _ = deadline_wait(deadline) => Err(Error::Timeout),
        }
    }

    /// Stream the final body into the configured sink.
    #[allow(clippy::too_many_arguments)]
    async fn deliver(
        &self,
        status: u16,
        headers: HeaderStore,
        body: ReplyBody,
        preread: Option<Bytes>,
        wire: &WireRequest,
        opts: &TransferOptions<'_>,
        resuming: bool,
        attempt_start: Instant,
        headers_at: Instant,
        deadline: Option<Instant>,
        task_start: Instant,
        mut metrics: Metrics,
    ) -> Result<LoaderOutput, Error> {
        // A 206 continues the partial transfer; anything else restarts it.
        let resumed = resuming && status == 206;
        let offset = if resumed {
            opts.resume.map(|resume| resume.bytes_received).unwrap_or(0)
        } else {
            0
        };

        let mut sink = Sink::create(opts.mode, if resumed { opts.resume } else { None }).await?;
        let mut current = offset;

        let announced = headers
            .value("content-length")
            .and_then(|value| value.parse::<u64>().ok());
        let expected = announced.map(|remaining| remaining + offset);

        if resumed {
            opts.publish(Progress::new(ProgressEvent::Resumed, current, expected));
        }

        let finalize_metrics = |metrics: &mut Metrics| {
            let done = Instant::now();
            metrics
                .transactions
                .push(hop_metrics(attempt_start, headers_at, done));
            metrics.task_interval = Some(window(task_start, done));
        };

        let mut body = body;
        if let Some(bytes) = preread {
            current += bytes.len() as u64;
            sink.write(&bytes).await?;
        }

        let failure = loop {
            tokio::select! {
                _ = cancelled_wait(opts.cancel) => {
                    let cancel = opts.cancel.expect("cancel branch without handle");
                    if cancel.wants_resume_data() {
                        sink.flush().await;
                        let (partial, file) = sink.into_parts();
                        cancel.stash_resume_data(ResumeData {
                            url: wire.url.clone(),
                            bytes_received: current,
                            expected,
                            file,
                            partial,
                            etag: headers.value("etag").map(str::to_string),
                        });
                    } else {
                        sink.discard();
                    }
                    return Err(Error::Cancelled);
                }
                _ = deadline_wait(deadline) => break Some(Error::Timeout),
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        sink.write(&bytes).await?;
                        current += bytes.len() as u64;
                        opts.publish(Progress::new(ProgressEvent::Download, current, expected));
                    }
                    Some(Err(error)) => break Some(error),
                    None => break None,
                }
            }
        };

        sink.flush().await;
        let (data, file) = sink.into_parts();

        if let Some(error) = failure {
            let mut progress = Progress::new(ProgressEvent::Failed, current, expected);
            progress.partial_data = data.clone();
            opts.publish(progress);

            finalize_metrics(&mut metrics);
            return Ok(LoaderOutput {
                status,
                headers,
                data,
                file,
                error: Some(error),
                metrics,
                final_request: wire.clone(),
            });
        }

        finalize_metrics(&mut metrics);
        Ok(LoaderOutput {
            status,
            headers,
            data,
            file,
            error: None,
            metrics,
            final_request: wire.clone(),
        })
    }
}

/// Where response bytes land.
enum Sink {
    Buffer(BytesMut),
    File { file: tokio::fs::File, path: PathBuf },
}

impl Sink {
    async fn create(mode: TransferMode, resume: Option<&ResumeData>) -> Result<Self, Error> {
        match mode {
            TransferMode::Buffered => {
                let mut buffer = BytesMut::new();
                if let Some(partial) = resume.and_then(|resume| resume.partial.as_ref()) {
                    buffer.extend_from_slice(partial);
                }
                Ok(Sink::Buffer(buffer))
            }
            TransferMode::LargeData => {
                if let Some(path) = resume.and_then(|resume| resume.file.clone()) {
                    let file = tokio::fs::OpenOptions::new()
                        .append(true)
                        .open(&path)
                        .await
                        .map_err(|e| Error::Internal(format!("reopening spill file: {e}")))?;
                    return Ok(Sink::File { file, path });
                }
                let tmp = tempfile::Builder::new()
                    .prefix("wireline-")
                    .suffix(".part")
                    .tempfile()
                    .map_err(|e| Error::Internal(format!("creating spill file: {e}")))?;
                let (std_file, path) = tmp
                    .keep()
                    .map_err(|e| Error::Internal(format!("persisting spill file: {e}")))?;
                Ok(Sink::File {
                    file: tokio::fs::File::from_std(std_file),
                    path,
                })
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        match self {
            Sink::Buffer(buffer) => {
                buffer.extend_from_slice(bytes);
                Ok(())
            }
            Sink::File { file, .. } => file
                .write_all(bytes)
                .await
                .map_err(|e| Error::Internal(format!("writing spill file: {e}"))),
        }
    }

    async fn flush(&mut self) {
        if let Sink::File { file, .. } = self {
            let _ = file.flush().await;
        }
    }

    /// Buffered bytes and spill path. In large-data mode the bytes stay
    /// on disk; the consumer reads them explicitly.
    fn into_parts(self) -> (Option<Bytes>, Option<PathBuf>) {
        match self {
            Sink::Buffer(buffer) => (Some(buffer.freeze()), None),
            Sink::File { path, .. } => (None, Some(path)),
        }
    }

    /// Drop partial state after a plain (non-resumable) cancellation.
    fn discard(self) {
        if let Sink::File { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn is_redirect_status(status: u16) -> bool {
    (300..=399).contains(&status) && status != 304 && status != 305
}

/// Under the plain follow policy, 303 always downgrades to GET, and the
/// legacy 301/302 statuses downgrade everything but GET and HEAD.
fn downgrades_to_get(status: u16, method: &Method) -> bool {
    status == 303
        || ((status == 301 || status == 302) && *method != Method::GET && *method != Method::HEAD)
}

fn window(start: Instant, end: Instant) -> TimeWindow {
    TimeWindow::new(start.into_std(), end.into_std())
}

fn hop_metrics(attempt_start: Instant, headers_at: Instant, done: Instant) -> TransactionMetrics {
    TransactionMetrics {
        server: Some(window(attempt_start, headers_at)),
        response: Some(window(headers_at, done)),
        total: Some(window(attempt_start, done)),
        ..TransactionMetrics::default()
    }
}

/// Resolves when the handle is cancelled; pends forever without one.
async fn cancelled_wait(cancel: Option<&CancelHandle>) {
    match cancel {
        Some(handle) => handle.cancelled().await,
        None => futures::future::pending().await,
    }
}

/// Resolves at the deadline; pends forever without one.
async fn deadline_wait(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => futures::future::pending().await,
    }
}

/// Collect at most `limit` bytes of the body. Stream errors and the
/// attempt deadline end the probe with what was read; the delivery loop
/// re-checks the deadline afterwards.
async fn collect_limited(
    mut body: ReplyBody,
    limit: usize,
    cancel: Option<&CancelHandle>,
    deadline: Option<Instant>,
) -> Result<Bytes, Error> {
    let mut out = BytesMut::new();
    loop {
        tokio::select! {
            _ = cancelled_wait(cancel) => return Err(Error::Cancelled),
            _ = deadline_wait(deadline) => return Ok(out.freeze()),
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    out.extend_from_slice(&bytes);
                    if out.len() >= limit {
                        return Ok(out.freeze());
                    }
                }
                Some(Err(_)) | None => return Ok(out.freeze()),
            }
        }
    }
}

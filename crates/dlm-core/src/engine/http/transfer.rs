//! One blocking libcurl transfer into a staging file.

use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::PathBuf;

use curl::easy::{Easy, List};

use super::headers::ResponseHeaders;
use super::token::ResumeData;
use super::CurlOptions;
use crate::engine::{
    Artifact, ControlFlag, ControlSignal, ResumeToken, TransferError, TransferErrorKind,
    TransferId, TransferSink, TransferSource,
};
use crate::retry::{classify_curl_error, classify_http_status};
use crate::url_model::parse_content_disposition_filename;

/// Abort if throughput stays below this many bytes/s for `low_speed_time`.
const LOW_SPEED_LIMIT: u32 = 1024;

pub(super) struct TransferJob {
    pub id: TransferId,
    pub source: TransferSource,
    pub staging_dir: PathBuf,
    pub options: CurlOptions,
    pub flag: ControlFlag,
}

/// The single terminal event of a transfer.
#[derive(Debug)]
pub(super) enum Outcome {
    Succeeded(Artifact),
    Failed(TransferError),
    Suspended(Option<ResumeToken>),
}

impl Outcome {
    pub fn deliver(self, sink: &TransferSink) {
        match self {
            Outcome::Succeeded(artifact) => sink.succeeded(artifact),
            Outcome::Failed(error) => sink.failed(error),
            Outcome::Suspended(token) => sink.suspended(token),
        }
    }
}

/// Mutable transfer state shared by the libcurl callbacks.
struct State {
    file: File,
    /// Body offset the request started from (0 after a forced restart).
    offset: u64,
    /// Bytes of the body now in the file.
    written: u64,
    headers: ResponseHeaders,
    body_started: bool,
    io_error: Option<io::Error>,
    last_reported: Option<u64>,
}

impl State {
    fn write_body(&mut self, data: &[u8]) -> usize {
        if !self.headers.is_success() {
            // error page; the status is reported after perform
            return data.len();
        }
        if !self.body_started {
            self.body_started = true;
            if self.offset > 0 && self.headers.status == Some(200) {
                if let Err(e) = self.restart() {
                    self.io_error = Some(e);
                    return 0;
                }
            }
        }
        match self.file.write_all(data) {
            Ok(()) => {
                self.written += data.len() as u64;
                data.len()
            }
            Err(e) => {
                self.io_error = Some(e);
                0
            }
        }
    }

    /// Server ignored the range (or the validator no longer matched).
    fn restart(&mut self) -> io::Result<()> {
        tracing::debug!("server sent full body for a ranged request, restarting at 0");
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.offset = 0;
        self.written = 0;
        Ok(())
    }

    fn report_progress(&mut self, sink: &TransferSink) {
        if !self.headers.is_success() || self.last_reported == Some(self.written) {
            return;
        }
        self.last_reported = Some(self.written);
        sink.progress(self.written, self.headers.expected_total(self.offset));
    }
}

struct Staged {
    file: File,
    path: PathBuf,
    offset: u64,
    validator: Option<String>,
}

/// Runs the transfer to completion on the current thread.
pub(super) fn run(job: &TransferJob, sink: &TransferSink) -> Outcome {
    let url = job.source.request().url.as_str();
    match job.flag.get() {
        ControlSignal::Run => {}
        ControlSignal::Suspend => {
            tracing::debug!(transfer = %job.id, "suspended before start");
            return Outcome::Suspended(job.source.resume_token().cloned());
        }
        ControlSignal::Abort => {
            tracing::debug!(transfer = %job.id, "aborted before start");
            if let Some(data) = job.source.resume_token().and_then(|t| ResumeData::decode(t).ok()) {
                data.discard();
            }
            return Outcome::Failed(TransferError::aborted());
        }
    }
    let staged = match stage(job) {
        Ok(staged) => staged,
        Err(e) => {
            tracing::warn!(transfer = %job.id, "staging file for {}: {}", url, e);
            return Outcome::Failed(TransferError::io(&e));
        }
    };
    tracing::debug!(transfer = %job.id, offset = staged.offset, "GET {}", url);

    let path = staged.path;
    let validator = staged.validator;
    let state = RefCell::new(State {
        file: staged.file,
        offset: staged.offset,
        written: staged.offset,
        headers: ResponseHeaders::default(),
        body_started: false,
        io_error: None,
        last_reported: None,
    });
    let result = perform(job, validator.as_deref(), &state, sink);
    let mut state = state.into_inner();

    match result {
        Err(e) => match job.flag.get() {
            ControlSignal::Abort => {
                remove_partial(&path);
                Outcome::Failed(TransferError::aborted())
            }
            ControlSignal::Suspend => suspend_outcome(url, path, state),
            ControlSignal::Run => {
                remove_partial(&path);
                let error = match state.io_error.take() {
                    Some(io_err) => TransferError::io(&io_err),
                    None => TransferError::new(classify_curl_error(&e), e.to_string()),
                };
                tracing::debug!(transfer = %job.id, "GET {} failed: {}", url, error);
                Outcome::Failed(error)
            }
        },
        Ok(code) => {
            if code == 416 && state.offset > 0 && state.headers.range_total == Some(state.offset) {
                // the partial already held the whole body
                if let Err(e) = state.file.sync_all() {
                    remove_partial(&path);
                    return Outcome::Failed(TransferError::io(&e));
                }
                tracing::debug!(transfer = %job.id, bytes = state.offset, "GET {} already complete", url);
                sink.progress(state.offset, state.offset);
                return Outcome::Succeeded(Artifact::new(path));
            }
            if let Some(kind) = classify_http_status(code) {
                remove_partial(&path);
                tracing::debug!(transfer = %job.id, "GET {} returned HTTP {}", url, code);
                let error = match kind {
                    TransferErrorKind::Timeout => {
                        TransferError::timeout(format!("server responded with HTTP {}", code))
                    }
                    _ => TransferError::new(kind, "unexpected response status"),
                };
                return Outcome::Failed(error);
            }
            if state.offset > 0 && state.headers.status == Some(200) && !state.body_started {
                if let Err(e) = state.restart() {
                    remove_partial(&path);
                    return Outcome::Failed(TransferError::io(&e));
                }
            }
            if let Err(e) = state.file.sync_all() {
                remove_partial(&path);
                return Outcome::Failed(TransferError::io(&e));
            }
            state.report_progress(sink);
            tracing::debug!(transfer = %job.id, bytes = state.written, "GET {} complete", url);
            let suggested = state
                .headers
                .content_disposition
                .as_deref()
                .and_then(parse_content_disposition_filename);
            let artifact = Artifact::new(path);
            Outcome::Succeeded(match suggested {
                Some(name) => artifact.with_suggested_filename(name),
                None => artifact,
            })
        }
    }
}

fn perform(
    job: &TransferJob,
    validator: Option<&str>,
    state: &RefCell<State>,
    sink: &TransferSink,
) -> Result<u32, curl::Error> {
    let request = job.source.request();
    let opts = &job.options;
    let offset = state.borrow().offset;

    let mut easy = Easy::new();
    easy.url(&request.url)?;
    easy.follow_location(true)?;
    easy.max_redirections(opts.max_redirections)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.low_speed_limit(LOW_SPEED_LIMIT)?;
    easy.low_speed_time(opts.low_speed_time)?;
    if let Some(timeout) = request.timeout {
        easy.timeout(timeout)?;
    }
    easy.useragent(&opts.user_agent)?;
    easy.progress(true)?;
    if offset > 0 {
        // plain Range header: resume_from would reject a 200 reply outright
        easy.range(&format!("{}-", offset))?;
    }

    let mut list = List::new();
    for (k, v) in &request.headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    if let Some(v) = validator.filter(|_| offset > 0) {
        list.append(&format!("If-Range: {}", v))?;
    }
    easy.http_headers(list)?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(line) = std::str::from_utf8(data) {
                state.borrow_mut().headers.feed(line);
            }
            true
        })?;
        transfer.write_function(|data| Ok(state.borrow_mut().write_body(data)))?;
        transfer.progress_function(|_, _, _, _| {
            state.borrow_mut().report_progress(sink);
            !job.flag.should_stop()
        })?;
        transfer.perform()?;
    }
    easy.response_code()
}

fn stage(job: &TransferJob) -> io::Result<Staged> {
    fs::create_dir_all(&job.staging_dir)?;
    if let Some(token) = job.source.resume_token() {
        match ResumeData::decode(token) {
            Ok(data) => match open_partial(&data) {
                Ok(staged) => return Ok(staged),
                Err(e) => {
                    tracing::debug!(transfer = %job.id, "cannot resume {}: {}", data.partial_path.display(), e);
                    data.discard();
                }
            },
            Err(e) => tracing::debug!(transfer = %job.id, "unreadable resume token: {}", e),
        }
    }
    let (file, path) = tempfile::Builder::new()
        .prefix(".dlm-")
        .suffix(".part")
        .tempfile_in(&job.staging_dir)?
        .keep()
        .map_err(|e| e.error)?;
    Ok(Staged {
        file,
        path,
        offset: 0,
        validator: None,
    })
}

fn open_partial(data: &ResumeData) -> io::Result<Staged> {
    let mut file = OpenOptions::new().write(true).open(&data.partial_path)?;
    if file.metadata()?.len() < data.offset {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "partial file is shorter than its recorded offset",
        ));
    }
    file.set_len(data.offset)?;
    file.seek(SeekFrom::Start(data.offset))?;
    Ok(Staged {
        file,
        path: data.partial_path.clone(),
        offset: data.offset,
        validator: data.if_range().map(str::to_string),
    })
}

fn suspend_outcome(url: &str, path: PathBuf, state: State) -> Outcome {
    if !state.headers.is_success() || state.written == 0 || state.file.sync_all().is_err() {
        remove_partial(&path);
        return Outcome::Suspended(None);
    }
    let data = ResumeData {
        url: url.to_string(),
        partial_path: path,
        offset: state.written,
        etag: state.headers.etag,
        last_modified: state.headers.last_modified,
    };
    Outcome::Suspended(Some(data.encode()))
}

fn remove_partial(path: &std::path::Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::debug!("remove {}: {}", path.display(), e);
        }
    }
}

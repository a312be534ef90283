// Uploader: sends one file to the deposition bucket and keeps trying
// until it lands. Each attempt ends in an `AttemptOutcome`; the `retry`
// driver turns those outcomes into the fixed-delay retry loop:
//
//   Attempting --Success--> done
//   Attempting --Retryable--> RetryWait --(sleep)--> Attempting
//   Attempting --Cancelled--> stop the run
//
// Progress reporting goes through `ProgressObserver` and never feeds back
// into the loop.

use crate::api::{FileTransport, UploadedFile};
use crate::config::{Config, RETRY_DELAY};
use crate::error::{ApiError, UploadError};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Receives progress notifications while a file is streamed.
pub trait ProgressObserver: Send + Sync {
    /// An attempt for `path` begins; `total` is the size measured before
    /// the first attempt.
    fn on_attempt_start(&self, _path: &Path, _total: u64) {}

    fn on_bytes_transferred(&self, count: u64);

    fn on_attempt_end(&self, _succeeded: bool) {}
}

/// Observer that discards everything.
pub struct SilentProgress;

impl ProgressObserver for SilentProgress {
    fn on_bytes_transferred(&self, _count: u64) {}
}

/// `Read` adapter that reports every chunk it hands out.
pub struct ProgressReader<R> {
    inner: R,
    observer: Arc<dyn ProgressObserver>,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, observer: Arc<dyn ProgressObserver>) -> Self {
        ProgressReader { inner, observer }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.observer.on_bytes_transferred(n as u64);
        }
        Ok(n)
    }
}

/// The pause between attempts.
pub trait Sleeper {
    fn sleep(&self, delay: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, delay: Duration) {
        (**self).sleep(delay)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// `None` never gives up.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            delay: RETRY_DELAY,
            max_attempts: None,
        }
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        RetryPolicy {
            delay: config.retry_delay,
            max_attempts: config.max_attempts,
        }
    }
}

/// Result of one attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    Retryable(ApiError),
    Cancelled,
}

impl<T> AttemptOutcome<T> {
    /// Any error is retryable unless it was caused by a user interrupt.
    pub fn classify(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(value) => AttemptOutcome::Success(value),
            Err(err) if err.is_interrupt() => AttemptOutcome::Cancelled,
            Err(err) => AttemptOutcome::Retryable(err),
        }
    }
}

#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Why the retry driver stopped without a success.
#[derive(Debug)]
pub enum RetryStop {
    Cancelled { attempts: u32 },
    Exhausted { attempts: u32, last: ApiError },
}

enum RetryState {
    Attempting { attempt: u32 },
    RetryWait { attempt: u32, error: ApiError },
}

/// Run `attempt` until it succeeds, is cancelled, or hits
/// `policy.max_attempts`. Attempts are numbered from 1.
pub fn retry<T>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut attempt: impl FnMut(u32) -> AttemptOutcome<T>,
) -> Result<Retried<T>, RetryStop> {
    let mut state = RetryState::Attempting { attempt: 1 };
    loop {
        state = match state {
            RetryState::Attempting { attempt: n } => match attempt(n) {
                AttemptOutcome::Success(value) => {
                    return Ok(Retried { value, attempts: n })
                }
                AttemptOutcome::Cancelled => return Err(RetryStop::Cancelled { attempts: n }),
                AttemptOutcome::Retryable(error) => {
                    if policy.max_attempts.is_some_and(|max| n >= max) {
                        return Err(RetryStop::Exhausted {
                            attempts: n,
                            last: error,
                        });
                    }
                    RetryState::RetryWait { attempt: n, error }
                }
            },
            RetryState::RetryWait { attempt: n, error } => {
                tracing::warn!(
                    attempt = n,
                    error = %error,
                    "upload attempt failed, retrying in {:?}",
                    policy.delay
                );
                sleeper.sleep(policy.delay);
                RetryState::Attempting {
                    attempt: n.saturating_add(1),
                }
            }
        };
    }
}

/// What a finished upload reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfirmation {
    pub path: PathBuf,
    pub size: u64,
    pub attempts: u32,
    pub file: UploadedFile,
}

/// Streams files through a `FileTransport` with the retry policy applied.
pub struct Uploader<'a, T: FileTransport + ?Sized> {
    transport: &'a T,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper + 'a>,
    observer: Arc<dyn ProgressObserver>,
}

impl<'a, T: FileTransport + ?Sized> Uploader<'a, T> {
    pub fn new(transport: &'a T, policy: RetryPolicy) -> Self {
        Uploader {
            transport,
            policy,
            sleeper: Box::new(ThreadSleeper),
            observer: Arc::new(SilentProgress),
        }
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'a) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Upload `path` to `bucket_url/<basename>`.
    ///
    /// Transport and status failures are retried from byte 0 after the
    /// policy delay. Only a cancellation, an exhausted retry cap, or a file
    /// that cannot be stat'ed before the first attempt end in an error.
    pub fn upload(&self, bucket_url: &str, path: &Path) -> Result<UploadConfirmation, UploadError> {
        let size = std::fs::metadata(path)
            .map_err(|source| UploadError::Metadata {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let outcome = retry(&self.policy, self.sleeper.as_ref(), |attempt| {
            tracing::debug!(attempt, path = %path.display(), size, "upload attempt");
            self.observer.on_attempt_start(path, size);
            let result = self
                .transport
                .put_file(bucket_url, path, Arc::clone(&self.observer));
            self.observer.on_attempt_end(result.is_ok());
            AttemptOutcome::classify(result)
        });

        match outcome {
            Ok(Retried { value, attempts }) => Ok(UploadConfirmation {
                path: path.to_path_buf(),
                size,
                attempts,
                file: value,
            }),
            Err(RetryStop::Cancelled { .. }) => Err(UploadError::Cancelled {
                path: path.to_path_buf(),
            }),
            Err(RetryStop::Exhausted { attempts, last }) => Err(UploadError::Exhausted {
                path: path.to_path_buf(),
                attempts,
                source: last,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::io::Cursor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        delays: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, delay: Duration) {
            self.delays.borrow_mut().push(delay);
        }
    }

    /// Fails `failures` times with a 503, then streams the file for real.
    struct FlakyTransport {
        failures: u32,
        calls: Cell<u32>,
        interrupt_on: Option<u32>,
    }

    impl FlakyTransport {
        fn failing(failures: u32) -> Self {
            FlakyTransport {
                failures,
                calls: Cell::new(0),
                interrupt_on: None,
            }
        }
    }

    impl FileTransport for FlakyTransport {
        fn put_file(
            &self,
            _bucket_url: &str,
            path: &Path,
            observer: Arc<dyn ProgressObserver>,
        ) -> Result<UploadedFile, ApiError> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            if self.interrupt_on == Some(call) {
                return Err(ApiError::Io(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "interrupted",
                )));
            }
            if call <= self.failures {
                return Err(ApiError::Status {
                    status: 503,
                    body: "try later".into(),
                });
            }
            let mut reader = ProgressReader::new(std::fs::File::open(path)?, observer);
            let mut sink = Vec::new();
            reader.read_to_end(&mut sink)?;
            Ok(UploadedFile {
                key: crate::planner::basename(path),
                size: sink.len() as u64,
                checksum: None,
            })
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
        bytes: Mutex<u64>,
    }

    impl ProgressObserver for RecordingObserver {
        fn on_attempt_start(&self, _path: &Path, total: u64) {
            self.events.lock().unwrap().push(format!("start {total}"));
        }

        fn on_bytes_transferred(&self, count: u64) {
            *self.bytes.lock().unwrap() += count;
        }

        fn on_attempt_end(&self, succeeded: bool) {
            self.events.lock().unwrap().push(format!("end {succeeded}"));
        }
    }

    fn sample_file(contents: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn succeeds_after_n_failures_with_n_waits() {
        let (_dir, path) = sample_file(b"hello world");
        let transport = FlakyTransport::failing(3);
        let sleeper = RecordingSleeper::default();
        let uploader = Uploader::new(&transport, RetryPolicy::default()).with_sleeper(&sleeper);

        let confirmation = uploader.upload("http://bucket", &path).unwrap();

        assert_eq!(confirmation.attempts, 4);
        assert_eq!(transport.calls.get(), 4);
        assert_eq!(confirmation.size, 11);
        assert_eq!(confirmation.file.key, "sample.bin");
        assert_eq!(*sleeper.delays.borrow(), vec![Duration::from_secs(5); 3]);
    }

    #[test]
    fn first_try_success_does_not_wait() {
        let (_dir, path) = sample_file(b"x");
        let transport = FlakyTransport::failing(0);
        let sleeper = RecordingSleeper::default();
        let uploader = Uploader::new(&transport, RetryPolicy::default()).with_sleeper(&sleeper);

        let confirmation = uploader.upload("http://bucket", &path).unwrap();
        assert_eq!(confirmation.attempts, 1);
        assert!(sleeper.delays.borrow().is_empty());
    }

    #[test]
    fn interrupt_stops_without_further_attempts() {
        let (_dir, path) = sample_file(b"data");
        let transport = FlakyTransport {
            failures: 5,
            calls: Cell::new(0),
            interrupt_on: Some(2),
        };
        let sleeper = RecordingSleeper::default();
        let uploader = Uploader::new(&transport, RetryPolicy::default()).with_sleeper(&sleeper);

        let err = uploader.upload("http://bucket", &path).unwrap_err();
        assert!(matches!(err, UploadError::Cancelled { .. }));
        assert_eq!(transport.calls.get(), 2);
        assert_eq!(sleeper.delays.borrow().len(), 1);
    }

    #[test]
    fn retry_cap_surfaces_last_error() {
        let (_dir, path) = sample_file(b"data");
        let transport = FlakyTransport::failing(u32::MAX);
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy {
            delay: Duration::from_millis(10),
            max_attempts: Some(3),
        };
        let uploader = Uploader::new(&transport, policy).with_sleeper(&sleeper);

        match uploader.upload("http://bucket", &path).unwrap_err() {
            UploadError::Exhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, ApiError::Status { status: 503, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*sleeper.delays.borrow(), vec![Duration::from_millis(10); 2]);
    }

    #[test]
    fn missing_file_fails_before_any_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FlakyTransport::failing(0);
        let uploader = Uploader::new(&transport, RetryPolicy::default())
            .with_sleeper(RecordingSleeper::default());

        let err = uploader
            .upload("http://bucket", &dir.path().join("gone.txt"))
            .unwrap_err();
        assert!(matches!(err, UploadError::Metadata { .. }));
        assert_eq!(transport.calls.get(), 0);
    }

    #[test]
    fn observer_sees_each_attempt_and_all_bytes() {
        let (_dir, path) = sample_file(&[7u8; 4096]);
        let transport = FlakyTransport::failing(1);
        let observer = Arc::new(RecordingObserver::default());
        let uploader = Uploader::new(&transport, RetryPolicy::default())
            .with_sleeper(RecordingSleeper::default())
            .with_observer(observer.clone());

        uploader.upload("http://bucket", &path).unwrap();

        assert_eq!(
            *observer.events.lock().unwrap(),
            vec!["start 4096", "end false", "start 4096", "end true"]
        );
        assert_eq!(*observer.bytes.lock().unwrap(), 4096);
    }

    #[test]
    fn progress_reader_reports_every_chunk() {
        let observer = Arc::new(RecordingObserver::default());
        let mut reader = ProgressReader::new(Cursor::new(vec![1u8; 10_000]), observer.clone());
        let mut buf = [0u8; 3000];
        let mut seen = 0;
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            seen += n;
        }
        assert_eq!(seen, 10_000);
        assert_eq!(*observer.bytes.lock().unwrap(), 10_000);
    }

    #[test]
    fn classify_maps_interrupts_to_cancelled() {
        let ok: AttemptOutcome<u8> = AttemptOutcome::classify(Ok(1));
        assert!(matches!(ok, AttemptOutcome::Success(1)));

        let cancelled: AttemptOutcome<u8> = AttemptOutcome::classify(Err(ApiError::Io(
            io::Error::new(io::ErrorKind::Interrupted, "ctrl-c"),
        )));
        assert!(matches!(cancelled, AttemptOutcome::Cancelled));

        let retry: AttemptOutcome<u8> = AttemptOutcome::classify(Err(ApiError::Status {
            status: 500,
            body: String::new(),
        }));
        assert!(matches!(retry, AttemptOutcome::Retryable(_)));
    }
}

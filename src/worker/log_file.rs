//! Live tailing of job log files.
//!
//! A [`LogFile`] turns a file on disk into a live sequence of lines: first
//! everything already present, then each newly appended line as filesystem
//! modify events arrive. Every follow is fully independent, with its own
//! file handle and its own watch, so concurrent followers of the same file
//! never interfere.

use std::path::PathBuf;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Lines a follower may buffer before the follow loop applies backpressure.
const FOLLOW_BUFFER: usize = 64;

pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Follow the file as a live sequence of complete lines.
    ///
    /// The returned receiver yields every line already present in the file
    /// (trailing newline stripped), then each subsequently appended line as
    /// write events arrive. Content after the last newline stays buffered
    /// until a later write completes it.
    ///
    /// The sequence ends when `stop` is cancelled, the watch fails, an
    /// unrecoverable read error occurs, or the receiver is dropped. Lines
    /// already on disk when `stop` fires are still delivered before the
    /// channel closes. Ending the sequence releases the file handle and
    /// the watch.
    ///
    /// # Errors
    ///
    /// Fails immediately if the file cannot be opened or the watch cannot
    /// be registered.
    pub async fn follow(&self, stop: CancellationToken) -> Result<mpsc::Receiver<String>> {
        let file = File::open(&self.path).await?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            let _ = event_tx.send(event);
        })?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        let (line_tx, line_rx) = mpsc::channel(FOLLOW_BUFFER);
        tokio::spawn(follow_loop(
            self.path.clone(),
            file,
            watcher,
            event_rx,
            line_tx,
            stop,
        ));

        Ok(line_rx)
    }
}

async fn follow_loop(
    path: PathBuf,
    file: File,
    watcher: RecommendedWatcher,
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    lines: mpsc::Sender<String>,
    stop: CancellationToken,
) {
    // Dropping the watcher releases the underlying watch, so it must live
    // for the whole loop.
    let _watcher = watcher;
    let mut reader = BufReader::new(file);
    let mut partial = String::new();

    // Catch up on everything already present in the file.
    if !drain(&mut reader, &mut partial, &lines).await {
        return;
    }

    loop {
        tokio::select! {
            _ = stop.cancelled() => {
                // Deliver lines already on disk before closing.
                drain(&mut reader, &mut partial, &lines).await;
                return;
            }
            _ = lines.closed() => return,
            event = events.recv() => match event {
                Some(Ok(event)) if event.kind.is_modify() => {
                    if !drain(&mut reader, &mut partial, &lines).await {
                        return;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(path = %path.display(), error = %e, "log watch failed");
                    return;
                }
                None => return,
            },
        }
    }
}

/// Read and emit every complete line currently available. Returns false if
/// the follower is gone or a read failed, both of which end the follow.
async fn drain(
    reader: &mut BufReader<File>,
    partial: &mut String,
    lines: &mpsc::Sender<String>,
) -> bool {
    loop {
        match next_line(reader, partial).await {
            Ok(Some(line)) => {
                if lines.send(line).await.is_err() {
                    return false;
                }
            }
            Ok(None) => return true,
            Err(e) => {
                tracing::error!(error = %e, "error reading log file");
                return false;
            }
        }
    }
}

/// Next complete line, with its trailing newline stripped.
///
/// Content after the last newline stays buffered in `partial` until a later
/// write completes the line.
async fn next_line(
    reader: &mut BufReader<File>,
    partial: &mut String,
) -> std::io::Result<Option<String>> {
    loop {
        let mut chunk = String::new();
        if reader.read_line(&mut chunk).await? == 0 {
            return Ok(None);
        }

        partial.push_str(&chunk);
        if partial.ends_with('\n') {
            partial.pop();
            return Ok(Some(std::mem::take(partial)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;
    use tokio::time::{timeout, Duration};

    async fn recv_line(rx: &mut mpsc::Receiver<String>) -> Option<String> {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for log line")
    }

    fn append(path: &Path, content: &str) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    #[tokio::test]
    async fn test_follow_reads_initial_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        std::fs::write(&path, "first\nsecond\n").unwrap();

        let stop = CancellationToken::new();
        let mut rx = LogFile::new(&path).follow(stop).await.unwrap();

        assert_eq!(recv_line(&mut rx).await.as_deref(), Some("first"));
        assert_eq!(recv_line(&mut rx).await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_follow_streams_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        std::fs::write(&path, "initial\n").unwrap();

        let stop = CancellationToken::new();
        let mut rx = LogFile::new(&path).follow(stop).await.unwrap();
        assert_eq!(recv_line(&mut rx).await.as_deref(), Some("initial"));

        for i in 0..10 {
            append(&path, &format!("delayed {i}\n"));
            assert_eq!(
                recv_line(&mut rx).await,
                Some(format!("delayed {i}"))
            );
        }
    }

    #[tokio::test]
    async fn test_partial_line_buffered_until_completed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        std::fs::write(&path, "").unwrap();

        let stop = CancellationToken::new();
        let mut rx = LogFile::new(&path).follow(stop).await.unwrap();

        append(&path, "partial");
        // No complete line yet.
        assert!(
            timeout(Duration::from_millis(300), rx.recv()).await.is_err(),
            "partial line must not be emitted"
        );

        append(&path, " now complete\n");
        assert_eq!(
            recv_line(&mut rx).await.as_deref(),
            Some("partial now complete")
        );
    }

    #[tokio::test]
    async fn test_stop_ends_sequence_after_draining() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        std::fs::write(&path, "one\ntwo\n").unwrap();

        let stop = CancellationToken::new();
        let mut rx = LogFile::new(&path).follow(stop.clone()).await.unwrap();

        stop.cancel();
        // Cancelling twice is a no-op.
        stop.cancel();

        assert_eq!(recv_line(&mut rx).await.as_deref(), Some("one"));
        assert_eq!(recv_line(&mut rx).await.as_deref(), Some("two"));
        assert_eq!(recv_line(&mut rx).await, None);
    }

    #[tokio::test]
    async fn test_follow_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.log");

        let result = LogFile::new(&path).follow(CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_followers_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        std::fs::write(&path, "shared\n").unwrap();

        let log_file = LogFile::new(&path);
        let stop_a = CancellationToken::new();
        let stop_b = CancellationToken::new();
        let mut rx_a = log_file.follow(stop_a.clone()).await.unwrap();
        let mut rx_b = log_file.follow(stop_b).await.unwrap();

        assert_eq!(recv_line(&mut rx_a).await.as_deref(), Some("shared"));
        assert_eq!(recv_line(&mut rx_b).await.as_deref(), Some("shared"));

        // Cancelling one follower leaves the other alive.
        stop_a.cancel();
        assert_eq!(recv_line(&mut rx_a).await, None);

        append(&path, "more\n");
        assert_eq!(recv_line(&mut rx_b).await.as_deref(), Some("more"));
    }
}

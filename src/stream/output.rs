//! Reading transcoder diagnostics.
//!
//! ffmpeg rewrites its progress line with `\r`, so a piped stderr is one long
//! line as far as `lines()` is concerned. Records here end at either `\n` or
//! `\r`, and a record that never ends is cut at [`MAX_RECORD_LEN`].

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, trace, warn};

/// Longest record kept before it is emitted as is.
pub const MAX_RECORD_LEN: usize = 16 * 1024;

/// Yields text records delimited by `\n` or `\r` from an async stream.
pub struct OutputRecordReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    scratch: [u8; 4096],
}

impl<R> OutputRecordReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            scratch: [0u8; 4096],
        }
    }

    /// Next non-empty record, or `None` at end of stream. Invalid UTF-8 is
    /// replaced rather than treated as an error.
    pub async fn next_record(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(end) = self.pending.iter().position(|&b| is_delimiter(b)) {
                let record = self.take_record(end);
                if record.is_empty() {
                    continue;
                }
                return Ok(Some(record));
            }

            if self.pending.len() >= MAX_RECORD_LEN {
                return Ok(Some(self.take_record(MAX_RECORD_LEN)));
            }

            let n = self.reader.read(&mut self.scratch).await?;
            if n == 0 {
                let record = self.take_record(self.pending.len());
                return Ok((!record.is_empty()).then_some(record));
            }
            self.pending.extend_from_slice(&self.scratch[..n]);
        }
    }

    fn take_record(&mut self, end: usize) -> String {
        let bytes = self.pending.drain(..end).collect::<Vec<_>>();
        let delimiters = self
            .pending
            .iter()
            .take_while(|&&b| is_delimiter(b))
            .count();
        self.pending.drain(..delimiters);

        String::from_utf8_lossy(&bytes).trim().to_string()
    }
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'\n' | b'\r')
}

fn is_error_record(record: &str) -> bool {
    record.contains("Error") || record.contains("error") || record.contains("failed")
}

/// What a transcoder wrote before its output closed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutputSummary {
    pub records: usize,
    pub errors: usize,
}

/// Logs every record of `output` as it arrives: errors at warn, progress at
/// trace. Runs until the stream closes.
pub async fn log_transcoder_output<R>(output: R, playlist: &str) -> OutputSummary
where
    R: AsyncRead + Unpin,
{
    let mut reader = OutputRecordReader::new(output);
    let mut summary = OutputSummary::default();

    loop {
        match reader.next_record().await {
            Ok(Some(record)) => {
                summary.records += 1;
                if is_error_record(&record) {
                    summary.errors += 1;
                    warn!(%playlist, "ffmpeg: {record}");
                } else {
                    trace!(%playlist, "ffmpeg: {record}");
                }
            }
            Ok(None) => break,
            Err(error) => {
                debug!(%playlist, ?error, "Failed to read ffmpeg output");
                break;
            }
        }
    }

    debug!(%playlist, records = summary.records, errors = summary.errors, "ffmpeg output closed");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn records_of(input: &'static [u8]) -> Vec<String> {
        let (mut tx, rx) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let _ = tx.write_all(input).await;
        });

        let mut reader = OutputRecordReader::new(rx);
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().await.unwrap() {
            records.push(record);
        }
        records
    }

    #[tokio::test]
    async fn test_splits_on_cr_and_lf() {
        let records = records_of(b"one\rtwo\nthree\r\n\r\nfour").await;
        assert_eq!(records, ["one", "two", "three", "four"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_end_stream() {
        let records = records_of(b"frame=1\r\xff\xfe bad\rConnection Error: timed out\r").await;
        assert_eq!(records.len(), 3);
        assert!(records[1].ends_with("bad"));
        assert_eq!(records[2], "Connection Error: timed out");
    }

    #[tokio::test]
    async fn test_long_record_is_cut() {
        let (mut tx, rx) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let _ = tx.write_all(&vec![b'x'; MAX_RECORD_LEN * 2 + 10]).await;
        });

        let mut reader = OutputRecordReader::new(rx);
        let mut lengths = Vec::new();
        while let Some(record) = reader.next_record().await.unwrap() {
            lengths.push(record.len());
        }
        assert_eq!(lengths, [MAX_RECORD_LEN, MAX_RECORD_LEN, 10]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_logs_carriage_return_progress_while_running() {
        use std::process::Stdio;
        use tokio::process::Command;

        // writes progress the way ffmpeg does, then keeps running
        let script = r#"i=0
while [ $i -lt 2000 ]; do printf 'frame=%d fps=25 q=28.0 size=1024kB time=00:00:01.00\r' $i; i=$((i+1)); done
printf 'Connection Error: timed out\r'
exec sleep 30"#;
        let mut child = Command::new("sh")
            .args(["-c", script])
            .stderr(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();

        let mut reader = OutputRecordReader::new(stdout);
        let mut records = Vec::new();
        while records.len() < 2001 {
            let record = tokio::time::timeout(
                std::time::Duration::from_secs(10),
                reader.next_record(),
            )
            .await
            .unwrap()
            .unwrap()
            .unwrap();
            assert!(record.len() < 100);
            records.push(record);
        }
        assert!(records[0].starts_with("frame=0 "));
        assert_eq!(records[2000], "Connection Error: timed out");

        // the process is still running at this point
        assert!(child.try_wait().unwrap().is_none());
        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_log_transcoder_output_counts_errors() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let _ = tx
                .write_all(b"frame=1\rframe=2\r\xffframe=3\r[rtsp] Connection Error: timed out\r")
                .await;
        });

        let summary = log_transcoder_output(rx, "cam1.m3u8").await;
        assert_eq!(
            summary,
            OutputSummary {
                records: 4,
                errors: 1
            }
        );
    }
}

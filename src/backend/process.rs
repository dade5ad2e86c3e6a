//! Child process execution with line-by-line log forwarding

use crate::backend::{BackendError, CommandOutput, LogSink, LogStream};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Run a command to completion, capturing stdout and stderr
///
/// Each line is forwarded to `sink` as it arrives. A non-zero exit is
/// returned as [`BackendError::NonZeroExit`] carrying the captured output.
pub async fn run_command(
    mut command: Command,
    program: &str,
    limit: Option<Duration>,
    sink: Option<&dyn LogSink>,
) -> Result<CommandOutput, BackendError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Spawning {:?}", command.as_std());

    let child = command.spawn().map_err(|source| BackendError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let output = match limit {
        Some(limit) => timeout(limit, collect(child, sink))
            .await
            .map_err(|_| BackendError::Timeout(limit))??,
        None => collect(child, sink).await?,
    };

    if !output.is_success() {
        warn!("{} exited with code {}", program, output.exit_code);
        return Err(BackendError::NonZeroExit {
            program: program.to_string(),
            code: output.exit_code,
            output,
        });
    }

    Ok(output)
}

async fn collect(
    mut child: tokio::process::Child,
    sink: Option<&dyn LogSink>,
) -> Result<CommandOutput, BackendError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BackendError::Internal("stdout was not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| BackendError::Internal("stderr was not captured".to_string()))?;

    let mut out_reader = BufReader::new(stdout);
    let mut err_reader = BufReader::new(stderr);
    let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
    let mut output = CommandOutput::default();
    let (mut out_done, mut err_done) = (false, false);

    while !(out_done && err_done) {
        tokio::select! {
            line = read_line(&mut out_reader, &mut out_buf), if !out_done => match line? {
                Some(line) => {
                    if let Some(sink) = sink {
                        sink.on_line(LogStream::Stdout, &line);
                    }
                    output.stdout.push_str(&line);
                    output.stdout.push('\n');
                }
                None => out_done = true,
            },
            line = read_line(&mut err_reader, &mut err_buf), if !err_done => match line? {
                Some(line) => {
                    if let Some(sink) = sink {
                        sink.on_line(LogStream::Stderr, &line);
                    }
                    output.stderr.push_str(&line);
                    output.stderr.push('\n');
                }
                None => err_done = true,
            },
        }
    }

    let status = child.wait().await?;
    output.exit_code = status.code().unwrap_or(-1);
    Ok(output)
}

/// Read one line, decoding invalid UTF-8 lossily
///
/// Bytes read before a cancelled call stay in `buf` and are completed by the
/// next call, so this is safe to race in `select!`.
async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 && buf.is_empty() {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    Ok(Some(line))
}

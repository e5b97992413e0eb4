//! Line-delimited JSON transport over a reader/writer pair (stdin/stdout in the binary).

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::gateway::dispatch::Dispatcher;

/// Parsed messages waiting for dispatch. Reading pauses only when this many are queued.
const INBOX_CAPACITY: usize = 256;

/// Read requests from `reader` and write one response line per answered request to `writer`.
/// A reader task keeps parsing input while a slow tool call is being dispatched; dispatch
/// itself is sequential in arrival order. Returns when the input ends and the backlog is done.
pub async fn run_stdio<R, W>(reader: R, mut writer: W, dispatcher: Dispatcher) -> std::io::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::channel::<Value>(INBOX_CAPACITY);
    let reader_task = tokio::spawn(read_messages(reader, tx));

    while let Some(msg) = rx.recv().await {
        let Some(resp) = dispatcher.handle(&msg).await else {
            continue;
        };
        let mut out = serde_json::to_string(&resp).unwrap_or_default();
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }

    match reader_task.await {
        Ok(res) => res,
        Err(e) => Err(std::io::Error::other(e)),
    }
}

/// Split input on `\n` (tolerating `\r\n`); skip blank, non-UTF-8 and non-JSON lines.
async fn read_messages<R>(reader: R, tx: mpsc::Sender<Value>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let Some(msg) = parse_line(&buf) else {
            continue;
        };
        if tx.send(msg).await.is_err() {
            return Ok(());
        }
    }
}

fn parse_line(raw: &[u8]) -> Option<Value> {
    let line = std::str::from_utf8(raw).ok()?;
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(v) => Some(v),
        Err(e) => {
            log::debug!("ignoring unparseable stdio line: {}", e);
            None
        }
    }
}

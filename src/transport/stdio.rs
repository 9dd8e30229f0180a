//! Point-to-point line-delimited transport
//!
//! Each message is one line of UTF-8 JSON terminated by `\n`. By default the transport
//! reads stdin and writes stdout, but any async reader/writer pair can be supplied,
//! which is how the tests drive it.

use async_trait::async_trait;
use tokio::{
    io::{
        stdin, stdout, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stdin,
        Stdout,
    },
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{Lifecycle, Transport, TransportKind};
use crate::errors::TransportError;

const TRANSPORT: &str = "stdio";

pub struct StdioTransport<R = Stdin, W = Stdout> {
    reader: Mutex<BufReader<R>>,
    writer: Mutex<W>,
    lifecycle: Lifecycle,
}

impl StdioTransport<Stdin, Stdout> {
    pub fn new() -> Self {
        Self::with_io(stdin(), stdout())
    }
}

impl Default for StdioTransport<Stdin, Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn with_io(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(writer),
            lifecycle: Lifecycle::new(TRANSPORT),
        }
    }

    fn io_error(source: std::io::Error) -> TransportError {
        TransportError::Io {
            transport: TRANSPORT,
            source,
        }
    }
}

#[async_trait]
impl<R, W> Transport for StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn start(&self, ctx: CancellationToken) -> Result<(), TransportError> {
        self.lifecycle.begin_start(&ctx)?;
        info!("stdio transport started");
        Ok(())
    }

    async fn read_message(&self) -> Result<Vec<u8>, TransportError> {
        self.lifecycle.ensure_open()?;

        let mut reader = tokio::select! {
            guard = self.reader.lock() => guard,
            err = self.lifecycle.interrupted() => return Err(err),
        };

        loop {
            let mut line = Vec::new();
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut line) => read,
                err = self.lifecycle.interrupted() => return Err(err),
            };

            match read {
                Ok(0) => {
                    return Err(TransportError::EndOfStream {
                        transport: TRANSPORT,
                    })
                }
                Ok(_) => {
                    while matches!(line.last(), Some(b'\n' | b'\r')) {
                        line.pop();
                    }
                    // blank lines carry no message
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }

                    debug!(message_length = line.len(), "received message via stdio");
                    return Ok(line);
                }
                Err(source) => {
                    error!(error = %source, "failed to read from stdin");
                    return Err(Self::io_error(source));
                }
            }
        }
    }

    async fn write_message(&self, message: &[u8]) -> Result<(), TransportError> {
        self.lifecycle.ensure_open()?;

        let mut writer = self.writer.lock().await;
        writer.write_all(message).await.map_err(|err| {
            error!(error = %err, "failed to write message to stdout");
            Self::io_error(err)
        })?;
        // payload and delimiter succeed or fail together from the caller's view
        writer.write_all(b"\n").await.map_err(|err| {
            error!(error = %err, "failed to write message delimiter to stdout");
            Self::io_error(err)
        })?;
        writer.flush().await.map_err(Self::io_error)?;

        debug!(message_length = message.len(), "sent message via stdio");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.lifecycle.begin_close() {
            info!("stdio transport closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    fn transport_type(&self) -> TransportKind {
        TransportKind::Stdio
    }
}

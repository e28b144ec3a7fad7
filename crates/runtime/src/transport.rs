//! Length-prefixed JSON transport over the bridge's stdio pipes.
//!
//! Frame format: a 4-byte little-endian length followed by that many bytes
//! of UTF-8 JSON. Both sides of the pipe use the same framing.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};

/// Bidirectional transport over a write half (bridge stdin) and a read
/// half (bridge stdout).
///
/// Splitting with [`into_parts`](Self::into_parts) yields an owned sender
/// for the writer task and a receiver whose [`run`](PipeReceiver::run)
/// loop decodes inbound frames onto the message channel handed out by
/// [`new`](Self::new).
pub struct PipeTransport<W, R> {
    writer: W,
    reader: R,
    inbound_tx: mpsc::UnboundedSender<Value>,
}

impl<W, R> PipeTransport<W, R>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Creates a transport and the channel inbound messages arrive on.
    pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                writer,
                reader,
                inbound_tx,
            },
            inbound_rx,
        )
    }

    /// Splits into the sender and receiver halves.
    pub fn into_parts(self) -> (PipeSender<W>, PipeReceiver<R>) {
        (
            PipeSender {
                writer: self.writer,
            },
            PipeReceiver {
                reader: self.reader,
                inbound_tx: self.inbound_tx,
            },
        )
    }
}

/// Outbound half of the transport.
pub struct PipeSender<W> {
    writer: W,
}

impl<W> PipeSender<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Writes one framed message.
    pub async fn send(&mut self, message: Value) -> Result<()> {
        let payload = serde_json::to_vec(&message)?;
        let length = u32::try_from(payload.len())
            .map_err(|_| Error::TransportError("outbound frame exceeds u32 length".to_string()))?;

        self.writer
            .write_all(&length.to_le_bytes())
            .await
            .map_err(|e| Error::TransportError(format!("Failed to write length prefix: {e}")))?;
        self.writer
            .write_all(&payload)
            .await
            .map_err(|e| Error::TransportError(format!("Failed to write frame: {e}")))?;
        self.writer
            .flush()
            .await
            .map_err(|e| Error::TransportError(format!("Failed to flush frame: {e}")))?;

        trace!(target = "watify.transport", bytes = payload.len(), "frame sent");
        Ok(())
    }
}

/// Inbound half of the transport.
pub struct PipeReceiver<R> {
    reader: R,
    inbound_tx: mpsc::UnboundedSender<Value>,
}

impl<R> PipeReceiver<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Read loop: decodes frames until EOF or until the consumer drops
    /// the inbound channel (normal shutdown).
    pub async fn run(mut self) -> Result<()> {
        loop {
            let mut len_buf = [0u8; 4];
            match self.reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Clean EOF between frames: the bridge exited.
                    return Ok(());
                }
                Err(e) => {
                    return Err(Error::TransportError(format!(
                        "Failed to read length prefix: {e}"
                    )));
                }
            }

            let length = u32::from_le_bytes(len_buf) as usize;
            let mut payload = vec![0u8; length];
            self.reader
                .read_exact(&mut payload)
                .await
                .map_err(|e| Error::TransportError(format!("Failed to read frame body: {e}")))?;

            let message: Value = serde_json::from_slice(&payload)?;
            trace!(target = "watify.transport", bytes = length, "frame received");

            if self.inbound_tx.send(message).is_err() {
                // Consumer is gone; stop reading.
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    #[tokio::test]
    async fn sender_frames_messages() {
        let (stdin_read, stdin_write) = duplex(1024);
        let (stdout_read, _stdout_write) = duplex(1024);

        let (transport, _rx) = PipeTransport::new(stdin_write, stdout_read);
        let (mut sender, _receiver) = transport.into_parts();

        let message = serde_json::json!({"id": 1, "method": "init", "params": {}});
        sender.send(message.clone()).await.unwrap();

        let (mut read_half, _write_half) = tokio::io::split(stdin_read);
        let mut len_buf = [0u8; 4];
        read_half.read_exact(&mut len_buf).await.unwrap();
        let length = u32::from_le_bytes(len_buf) as usize;

        let mut payload = vec![0u8; length];
        read_half.read_exact(&mut payload).await.unwrap();

        let received: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn receiver_preserves_message_order() {
        let (_stdin_read, stdin_write) = duplex(4096);
        let (stdout_read, mut stdout_write) = duplex(4096);

        let (transport, mut rx) = PipeTransport::new(stdin_write, stdout_read);
        let (_sender, receiver) = transport.into_parts();
        let read_task = tokio::spawn(receiver.run());

        let messages = vec![
            serde_json::json!({"event": "qr", "params": {"qr": "2@first"}}),
            serde_json::json!({"event": "authenticated"}),
            serde_json::json!({"id": 0, "result": null}),
        ];

        for msg in &messages {
            let payload = serde_json::to_vec(msg).unwrap();
            let length = payload.len() as u32;
            stdout_write.write_all(&length.to_le_bytes()).await.unwrap();
            stdout_write.write_all(&payload).await.unwrap();
        }
        stdout_write.flush().await.unwrap();

        for expected in &messages {
            let received = rx.recv().await.unwrap();
            assert_eq!(&received, expected);
        }

        drop(stdout_write);
        let result = read_task.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn truncated_length_prefix_is_an_error() {
        let (_stdin_read, stdin_write) = duplex(1024);
        let (stdout_read, mut stdout_write) = duplex(1024);

        let (transport, _rx) = PipeTransport::new(stdin_write, stdout_read);
        let (_sender, receiver) = transport.into_parts();

        stdout_write.write_all(&[0x01, 0x02]).await.unwrap();
        stdout_write.flush().await.unwrap();
        drop(stdout_write);

        let result = receiver.run().await;
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read length prefix")
        );
    }

    #[tokio::test]
    async fn eof_between_frames_is_clean_shutdown() {
        let (_stdin_read, stdin_write) = duplex(1024);
        let (stdout_read, stdout_write) = duplex(1024);

        let (transport, _rx) = PipeTransport::new(stdin_write, stdout_read);
        let (_sender, receiver) = transport.into_parts();

        drop(stdout_write);

        assert!(receiver.run().await.is_ok());
    }
}

//! Background I/O pump.
//!
//! ```text
//!            outbound queue                      socket
//! session ──────────────────→ writer task ──────────────→ server
//! session ←────────────────── reader task ←────────────── server
//!            inbound queue
//! ```
//!
//! Each queue is bounded and has exactly one producer and one consumer.
//! A single [`CancellationToken`] is the shutdown signal for both tasks.
//! Either task failing records the reason, cancels the token (stopping
//! its sibling), and leaves the session to observe a closed connection on
//! its next call.
//!
//! On close the outbound sender is dropped first, so the writer drains
//! queued frames for up to [`CLOSE_DRAIN_TIMEOUT`]. After that the token is
//! cancelled, which also abandons a write stuck on a peer that stopped
//! reading. Both tasks hand their stream half back through their
//! `JoinHandle`; the halves are rejoined and the socket is shut down only
//! after both tasks have finished.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use canal_protocol::{read_frame, write_frame, Packet, ProtocolError};
use tokio::io::{
    AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf,
    WriteHalf,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{Connection, TransportError};

type Inbound = Result<Packet, ProtocolError>;

/// How long `close` lets the writer drain queued frames before cancelling.
pub const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A connection whose socket I/O runs on two background tasks.
pub struct PumpedConnection<S> {
    /// `None` once closing has begun.
    outbound: Option<mpsc::Sender<Packet>>,
    inbound: mpsc::Receiver<Inbound>,
    shutdown: CancellationToken,
    /// First failure reported by either task.
    failure: Arc<OnceLock<String>>,
    reader: Option<JoinHandle<ReadHalf<S>>>,
    writer: Option<JoinHandle<WriteHalf<S>>>,
}

impl<S> PumpedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Splits `stream` and spawns the reader and writer tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(stream: S, queue_capacity: usize, max_frame_length: usize) -> Self {
        let capacity = queue_capacity.max(1);
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let shutdown = CancellationToken::new();
        let failure = Arc::new(OnceLock::new());

        let reader = tokio::spawn(run_reader(
            BufReader::new(read_half),
            inbound_tx,
            shutdown.clone(),
            Arc::clone(&failure),
            max_frame_length,
        ));
        let writer = tokio::spawn(run_writer(
            BufWriter::new(write_half),
            outbound_rx,
            shutdown.clone(),
            Arc::clone(&failure),
        ));

        tracing::debug!(capacity, "I/O pump started");

        Self {
            outbound: Some(outbound_tx),
            inbound: inbound_rx,
            shutdown,
            failure,
            reader: Some(reader),
            writer: Some(writer),
        }
    }

    fn closed_error(&self) -> TransportError {
        let reason = self
            .failure
            .get()
            .cloned()
            .unwrap_or_else(|| "I/O pump stopped".into());
        TransportError::ConnectionClosed(reason)
    }
}

impl<S> Connection for PumpedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(self.closed_error());
        }
        let Some(outbound) = &self.outbound else {
            return Err(self.closed_error());
        };
        if outbound.send(packet.clone()).await.is_err() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Packet, TransportError> {
        match self.inbound.recv().await {
            Some(Ok(packet)) => Ok(packet),
            Some(Err(e)) => Err(TransportError::ReceiveFailed(e)),
            None => Err(self.closed_error()),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let (Some(reader), Some(mut writer)) = (self.reader.take(), self.writer.take())
        else {
            return Ok(());
        };

        // Writer drains whatever is queued, then sees the channel close.
        self.outbound.take();
        // Unblocks a reader waiting for queue capacity.
        self.inbound.close();

        let drained = tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, &mut writer).await;
        self.shutdown.cancel();
        let write_half = match drained {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    timeout = ?CLOSE_DRAIN_TIMEOUT,
                    "outbound frames not drained in time, abandoning them"
                );
                writer.await
            }
        }
        .map_err(|e| {
            TransportError::ConnectionClosed(format!("writer task failed: {e}"))
        })?;
        let read_half = reader.await.map_err(|e| {
            TransportError::ConnectionClosed(format!("reader task failed: {e}"))
        })?;
        tracing::debug!("I/O pump stopped");

        let mut stream = read_half.unsplit(write_half);
        match stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {
                tracing::debug!(error = %e, "socket already disconnected");
                Ok(())
            }
            Err(e) => Err(TransportError::CloseFailed(e)),
        }
    }

    fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

async fn run_reader<S>(
    mut reader: BufReader<ReadHalf<S>>,
    inbound: mpsc::Sender<Inbound>,
    shutdown: CancellationToken,
    failure: Arc<OnceLock<String>>,
    max_frame_length: usize,
) -> ReadHalf<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let result = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            result = read_frame(&mut reader, max_frame_length) => result,
        };

        let fatal = result.is_err();
        if let Err(e) = &result {
            tracing::warn!(error = %e, "pump reader stopped");
            let _ = failure.set(format!("reader failed: {e}"));
            shutdown.cancel();
        }
        if inbound.send(result).await.is_err() || fatal {
            break;
        }
    }
    reader.into_inner()
}

async fn run_writer<S>(
    mut writer: BufWriter<WriteHalf<S>>,
    mut outbound: mpsc::Receiver<Packet>,
    shutdown: CancellationToken,
    failure: Arc<OnceLock<String>>,
) -> WriteHalf<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let packet = tokio::select! {
            biased;
            packet = outbound.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
            () = shutdown.cancelled() => break,
        };

        let written = tokio::select! {
            biased;
            result = write_frame(&mut writer, &packet) => result,
            () = shutdown.cancelled() => {
                tracing::debug!("pending write abandoned on shutdown");
                break;
            }
        };
        if let Err(e) = written {
            tracing::warn!(error = %e, "pump writer stopped");
            let _ = failure.set(format!("writer failed: {e}"));
            shutdown.cancel();
            break;
        }
    }
    writer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use canal_protocol::{
        Ack, ClientAck, Messages, PacketType, DEFAULT_MAX_FRAME_LENGTH,
    };
    use tokio::io::DuplexStream;

    fn ack(message: &str) -> Packet {
        Packet::wrap(
            PacketType::Ack,
            &Ack {
                error_code: None,
                error_message: message.into(),
            },
        )
    }

    fn client_ack(batch_id: i64) -> Packet {
        Packet::wrap(
            PacketType::ClientAck,
            &ClientAck {
                destination: "example".into(),
                client_id: "1001".into(),
                batch_id,
            },
        )
    }

    fn pump() -> (PumpedConnection<DuplexStream>, DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        (
            PumpedConnection::spawn(client, 4, DEFAULT_MAX_FRAME_LENGTH),
            server,
        )
    }

    #[tokio::test]
    async fn test_frames_flow_in_both_directions_in_order() {
        let (mut conn, mut server) = pump();

        for id in 1..=3 {
            conn.send(&client_ack(id)).await.unwrap();
        }
        for id in 1..=3 {
            let packet = read_frame(&mut server, DEFAULT_MAX_FRAME_LENGTH)
                .await
                .unwrap();
            assert_eq!(packet, client_ack(id));
        }

        write_frame(&mut server, &ack("a")).await.unwrap();
        write_frame(&mut server, &ack("b")).await.unwrap();
        assert_eq!(conn.recv().await.unwrap(), ack("a"));
        assert_eq!(conn.recv().await.unwrap(), ack("b"));

        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_flushes_queued_frames_before_shutdown() {
        let (mut conn, mut server) = pump();

        conn.send(&client_ack(9)).await.unwrap();
        conn.close().await.unwrap();

        let packet = read_frame(&mut server, DEFAULT_MAX_FRAME_LENGTH)
            .await
            .unwrap();
        assert_eq!(packet, client_ack(9));
        // Socket was shut down after the flush.
        let next = read_frame(&mut server, DEFAULT_MAX_FRAME_LENGTH).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_joins_tasks() {
        let (mut conn, _server) = pump();

        conn.close().await.unwrap();
        assert!(conn.is_closed());
        // Second close must neither fail nor block.
        tokio::time::timeout(std::time::Duration::from_secs(1), conn.close())
            .await
            .expect("second close should not block")
            .unwrap();
    }

    #[tokio::test]
    async fn test_reader_failure_stops_the_pump() {
        let (mut conn, server) = pump();
        drop(server);

        let err = conn.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::ReceiveFailed(_)));

        // The sibling writer was cancelled too; sends now fail.
        let err = conn.send(&client_ack(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(reason)
            if reason.contains("reader failed")));

        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_does_not_hang_on_peer_that_never_reads() {
        let (client, _server) = tokio::io::duplex(64);
        let mut conn = PumpedConnection::spawn(client, 4, DEFAULT_MAX_FRAME_LENGTH);
        let large = Packet::wrap(
            PacketType::Messages,
            &Messages {
                batch_id: 1,
                messages: vec![vec![0u8; 4096]],
            },
        );
        conn.send(&large).await.unwrap();

        tokio::time::timeout(
            CLOSE_DRAIN_TIMEOUT + Duration::from_secs(2),
            conn.close(),
        )
        .await
        .expect("close must give up on a stuck write")
        .unwrap();
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut conn, _server) = pump();
        conn.close().await.unwrap();
        let err = conn.send(&client_ack(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
    }
}

//! Direct, half-duplex framed connection.

use canal_protocol::{read_frame, write_frame, Packet};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};

use crate::{Connection, TransportError};

/// A connection that reads and writes frames on the caller's task.
///
/// Generic over the stream so tests can run it over
/// [`tokio::io::duplex`]; [`dial`](crate::dial) uses a `TcpStream`.
pub struct FramedConnection<S> {
    /// `None` once closed.
    stream: Option<BufStream<S>>,
    max_frame_length: usize,
}

impl<S> FramedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an already connected stream.
    pub fn new(stream: S, max_frame_length: usize) -> Self {
        Self {
            stream: Some(BufStream::new(stream)),
            max_frame_length,
        }
    }

    fn stream(&mut self) -> Result<&mut BufStream<S>, TransportError> {
        self.stream.as_mut().ok_or_else(|| {
            TransportError::ConnectionClosed("connection already closed".into())
        })
    }
}

impl<S> Connection for FramedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let stream = self.stream()?;
        write_frame(stream, packet)
            .await
            .map_err(TransportError::SendFailed)
    }

    async fn recv(&mut self) -> Result<Packet, TransportError> {
        let max = self.max_frame_length;
        let stream = self.stream()?;
        read_frame(stream, max)
            .await
            .map_err(TransportError::ReceiveFailed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        match stream.shutdown().await {
            Ok(()) => Ok(()),
            // The peer hung up first; the socket is as closed as it gets.
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {
                tracing::debug!(error = %e, "socket already disconnected");
                Ok(())
            }
            Err(e) => Err(TransportError::CloseFailed(e)),
        }
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canal_protocol::{
        encode_frame, Ack, FrameError, PacketType, ProtocolError,
        DEFAULT_MAX_FRAME_LENGTH,
    };
    use tokio::io::AsyncReadExt;

    fn ack(message: &str) -> Packet {
        Packet::wrap(
            PacketType::Ack,
            &Ack {
                error_code: None,
                error_message: message.into(),
            },
        )
    }

    #[tokio::test]
    async fn test_send_writes_one_frame() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut conn = FramedConnection::new(client, DEFAULT_MAX_FRAME_LENGTH);
        let packet = ack("hello");

        conn.send(&packet).await.unwrap();

        let expected = encode_frame(&packet).unwrap();
        let mut buf = vec![0u8; expected.len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, expected);
    }

    #[tokio::test]
    async fn test_recv_reads_frames_in_order() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut conn = FramedConnection::new(client, DEFAULT_MAX_FRAME_LENGTH);

        server
            .write_all(&encode_frame(&ack("one")).unwrap())
            .await
            .unwrap();
        server
            .write_all(&encode_frame(&ack("two")).unwrap())
            .await
            .unwrap();

        assert_eq!(conn.recv().await.unwrap(), ack("one"));
        assert_eq!(conn.recv().await.unwrap(), ack("two"));
    }

    #[tokio::test]
    async fn test_recv_surfaces_frame_errors() {
        let (client, server) = tokio::io::duplex(1024);
        let mut conn = FramedConnection::new(client, DEFAULT_MAX_FRAME_LENGTH);
        drop(server);

        let err = conn.recv().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::ReceiveFailed(ProtocolError::Frame(
                FrameError::Closed
            ))
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = tokio::io::duplex(1024);
        let mut conn = FramedConnection::new(client, DEFAULT_MAX_FRAME_LENGTH);

        conn.close().await.unwrap();
        assert!(conn.is_closed());
        conn.close().await.unwrap();

        let err = conn.send(&ack("late")).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
    }
}

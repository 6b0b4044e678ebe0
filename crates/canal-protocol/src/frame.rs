//! Length-prefixed framing.
//!
//! Every packet on the stream is laid out as:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────┐
//! │ body length (u32 BE) │ body (encoded Packet)        │
//! └──────────────────────┴──────────────────────────────┘
//! ```
//!
//! Reads are exact: a frame is either returned whole or the read fails.
//! A declared length larger than the caller's cap is rejected before any
//! body buffer is allocated, so a corrupted or hostile peer can't make the
//! client allocate gigabytes from a four-byte header.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{decode_message, FrameError, Packet, ProtocolError, encode_message};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default cap on an inbound body (16 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Encodes a packet into a complete frame (prefix + body).
///
/// # Errors
/// Returns [`FrameError::TooLarge`] if the encoded body doesn't fit in the
/// 32-bit length prefix.
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, FrameError> {
    let body = encode_message(packet);
    let length = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge {
        length: body.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + body.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes the first frame in `data`.
///
/// Returns the packet and the number of bytes consumed, so callers
/// holding several frames in one buffer can advance past it.
///
/// # Errors
/// - [`FrameError::Truncated`] if `data` ends before the header or the
///   declared body is complete.
/// - [`FrameError::TooLarge`] if the declared length exceeds `max_length`.
/// - [`ProtocolError::Decode`] if the body isn't a valid packet.
pub fn decode_frame(
    data: &[u8],
    max_length: usize,
) -> Result<(Packet, usize), ProtocolError> {
    let Some(header) = data.get(..LENGTH_PREFIX_LEN) else {
        return Err(FrameError::Truncated {
            expected: LENGTH_PREFIX_LEN,
            received: data.len(),
        }
        .into());
    };
    let length = body_length(header, max_length)?;

    let body = &data[LENGTH_PREFIX_LEN..];
    if body.len() < length {
        return Err(FrameError::Truncated {
            expected: length,
            received: body.len(),
        }
        .into());
    }

    let packet = decode_message(&body[..length])?;
    Ok((packet, LENGTH_PREFIX_LEN + length))
}

/// Reads exactly one frame from `reader` and decodes its packet.
///
/// # Errors
/// - [`FrameError::Closed`] if the stream ends before any header byte.
/// - [`FrameError::Truncated`] if it ends part-way through a frame.
/// - [`FrameError::TooLarge`] if the declared length exceeds `max_length`.
/// - [`FrameError::Io`] for any other read failure.
/// - [`ProtocolError::Decode`] if the body isn't a valid packet.
pub async fn read_frame<R>(
    reader: &mut R,
    max_length: usize,
) -> Result<Packet, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LENGTH_PREFIX_LEN];
    let received = read_full(reader, &mut header).await?;
    if received == 0 {
        return Err(FrameError::Closed.into());
    }
    if received < LENGTH_PREFIX_LEN {
        return Err(FrameError::Truncated {
            expected: LENGTH_PREFIX_LEN,
            received,
        }
        .into());
    }

    let length = body_length(&header, max_length)?;
    let mut body = vec![0u8; length];
    let received = read_full(reader, &mut body).await?;
    if received < length {
        return Err(FrameError::Truncated {
            expected: length,
            received,
        }
        .into());
    }

    decode_message(&body)
}

/// Writes one frame and flushes the writer.
///
/// # Errors
/// Returns [`FrameError::Io`] if the write or flush fails, or
/// [`FrameError::TooLarge`] if the body can't be length-prefixed.
pub async fn write_frame<W>(
    writer: &mut W,
    packet: &Packet,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(packet)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

fn body_length(header: &[u8], max_length: usize) -> Result<usize, FrameError> {
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    prefix.copy_from_slice(header);
    let length = u32::from_be_bytes(prefix) as usize;
    if length > max_length {
        return Err(FrameError::TooLarge {
            length,
            max: max_length,
        });
    }
    Ok(length)
}

/// Fills `buf` unless the stream ends first; returns how many bytes arrived.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ack, Handshake, PacketType};

    fn ack_packet(code: i32, message: &str) -> Packet {
        Packet::wrap(
            PacketType::Ack,
            &Ack {
                error_code: Some(code),
                error_message: message.into(),
            },
        )
    }

    #[test]
    fn test_encode_frame_prefixes_big_endian_length() {
        let packet = ack_packet(1, "bad credentials");
        let frame = encode_frame(&packet).unwrap();
        let body_len = frame.len() - LENGTH_PREFIX_LEN;
        assert_eq!(&frame[..4], &(body_len as u32).to_be_bytes());
    }

    #[test]
    fn test_decode_frame_round_trip() {
        let packet = Packet::wrap(
            PacketType::Handshake,
            &Handshake {
                communication_encoding: Some("utf8".into()),
                seeds: vec![1, 2, 3, 4, 5, 6, 7, 8],
                supported_compressions: 1,
            },
        );
        let frame = encode_frame(&packet).unwrap();
        let (decoded, consumed) =
            decode_frame(&frame, DEFAULT_MAX_FRAME_LENGTH).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn test_decode_frame_short_body_is_truncated() {
        let frame = encode_frame(&ack_packet(0, "ok")).unwrap();
        let cut = &frame[..frame.len() - 1];
        let err = decode_frame(cut, DEFAULT_MAX_FRAME_LENGTH).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Frame(FrameError::Truncated { received, expected })
                if received + 1 == expected
        ));
    }

    #[test]
    fn test_decode_frame_short_header_is_truncated() {
        let err = decode_frame(&[0, 0], DEFAULT_MAX_FRAME_LENGTH).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Frame(FrameError::Truncated {
                expected: 4,
                received: 2
            })
        ));
    }

    #[test]
    fn test_decode_frame_rejects_oversized_length() {
        let data = [0x7F, 0xFF, 0xFF, 0xFF];
        let err = decode_frame(&data, 1024).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Frame(FrameError::TooLarge { max: 1024, .. })
        ));
    }

    #[test]
    fn test_decode_frame_leaves_trailing_bytes() {
        let mut data = encode_frame(&ack_packet(0, "")).unwrap();
        let first_len = data.len();
        data.extend(encode_frame(&ack_packet(2, "second")).unwrap());

        let (_, consumed) = decode_frame(&data, DEFAULT_MAX_FRAME_LENGTH).unwrap();
        assert_eq!(consumed, first_len);
        let (second, _) =
            decode_frame(&data[consumed..], DEFAULT_MAX_FRAME_LENGTH).unwrap();
        let ack: Ack = decode_message(&second.body).unwrap();
        assert_eq!(ack.error_message, "second");
    }

    #[tokio::test]
    async fn test_read_frame_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let packet = ack_packet(0, "welcome");

        write_frame(&mut server, &packet).await.unwrap();
        let read = read_frame(&mut client, DEFAULT_MAX_FRAME_LENGTH)
            .await
            .unwrap();
        assert_eq!(read, packet);
    }

    #[tokio::test]
    async fn test_read_frame_reports_clean_close() {
        let (mut client, server) = tokio::io::duplex(64);
        drop(server);
        let err = read_frame(&mut client, DEFAULT_MAX_FRAME_LENGTH)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Frame(FrameError::Closed)));
    }

    #[tokio::test]
    async fn test_read_frame_never_returns_partial_message() {
        let (mut client, mut server) = tokio::io::duplex(64);
        // Declares 100 bytes but only sends 3 before hanging up.
        server.write_all(&100u32.to_be_bytes()).await.unwrap();
        server.write_all(&[1, 2, 3]).await.unwrap();
        drop(server);

        let err = read_frame(&mut client, DEFAULT_MAX_FRAME_LENGTH)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Frame(FrameError::Truncated {
                expected: 100,
                received: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_before_reading_body() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        let err = read_frame(&mut client, 4096).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Frame(FrameError::TooLarge { max: 4096, .. })
        ));
    }
}

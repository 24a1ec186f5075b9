use std::{fmt, io};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Origin token used when a frame is addressed to every client instead of one UUID.
pub const BROADCAST: &str = "BROADCAST";

/// Protocol message headers. Unrecognized spellings decode to [`Header::Other`]
/// so future headers pass through the codec without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    /// Client announces its identity (payload = client-chosen id).
    Uuid,
    /// Server asks a client to identify itself.
    UuidReq,
    /// Liveness probe (outbound) or acknowledgment (inbound, payload `ACK`).
    IsAlive,
    /// Standalone liveness acknowledgment.
    Ack,
    /// Server asks a client to report its status.
    Status,
    /// Barrier controller reports `{"barrier_open": bool}`.
    BarrierStatus,
    /// Dashboard requests a registry snapshot.
    GuiUpdateReq,
    /// Server confirms a successful registration.
    RegComplete,
    /// Serialized node list for dashboards.
    ClientData,
    /// Anything else; ignored by the dispatcher by policy.
    Other(String),
}

impl Header {
    fn from_token(token: &str) -> Self {
        match token {
            "UUID" => Header::Uuid,
            "UUID_REQ" => Header::UuidReq,
            "IS_ALIVE" => Header::IsAlive,
            "ACK" => Header::Ack,
            "STATUS" => Header::Status,
            "BARRIER_STATUS" => Header::BarrierStatus,
            "GUI_UPDATE_REQ" => Header::GuiUpdateReq,
            "REG_COMPLETE" => Header::RegComplete,
            "CLIENT_DATA" => Header::ClientData,
            other => Header::Other(other.to_string()),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Header::Uuid => "UUID",
            Header::UuidReq => "UUID_REQ",
            Header::IsAlive => "IS_ALIVE",
            Header::Ack => "ACK",
            Header::Status => "STATUS",
            Header::BarrierStatus => "BARRIER_STATUS",
            Header::GuiUpdateReq => "GUI_UPDATE_REQ",
            Header::RegComplete => "REG_COMPLETE",
            Header::ClientData => "CLIENT_DATA",
            Header::Other(token) => token,
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded protocol message: `origin,header,payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub origin: String,
    pub header: Header,
    pub payload: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer than three comma-separated fields.
    Malformed,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Malformed => f.write_str("frame has fewer than three fields"),
        }
    }
}

impl std::error::Error for FrameError {}

impl Frame {
    pub fn unicast(destination: &str, header: Header, payload: impl Into<String>) -> Self {
        Self {
            origin: destination.to_string(),
            header,
            payload: payload.into(),
        }
    }

    pub fn broadcast(header: Header, payload: impl Into<String>) -> Self {
        Self {
            origin: BROADCAST.to_string(),
            header,
            payload: payload.into(),
        }
    }

    /// Splits one line into origin, header, and payload. Commas after the
    /// second delimiter belong to the payload, which may itself be JSON.
    pub fn parse(line: &str) -> Result<Self, FrameError> {
        let mut fields = line.splitn(3, ',');
        let origin = fields.next().ok_or(FrameError::Malformed)?;
        let header = fields.next().ok_or(FrameError::Malformed)?;
        let payload = fields.next().ok_or(FrameError::Malformed)?;
        Ok(Self {
            origin: origin.to_string(),
            header: Header::from_token(header),
            payload: payload.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        format!("{},{},{}", self.origin, self.header, self.payload)
    }
}

/// Report sent by barrier controllers in a `BARRIER_STATUS` payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BarrierReport {
    pub barrier_open: bool,
}

/// Reads the next well-formed frame, skipping blank lines. Malformed lines
/// are logged and dropped so a single bad frame never ends the connection.
/// Returns `Ok(None)` once the peer closes its write side.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if trimmed.is_empty() {
            continue;
        }

        match Frame::parse(trimmed) {
            Ok(frame) => return Ok(Some(frame)),
            Err(FrameError::Malformed) => {
                warn!(line = trimmed, "dropping malformed frame");
                continue;
            }
        }
    }
}

/// Encodes one frame, appends the newline delimiter, and flushes so probes
/// and replies reach peers promptly.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = frame.encode().into_bytes();
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_fields() {
        let frame = Frame::parse("PI-A,IS_ALIVE,ACK").expect("well-formed frame");
        assert_eq!(frame.origin, "PI-A");
        assert_eq!(frame.header, Header::IsAlive);
        assert_eq!(frame.payload, "ACK");
    }

    #[test]
    fn payload_keeps_embedded_commas() {
        let frame = Frame::parse("PI-A,BARRIER_STATUS,{\"barrier_open\": true, \"extra\": 1}")
            .expect("well-formed frame");
        assert_eq!(frame.payload, "{\"barrier_open\": true, \"extra\": 1}");
    }

    #[test]
    fn two_fields_is_malformed() {
        assert_eq!(Frame::parse("PI-A,IS_ALIVE"), Err(FrameError::Malformed));
        assert_eq!(Frame::parse(""), Err(FrameError::Malformed));
    }

    #[test]
    fn unknown_header_is_preserved() {
        let frame = Frame::parse("PI-A,FUTURE_THING,x").expect("well-formed frame");
        assert_eq!(frame.header, Header::Other("FUTURE_THING".into()));
        assert_eq!(frame.encode(), "PI-A,FUTURE_THING,x");
    }

    #[test]
    fn encodes_unicast_and_broadcast() {
        let probe = Frame::unicast("PI-A", Header::IsAlive, "");
        assert_eq!(probe.encode(), "PI-A,IS_ALIVE,");

        let req = Frame::broadcast(Header::UuidReq, "");
        assert_eq!(req.encode(), "BROADCAST,UUID_REQ,");
    }

    #[tokio::test]
    async fn roundtrip_over_duplex() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);
        let frame = Frame::unicast("GUI-1", Header::ClientData, "[{\"uuid\":\"PI-A\"}]");

        write_frame(&mut writer, &frame).await.expect("write frame");
        let parsed = read_frame(&mut reader)
            .await
            .expect("read frame")
            .expect("expected a frame");

        assert_eq!(frame, parsed);
    }

    #[tokio::test]
    async fn malformed_line_is_skipped() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);

        writer
            .write_all(b"garbage\n\nPI-A,ACK,\n")
            .await
            .expect("write lines");

        let parsed = read_frame(&mut reader)
            .await
            .expect("read frame")
            .expect("expected the good frame");
        assert_eq!(parsed.header, Header::Ack);
        assert_eq!(parsed.origin, "PI-A");
    }
}

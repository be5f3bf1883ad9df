//! NETCONF 1.0 end-of-message framing and message builders.
//!
//! Every message, in both directions, is terminated by [`MARKER`]. A read
//! may return bytes past the marker; those belong to the next frame and are
//! kept by [`FrameReader`].

use crate::error::NetconfError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// End-of-message marker.
pub const MARKER: &[u8] = b"]]>]]>";

/// Maximum frame size (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Base namespace.
pub const BASE_NS: &str = "urn:ietf:params:netconf:base:1.0";

/// Capabilities advertised in our greeting.
pub const DEFAULT_CAPABILITIES: &[&str] = &[
    "urn:ietf:params:netconf:base:1.0",
    "urn:ietf:params:netconf:capability:startup:1.0",
    "urn:ietf:params:netconf:capability:candidate:1.0",
];

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Client greeting, marker included.
pub fn hello(capabilities: &[String]) -> String {
    let mut caps = String::new();
    for cap in capabilities {
        caps.push_str(&format!("<capability>{}</capability>\n", cap));
    }
    format!(
        "{XML_DECLARATION}\n<hello xmlns=\"{BASE_NS}\">\n<capabilities>\n{caps}</capabilities>\n</hello>\n]]>]]>"
    )
}

/// An `<rpc>` envelope around `payload`, marker included.
///
/// A leading XML declaration in the payload is dropped.
pub fn rpc(message_id: u64, payload: &str) -> String {
    let body = strip_xml_declaration(payload).trim();
    format!(
        "{XML_DECLARATION}\n<rpc message-id=\"{message_id}\" xmlns=\"{BASE_NS}\">\n{body}\n</rpc>\n]]>]]>"
    )
}

/// `<close-session/>` request, marker included.
pub fn close_session(message_id: u64) -> String {
    rpc(message_id, "<close-session/>")
}

/// Remove a leading `<?xml ...?>` declaration.
pub fn strip_xml_declaration(payload: &str) -> &str {
    let trimmed = payload.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return &trimmed[end + 2..];
        }
    }
    payload
}

/// True when `message` is a server greeting.
pub fn is_hello(message: &str) -> bool {
    contains_element(message, "hello") && contains_element(message, "capabilities")
}

/// True when `reply` carries an `rpc-error` element.
pub fn has_rpc_error(reply: &str) -> bool {
    contains_element(reply, "rpc-error")
}

/// The `session-id` from a server greeting.
pub fn session_id(greeting: &str) -> Option<u64> {
    let start = greeting.find("session-id>")? + "session-id>".len();
    let rest = &greeting[start..];
    let end = rest.find('<')?;
    rest[..end].trim().parse().ok()
}

/// `<name` or `<prefix:name` followed by a delimiter.
fn contains_element(xml: &str, name: &str) -> bool {
    xml.match_indices(name).any(|(i, _)| {
        let before = xml[..i].chars().next_back();
        let after = xml[i + name.len()..].chars().next();
        matches!(before, Some('<') | Some(':'))
            && matches!(after, Some('>') | Some('/') | Some(' ') | Some('\n') | Some('\t') | Some('\r'))
            && xml[..i].rfind('<').map(|lt| !xml[lt..i].contains('>')).unwrap_or(false)
            && !xml[..i].ends_with("</")
    })
}

/// Buffers bytes from a stream and cuts them into frames.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    /// Create an empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes received past the last complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Take the next complete frame, marker stripped.
    pub fn next_frame(&mut self) -> Option<Result<String, NetconfError>> {
        let pos = self.buf.windows(MARKER.len()).position(|w| w == MARKER)?;
        let rest = self.buf.split_off(pos + MARKER.len());
        let mut frame = std::mem::replace(&mut self.buf, rest);
        frame.truncate(pos);
        Some(
            String::from_utf8(frame)
                .map_err(|e| NetconfError::Protocol(format!("frame is not UTF-8: {e}"))),
        )
    }

    /// Read until a complete frame is available.
    pub async fn read_frame<R>(&mut self, reader: &mut R) -> Result<String, NetconfError>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = self.next_frame() {
                return frame;
            }
            if self.buf.len() > MAX_FRAME_SIZE {
                return Err(NetconfError::Protocol(format!(
                    "frame too large: more than {} bytes without marker",
                    MAX_FRAME_SIZE
                )));
            }
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                return Err(NetconfError::Closed);
            }
            self.push(&chunk[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================
    // Builders
    // ===========================================

    #[test]
    fn every_message_ends_with_marker() {
        let caps: Vec<String> = DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect();
        for msg in [hello(&caps), rpc(1, "<get/>"), close_session(2)] {
            assert!(msg.as_bytes().ends_with(MARKER), "{msg}");
        }
    }

    #[test]
    fn rpc_envelope_drops_declaration() {
        let msg = rpc(7, "<?xml version=\"1.0\"?>\n<get-config><source><running/></source></get-config>");
        assert!(msg.contains("<rpc message-id=\"7\""));
        assert_eq!(msg.matches("<?xml").count(), 1);
        assert!(msg.contains("<get-config>"));
    }

    #[test]
    fn hello_lists_capabilities() {
        let msg = hello(&["urn:a".to_string(), "urn:b".to_string()]);
        assert!(msg.contains("<capability>urn:a</capability>"));
        assert!(msg.contains("<capability>urn:b</capability>"));
        assert!(is_hello(&msg));
    }

    // ===========================================
    // Reply inspection
    // ===========================================

    #[test]
    fn rpc_error_detection() {
        assert!(!has_rpc_error("<rpc-reply message-id=\"1\"><ok/></rpc-reply>"));
        assert!(has_rpc_error("<rpc-reply><rpc-error><error-tag>x</error-tag></rpc-error></rpc-reply>"));
        assert!(has_rpc_error("<nc:rpc-reply><nc:rpc-error/></nc:rpc-reply>"));
        // Text mentioning the element is not the element.
        assert!(!has_rpc_error("<data>no rpc-error here</data>"));
    }

    #[test]
    fn session_id_from_greeting() {
        let greeting = "<hello><capabilities/><session-id>42</session-id></hello>";
        assert_eq!(session_id(greeting), Some(42));
        assert_eq!(session_id("<hello/>"), None);
    }

    // ===========================================
    // FrameReader
    // ===========================================

    #[test]
    fn leftover_bytes_start_next_frame() {
        let mut reader = FrameReader::new();
        reader.push(b"<a/>]]>]]><b");
        assert_eq!(reader.next_frame().unwrap().unwrap(), "<a/>");
        assert!(reader.next_frame().is_none());
        reader.push(b"/>]]>]]>");
        assert_eq!(reader.next_frame().unwrap().unwrap(), "<b/>");
        assert_eq!(reader.pending(), 0);
    }

    #[tokio::test]
    async fn marker_split_across_reads() {
        let (mut client, mut server) = tokio::io::duplex(8);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            server.write_all(b"<ok/>]]>").await.unwrap();
            server.write_all(b"]]>").await.unwrap();
        });
        let mut reader = FrameReader::new();
        assert_eq!(reader.read_frame(&mut client).await.unwrap(), "<ok/>");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn eof_before_marker() {
        let (mut client, server) = tokio::io::duplex(64);
        drop(server);
        let mut reader = FrameReader::new();
        assert!(matches!(
            reader.read_frame(&mut client).await,
            Err(NetconfError::Closed)
        ));
    }
}

//! Collect HTTP response header lines into a ResponseHead.

use std::str;

use super::{ResponseHead, EVENT_STREAM_MEDIA_TYPE};

/// Accumulates header lines as curl delivers them, across redirects and
/// interim (1xx) responses, and reports when the final header block ends.
#[derive(Debug, Default)]
pub(crate) struct HeadCollector {
    status: Option<u32>,
    content_type: Option<String>,
    /// Current block is a proxy's reply to CONNECT, not the origin's response.
    tunnel_reply: bool,
    complete: bool,
}

impl HeadCollector {
    /// Feed one raw header line. Returns false once the final header block
    /// is complete, which tells curl to stop the transfer there.
    pub(crate) fn push_line(&mut self, raw: &[u8]) -> bool {
        let Ok(line) = str::from_utf8(raw) else {
            return true;
        };
        let line = line.trim();
        if line.is_empty() {
            if self.tunnel_reply {
                self.status = None;
                self.content_type = None;
                self.tunnel_reply = false;
                return true;
            }
            return match self.status {
                // Interim or redirect block: curl keeps going.
                Some(code) if (100..200).contains(&code) || (300..400).contains(&code) => true,
                Some(_) => {
                    self.complete = true;
                    false
                }
                None => true,
            };
        }
        if line.starts_with("HTTP/") {
            self.status = parse_status_line(line);
            self.content_type = None;
            self.tunnel_reply = is_tunnel_reply(line);
            return true;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-type") {
                self.content_type = Some(value.trim().to_string());
            }
        }
        true
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.complete
    }

    /// The head seen so far; None when no status line arrived.
    pub(crate) fn finish(self) -> Option<ResponseHead> {
        self.status.map(|status| ResponseHead {
            status,
            content_type: self.content_type,
        })
    }
}

/// "HTTP/1.1 200 OK" or "HTTP/2 200" -> 200.
fn parse_status_line(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// "HTTP/1.1 200 Connection established": the proxy opened the tunnel and
/// the origin's response follows.
fn is_tunnel_reply(line: &str) -> bool {
    let mut parts = line.splitn(3, ' ');
    let _version = parts.next();
    let Some(code) = parts.next() else {
        return false;
    };
    let reason = parts.next().unwrap_or("").trim();
    code.starts_with('2') && reason.eq_ignore_ascii_case("connection established")
}

/// True when the declared media type (parameters ignored) is `text/event-stream`.
pub(crate) fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|media| media.trim().eq_ignore_ascii_case(EVENT_STREAM_MEDIA_TYPE))
        .unwrap_or(false)
}

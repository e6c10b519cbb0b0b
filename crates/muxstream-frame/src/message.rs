use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Request id reserved for server pushes and their acks.
pub const PUSH_REQ_ID: u32 = 1;

/// Longest header key or value, in UTF-8 bytes.
pub const MAX_HEADER_LEN: usize = u8::MAX as usize;

const HEADER_END: u8 = 0;
const RESPONSE_MIN: usize = 5;
const PUSH_RESPONSE_MIN: usize = RESPONSE_MIN + 4;

/// Outcome carried in the status byte of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed,
}

/// Encode a request frame.
///
/// ```text
/// reqId(4B BE) | { keyLen(1) | key | valLen(1) | val }* | 0x00 | body
/// ```
///
/// On error nothing is written to `dst`.
pub fn encode_request<I, K, V>(req_id: u32, headers: I, body: &[u8], dst: &mut BytesMut) -> Result<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut buf = BytesMut::with_capacity(4 + 1 + body.len());
    buf.put_u32(req_id);
    for (key, value) in headers {
        let (key, value) = (key.as_ref().as_bytes(), value.as_ref().as_bytes());
        if key.len() > MAX_HEADER_LEN {
            return Err(FrameError::HeaderTooLong {
                field: "key",
                len: key.len(),
            });
        }
        if value.len() > MAX_HEADER_LEN {
            return Err(FrameError::HeaderTooLong {
                field: "value",
                len: value.len(),
            });
        }
        buf.put_u8(key.len() as u8);
        buf.put_slice(key);
        buf.put_u8(value.len() as u8);
        buf.put_slice(value);
    }
    buf.put_u8(HEADER_END);
    buf.put_slice(body);

    dst.extend_from_slice(&buf);
    Ok(())
}

/// Encode the ack for a server push: `reqId=1 | 0x00 | pushId`.
pub fn encode_push_ack(push_id: u32, dst: &mut BytesMut) {
    dst.reserve(PUSH_RESPONSE_MIN);
    dst.put_u32(PUSH_REQ_ID);
    dst.put_u8(HEADER_END);
    dst.put_u32(push_id);
}

/// A decoded request frame, as seen by the server side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub req_id: u32,
    /// Headers in wire order.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Request {
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        encode_request(
            self.req_id,
            self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            &self.body,
            dst,
        )
    }

    pub fn decode(mut src: Bytes) -> Result<Self> {
        if src.len() < RESPONSE_MIN {
            return Err(FrameError::Truncated {
                needed: RESPONSE_MIN,
                actual: src.len(),
            });
        }
        let req_id = src.get_u32();

        let mut headers = Vec::new();
        loop {
            if !src.has_remaining() {
                return Err(FrameError::UnterminatedHeaders);
            }
            let key_len = src.get_u8() as usize;
            if key_len == 0 {
                break;
            }
            let key = take_str(&mut src, key_len)?;
            if !src.has_remaining() {
                return Err(FrameError::UnterminatedHeaders);
            }
            let value_len = src.get_u8() as usize;
            let value = take_str(&mut src, value_len)?;
            headers.push((key, value));
        }

        Ok(Self {
            req_id,
            headers,
            body: src,
        })
    }

    /// Whether this request is a push ack rather than a caller request.
    pub fn is_push_ack(&self) -> bool {
        self.req_id == PUSH_REQ_ID
    }
}

fn take_str(src: &mut Bytes, len: usize) -> Result<String> {
    if src.len() < len {
        return Err(FrameError::UnterminatedHeaders);
    }
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidHeader)
}

/// A decoded response frame.
///
/// ```text
/// reqId(4B BE) | status(1) | [pushId(4B BE) iff reqId == 1] | body
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub req_id: u32,
    pub status: Status,
    /// Present exactly when `req_id` is [`PUSH_REQ_ID`].
    pub push_id: Option<u32>,
    pub body: Bytes,
}

impl Response {
    pub fn ok(req_id: u32, body: impl Into<Bytes>) -> Self {
        Self {
            req_id,
            status: Status::Ok,
            push_id: None,
            body: body.into(),
        }
    }

    pub fn failed(req_id: u32, reason: impl Into<Bytes>) -> Self {
        Self {
            req_id,
            status: Status::Failed,
            push_id: None,
            body: reason.into(),
        }
    }

    pub fn push(push_id: u32, body: impl Into<Bytes>) -> Self {
        Self {
            req_id: PUSH_REQ_ID,
            status: Status::Ok,
            push_id: Some(push_id),
            body: body.into(),
        }
    }

    pub fn is_push(&self) -> bool {
        self.req_id == PUSH_REQ_ID
    }

    pub fn decode(mut src: Bytes) -> Result<Self> {
        if src.len() < RESPONSE_MIN {
            return Err(FrameError::Truncated {
                needed: RESPONSE_MIN,
                actual: src.len(),
            });
        }
        let req_id = src.get_u32();
        let status = match src.get_u8() {
            0 => Status::Ok,
            _ => Status::Failed,
        };

        let push_id = if req_id == PUSH_REQ_ID {
            if src.len() < 4 {
                return Err(FrameError::Truncated {
                    needed: PUSH_RESPONSE_MIN,
                    actual: RESPONSE_MIN + src.len(),
                });
            }
            Some(src.get_u32())
        } else {
            None
        };

        Ok(Self {
            req_id,
            status,
            push_id,
            body: src,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(PUSH_RESPONSE_MIN + self.body.len());
        dst.put_u32(self.req_id);
        dst.put_u8(match self.status {
            Status::Ok => 0,
            Status::Failed => 1,
        });
        if self.req_id == PUSH_REQ_ID {
            dst.put_u32(self.push_id.unwrap_or_default());
        }
        dst.put_slice(&self.body);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn request_roundtrip_preserves_headers_and_body() {
        let mut headers = HashMap::new();
        headers.insert("api".to_string(), "/user/get".to_string());
        headers.insert("X-Req-Id".to_string(), "abc".to_string());
        headers.insert("k".repeat(255), "v".repeat(255));

        let mut buf = BytesMut::new();
        encode_request(42, &headers, b"payload", &mut buf).unwrap();

        let req = Request::decode(buf.freeze()).unwrap();
        assert_eq!(req.req_id, 42);
        assert_eq!(req.body.as_ref(), b"payload");
        let decoded: HashMap<String, String> = req.headers.into_iter().collect();
        assert_eq!(decoded, headers);
    }

    #[test]
    fn request_wire_layout() {
        let mut buf = BytesMut::new();
        encode_request(0x0a, [("a", "bc")], b"z", &mut buf).unwrap();
        assert_eq!(
            buf.as_ref(),
            &[0, 0, 0, 0x0a, 1, b'a', 2, b'b', b'c', 0, b'z']
        );
    }

    #[test]
    fn long_header_key_writes_nothing() {
        let mut buf = BytesMut::from(&b"keep"[..]);
        let key = "k".repeat(256);
        let err = encode_request(11, [(key.as_str(), "v")], b"body", &mut buf).unwrap_err();
        assert!(matches!(
            err,
            FrameError::HeaderTooLong {
                field: "key",
                len: 256
            }
        ));
        assert_eq!(buf.as_ref(), b"keep");
    }

    #[test]
    fn long_header_value_is_rejected() {
        let mut buf = BytesMut::new();
        let value = "é".repeat(128); // 256 bytes of UTF-8
        let err = encode_request(11, [("k", value.as_str())], b"", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::HeaderTooLong { field: "value", .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn response_roundtrip() {
        for resp in [
            Response::ok(10, Bytes::from_static(b"hello")),
            Response::failed(99, Bytes::from_static(b"denied")),
            Response::push(7, Bytes::from_static(b"event")),
            Response::ok(12, Bytes::new()),
        ] {
            let mut buf = BytesMut::new();
            resp.encode(&mut buf);
            assert_eq!(Response::decode(buf.freeze()).unwrap(), resp);
        }
    }

    #[test]
    fn three_byte_response_is_too_short() {
        let err = Response::decode(Bytes::from_static(&[0, 0, 0])).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                needed: 5,
                actual: 3
            }
        ));
    }

    #[test]
    fn push_needs_nine_bytes() {
        let err = Response::decode(Bytes::from_static(&[0, 0, 0, 1, 0, 0, 0, 7])).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                needed: 9,
                actual: 8
            }
        ));

        let push = Response::decode(Bytes::from_static(&[0, 0, 0, 1, 0, 0, 0, 0, 7])).unwrap();
        assert!(push.is_push());
        assert_eq!(push.push_id, Some(7));
        assert!(push.body.is_empty());
    }

    #[test]
    fn nonzero_status_is_failed() {
        let resp = Response::decode(Bytes::from_static(&[0, 0, 0, 20, 3, b'x'])).unwrap();
        assert_eq!(resp.status, Status::Failed);
        assert_eq!(resp.push_id, None);
        assert_eq!(resp.body.as_ref(), b"x");
    }

    #[test]
    fn push_ack_bytes() {
        let mut buf = BytesMut::new();
        encode_push_ack(7, &mut buf);
        assert_eq!(buf.as_ref(), &[0, 0, 0, 1, 0, 0, 0, 0, 7]);

        let ack = Request::decode(buf.freeze()).unwrap();
        assert!(ack.is_push_ack());
        assert!(ack.headers.is_empty());
        assert_eq!(ack.body.as_ref(), &[0, 0, 0, 7]);
    }

    #[test]
    fn request_without_terminator_is_rejected() {
        let err = Request::decode(Bytes::from_static(&[0, 0, 0, 10, 3, b'a'])).unwrap_err();
        assert!(matches!(err, FrameError::UnterminatedHeaders));
    }
}

//! protocol-echo - demo schema glue.
//!
//! Hand-written stand-in for generated stubs: the `unstructured.Test`
//! arithmetic service (`i64` in, `7 + input` out) and the
//! `unstructured.Unstructured` echo service (`"Hello " + input`), with
//! their wire codecs and typed service constructors.
//!
//! Wire formats are deliberately plain: the echo pair is the UTF-8 text
//! itself, the arithmetic pair one big-endian `i64`.

use bytes::{Bytes, BytesMut};

use server::ServiceDef;
use transport::{DecodeError, Message, MethodSchema};

/// Request to the echo service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    pub input: String,
}

/// Reply from the echo service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoReply {
    pub output: String,
}

impl Message for EchoRequest {
    fn encode(&self) -> Bytes {
        Bytes::from(self.input.clone().into_bytes())
    }

    fn decode(buf: Bytes) -> Result<Self, DecodeError> {
        let input = String::from_utf8(buf.to_vec())
            .map_err(|e| DecodeError::new(format!("echo request is not UTF-8: {e}")))?;
        Ok(Self { input })
    }
}

impl Message for EchoReply {
    fn encode(&self) -> Bytes {
        Bytes::from(self.output.clone().into_bytes())
    }

    fn decode(buf: Bytes) -> Result<Self, DecodeError> {
        let output = String::from_utf8(buf.to_vec())
            .map_err(|e| DecodeError::new(format!("echo reply is not UTF-8: {e}")))?;
        Ok(Self { output })
    }
}

/// Request to the arithmetic service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MathRequest {
    pub input: i64,
}

/// Reply from the arithmetic service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MathReply {
    pub output: i64,
}

fn encode_i64(value: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.extend_from_slice(&value.to_be_bytes());
    buf.freeze()
}

fn decode_i64(buf: &Bytes) -> Result<i64, DecodeError> {
    let bytes: [u8; 8] = buf
        .as_ref()
        .try_into()
        .map_err(|_| DecodeError::new(format!("expected 8 bytes, got {}", buf.len())))?;
    Ok(i64::from_be_bytes(bytes))
}

impl Message for MathRequest {
    fn encode(&self) -> Bytes {
        encode_i64(self.input)
    }

    fn decode(buf: Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            input: decode_i64(&buf)?,
        })
    }
}

impl Message for MathReply {
    fn encode(&self) -> Bytes {
        encode_i64(self.output)
    }

    fn decode(buf: Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            output: decode_i64(&buf)?,
        })
    }
}

/// The echo method: `/unstructured.Unstructured/Process`.
pub enum Echo {}

impl MethodSchema for Echo {
    type Request = EchoRequest;
    type Response = EchoReply;

    fn path() -> &'static str {
        "/unstructured.Unstructured/Process"
    }
}

/// The arithmetic method: `/unstructured.Test/Process`.
pub enum Arith {}

impl MethodSchema for Arith {
    type Request = MathRequest;
    type Response = MathReply;

    fn path() -> &'static str {
        "/unstructured.Test/Process"
    }
}

/// The echo service: replies `"Hello " + input`.
pub fn echo_service() -> ServiceDef {
    ServiceDef::new("unstructured.Unstructured").unary(
        "Process",
        |_ctx, req: EchoRequest| {
            Ok(EchoReply {
                output: format!("Hello {}", req.input),
            })
        },
    )
}

/// The arithmetic service: replies `7 + input`.
pub fn arith_service() -> ServiceDef {
    ServiceDef::new("unstructured.Test").unary("Process", |_ctx, req: MathRequest| {
        Ok(MathReply {
            output: 7 + req.input,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_wire_format_is_plain_utf8() {
        let req = EchoRequest {
            input: "world".to_string(),
        };
        assert_eq!(&req.encode()[..], b"world");
        let back = EchoRequest::decode(Bytes::from_static(b"world")).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_echo_rejects_invalid_utf8() {
        let err = EchoRequest::decode(Bytes::from_static(&[0xff, 0xfe])).unwrap_err();
        assert!(err.to_string().contains("not UTF-8"));
    }

    #[test]
    fn test_math_wire_format_is_big_endian() {
        let req = MathRequest { input: 13 };
        assert_eq!(&req.encode()[..], &13i64.to_be_bytes());
        assert_eq!(MathRequest::decode(req.encode()).unwrap().input, 13);
        assert_eq!(MathReply::decode(encode_i64(-5)).unwrap().output, -5);
    }

    #[test]
    fn test_math_rejects_short_payload() {
        let err = MathRequest::decode(Bytes::from_static(&[1, 2, 3])).unwrap_err();
        assert!(err.to_string().contains("expected 8 bytes"));
    }

    #[test]
    fn test_schema_paths() {
        assert_eq!(Echo::path(), "/unstructured.Unstructured/Process");
        assert_eq!(Arith::path(), "/unstructured.Test/Process");
    }
}

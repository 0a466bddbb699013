//! DNS wire codec seam
//!
//! Thin wrappers over `hickory-proto` that give the dispatch handler the
//! three operations it consumes: [`unpack`], [`pack`], and the
//! pool-backed [`pack_buffer`]. Also home of [`servfail_reply`], the one
//! piece of message construction the handler owns.
//!
//! `pack_buffer` is the hot encode path: it serializes into a buffer
//! drawn from the [`Allocator`] and hands back a [`PooledBuf`] whose drop
//! returns the buffer, with its original capacity, to the pool. The
//! encoded bytes are the deref'd prefix; the guard keeps the
//! full-capacity vector underneath so the release-time capacity check
//! still recognizes the buffer.

use std::sync::Arc;

use hickory_proto::op::{Header, Message, ResponseCode};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable, BinEncoder};

use crate::error::{DnsError, DnsResult};
use crate::io::{Allocator, PooledBuf};

/// Size class drawn for encoding.
///
/// The encoder reserves 512 bytes up front and most responses fit well
/// under 4 KiB; a response that outgrows this doubles into the next
/// power-of-two class and still releases cleanly.
pub const PACK_BUFFER_SIZE: usize = 4096;

/// Decode a DNS message from wire format.
///
/// # Errors
///
/// Returns [`DnsError::ParseError`] if the bytes are not a well-formed
/// DNS message.
pub fn unpack(data: &[u8]) -> DnsResult<Message> {
    Message::from_bytes(data).map_err(|e| DnsError::parse(e.to_string()))
}

/// Encode a DNS message to a freshly allocated byte vector.
///
/// # Errors
///
/// Returns [`DnsError::SerializeError`] if the message cannot be encoded.
pub fn pack(msg: &Message) -> DnsResult<Vec<u8>> {
    msg.to_vec().map_err(|e| DnsError::serialize(e.to_string()))
}

/// Encode a DNS message into an allocator-sourced buffer.
///
/// The returned handle dereferences to the encoded bytes and releases the
/// owning buffer back to `alloc` when dropped.
///
/// # Errors
///
/// Returns [`DnsError::SerializeError`] if the message cannot be encoded;
/// the buffer is released before returning.
pub fn pack_buffer(msg: &Message, alloc: &Arc<Allocator>) -> DnsResult<PooledBuf> {
    let mut buf = alloc.get(PACK_BUFFER_SIZE);
    buf.clear();

    let mut encoder = BinEncoder::new(&mut buf);
    if let Err(e) = msg.emit(&mut encoder) {
        drop(encoder);
        alloc.release(buf);
        return Err(DnsError::serialize(e.to_string()));
    }

    Ok(PooledBuf::from_parts(buf, Arc::clone(alloc)))
}

/// Build an RFC 1035 SERVFAIL reply to `request`.
///
/// Echoes the question section, sets QR=1 and RCODE=2, and preserves the
/// transaction id.
#[must_use]
pub fn servfail_reply(request: &Message) -> Message {
    let mut header = Header::response_from_request(request.header());
    header.set_response_code(ResponseCode::ServFail);

    let mut reply = Message::new();
    reply.set_header(header);
    reply.add_queries(request.queries().iter().cloned());
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{MessageType, OpCode, Query};
    use hickory_proto::rr::{Name, RecordType};

    fn a_query(id: u16) -> Message {
        let mut msg = Message::new();
        msg.set_id(id);
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg.set_recursion_desired(true);
        msg.add_query(Query::query(
            Name::from_ascii("example.com.").unwrap(),
            RecordType::A,
        ));
        msg
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let msg = a_query(0x1234);
        let wire = pack(&msg).unwrap();
        let decoded = unpack(&wire).unwrap();
        assert_eq!(decoded.id(), 0x1234);
        assert_eq!(decoded.queries().len(), 1);
        assert_eq!(decoded.queries()[0].query_type(), RecordType::A);
    }

    #[test]
    fn test_unpack_garbage_fails() {
        assert!(unpack(&[0xde, 0xad, 0xbe]).is_err());
    }

    #[test]
    fn test_pack_buffer_uses_pool() {
        let alloc = Arc::new(Allocator::new(16));
        let msg = a_query(0x4242);

        let encoded = pack_buffer(&msg, &alloc).unwrap();
        assert!(!encoded.is_empty());
        assert_eq!(encoded.capacity(), PACK_BUFFER_SIZE);
        assert_eq!(unpack(&encoded).unwrap().id(), 0x4242);

        drop(encoded);
        assert_eq!(alloc.stats().returns(), 1);

        // The next encode reuses the buffer the drop returned
        let _encoded = pack_buffer(&msg, &alloc).unwrap();
        assert_eq!(alloc.stats().reuses(), 1);
    }

    #[test]
    fn test_pack_buffer_matches_pack() {
        let alloc = Arc::new(Allocator::new(16));
        let msg = a_query(7);
        let pooled = pack_buffer(&msg, &alloc).unwrap();
        let plain = pack(&msg).unwrap();
        assert_eq!(&*pooled, plain.as_slice());
    }

    #[test]
    fn test_servfail_reply_shape() {
        let req = a_query(0xbeef);
        let reply = servfail_reply(&req);

        assert_eq!(reply.id(), 0xbeef);
        assert_eq!(reply.header().message_type(), MessageType::Response);
        assert_eq!(reply.header().response_code(), ResponseCode::ServFail);
        assert_eq!(reply.queries(), req.queries());

        // Survives the wire
        let decoded = unpack(&pack(&reply).unwrap()).unwrap();
        assert_eq!(decoded.header().response_code(), ResponseCode::ServFail);
        assert_eq!(decoded.queries()[0].name().to_ascii(), "example.com.");
    }
}

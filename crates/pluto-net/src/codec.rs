//! Wire codec: typed primitive fields in a length-prefixed message.
//!
//! Every message on the wire has the same shape:
//!
//! ```text
//! +-------------------+---------+----------------------------+
//! | length (2 bytes)  | token   | fields                     |
//! | u16 little-endian | u8      | in the order they were put |
//! +-------------------+---------+----------------------------+
//! ```
//!
//! The length counts the whole message, prefix included, and is written by
//! [`MessageWriter::finish`] once the payload is complete. Integers and floats
//! are little-endian regardless of host order; strings are NUL-terminated.
//!
//! Decoding never fails: a [`MessageReader`] that runs past the end of the
//! message yields zeros and empty strings. Deciding whether a value is
//! acceptable belongs to the receive helpers one layer up.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX: usize = 2;

/// Smallest well-formed message: length prefix plus token.
pub const MESSAGE_MIN: usize = LENGTH_PREFIX + 1;

/// Largest message a peer may build or send, prefix included.
pub const MESSAGE_MAX: usize = 4096;

static_assertions::const_assert!(MESSAGE_MAX <= u16::MAX as usize);

/// Errors raised while building a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The message grew past [`MESSAGE_MAX`]. Nothing was produced.
    #[error("message size {size} exceeds maximum {max}")]
    Overflow {
        /// Size the message would have had.
        size: usize,
        /// The fixed capacity.
        max: usize,
    },
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// The primitive field types the codec understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    Str,
}

/// A single decoded or to-be-encoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
    Str(String),
}

impl Field {
    /// The type tag of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::U8(_) => FieldType::U8,
            Field::I8(_) => FieldType::I8,
            Field::U16(_) => FieldType::U16,
            Field::I16(_) => FieldType::I16,
            Field::U32(_) => FieldType::U32,
            Field::I32(_) => FieldType::I32,
            Field::F32(_) => FieldType::F32,
            Field::Str(_) => FieldType::Str,
        }
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// One complete encoded message, length prefix included.
///
/// Cloning is cheap; the bytes are reference counted so a broadcast shares one
/// buffer between every peer queue it lands in.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    frame: Bytes,
}

impl Packet {
    /// Wraps a complete frame. The caller has checked the length prefix.
    pub(crate) fn from_frame(frame: Bytes) -> Self {
        debug_assert!(frame.len() >= MESSAGE_MIN);
        Self { frame }
    }

    /// The leading token byte.
    pub fn token(&self) -> u8 {
        self.frame.get(LENGTH_PREFIX).copied().unwrap_or(0)
    }

    /// The fields following the token.
    pub fn payload(&self) -> &[u8] {
        self.frame.get(MESSAGE_MIN..).unwrap_or_default()
    }

    /// A fresh read cursor positioned after the token.
    pub fn reader(&self) -> MessageReader<'_> {
        MessageReader::new(self.payload())
    }

    /// The whole frame as it travels on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.frame
    }

    /// Total size on the wire.
    pub fn len(&self) -> usize {
        self.frame.len()
    }

    /// Always `false`; a packet carries at least its prefix and token.
    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("token", &self.token())
            .field("len", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// MessageWriter
// ---------------------------------------------------------------------------

/// Builds one message field by field.
///
/// Writes past [`MESSAGE_MAX`] are discarded and remembered; [`finish`]
/// then reports the overflow instead of producing a truncated message.
///
/// [`finish`]: MessageWriter::finish
pub struct MessageWriter {
    buf: BytesMut,
    size: usize,
}

impl MessageWriter {
    /// Starts a message with the given token.
    pub fn new(token: u8) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u16_le(0);
        buf.put_u8(token);
        Self {
            buf,
            size: MESSAGE_MIN,
        }
    }

    fn claim(&mut self, n: usize) -> bool {
        self.size += n;
        self.size <= MESSAGE_MAX
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        if self.claim(1) {
            self.buf.put_u8(value);
        }
        self
    }

    pub fn i8(&mut self, value: i8) -> &mut Self {
        if self.claim(1) {
            self.buf.put_i8(value);
        }
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        if self.claim(2) {
            self.buf.put_u16_le(value);
        }
        self
    }

    pub fn i16(&mut self, value: i16) -> &mut Self {
        if self.claim(2) {
            self.buf.put_i16_le(value);
        }
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        if self.claim(4) {
            self.buf.put_u32_le(value);
        }
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        if self.claim(4) {
            self.buf.put_i32_le(value);
        }
        self
    }

    pub fn f32(&mut self, value: f32) -> &mut Self {
        if self.claim(4) {
            self.buf.put_f32_le(value);
        }
        self
    }

    /// Writes a NUL-terminated string. Anything after an embedded NUL is
    /// dropped so the terminator stays unambiguous.
    pub fn string(&mut self, value: &str) -> &mut Self {
        let bytes = value.as_bytes();
        let bytes = match bytes.iter().position(|&b| b == 0) {
            Some(end) => &bytes[..end],
            None => bytes,
        };
        if self.claim(bytes.len() + 1) {
            self.buf.put_slice(bytes);
            self.buf.put_u8(0);
        }
        self
    }

    /// Writes a dynamically typed field.
    pub fn field(&mut self, field: &Field) -> &mut Self {
        match field {
            Field::U8(v) => self.u8(*v),
            Field::I8(v) => self.i8(*v),
            Field::U16(v) => self.u16(*v),
            Field::I16(v) => self.i16(*v),
            Field::U32(v) => self.u32(*v),
            Field::I32(v) => self.i32(*v),
            Field::F32(v) => self.f32(*v),
            Field::Str(v) => self.string(v),
        }
    }

    /// Writes the length prefix and hands back the finished message.
    pub fn finish(mut self) -> Result<Packet, CodecError> {
        if self.size > MESSAGE_MAX {
            return Err(CodecError::Overflow {
                size: self.size,
                max: MESSAGE_MAX,
            });
        }
        let len = self.buf.len() as u16;
        self.buf[..LENGTH_PREFIX].copy_from_slice(&len.to_le_bytes());
        Ok(Packet::from_frame(self.buf.freeze()))
    }
}

// ---------------------------------------------------------------------------
// MessageReader
// ---------------------------------------------------------------------------

/// A read cursor over one message's fields.
///
/// Each received message gets exactly one reader, and fields must be read in
/// the order and count they were written.
#[derive(Debug, Clone)]
pub struct MessageReader<'a> {
    rest: &'a [u8],
    overrun: bool,
}

impl<'a> MessageReader<'a> {
    /// A cursor over `payload` (the bytes after the token).
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            rest: payload,
            overrun: false,
        }
    }

    fn take(&mut self, n: usize) -> bool {
        if self.rest.remaining() >= n {
            true
        } else {
            self.overrun = true;
            self.rest = &[];
            false
        }
    }

    pub fn u8(&mut self) -> u8 {
        if self.take(1) { self.rest.get_u8() } else { 0 }
    }

    pub fn i8(&mut self) -> i8 {
        if self.take(1) { self.rest.get_i8() } else { 0 }
    }

    pub fn u16(&mut self) -> u16 {
        if self.take(2) { self.rest.get_u16_le() } else { 0 }
    }

    pub fn i16(&mut self) -> i16 {
        if self.take(2) { self.rest.get_i16_le() } else { 0 }
    }

    pub fn u32(&mut self) -> u32 {
        if self.take(4) { self.rest.get_u32_le() } else { 0 }
    }

    pub fn i32(&mut self) -> i32 {
        if self.take(4) { self.rest.get_i32_le() } else { 0 }
    }

    pub fn f32(&mut self) -> f32 {
        if self.take(4) { self.rest.get_f32_le() } else { 0.0 }
    }

    /// Reads up to the next NUL. An unterminated string reads as empty and
    /// exhausts the cursor. Invalid UTF-8 is replaced, not rejected.
    pub fn string(&mut self) -> String {
        match self.rest.iter().position(|&b| b == 0) {
            Some(end) => {
                let value = String::from_utf8_lossy(&self.rest[..end]).into_owned();
                self.rest.advance(end + 1);
                value
            }
            None => {
                self.overrun = true;
                self.rest = &[];
                String::new()
            }
        }
    }

    /// Reads a dynamically typed field.
    pub fn field(&mut self, field_type: FieldType) -> Field {
        match field_type {
            FieldType::U8 => Field::U8(self.u8()),
            FieldType::I8 => Field::I8(self.i8()),
            FieldType::U16 => Field::U16(self.u16()),
            FieldType::I16 => Field::I16(self.i16()),
            FieldType::U32 => Field::U32(self.u32()),
            FieldType::I32 => Field::I32(self.i32()),
            FieldType::F32 => Field::F32(self.f32()),
            FieldType::Str => Field::Str(self.string()),
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    /// Whether any read ran past the end of the message.
    pub fn overrun(&self) -> bool {
        self.overrun
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn field_strategy() -> impl Strategy<Value = Field> {
        prop_oneof![
            any::<u8>().prop_map(Field::U8),
            any::<i8>().prop_map(Field::I8),
            any::<u16>().prop_map(Field::U16),
            any::<i16>().prop_map(Field::I16),
            any::<u32>().prop_map(Field::U32),
            any::<i32>().prop_map(Field::I32),
            any::<f32>()
                .prop_filter("NaN never compares equal", |v| !v.is_nan())
                .prop_map(Field::F32),
            "[^\\x00]{0,12}".prop_map(Field::Str),
        ]
    }

    proptest! {
        #[test]
        fn test_fields_survive_encode_decode(
            token in any::<u8>(),
            fields in prop::collection::vec(field_strategy(), 0..48),
        ) {
            let mut writer = MessageWriter::new(token);
            for field in &fields {
                writer.field(field);
            }
            let packet = writer.finish().unwrap();
            prop_assert_eq!(packet.token(), token);

            let mut reader = packet.reader();
            let decoded: Vec<Field> = fields
                .iter()
                .map(|f| reader.field(f.field_type()))
                .collect();
            prop_assert_eq!(decoded, fields);
            prop_assert_eq!(reader.remaining(), 0);
            prop_assert!(!reader.overrun());
        }
    }

    #[test]
    fn test_length_prefix_counts_whole_message() {
        let mut writer = MessageWriter::new(9);
        writer.u16(0x1234).string("ab");
        let packet = writer.finish().unwrap();
        assert_eq!(packet.as_bytes(), &[8, 0, 9, 0x34, 0x12, b'a', b'b', 0]);
        assert_eq!(packet.len(), 8);
    }

    #[test]
    fn test_little_endian_regardless_of_host() {
        let mut writer = MessageWriter::new(1);
        writer.u32(0x0102_0304).i16(-2).f32(1.0);
        let packet = writer.finish().unwrap();
        assert_eq!(&packet.payload()[..4], &[4, 3, 2, 1]);
        assert_eq!(&packet.payload()[4..6], &[0xfe, 0xff]);
        assert_eq!(&packet.payload()[6..], &1.0f32.to_bits().to_le_bytes());
    }

    #[test]
    fn test_overflow_produces_no_message() {
        let mut writer = MessageWriter::new(1);
        for _ in 0..MESSAGE_MAX {
            writer.u8(0xaa);
        }
        let err = writer.finish().unwrap_err();
        assert_eq!(
            err,
            CodecError::Overflow {
                size: MESSAGE_MAX + MESSAGE_MIN,
                max: MESSAGE_MAX,
            }
        );
    }

    #[test]
    fn test_message_at_capacity_is_accepted() {
        let mut writer = MessageWriter::new(1);
        for _ in 0..MESSAGE_MAX - MESSAGE_MIN {
            writer.u8(1);
        }
        let packet = writer.finish().unwrap();
        assert_eq!(packet.len(), MESSAGE_MAX);
    }

    #[test]
    fn test_read_past_end_yields_zero() {
        let mut writer = MessageWriter::new(1);
        writer.u8(7);
        let packet = writer.finish().unwrap();
        let mut reader = packet.reader();
        assert_eq!(reader.u8(), 7);
        assert!(!reader.overrun());
        assert_eq!(reader.u32(), 0);
        assert_eq!(reader.i16(), 0);
        assert_eq!(reader.f32(), 0.0);
        assert_eq!(reader.string(), "");
        assert!(reader.overrun());
    }

    #[test]
    fn test_short_read_exhausts_cursor() {
        let mut reader = MessageReader::new(&[1, 2, 3]);
        assert_eq!(reader.u32(), 0);
        assert_eq!(reader.u8(), 0);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_unterminated_string_reads_empty() {
        let mut reader = MessageReader::new(b"abc");
        assert_eq!(reader.string(), "");
        assert!(reader.overrun());
    }

    #[test]
    fn test_embedded_nul_truncates_string() {
        let mut writer = MessageWriter::new(1);
        writer.string("abc\0def").u8(5);
        let packet = writer.finish().unwrap();
        let mut reader = packet.reader();
        assert_eq!(reader.string(), "abc");
        assert_eq!(reader.u8(), 5);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut reader = MessageReader::new(&[0xff, b'x', 0]);
        assert_eq!(reader.string(), "\u{fffd}x");
    }
}

//! In-memory argument and result blocks
//!
//! A block is the concatenation of its fields' encodings. Proxies and stubs
//! build blocks with [`BlockEncoder`] and take them apart with
//! [`BlockDecoder`], which never touches the transport.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::codec::{decode_word, encode_word, WireWord};
use super::{StatusCode, TERMINATOR, WORD_SIZE};

/// Malformed block contents
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("block exhausted: field needs {needed} bytes, {remaining} left")]
    Exhausted { needed: usize, remaining: usize },

    #[error("{remaining} unconsumed bytes at end of block")]
    Trailing { remaining: usize },

    #[error("no terminator within the remaining {remaining} bytes")]
    Unterminated { remaining: usize },

    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

impl ExtractError {
    /// Status code reported to the peer for this failure
    pub fn status(&self) -> StatusCode {
        match self {
            ExtractError::Exhausted { .. } => StatusCode::TooFewBytes,
            ExtractError::Trailing { .. } => StatusCode::TooManyBytes,
            ExtractError::Unterminated { .. } | ExtractError::InvalidUtf8 => {
                StatusCode::ScrambledBytes
            }
        }
    }
}

/// Builds a block field by field
#[derive(Debug, Default)]
pub struct BlockEncoder {
    buf: BytesMut,
}

impl BlockEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_word<W: WireWord>(&mut self, value: W) {
        self.buf.put_slice(&encode_word(value));
    }

    pub fn put_u32(&mut self, value: u32) {
        self.put_word(value);
    }

    pub fn put_i32(&mut self, value: i32) {
        self.put_word(value);
    }

    pub fn put_f32(&mut self, value: f32) {
        self.put_word(value);
    }

    /// String bytes followed by one terminator
    pub fn put_string(&mut self, s: &str) {
        self.buf.put_slice(s.as_bytes());
        self.buf.put_u8(TERMINATOR);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over a block that has already been received in full
#[derive(Debug)]
pub struct BlockDecoder<'a> {
    buf: &'a [u8],
}

impl<'a> BlockDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn extract_word<W: WireWord>(&mut self) -> Result<W, ExtractError> {
        if self.buf.remaining() < WORD_SIZE {
            return Err(ExtractError::Exhausted {
                needed: WORD_SIZE,
                remaining: self.buf.remaining(),
            });
        }
        let mut word = [0u8; WORD_SIZE];
        self.buf.copy_to_slice(&mut word);
        Ok(decode_word(word))
    }

    pub fn extract_u32(&mut self) -> Result<u32, ExtractError> {
        self.extract_word()
    }

    pub fn extract_i32(&mut self) -> Result<i32, ExtractError> {
        self.extract_word()
    }

    pub fn extract_f32(&mut self) -> Result<f32, ExtractError> {
        self.extract_word()
    }

    /// Take bytes up to and including the next terminator
    pub fn extract_string(&mut self) -> Result<String, ExtractError> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == TERMINATOR)
            .ok_or(ExtractError::Unterminated {
                remaining: self.buf.remaining(),
            })?;

        let s = std::str::from_utf8(&self.buf[..end])
            .map_err(|_| ExtractError::InvalidUtf8)?
            .to_string();
        self.buf.advance(end + 1);
        Ok(s)
    }

    /// The block must be consumed exactly
    pub fn finish(self) -> Result<(), ExtractError> {
        match self.buf.remaining() {
            0 => Ok(()),
            remaining => Err(ExtractError::Trailing { remaining }),
        }
    }
}

/// Decode a whole block into `D` and check that nothing is left over
pub fn decode_block<D: WireDecode>(block: &[u8]) -> Result<D, ExtractError> {
    let mut dec = BlockDecoder::new(block);
    let value = D::decode(&mut dec)?;
    dec.finish()?;
    Ok(value)
}

/// Encode `value` into a fresh block
pub fn encode_block<E: WireEncode + ?Sized>(value: &E) -> Bytes {
    let mut enc = BlockEncoder::new();
    value.encode(&mut enc);
    enc.finish()
}

/// Status a receiver reports for a decode attempt
pub fn block_status<T>(result: &Result<T, ExtractError>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::GoodBytes,
        Err(e) => e.status(),
    }
}

/// Values that can be appended to a block
pub trait WireEncode {
    /// `()` marks a procedure without a result block
    const VOID: bool = false;

    fn encode(&self, enc: &mut BlockEncoder);

    /// Encode and record the byte length of each argument slot
    fn encode_slots(&self, enc: &mut BlockEncoder, slots: &mut Vec<u32>) {
        let start = enc.len();
        self.encode(enc);
        slots.push((enc.len() - start) as u32);
    }
}

/// Values that can be read back out of a block
pub trait WireDecode: Sized {
    fn decode(dec: &mut BlockDecoder<'_>) -> Result<Self, ExtractError>;
}

/// Human-readable type names, used to describe procedures
pub trait WireType {
    fn wire_type() -> String;

    fn slot_types(out: &mut Vec<String>) {
        out.push(Self::wire_type());
    }
}

macro_rules! word_impl {
    ($ty:ty, $name:expr) => {
        impl WireEncode for $ty {
            fn encode(&self, enc: &mut BlockEncoder) {
                enc.put_word(*self);
            }
        }

        impl WireDecode for $ty {
            fn decode(dec: &mut BlockDecoder<'_>) -> Result<Self, ExtractError> {
                dec.extract_word()
            }
        }

        impl WireType for $ty {
            fn wire_type() -> String {
                $name.to_string()
            }
        }
    };
}

word_impl!(u32, "u32");
word_impl!(i32, "i32");
word_impl!(f32, "f32");

impl WireEncode for String {
    fn encode(&self, enc: &mut BlockEncoder) {
        enc.put_string(self);
    }
}

impl WireEncode for str {
    fn encode(&self, enc: &mut BlockEncoder) {
        enc.put_string(self);
    }
}

impl WireDecode for String {
    fn decode(dec: &mut BlockDecoder<'_>) -> Result<Self, ExtractError> {
        dec.extract_string()
    }
}

impl WireType for String {
    fn wire_type() -> String {
        "string".to_string()
    }
}

impl WireEncode for () {
    const VOID: bool = true;

    fn encode(&self, _enc: &mut BlockEncoder) {}

    fn encode_slots(&self, _enc: &mut BlockEncoder, _slots: &mut Vec<u32>) {}
}

impl WireDecode for () {
    fn decode(_dec: &mut BlockDecoder<'_>) -> Result<Self, ExtractError> {
        Ok(())
    }
}

impl WireType for () {
    fn wire_type() -> String {
        "void".to_string()
    }

    fn slot_types(_out: &mut Vec<String>) {}
}

impl<T: WireEncode, const N: usize> WireEncode for [T; N] {
    fn encode(&self, enc: &mut BlockEncoder) {
        for item in self {
            item.encode(enc);
        }
    }
}

impl<T: WireDecode, const N: usize> WireDecode for [T; N] {
    fn decode(dec: &mut BlockDecoder<'_>) -> Result<Self, ExtractError> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::decode(dec)?);
        }
        items.try_into().map_err(|items: Vec<T>| ExtractError::Exhausted {
            needed: N,
            remaining: items.len(),
        })
    }
}

impl<T: WireType, const N: usize> WireType for [T; N] {
    fn wire_type() -> String {
        format!("{}[{}]", T::wire_type(), N)
    }
}

// Tuples are argument lists: one slot per element.
macro_rules! tuple_impl {
    ($($name:ident)+) => {
        #[allow(non_snake_case)]
        impl<$($name: WireEncode),+> WireEncode for ($($name,)+) {
            fn encode(&self, enc: &mut BlockEncoder) {
                let ($($name,)+) = self;
                $($name.encode(enc);)+
            }

            fn encode_slots(&self, enc: &mut BlockEncoder, slots: &mut Vec<u32>) {
                let ($($name,)+) = self;
                $($name.encode_slots(enc, slots);)+
            }
        }

        impl<$($name: WireDecode),+> WireDecode for ($($name,)+) {
            fn decode(dec: &mut BlockDecoder<'_>) -> Result<Self, ExtractError> {
                Ok(($($name::decode(dec)?,)+))
            }
        }

        impl<$($name: WireType),+> WireType for ($($name,)+) {
            fn wire_type() -> String {
                let mut parts = Vec::new();
                Self::slot_types(&mut parts);
                format!("({})", parts.join(", "))
            }

            fn slot_types(out: &mut Vec<String>) {
                $(out.push($name::wire_type());)+
            }
        }
    };
}

tuple_impl!(A);
tuple_impl!(A B);
tuple_impl!(A B C);
tuple_impl!(A B C D);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_in_declared_order() {
        let mut enc = BlockEncoder::new();
        enc.put_u32(21);
        enc.put_string("ab");
        enc.put_f32(-0.0);
        let block = enc.finish();

        assert_eq!(&block[..4], &[0, 0, 0, 21]);
        assert_eq!(&block[4..7], b"ab\0");

        let mut dec = BlockDecoder::new(&block);
        assert_eq!(dec.extract_u32().unwrap(), 21);
        assert_eq!(dec.extract_string().unwrap(), "ab");
        assert_eq!(dec.extract_f32().unwrap().to_bits(), (-0.0f32).to_bits());
        dec.finish().unwrap();
    }

    #[test]
    fn test_too_few_and_too_many_are_distinct() {
        let short = [0u8, 0];
        let err = decode_block::<u32>(&short).unwrap_err();
        assert_eq!(err, ExtractError::Exhausted { needed: 4, remaining: 2 });
        assert_eq!(err.status(), StatusCode::TooFewBytes);

        let long = [0u8, 0, 0, 1, 0xAA];
        let err = decode_block::<u32>(&long).unwrap_err();
        assert_eq!(err, ExtractError::Trailing { remaining: 1 });
        assert_eq!(err.status(), StatusCode::TooManyBytes);
    }

    #[test]
    fn test_unterminated_string_is_scrambled() {
        let err = decode_block::<String>(b"abc").unwrap_err();
        assert_eq!(err.status(), StatusCode::ScrambledBytes);

        let err = decode_block::<String>(&[0xFF, 0xFE, 0]).unwrap_err();
        assert_eq!(err, ExtractError::InvalidUtf8);
    }

    #[test]
    fn test_tuple_records_one_slot_per_argument() {
        let mut enc = BlockEncoder::new();
        let mut slots = Vec::new();
        (7i32, "hey".to_string(), [1u32, 2]).encode_slots(&mut enc, &mut slots);

        assert_eq!(slots, vec![4, 4, 8]);
        assert_eq!(enc.len(), 16);
    }

    #[test]
    fn test_array_and_tuple_decode() {
        let block = encode_block(&([3u32, 4, 5], -9i32));
        let (arr, n): ([u32; 3], i32) = decode_block(&block).unwrap();
        assert_eq!(arr, [3, 4, 5]);
        assert_eq!(n, -9);
    }

    #[test]
    fn test_void_has_no_slots() {
        let mut enc = BlockEncoder::new();
        let mut slots = Vec::new();
        ().encode_slots(&mut enc, &mut slots);

        assert!(slots.is_empty());
        assert!(enc.is_empty());
        assert!(<() as WireEncode>::VOID);
        assert!(!<u32 as WireEncode>::VOID);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(<[f32; 2]>::wire_type(), "f32[2]");
        assert_eq!(<(i32, String)>::wire_type(), "(i32, string)");
        let mut slots = Vec::new();
        <(i32, String)>::slot_types(&mut slots);
        assert_eq!(slots, vec!["i32", "string"]);
    }
}

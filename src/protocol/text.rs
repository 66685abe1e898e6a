//! Text channel framing
//!
//! Two framings are supported:
//!
//! - `LengthPrefixed`: `[len: u32 BE][len bytes of UTF-8]`. Survives TCP
//!   splitting and coalescing.
//! - `Raw`: no framing; whatever a single `read()` returns is one message.
//!   Only correct while messages are short and infrequent. Kept for peers
//!   that speak the legacy protocol.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::MAX_TEXT_MESSAGE;
use crate::error::ProtocolError;

const LEN_PREFIX: usize = 4;

/// How text messages are delimited on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextFraming {
    /// One read is one message
    Raw,
    /// 4-byte big-endian length prefix
    #[default]
    LengthPrefixed,
}

impl fmt::Display for TextFraming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextFraming::Raw => write!(f, "raw"),
            TextFraming::LengthPrefixed => write!(f, "length-prefixed"),
        }
    }
}

impl FromStr for TextFraming {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(TextFraming::Raw),
            "length-prefixed" => Ok(TextFraming::LengthPrefixed),
            other => Err(ProtocolError::UnknownFraming(other.to_string())),
        }
    }
}

/// Frame one message for the wire
pub fn encode_text(framing: TextFraming, payload: &[u8]) -> Result<Bytes, ProtocolError> {
    match framing {
        TextFraming::Raw => Ok(Bytes::copy_from_slice(payload)),
        TextFraming::LengthPrefixed => {
            if payload.len() > MAX_TEXT_MESSAGE {
                return Err(ProtocolError::MessageTooLarge(payload.len()));
            }
            let mut buf = BytesMut::with_capacity(LEN_PREFIX + payload.len());
            buf.put_u32(payload.len() as u32);
            buf.put_slice(payload);
            Ok(buf.freeze())
        }
    }
}

/// Incremental decoder for one text connection
pub struct TextDecoder {
    framing: TextFraming,
    buffer: BytesMut,
}

impl TextDecoder {
    pub fn new(framing: TextFraming) -> Self {
        Self {
            framing,
            buffer: BytesMut::new(),
        }
    }

    pub fn framing(&self) -> TextFraming {
        self.framing
    }

    /// Feed the bytes of one read and take every message they complete
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
        if self.framing == TextFraming::Raw {
            if data.is_empty() {
                return Ok(Vec::new());
            }
            return Ok(vec![Bytes::copy_from_slice(data)]);
        }

        self.buffer.extend_from_slice(data);
        let mut messages = Vec::new();
        loop {
            if self.buffer.len() < LEN_PREFIX {
                break;
            }
            let len = u32::from_be_bytes([
                self.buffer[0],
                self.buffer[1],
                self.buffer[2],
                self.buffer[3],
            ]) as usize;
            if len > MAX_TEXT_MESSAGE {
                return Err(ProtocolError::MessageTooLarge(len));
            }
            if self.buffer.len() < LEN_PREFIX + len {
                break;
            }
            self.buffer.advance(LEN_PREFIX);
            messages.push(self.buffer.split_to(len).freeze());
        }
        Ok(messages)
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_length_prefix_layout() {
        let framed = encode_text(TextFraming::LengthPrefixed, "hi".as_bytes()).unwrap();
        assert_eq!(&framed[..], &[0, 0, 0, 2, b'h', b'i']);
    }

    #[test]
    fn test_raw_read_is_one_message() {
        let mut decoder = TextDecoder::new(TextFraming::Raw);
        let messages = decoder.push("hello there".as_bytes()).unwrap();
        assert_eq!(messages, vec![Bytes::from_static(b"hello there")]);
        assert!(decoder.push(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_coalesced_frames() {
        let mut wire = BytesMut::new();
        wire.extend_from_slice(&encode_text(TextFraming::LengthPrefixed, b"one").unwrap());
        wire.extend_from_slice(&encode_text(TextFraming::LengthPrefixed, b"two").unwrap());

        let mut decoder = TextDecoder::new(TextFraming::LengthPrefixed);
        let messages = decoder.push(&wire).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(&messages[0][..], b"one");
        assert_eq!(&messages[1][..], b"two");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_split_frame_waits_for_rest() {
        let framed = encode_text(TextFraming::LengthPrefixed, "héllo".as_bytes()).unwrap();
        let mut decoder = TextDecoder::new(TextFraming::LengthPrefixed);

        assert!(decoder.push(&framed[..3]).unwrap().is_empty());
        assert!(decoder.push(&framed[3..6]).unwrap().is_empty());
        let messages = decoder.push(&framed[6..]).unwrap();
        assert_eq!(std::str::from_utf8(&messages[0]).unwrap(), "héllo");
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut decoder = TextDecoder::new(TextFraming::LengthPrefixed);
        let len = (MAX_TEXT_MESSAGE as u32 + 1).to_be_bytes();
        assert!(matches!(
            decoder.push(&len),
            Err(ProtocolError::MessageTooLarge(_))
        ));

        let big = vec![b'x'; MAX_TEXT_MESSAGE + 1];
        assert!(encode_text(TextFraming::LengthPrefixed, &big).is_err());
        assert!(encode_text(TextFraming::Raw, &big).is_ok());
    }

    #[test]
    fn test_framing_names() {
        assert_eq!("raw".parse::<TextFraming>().unwrap(), TextFraming::Raw);
        assert_eq!(
            TextFraming::LengthPrefixed.to_string().parse::<TextFraming>().unwrap(),
            TextFraming::LengthPrefixed
        );
        assert!("netstring".parse::<TextFraming>().is_err());
    }

    proptest! {
        #[test]
        fn test_any_split_yields_sent_messages(
            messages in prop::collection::vec(".{0,40}", 1..8),
            cuts in prop::collection::vec(1usize..16, 0..32),
        ) {
            let mut wire = Vec::new();
            for m in &messages {
                wire.extend_from_slice(&encode_text(TextFraming::LengthPrefixed, m.as_bytes()).unwrap());
            }

            let mut decoder = TextDecoder::new(TextFraming::LengthPrefixed);
            let mut decoded = Vec::new();
            let mut rest = &wire[..];
            for cut in cuts {
                let n = cut.min(rest.len());
                let (head, tail) = rest.split_at(n);
                decoded.extend(decoder.push(head).unwrap());
                rest = tail;
            }
            decoded.extend(decoder.push(rest).unwrap());

            let decoded: Vec<String> = decoded
                .iter()
                .map(|b| String::from_utf8(b.to_vec()).unwrap())
                .collect();
            prop_assert_eq!(decoded, messages);
        }
    }
}

use std::fmt::Display;
use std::time::{Duration, SystemTime};

use base64::prelude::BASE64_URL_SAFE;
use base64::Engine;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const TIMESTAMP_BITS: u8 = 64;
const SEQUENCE_BITS: u8 = 16;
const CONTEXT_BITS: u8 = 16;
const RANDOM_BITS: u8 = 32;

const _: () = assert!(TIMESTAMP_BITS + SEQUENCE_BITS + CONTEXT_BITS + RANDOM_BITS == 128);

const TIMESTAMP_OFFSET: u8 = SEQUENCE_OFFSET + SEQUENCE_BITS;
const SEQUENCE_OFFSET: u8 = CONTEXT_OFFSET + CONTEXT_BITS;
const CONTEXT_OFFSET: u8 = RANDOM_BITS;

const _: () = assert!(128 == TIMESTAMP_OFFSET + TIMESTAMP_BITS);

const TIMESTAMP_MASK: u128 = (1 << TIMESTAMP_BITS) - 1;
const SEQUENCE_MASK: u128 = (1 << SEQUENCE_BITS) - 1;
const CONTEXT_MASK: u128 = (1 << CONTEXT_BITS) - 1;
const RANDOM_MASK: u128 = (1 << RANDOM_BITS) - 1;

/// Correlates handshake sessions, calls and their responses across windows. `context` tells apart
/// the window contexts generating ids on the same millisecond
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub struct MessageId {
    timestamp: SystemTime,
    sequence: u16,
    context: u16,
    random: u32,
}

impl MessageId {
    pub fn as_base64(&self) -> String {
        let id: u128 = (*self).into();
        BASE64_URL_SAFE.encode(id.to_be_bytes())
    }

    pub fn from_base64(base64: &str) -> Option<Self> {
        let bytes = BASE64_URL_SAFE.decode(base64).ok()?;
        let bytes: [u8; 16] = bytes.try_into().ok()?;
        Some(u128::from_be_bytes(bytes).into())
    }

    pub fn as_hex(&self) -> String {
        format!("{:032x}", u128::from(*self))
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 32 {
            return None;
        }
        let id = u128::from_str_radix(hex, 16).ok()?;
        Some(id.into())
    }

    pub fn context(&self) -> u16 {
        self.context
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl From<u128> for MessageId {
    fn from(id: u128) -> Self {
        Self {
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_millis(((id >> TIMESTAMP_OFFSET) & TIMESTAMP_MASK) as u64),
            sequence: ((id >> SEQUENCE_OFFSET) & SEQUENCE_MASK) as u16,
            context: ((id >> CONTEXT_OFFSET) & CONTEXT_MASK) as u16,
            random: (id & RANDOM_MASK) as u32,
        }
    }
}

impl From<MessageId> for u128 {
    fn from(id: MessageId) -> u128 {
        let millis = id.timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        (millis & TIMESTAMP_MASK) << TIMESTAMP_OFFSET |
            (id.sequence as u128) << SEQUENCE_OFFSET |
            (id.context as u128) << CONTEXT_OFFSET |
            id.random as u128
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_hex())
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = <String>::deserialize(deserializer)?;
        MessageId::from_hex(&hex).ok_or_else(|| serde::de::Error::custom("invalid message id"))
    }
}

pub struct MessageIdGenerator {
    timestamp: u64,
    sequence: u16,
    context: u16,
    rng: StdRng,
}

impl MessageIdGenerator {
    pub fn new(context: u16) -> Self {
        Self {
            timestamp: 0,
            sequence: 0,
            context,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn generate(&mut self) -> MessageId {
        self.generate_bits().into()
    }

    fn generate_bits(&mut self) -> u128 {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        let sequence = if timestamp == self.timestamp {
            self.sequence.wrapping_add(1)
        } else {
            0
        };
        self.timestamp = timestamp;
        self.sequence = sequence;
        let random = self.rng.gen::<u32>();
        (timestamp as u128) << TIMESTAMP_OFFSET |
            (sequence as u128) << SEQUENCE_OFFSET |
            (self.context as u128) << CONTEXT_OFFSET |
            random as u128
    }
}

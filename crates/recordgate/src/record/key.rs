//! Record identifiers.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

/// Types usable as a record's `_id`.
pub trait RecordKey:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Returns `true` for the "no identifier yet" value of this type.
    fn is_unset(&self) -> bool;

    /// Generates a fresh identifier, or `None` if the type cannot.
    fn generate() -> Option<Self>;
}

impl RecordKey for String {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }

    fn generate() -> Option<Self> {
        Some(RecordId::new().to_string())
    }
}

impl RecordKey for RecordId {
    fn is_unset(&self) -> bool {
        self.0 == [0; 12]
    }

    fn generate() -> Option<Self> {
        Some(RecordId::new())
    }
}

impl RecordKey for Uuid {
    fn is_unset(&self) -> bool {
        self.is_nil()
    }

    fn generate() -> Option<Self> {
        Some(Uuid::new_v4())
    }
}

impl RecordKey for Value {
    fn is_unset(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    fn generate() -> Option<Self> {
        Some(Value::String(RecordId::new().to_string()))
    }
}

macro_rules! integer_keys {
    ($($ty:ty),*) => {
        $(
            impl RecordKey for $ty {
                fn is_unset(&self) -> bool {
                    *self == 0
                }

                fn generate() -> Option<Self> {
                    None
                }
            }
        )*
    };
}

integer_keys!(i32, i64, u32, u64);

/// A 12-byte, roughly time-ordered identifier.
///
/// Layout: 4-byte big-endian unix seconds, 5 bytes of per-process randomness
/// and a 3-byte counter. Rendered as 24 lowercase hex characters.
///
/// ```
/// use recordgate::record::RecordId;
///
/// let id = RecordId::new();
/// let text = id.to_string();
/// assert_eq!(text.len(), 24);
/// assert_eq!(text.parse::<RecordId>().unwrap(), id);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RecordId([u8; 12]);

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

impl RecordId {
    /// Generates a new identifier.
    pub fn new() -> Self {
        let seconds = chrono::Utc::now().timestamp() as u32;
        let process = PROCESS_UNIQUE.get_or_init(|| {
            let random = Uuid::new_v4();
            let mut bytes = [0u8; 5];
            bytes.copy_from_slice(&random.as_bytes()[..5]);
            bytes
        });
        let counter = COUNTER
            .get_or_init(|| {
                let random = Uuid::new_v4();
                let b = random.as_bytes();
                AtomicU32::new(u32::from_be_bytes([0, b[0], b[1], b[2]]))
            })
            .fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Returns the embedded creation time in whole seconds.
    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        let seconds = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        chrono::DateTime::from_timestamp(i64::from(seconds), 0).unwrap_or_default()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self)
    }
}

/// Error returned when parsing a malformed [`RecordId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid record id '{0}': expected 24 hex characters")]
pub struct ParseRecordIdError(String);

impl FromStr for RecordId {
    type Err = ParseRecordIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ParseRecordIdError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

//! Audit capabilities: creation and modification timestamps.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored name of the creation timestamp.
pub const CREATED_DATE_FIELD: &str = "CreatedDate";

/// Stored name of the modification timestamp.
pub const MODIFIED_DATE_FIELD: &str = "ModifiedDate";

/// Creation and modification timestamps, embedded in audited records.
///
/// Embed with `#[serde(flatten)]` so the two fields sit at the document root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditStamps {
    /// Set once, on the first save.
    #[serde(rename = "CreatedDate", default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,

    /// Set on every save.
    #[serde(rename = "ModifiedDate", default, skip_serializing_if = "Option::is_none")]
    pub modified_date: Option<DateTime<Utc>>,
}

impl AuditStamps {
    /// Applies a save at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if self.created_date.is_none() {
            self.created_date = Some(now);
        }
        self.modified_date = Some(now);
    }
}

/// Records whose creation and modification are audited.
pub trait Audited {
    /// Returns the record's stamps.
    fn audit_stamps(&self) -> &AuditStamps;

    /// Returns the record's stamps for update.
    fn audit_stamps_mut(&mut self) -> &mut AuditStamps;
}

/// Records that carry creation and modification timestamps.
pub trait TimeStamped {
    /// Returns the record's stamps.
    fn timestamps(&self) -> &AuditStamps;

    /// Returns the record's stamps for update.
    fn timestamps_mut(&mut self) -> &mut AuditStamps;
}

/// Which audit capability a record type declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditKind {
    /// Declared through [`Audited`].
    Audited,
    /// Declared through [`TimeStamped`].
    TimeStamped,
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditKind::Audited => write!(f, "audited"),
            AuditKind::TimeStamped => write!(f, "timestamped"),
        }
    }
}

/// Capability descriptor of a record type.
///
/// Returned by [`Record::capabilities`](super::Record::capabilities) and
/// captured once when a manager is built. The audited constructors only exist
/// when the record type implements the matching trait.
///
/// ```ignore
/// impl Record for Invoice {
///     type Id = RecordId;
///     fn capabilities() -> Capabilities<Self> {
///         Capabilities::audited()
///     }
///     // ...
/// }
/// ```
pub struct Capabilities<T> {
    audit: Option<(AuditKind, fn(&mut T) -> &mut AuditStamps)>,
}

impl<T> Capabilities<T> {
    /// No optional capabilities.
    pub const fn none() -> Self {
        Self { audit: None }
    }

    /// Returns the declared audit capability, if any.
    pub fn audit_kind(&self) -> Option<AuditKind> {
        self.audit.map(|(kind, _)| kind)
    }

    /// Returns `true` if saves maintain `CreatedDate`/`ModifiedDate`.
    pub fn is_audited(&self) -> bool {
        self.audit.is_some()
    }

    /// Returns the stamps of `record` when the type is audited.
    pub fn stamps_mut<'a>(&self, record: &'a mut T) -> Option<&'a mut AuditStamps> {
        self.audit.map(|(_, access)| access(record))
    }
}

impl<T: Audited> Capabilities<T> {
    /// Capability set of an [`Audited`] record.
    pub fn audited() -> Self {
        let access: fn(&mut T) -> &mut AuditStamps = <T as Audited>::audit_stamps_mut;
        Self {
            audit: Some((AuditKind::Audited, access)),
        }
    }
}

impl<T: TimeStamped> Capabilities<T> {
    /// Capability set of a [`TimeStamped`] record.
    pub fn timestamped() -> Self {
        let access: fn(&mut T) -> &mut AuditStamps = <T as TimeStamped>::timestamps_mut;
        Self {
            audit: Some((AuditKind::TimeStamped, access)),
        }
    }
}

impl<T> Clone for Capabilities<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Capabilities<T> {}

impl<T> Default for Capabilities<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> fmt::Debug for Capabilities<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("audit", &self.audit_kind())
            .finish()
    }
}

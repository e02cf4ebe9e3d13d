//! Record types used across the integration tests.

use recordgate::query::{IndexKeys, IndexModel};
use recordgate::record::{AuditStamps, Audited, Capabilities, Record, RecordId};
use recordgate::record_fields;
use serde::{Deserialize, Serialize};

/// A person with a nested address and a list of children.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Person {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "LastName")]
    pub last_name: String,
    #[serde(rename = "Age")]
    pub age: u32,
    #[serde(rename = "Address", default)]
    pub address: Address,
    #[serde(rename = "Children", default)]
    pub children: Vec<Child>,
}

/// A postal address embedded in [`Person`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "Zip")]
    pub zip: String,
}

/// A child embedded in [`Person`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Child {
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "LastName")]
    pub last_name: String,
}

record_fields! {
    Person {
        FIRST_NAME: String => "FirstName",
        LAST_NAME: String => "LastName",
        AGE: u32 => "Age",
        ADDRESS: Address => "Address",
        CHILDREN: Vec<Child> => "Children",
    }
    Address {
        CITY: String => "City",
        ZIP: String => "Zip",
    }
    Child {
        FIRST_NAME: String => "FirstName",
        LAST_NAME: String => "LastName",
    }
}

impl Record for Person {
    type Id = RecordId;

    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn indexes() -> Vec<IndexModel> {
        vec![IndexModel::new(
            IndexKeys::ascending(Person::LAST_NAME).then_descending(Person::AGE),
        )]
    }
}

impl Person {
    /// A person without an id, address or children.
    pub fn new(first_name: &str, last_name: &str, age: u32) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            age,
            ..Self::default()
        }
    }

    /// Sets the address.
    pub fn living_in(mut self, city: &str, zip: &str) -> Self {
        self.address = Address {
            city: city.to_string(),
            zip: zip.to_string(),
        };
        self
    }

    /// Adds a child.
    pub fn with_child(mut self, first_name: &str, last_name: &str) -> Self {
        self.children.push(Child {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        });
        self
    }
}

/// The family used by most manager tests.
pub fn family() -> Vec<Person> {
    vec![
        Person::new("Ada", "Lovelace", 36)
            .living_in("London", "W1")
            .with_child("Byron", "King"),
        Person::new("Grace", "Hopper", 85).living_in("Arlington", "22201"),
        Person::new("Alan", "Turing", 41).living_in("Wilmslow", "SK9"),
    ]
}

/// An audited work-queue item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Priority")]
    pub priority: i32,
    #[serde(rename = "Attempts", default)]
    pub attempts: u32,
    #[serde(flatten)]
    pub stamps: AuditStamps,
}

record_fields! {
    WorkItem {
        STATE: String => "State",
        PRIORITY: i32 => "Priority",
        ATTEMPTS: u32 => "Attempts",
    }
}

impl Audited for WorkItem {
    fn audit_stamps(&self) -> &AuditStamps {
        &self.stamps
    }

    fn audit_stamps_mut(&mut self) -> &mut AuditStamps {
        &mut self.stamps
    }
}

impl Record for WorkItem {
    type Id = RecordId;
    const COLLECTION: Option<&'static str> = Some("work_items");

    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn capabilities() -> Capabilities<Self> {
        Capabilities::audited()
    }
}

impl WorkItem {
    /// A pending item.
    pub fn pending(priority: i32) -> Self {
        Self {
            state: "pending".to_string(),
            priority,
            ..Self::default()
        }
    }
}

/// A record keyed by a caller-chosen string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    #[serde(rename = "_id")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl Record for Setting {
    type Id = String;

    fn id(&self) -> Option<&String> {
        Some(&self.key)
    }

    fn set_id(&mut self, id: String) {
        self.key = id;
    }
}

impl Setting {
    /// A setting.
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

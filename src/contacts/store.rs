//! The narrow interface the contact cache reads the device address book through

use crate::contacts::{ContactId, FieldClass, GroupId, PhoneKind, PostalAddress};
use crate::error::Result;

/// One data row of a raw contact, as the local storage returns it
#[derive(Clone, Debug, PartialEq)]
pub enum DataRow {
    Name {
        first: Option<String>,
        middle: Option<String>,
        last: Option<String>,
        display: Option<String>,
    },
    Nickname(String),
    Organization {
        company: Option<String>,
        title: Option<String>,
    },
    Note(String),
    Phone { number: String, kind: PhoneKind },
    Email { address: String, class: FieldClass },
    Address(PostalAddress),
    Website { url: String, class: FieldClass },
    GroupMembership(GroupId),
    /// The identifier the remote side knows this contact by, if any
    Uid(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawContact {
    pub id: ContactId,
    pub rows: Vec<DataRow>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawGroup {
    pub id: GroupId,
    pub title: String,
    /// Groups marked as deleted are still returned by some storages until they are purged
    pub deleted: bool,
}

/// Where local contacts come from.
///
/// Queries are expected to be quick local reads, hence synchronous.
pub trait LocalContactStore: Send + Sync {
    fn query_contacts(&self) -> Result<Vec<RawContact>>;
    fn query_groups(&self) -> Result<Vec<RawGroup>>;
}

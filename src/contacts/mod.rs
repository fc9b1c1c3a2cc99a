//! Contacts as they are uploaded to the merge service, and the local cache they are read from

use serde::{Deserialize, Serialize};

pub mod capping;
pub mod store;
pub use store::{DataRow, LocalContactStore, RawContact, RawGroup};
pub mod group_method;
pub use group_method::GroupMethod;
pub mod cache;
pub use cache::LocalContactCache;

pub type ContactId = i64;
pub type GroupId = i64;

/// The group id that means "every contact"
pub const ALL_CONTACTS: GroupId = -1;

/// Whether a field belongs to the private or the business side of a contact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldClass {
    Private,
    Business,
}

impl Default for FieldClass {
    fn default() -> Self {
        FieldClass::Private
    }
}

/// The buckets phone numbers are capped in, independently from each other
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhoneBucket {
    Plain,
    Mobile,
    Fax,
    Voip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhoneKind {
    Home,
    Work,
    Mobile,
    WorkMobile,
    Fax,
    WorkFax,
    Voip,
    WorkVoip,
    Other,
}

impl PhoneKind {
    pub fn class(&self) -> FieldClass {
        match self {
            PhoneKind::Work | PhoneKind::WorkMobile | PhoneKind::WorkFax | PhoneKind::WorkVoip => FieldClass::Business,
            _ => FieldClass::Private,
        }
    }

    pub fn bucket(&self) -> PhoneBucket {
        match self {
            PhoneKind::Home | PhoneKind::Work | PhoneKind::Other => PhoneBucket::Plain,
            PhoneKind::Mobile | PhoneKind::WorkMobile => PhoneBucket::Mobile,
            PhoneKind::Fax | PhoneKind::WorkFax => PhoneBucket::Fax,
            PhoneKind::Voip | PhoneKind::WorkVoip => PhoneBucket::Voip,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Phone {
    pub number: String,
    pub kind: PhoneKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub address: String,
    pub class: FieldClass,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub class: FieldClass,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebPage {
    pub url: String,
    pub class: FieldClass,
}

/// A contact, once shaped for upload
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub uid: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub nickname: Option<String>,
    pub organization: Option<String>,
    pub job_title: Option<String>,
    pub note: Option<String>,
    pub phones: Vec<Phone>,
    pub emails: Vec<Email>,
    pub addresses: Vec<PostalAddress>,
    pub web_pages: Vec<WebPage>,
    /// Ids of the groups this contact is a member of
    #[serde(skip)]
    pub groups: Vec<GroupId>,
    /// Group names, for address books that store groups as categories
    pub categories: Vec<String>,
}

impl Contact {
    pub fn new(id: ContactId) -> Self {
        Self { id, ..Self::default() }
    }

    /// The key contacts are sorted by: last name, then first name, case-insensitively
    pub fn sort_key(&self) -> (String, String) {
        (
            self.last_name.as_deref().unwrap_or("").to_lowercase(),
            self.first_name.as_deref().unwrap_or("").to_lowercase(),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub contact_count: usize,
}

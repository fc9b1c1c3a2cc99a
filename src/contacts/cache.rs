//! An in-memory mirror of the device address book
//!
//! The mirror is built from the [`LocalContactStore`] on first access, and is served as-is until it is [invalidated](LocalContactCache::invalidate).
//! Every contact is shaped for upload while the mirror is built: scalar fields are truncated and multi-valued fields are capped.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::config::ContactLimits;
use crate::contacts::capping::{cap_by_class, cap_phones};
use crate::contacts::{Contact, ContactId, Email, Group, GroupId, GroupMethod, Phone, PostalAddress, WebPage, ALL_CONTACTS};
use crate::contacts::store::{DataRow, LocalContactStore, RawContact};
use crate::error::Result;
use crate::utils::truncate_chars;

#[derive(Debug, Default)]
struct CachedData {
    contacts: BTreeMap<ContactId, Contact>,
    groups: HashMap<GroupId, Group>,
    /// Members of every group
    index: HashMap<GroupId, Vec<ContactId>>,
}

/// A lazily built, explicitly invalidated, cache of local contacts and groups
pub struct LocalContactCache {
    store: Arc<dyn LocalContactStore>,
    limits: ContactLimits,
    method: GroupMethod,
    data: Mutex<Option<Arc<CachedData>>>,
}

impl LocalContactCache {
    pub fn new(store: Arc<dyn LocalContactStore>, limits: ContactLimits, method: GroupMethod) -> Self {
        Self {
            store,
            limits,
            method,
            data: Mutex::new(None),
        }
    }

    pub fn group_method(&self) -> GroupMethod {
        self.method
    }

    /// Whether the next access will read the store
    pub fn is_stale(&self) -> bool {
        self.data.lock().unwrap().is_none()
    }

    /// Drop the mirror. It will be rebuilt on next access.
    pub fn invalidate(&self) {
        log::debug!("Invalidating the contact cache");
        *self.data.lock().unwrap() = None;
    }

    /// Every contact (when `group` is `None` or [`ALL_CONTACTS`]) or the members of a group, sorted by last name then first name
    pub fn all_contacts(&self, group: Option<GroupId>) -> Result<Vec<Contact>> {
        let data = self.data()?;
        let mut contacts: Vec<Contact> = match group {
            None | Some(ALL_CONTACTS) => data.contacts.values().cloned().collect(),
            Some(group) => data.index.get(&group)
                .map(|members| members.iter().filter_map(|id| data.contacts.get(id)).cloned().collect())
                .unwrap_or_default(),
        };
        contacts.sort_by_key(|contact| contact.sort_key());
        Ok(contacts)
    }

    /// The members of any of `groups`, each contact once, sorted like [`Self::all_contacts`]
    pub fn contacts_in_groups(&self, groups: &[GroupId]) -> Result<Vec<Contact>> {
        if groups.contains(&ALL_CONTACTS) {
            return self.all_contacts(None);
        }

        let data = self.data()?;
        let ids: BTreeSet<ContactId> = groups.iter()
            .filter_map(|group| data.index.get(group))
            .flatten()
            .copied()
            .collect();
        let mut contacts: Vec<Contact> = ids.iter()
            .filter_map(|id| data.contacts.get(id))
            .cloned()
            .collect();
        contacts.sort_by_key(|contact| contact.sort_key());
        Ok(contacts)
    }

    pub fn contact(&self, id: ContactId) -> Result<Option<Contact>> {
        Ok(self.data()?.contacts.get(&id).cloned())
    }

    /// Every group, with its member count, sorted by name
    pub fn groups(&self) -> Result<Vec<Group>> {
        let mut groups: Vec<Group> = self.data()?.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    pub(crate) fn groups_by_id(&self) -> Result<HashMap<GroupId, Group>> {
        Ok(self.data()?.groups.clone())
    }

    fn data(&self) -> Result<Arc<CachedData>> {
        let mut data = self.data.lock().unwrap();
        if let Some(cached) = &*data {
            return Ok(cached.clone());
        }

        let built = Arc::new(self.build()?);
        *data = Some(built.clone());
        Ok(built)
    }

    fn build(&self) -> Result<CachedData> {
        let mut groups = HashMap::new();
        for raw in self.store.query_groups()? {
            if raw.deleted {
                continue;
            }
            let name = truncate_chars(&raw.title, self.limits.max_name_len);
            groups.insert(raw.id, Group { id: raw.id, name, contact_count: 0 });
        }

        let mut contacts = BTreeMap::new();
        let mut index: HashMap<GroupId, Vec<ContactId>> = HashMap::new();
        for raw in self.store.query_contacts()? {
            let mut contact = assemble(raw, &self.limits);
            self.method.verify_contact(&mut contact, &groups);
            // Storages may repeat a membership row, or keep rows of deleted groups
            let memberships: BTreeSet<GroupId> = contact.groups.iter()
                .copied()
                .filter(|id| groups.contains_key(id))
                .collect();
            for group in memberships {
                index.entry(group).or_insert_with(Vec::new).push(contact.id);
            }
            contacts.insert(contact.id, contact);
        }

        self.method.post_process(&mut index, &contacts);
        for (id, group) in groups.iter_mut() {
            group.contact_count = index.get(id).map(|members| members.len()).unwrap_or(0);
        }

        log::info!("Contact cache built: {} contacts, {} groups", contacts.len(), groups.len());
        Ok(CachedData { contacts, groups, index })
    }
}

/// Fold the data rows of a raw contact into a capped, truncated [`Contact`]
fn assemble(raw: RawContact, limits: &ContactLimits) -> Contact {
    let name = |value: Option<String>| value.map(|v| truncate_chars(&v, limits.max_name_len));
    let value = |v: &str| truncate_chars(v, limits.max_value_len);

    let mut contact = Contact::new(raw.id);
    let mut phones = Vec::new();
    let mut emails = Vec::new();
    let mut addresses = Vec::new();
    let mut web_pages = Vec::new();

    for row in raw.rows {
        match row {
            DataRow::Name { first, middle, last, display } => {
                contact.first_name = name(first);
                contact.middle_name = name(middle);
                contact.last_name = name(last);
                contact.display_name = name(display);
            },
            DataRow::Nickname(nickname) => {
                contact.nickname = Some(truncate_chars(&nickname, limits.max_nickname_len));
            },
            DataRow::Organization { company, title } => {
                contact.organization = company.map(|c| truncate_chars(&c, limits.max_organization_len));
                contact.job_title = title.map(|t| truncate_chars(&t, limits.max_organization_len));
            },
            DataRow::Note(note) => {
                contact.note = Some(truncate_chars(&note, limits.max_note_len));
            },
            DataRow::Phone { number, kind } => phones.push(Phone { number: value(&number), kind }),
            DataRow::Email { address, class } => emails.push(Email { address: value(&address), class }),
            DataRow::Address(address) => addresses.push(PostalAddress {
                street: address.street.map(|v| value(&v)),
                city: address.city.map(|v| value(&v)),
                region: address.region.map(|v| value(&v)),
                postal_code: address.postal_code.map(|v| value(&v)),
                country: address.country.map(|v| value(&v)),
                class: address.class,
            }),
            DataRow::Website { url, class } => web_pages.push(WebPage { url: value(&url), class }),
            DataRow::GroupMembership(group) => contact.groups.push(group),
            DataRow::Uid(uid) => contact.uid = Some(uid),
        }
    }

    contact.phones = cap_phones(phones, limits);
    contact.emails = cap_by_class(emails, limits.emails, |email| email.class);
    contact.addresses = cap_by_class(addresses, limits.addresses, |address| address.class);
    contact.web_pages = cap_by_class(web_pages, limits.web_pages, |page| page.class);
    contact
}

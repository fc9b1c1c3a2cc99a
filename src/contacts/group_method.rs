//! How an address book stores group membership

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::contacts::{Contact, ContactId, Group, GroupId};

/// Chosen once per address book
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupMethod {
    /// Groups are category strings carried by each contact
    Categories,
    /// Groups are separate entities, contacts reference them by id
    Structured,
}

impl Default for GroupMethod {
    fn default() -> Self {
        GroupMethod::Structured
    }
}

impl GroupMethod {
    /// Prepare contacts that are about to be sent. `groups` is the current list of groups.
    pub fn before_upload(&self, contacts: &mut [Contact], groups: &HashMap<GroupId, Group>) {
        match self {
            GroupMethod::Categories => {
                for contact in contacts.iter_mut() {
                    contact.categories.retain(|category| category.trim().is_empty() == false);
                    contact.categories.sort();
                    contact.categories.dedup();
                }
            },
            GroupMethod::Structured => {
                for contact in contacts.iter_mut() {
                    let before = contact.groups.len();
                    contact.groups.retain(|id| groups.contains_key(id));
                    if contact.groups.len() != before {
                        log::debug!("Contact {} references groups that no longer exist", contact.id);
                    }
                }
            },
        }
    }

    /// Make a freshly read contact consistent with the known groups
    pub fn verify_contact(&self, contact: &mut Contact, groups: &HashMap<GroupId, Group>) {
        match self {
            GroupMethod::Categories => {
                let mut categories: Vec<String> = contact.groups.iter()
                    .filter_map(|id| groups.get(id))
                    .map(|group| group.name.clone())
                    .collect();
                categories.sort();
                categories.dedup();
                contact.categories = categories;
            },
            GroupMethod::Structured => {
                contact.groups.retain(|id| groups.contains_key(id));
                contact.groups.sort_unstable();
                contact.groups.dedup();
            },
        }
    }

    /// Called once every contact of the address book has been verified.
    ///
    /// `index` maps every existing group to its members, which gives the group counts.
    pub fn post_process(&self, index: &mut HashMap<GroupId, Vec<ContactId>>, contacts: &BTreeMap<ContactId, Contact>) {
        match self {
            GroupMethod::Categories => {},
            GroupMethod::Structured => {
                index.clear();
                for contact in contacts.values() {
                    for group in &contact.groups {
                        index.entry(*group).or_insert_with(Vec::new).push(contact.id);
                    }
                }
            },
        }
    }
}

//! Caps on the multi-valued fields of a contact
//!
//! The remote validation service rejects contacts with too many phone numbers, addresses, etc.
//! The trimming order below must be the one the service uses, so that both sides agree on which values survive:
//! 1. each class (private, business) is cut to its own cap,
//! 2. if both together still exceed the combined cap, half of the excess is dropped from the end of each class,
//! 3. whatever is still in excess is dropped from the end of the concatenation.

use serde::{Deserialize, Serialize};

use crate::contacts::{FieldClass, Phone, PhoneBucket};
use crate::config::ContactLimits;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCaps {
    pub max_private: usize,
    pub max_business: usize,
    pub max_combined: usize,
}

impl FieldCaps {
    pub const fn new(max_private: usize, max_business: usize, max_combined: usize) -> Self {
        Self { max_private, max_business, max_combined }
    }
}

/// Apply `caps` to a private and a business list. Private values come first in the result.
pub fn cap_fields<T>(mut private: Vec<T>, mut business: Vec<T>, caps: FieldCaps) -> Vec<T> {
    private.truncate(caps.max_private);
    business.truncate(caps.max_business);

    let total = private.len() + business.len();
    if total > caps.max_combined {
        let half = (total - caps.max_combined) / 2;
        private.truncate(private.len().saturating_sub(half));
        business.truncate(business.len().saturating_sub(half));
    }

    let mut result = private;
    result.append(&mut business);
    result.truncate(caps.max_combined);
    result
}

/// Split `items` by class, then cap them
pub fn cap_by_class<T, F>(items: Vec<T>, caps: FieldCaps, class_of: F) -> Vec<T>
where
    F: Fn(&T) -> FieldClass,
{
    let (private, business): (Vec<T>, Vec<T>) = items.into_iter()
        .partition(|item| class_of(item) == FieldClass::Private);
    cap_fields(private, business, caps)
}

/// Phone numbers are capped per bucket (plain, mobile, fax, VoIP), then concatenated in that order
pub fn cap_phones(phones: Vec<Phone>, limits: &ContactLimits) -> Vec<Phone> {
    let buckets = [
        (PhoneBucket::Plain, limits.phone_plain),
        (PhoneBucket::Mobile, limits.phone_mobile),
        (PhoneBucket::Fax, limits.phone_fax),
        (PhoneBucket::Voip, limits.phone_voip),
    ];

    let mut result = Vec::new();
    for (bucket, caps) in buckets.iter() {
        let in_bucket: Vec<Phone> = phones.iter()
            .filter(|phone| phone.kind.bucket() == *bucket)
            .cloned()
            .collect();
        result.extend(cap_by_class(in_bucket, *caps, |phone| phone.kind.class()));
    }
    result
}

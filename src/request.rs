//! Request aggregate, line items and the item edit algebra
use super::error::ValidationError;
use chrono::{DateTime, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    // Only found on documents written before `modified` became an edit-only action.
    #[n(3)]
    Modified,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Modified => "modified",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// `Utc` itself is not ordered, so the derive would never apply
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(TimeStamp)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// A requested line item. Always embedded in a [`Request`] or a snapshot of one.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Item {
    #[n(0)]
    pub id: String, // bech32 "item_" id, compared as a string only
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub quantity: u64,
    #[n(3)]
    pub purpose: String,
}

/// An item that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    pub quantity: u64,
    pub purpose: String,
}

impl NewItem {
    pub fn new(name: impl Into<String>, quantity: u64, purpose: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity,
            purpose: purpose.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_name(&self.name)?;
        check_quantity(self.quantity)?;
        check_purpose(&self.purpose)
    }

    pub fn into_item(self, id: String) -> Item {
        Item {
            id,
            name: self.name,
            quantity: self.quantity,
            purpose: self.purpose,
        }
    }
}

/// Partial update of an existing item, matched by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPatch {
    pub id: String,
    pub name: Option<String>,
    pub quantity: Option<u64>,
    pub purpose: Option<String>,
}

impl ItemPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            quantity: None,
            purpose: None,
        }
    }
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    pub fn set_quantity(mut self, quantity: u64) -> Self {
        self.quantity = Some(quantity);
        self
    }
    pub fn set_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        if let Some(quantity) = self.quantity {
            check_quantity(quantity)?;
        }
        if let Some(purpose) = &self.purpose {
            check_purpose(purpose)?;
        }
        Ok(())
    }

    fn merge_into(&self, item: &mut Item) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(quantity) = self.quantity {
            item.quantity = quantity;
        }
        if let Some(purpose) = &self.purpose {
            item.purpose = purpose.clone();
        }
    }
}

/// The `{add, remove, update}` edit set carried by a modified action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemEdits {
    pub add: Vec<NewItem>,
    pub remove: Vec<String>,
    pub update: Vec<ItemPatch>,
}

impl ItemEdits {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add(mut self, item: NewItem) -> Self {
        self.add.push(item);
        self
    }
    pub fn remove(mut self, item_id: impl Into<String>) -> Self {
        self.remove.push(item_id.into());
        self
    }
    pub fn update(mut self, patch: ItemPatch) -> Self {
        self.update.push(patch);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.update.is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for item in &self.add {
            item.validate()?;
        }
        for patch in &self.update {
            patch.validate()?;
        }
        Ok(())
    }

    /// Applies remove, then update, then add. An id that is both removed and
    /// updated stays removed. Patches for unknown ids are ignored.
    ///
    /// `added_ids` supplies the ids for `self.add`, pairwise.
    pub fn apply_to(&self, items: &[Item], added_ids: Vec<String>) -> Vec<Item> {
        let mut next: Vec<Item> = items
            .iter()
            .filter(|item| !self.remove.iter().any(|id| *id == item.id))
            .cloned()
            .collect();

        for patch in &self.update {
            if let Some(item) = next.iter_mut().find(|item| item.id == patch.id) {
                patch.merge_into(item);
            }
        }

        next.extend(
            self.add
                .iter()
                .cloned()
                .zip(added_ids)
                .map(|(item, id)| item.into_item(id)),
        );
        next
    }
}

fn check_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::InvalidItem { field: "name" });
    }
    Ok(())
}

fn check_quantity(quantity: u64) -> Result<(), ValidationError> {
    if quantity == 0 {
        return Err(ValidationError::InvalidItem { field: "quantity" });
    }
    Ok(())
}

fn check_purpose(purpose: &str) -> Result<(), ValidationError> {
    if purpose.trim().is_empty() {
        return Err(ValidationError::InvalidItem { field: "purpose" });
    }
    Ok(())
}

/// Used for constructing new requests before they are submitted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestDraft {
    requested_by: String,
    title: String,
    description: String,
    items: Vec<NewItem>,
}

impl RequestDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_requested_by(mut self, label: impl Into<String>) -> Self {
        self.requested_by = label.into();
        self
    }
    pub fn set_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
    pub fn set_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
    pub fn add_item(mut self, item: NewItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.requested_by.trim().is_empty() {
            return Err(ValidationError::EmptyRequester);
        }
        if self.items.is_empty() {
            return Err(ValidationError::NoItems);
        }
        for item in &self.items {
            item.validate()?;
        }
        Ok(())
    }

    /// Turns a validated draft into a `pending` request at version 1.
    /// `item_ids` supplies the ids for the draft items, pairwise.
    pub fn into_request(self, id: String, owner_id: String, item_ids: Vec<String>) -> Request {
        let now = TimeStamp::new();
        Request {
            id,
            owner_id,
            requested_by: self.requested_by,
            title: self.title,
            description: self.description,
            items: self
                .items
                .into_iter()
                .zip(item_ids)
                .map(|(item, id)| item.into_item(id))
                .collect(),
            status: RequestStatus::Pending,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub(crate) fn item_count(&self) -> usize {
        self.items.len()
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Request {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub owner_id: String,
    #[n(2)]
    pub requested_by: String, // display label, may differ from the owner
    #[n(3)]
    pub title: String,
    #[n(4)]
    pub description: String,
    #[n(5)]
    pub items: Vec<Item>,
    #[n(6)]
    pub status: RequestStatus,
    #[n(7)]
    pub version: u64, // bumped by every store update
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
    #[n(9)]
    pub updated_at: TimeStamp<Utc>,
}

impl Request {
    pub fn item(&self, item_id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == item_id)
    }
}

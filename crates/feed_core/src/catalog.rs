//! Canonical listing catalog: merge, sort and duplicate-image detection.
//!
//! Records are keyed by listing id and kept in a sorted id vector that is
//! rebuilt after every mutation. `batch` defers the resort so bulk loads pay
//! for a single sort.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use feed_logging::feed_debug;
use thiserror::Error;

use crate::{ListingFields, ListingId, SortType, Tier, Variant};

/// Rank of an unknown price under `PriceDesc`: below every real value, zero included.
const MISSING_PRICE_DESC: f64 = -1.0;
/// Rank of an unknown price under `PriceAsc`: after every finite value.
const MISSING_PRICE_ASC: f64 = f64::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("listing {0} is not in the catalog")]
    NotFound(ListingId),
}

/// Opaque handle to a record's rendered element, owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayHandle(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct ListingRecord {
    pub id: ListingId,
    pub first_seen_at: DateTime<Utc>,
    pub estimated_value_min: Option<f64>,
    pub estimated_value_max: Option<f64>,
    pub tier: Tier,
    pub available: bool,
    pub sortable_date: Option<DateTime<Utc>>,
    pub date_added: Option<DateTime<Utc>>,
    pub image_ref: Option<String>,
    pub display_binding: Option<DisplayHandle>,
    pub title: Option<String>,
    pub reason: Option<String>,
    pub queue_class: Option<String>,
    pub is_parent_listing: Option<bool>,
    pub is_pre_release: Option<bool>,
    pub enrollment_id: Option<String>,
    pub variants: Vec<Variant>,
    seq: u64,
}

impl ListingRecord {
    fn create(id: ListingId, fields: ListingFields, now: DateTime<Utc>, seq: u64) -> Self {
        let (estimated_value_min, estimated_value_max) =
            ordered_bounds(fields.estimated_value_min, fields.estimated_value_max);
        Self {
            id,
            first_seen_at: now,
            estimated_value_min,
            estimated_value_max,
            tier: fields.tier.unwrap_or_default(),
            available: true,
            sortable_date: fields.sortable_date,
            date_added: fields.date_added,
            image_ref: fields.image_ref,
            display_binding: None,
            title: fields.title,
            reason: fields.reason,
            queue_class: fields.queue_class,
            is_parent_listing: fields.is_parent_listing,
            is_pre_release: fields.is_pre_release,
            enrollment_id: fields.enrollment_id,
            variants: Vec::new(),
            seq,
        }
    }

    fn merge(&mut self, fields: ListingFields) {
        overwrite(&mut self.title, fields.title);
        overwrite(&mut self.sortable_date, fields.sortable_date);
        overwrite(&mut self.date_added, fields.date_added);
        overwrite(&mut self.image_ref, fields.image_ref);
        overwrite(&mut self.reason, fields.reason);
        overwrite(&mut self.queue_class, fields.queue_class);
        overwrite(&mut self.is_parent_listing, fields.is_parent_listing);
        overwrite(&mut self.is_pre_release, fields.is_pre_release);
        overwrite(&mut self.enrollment_id, fields.enrollment_id);
        if let Some(tier) = fields.tier {
            self.tier = tier;
        }

        let min = match (self.estimated_value_min, fields.estimated_value_min) {
            (Some(current), Some(incoming)) => Some(current.min(incoming)),
            (current, incoming) => current.or(incoming),
        };
        let max = match (self.estimated_value_max, fields.estimated_value_max) {
            (Some(current), Some(incoming)) => Some(current.max(incoming)),
            (current, incoming) => current.or(incoming),
        };
        (self.estimated_value_min, self.estimated_value_max) = ordered_bounds(min, max);
    }

    fn observe_value(&mut self, value: f64) {
        if self.estimated_value_min.is_none_or(|min| value < min) {
            self.estimated_value_min = Some(value);
        }
        if self.estimated_value_max.is_none_or(|max| value > max) {
            self.estimated_value_max = Some(value);
        }
    }

    /// Position in arrival order; the final sort tie-breaker.
    pub fn insertion_seq(&self) -> u64 {
        self.seq
    }

    fn date_key(&self) -> DateTime<Utc> {
        self.sortable_date.unwrap_or(self.first_seen_at)
    }
}

fn overwrite<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

fn ordered_bounds(min: Option<f64>, max: Option<f64>) -> (Option<f64>, Option<f64>) {
    match (min, max) {
        (Some(lo), Some(hi)) if lo > hi => (Some(hi), Some(lo)),
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    pub created: bool,
    /// The record's image was already seen on another listing.
    pub duplicate_image: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingOutcome {
    pub was_already_unavailable: bool,
}

/// Image references seen so far. Additive only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DuplicateImageIndex {
    seen: HashSet<String>,
}

impl DuplicateImageIndex {
    /// Records `image_ref`; returns `true` if it was already present.
    pub fn check_and_insert(&mut self, image_ref: &str) -> bool {
        !self.seen.insert(image_ref.to_string())
    }

    pub fn contains(&self, image_ref: &str) -> bool {
        self.seen.contains(image_ref)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Catalog {
    records: HashMap<ListingId, ListingRecord>,
    order: Vec<ListingId>,
    sort_type: SortType,
    next_seq: u64,
    detect_duplicate_images: bool,
    duplicate_images: DuplicateImageIndex,
    // Unavailability reported before the listing itself arrived.
    pending_unavailable: HashSet<ListingId>,
    sort_deferred: bool,
}

impl Catalog {
    pub fn new(sort_type: SortType, detect_duplicate_images: bool) -> Self {
        Self {
            sort_type,
            detect_duplicate_images,
            ..Self::default()
        }
    }

    pub fn add_or_update(
        &mut self,
        id: &str,
        fields: ListingFields,
        now: DateTime<Utc>,
    ) -> AddOutcome {
        let outcome = if let Some(record) = self.records.get_mut(id) {
            record.merge(fields);
            AddOutcome {
                created: false,
                duplicate_image: false,
            }
        } else {
            let seq = self.next_seq;
            self.next_seq += 1;
            let mut record = ListingRecord::create(id.to_string(), fields, now, seq);
            if self.pending_unavailable.remove(id) {
                record.available = false;
            }
            let duplicate_image = match (&record.image_ref, self.detect_duplicate_images) {
                (Some(image_ref), true) => self.duplicate_images.check_and_insert(image_ref),
                _ => false,
            };
            self.records.insert(record.id.clone(), record);
            self.order.push(id.to_string());
            AddOutcome {
                created: true,
                duplicate_image,
            }
        };
        self.resort();
        outcome
    }

    /// Widens the value envelope with one observation. `false` if `id` is unknown.
    pub fn update_estimated_value(&mut self, id: &str, value: f64) -> bool {
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };
        record.observe_value(value);
        self.resort();
        true
    }

    pub fn update_tier(&mut self, id: &str, tier: Tier) -> bool {
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };
        record.tier = tier;
        self.resort();
        true
    }

    pub fn update_variants(&mut self, id: &str, variants: Vec<Variant>) -> bool {
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };
        record.variants = variants;
        true
    }

    /// Idempotent. An unknown id is remembered and applied when the listing arrives.
    /// Returns `true` if a record was present.
    pub fn mark_unavailable(&mut self, id: &str) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                record.available = false;
                true
            }
            None => {
                feed_debug!("Unavailable before creation for listing {}", id);
                self.pending_unavailable.insert(id.to_string());
                false
            }
        }
    }

    pub fn attach_display_binding(
        &mut self,
        id: &str,
        handle: DisplayHandle,
    ) -> Result<BindingOutcome, CatalogError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        record.display_binding = Some(handle);
        Ok(BindingOutcome {
            was_already_unavailable: !record.available,
        })
    }

    /// Removes the record together with its binding.
    pub fn evict(&mut self, id: &str) -> Option<ListingRecord> {
        self.pending_unavailable.remove(id);
        let removed = self.records.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// Returns `true` if the order changed.
    pub fn set_sort_type(&mut self, sort_type: SortType) -> bool {
        if self.sort_type == sort_type {
            return false;
        }
        self.sort_type = sort_type;
        let before = self.order.clone();
        self.resort();
        before != self.order
    }

    pub fn sort_type(&self) -> SortType {
        self.sort_type
    }

    pub fn set_duplicate_detection(&mut self, enabled: bool) {
        self.detect_duplicate_images = enabled;
    }

    pub fn duplicate_images(&self) -> &DuplicateImageIndex {
        &self.duplicate_images
    }

    /// Runs several mutations and sorts once at the end.
    pub fn batch<R>(&mut self, apply: impl FnOnce(&mut Catalog) -> R) -> R {
        let outer = self.sort_deferred;
        self.sort_deferred = true;
        let result = apply(self);
        self.sort_deferred = outer;
        self.resort();
        result
    }

    pub fn get(&self, id: &str) -> Option<&ListingRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|existing| existing == id)
    }

    pub fn sorted_ids(&self) -> &[ListingId] {
        &self.order
    }

    pub fn iter_sorted(&self) -> impl Iterator<Item = &ListingRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Full stable resort; the insertion sequence breaks every remaining tie.
    pub fn resort(&mut self) {
        if self.sort_deferred {
            return;
        }
        let records = &self.records;
        let sort_type = self.sort_type;
        self.order.sort_by(|a, b| match (records.get(a), records.get(b)) {
            (Some(a), Some(b)) => compare(sort_type, a, b),
            _ => Ordering::Equal,
        });
    }
}

fn compare(sort_type: SortType, a: &ListingRecord, b: &ListingRecord) -> Ordering {
    let primary = match sort_type {
        SortType::DateAsc => a.date_key().cmp(&b.date_key()),
        SortType::DateDesc => b.date_key().cmp(&a.date_key()),
        SortType::PriceDesc => {
            let a = a.estimated_value_min.unwrap_or(MISSING_PRICE_DESC);
            let b = b.estimated_value_min.unwrap_or(MISSING_PRICE_DESC);
            b.total_cmp(&a)
        }
        SortType::PriceAsc => {
            let a = a.estimated_value_min.unwrap_or(MISSING_PRICE_ASC);
            let b = b.estimated_value_min.unwrap_or(MISSING_PRICE_ASC);
            a.total_cmp(&b)
        }
    };
    primary.then_with(|| a.seq.cmp(&b.seq))
}

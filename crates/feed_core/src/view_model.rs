use crate::{ConnectionState, ListingId, Tier};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub connection: ConnectionState,
    pub resyncing: bool,
    pub buffered_events: usize,
    pub item_count: usize,
    pub items: Vec<ItemRowView>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemRowView {
    pub id: ListingId,
    pub title: Option<String>,
    pub estimated_value_min: Option<f64>,
    pub estimated_value_max: Option<f64>,
    pub tier: Tier,
    pub available: bool,
}

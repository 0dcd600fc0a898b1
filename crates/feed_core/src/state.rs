use crate::view_model::{AppViewModel, ItemRowView};
use crate::{BulkBuffer, Catalog, Identity, InboundEvent, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Single-writer state owned by the dispatch loop.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    settings: Settings,
    catalog: Catalog,
    bulk: BulkBuffer<InboundEvent>,
    connection: ConnectionState,
    dirty: bool,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let catalog = Catalog::new(settings.sort_type, settings.hide_duplicate_thumbnail);
        Self {
            settings,
            catalog,
            ..Self::default()
        }
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            connection: self.connection,
            resyncing: self.bulk.is_buffering(),
            buffered_events: self.bulk.held_len(),
            item_count: self.catalog.len(),
            items: self
                .catalog
                .iter_sorted()
                .map(|record| ItemRowView {
                    id: record.id.clone(),
                    title: record.title.clone(),
                    estimated_value_min: record.estimated_value_min,
                    estimated_value_max: record.estimated_value_max,
                    tier: record.tier,
                    available: record.available,
                })
                .collect(),
            dirty: self.dirty,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn identity(&self) -> Identity {
        Identity {
            identity: self.settings.identity.clone(),
            region_code: self.settings.region_code.clone(),
        }
    }

    /// Returns and clears the dirty flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn catalog_mut(&mut self) -> &mut Catalog {
        self.dirty = true;
        &mut self.catalog
    }

    pub(crate) fn bulk_mut(&mut self) -> &mut BulkBuffer<InboundEvent> {
        &mut self.bulk
    }

    pub(crate) fn set_connection(&mut self, connection: ConnectionState) {
        if self.connection != connection {
            self.connection = connection;
            self.dirty = true;
        }
    }

    pub(crate) fn replace_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }
}

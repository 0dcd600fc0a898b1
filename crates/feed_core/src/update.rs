use feed_logging::{feed_debug, feed_info, feed_warn};

use crate::{
    AppState, Catalog, ConnectionState, Delivery, Effect, FeedEvent, InboundEvent, ListingFields,
    Msg, Notification, PauseReason, Settings, SurfaceEvent,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::Connected => {
            state.set_connection(ConnectionState::Connected);
            let mut effects = vec![Effect::Broadcast(SurfaceEvent::ConnectionOpen)];
            if state.bulk_mut().is_buffering() {
                // The snapshot request died with the previous socket; held events stay.
                feed_info!("Re-requesting bulk snapshot on the new connection");
                request_snapshot(&state, &mut effects);
            } else if state.settings().resync_on_connect {
                begin_resync(&mut state, &mut effects);
            }
            effects
        }
        Msg::Disconnected { reason } => {
            state.set_connection(ConnectionState::Disconnected);
            vec![Effect::Broadcast(SurfaceEvent::ConnectionClosed { reason })]
        }
        Msg::ConnectRejected { reason } => {
            state.set_connection(ConnectionState::Disconnected);
            vec![Effect::Broadcast(SurfaceEvent::ConnectionError {
                message: reason,
            })]
        }
        Msg::ReconnectAlarm => {
            // Reconnection cadence lives outside the connection manager; this only
            // decides whether the alarm should turn into an attempt.
            if state.settings().stream_enabled
                && state.connection() == ConnectionState::Disconnected
            {
                state.set_connection(ConnectionState::Connecting);
                vec![Effect::Connect(state.identity())]
            } else {
                Vec::new()
            }
        }
        Msg::ResyncRequested => {
            let mut effects = Vec::new();
            if state.connection() == ConnectionState::Connected {
                begin_resync(&mut state, &mut effects);
            } else {
                feed_debug!("Resync requested while {:?}; ignored", state.connection());
            }
            effects
        }
        Msg::Feed(InboundEvent {
            event: FeedEvent::ConnectionError { message },
            ..
        }) => vec![Effect::Broadcast(SurfaceEvent::ConnectionError { message })],
        Msg::Feed(inbound) => match state.bulk_mut().accept(inbound) {
            Delivery::Forward(inbound) => apply_live(&mut state, inbound),
            Delivery::Held => Vec::new(),
            Delivery::Batch(batch) => apply_batch(&mut state, batch),
        },
        Msg::ResyncTimedOut => {
            if state.bulk_mut().is_buffering() {
                let batch = state.bulk_mut().abandon();
                feed_warn!(
                    "Resync sentinel never arrived; releasing {} held events",
                    batch.len()
                );
                apply_batch(&mut state, batch)
            } else {
                Vec::new()
            }
        }
        Msg::DisplayBindingReady { id, handle } => {
            match state.catalog_mut().attach_display_binding(&id, handle) {
                Ok(outcome) if outcome.was_already_unavailable => {
                    vec![Effect::Broadcast(SurfaceEvent::ItemUnavailable {
                        id,
                        reason: None,
                    })]
                }
                Ok(_) => Vec::new(),
                Err(err) => {
                    feed_warn!("Display binding not attached: {}", err);
                    Vec::new()
                }
            }
        }
        Msg::EvictRequested { id } => {
            if state.catalog_mut().evict(&id).is_some() {
                vec![Effect::Broadcast(SurfaceEvent::ItemEvicted { id })]
            } else {
                Vec::new()
            }
        }
        Msg::SettingsChanged(settings) => apply_settings(&mut state, settings),
        Msg::AutomationChallenge { decoy } => {
            let reason = if decoy {
                PauseReason::Decoy
            } else {
                PauseReason::Challenge
            };
            vec![Effect::SuspendReload(reason)]
        }
    };

    (state, effects)
}

fn begin_resync(state: &mut AppState, effects: &mut Vec<Effect>) {
    if !state.bulk_mut().begin() {
        feed_debug!("Resync already in flight");
        return;
    }
    feed_info!("Starting bulk resync");
    request_snapshot(state, effects);
}

fn request_snapshot(state: &AppState, effects: &mut Vec<Effect>) {
    effects.push(Effect::RequestBulkSnapshot {
        identity: state.identity(),
        limit: state.settings().snapshot_limit,
    });
    effects.push(Effect::ArmResyncWatchdog);
}

fn apply_live(state: &mut AppState, inbound: InboundEvent) -> Vec<Effect> {
    let InboundEvent { event, received_at } = inbound;
    match event {
        FeedEvent::NewItem { id, fields } => add_listing(state, &id, fields, received_at, true),
        FeedEvent::BulkSnapshotItem { id, fields } => {
            add_listing(state, &id, fields, received_at, false)
        }
        FeedEvent::BulkSnapshotEnd => {
            feed_debug!("Resync sentinel outside a resync; ignored");
            Vec::new()
        }
        FeedEvent::ValueUpdate { id, value } => {
            let catalog = state.catalog_mut();
            if !catalog.update_estimated_value(&id, value) {
                return Vec::new();
            }
            let event = match (catalog.get(&id), catalog.position(&id)) {
                (Some(record), Some(position)) => SurfaceEvent::ValueChanged {
                    id: id.clone(),
                    min: record.estimated_value_min,
                    max: record.estimated_value_max,
                    position,
                },
                _ => return Vec::new(),
            };
            vec![Effect::Broadcast(event)]
        }
        FeedEvent::TierUpdate { id, tier } => {
            let catalog = state.catalog_mut();
            if !catalog.update_tier(&id, tier) {
                return Vec::new();
            }
            match catalog.position(&id) {
                Some(position) => vec![Effect::Broadcast(SurfaceEvent::TierChanged {
                    id,
                    tier,
                    position,
                })],
                None => Vec::new(),
            }
        }
        FeedEvent::VariantUpdate { id, variants } => {
            if state.catalog_mut().update_variants(&id, variants.clone()) {
                vec![Effect::Broadcast(SurfaceEvent::VariantsChanged { id, variants })]
            } else {
                Vec::new()
            }
        }
        FeedEvent::Unavailable { id, reason } => {
            if state.catalog_mut().mark_unavailable(&id) {
                vec![Effect::Broadcast(SurfaceEvent::ItemUnavailable { id, reason })]
            } else {
                Vec::new()
            }
        }
        FeedEvent::ReloadRequest { queue_class, page } => {
            vec![Effect::Broadcast(SurfaceEvent::ReloadSurface { queue_class, page })]
        }
        FeedEvent::ConnectionError { message } => {
            vec![Effect::Broadcast(SurfaceEvent::ConnectionError { message })]
        }
    }
}

fn add_listing(
    state: &mut AppState,
    id: &str,
    fields: ListingFields,
    received_at: chrono::DateTime<chrono::Utc>,
    notify: bool,
) -> Vec<Effect> {
    let catalog = state.catalog_mut();
    let outcome = catalog.add_or_update(id, fields, received_at);
    let (Some(record), Some(position)) = (catalog.get(id), catalog.position(id)) else {
        return Vec::new();
    };

    let mut effects = vec![Effect::Broadcast(SurfaceEvent::ItemAdded {
        record: record.clone(),
        position,
        created: outcome.created,
        duplicate_image: outcome.duplicate_image,
    })];
    if notify && outcome.created && !outcome.duplicate_image && record.available {
        effects.push(Effect::Notify(Notification::from(record)));
    }
    effects
}

/// Applies a resync batch with a single sort, then publishes the whole catalog.
fn apply_batch(state: &mut AppState, batch: Vec<InboundEvent>) -> Vec<Effect> {
    feed_info!("Applying resync batch of {} events", batch.len());
    let mut effects = Vec::new();
    let mut created = Vec::new();

    state.catalog_mut().batch(|catalog: &mut Catalog| {
        for InboundEvent { event, received_at } in batch {
            match event {
                FeedEvent::NewItem { id, fields } => {
                    let outcome = catalog.add_or_update(&id, fields, received_at);
                    if outcome.created && !outcome.duplicate_image {
                        created.push(id);
                    }
                }
                FeedEvent::BulkSnapshotItem { id, fields } => {
                    catalog.add_or_update(&id, fields, received_at);
                }
                FeedEvent::BulkSnapshotEnd => {}
                FeedEvent::ValueUpdate { id, value } => {
                    catalog.update_estimated_value(&id, value);
                }
                FeedEvent::TierUpdate { id, tier } => {
                    catalog.update_tier(&id, tier);
                }
                FeedEvent::VariantUpdate { id, variants } => {
                    catalog.update_variants(&id, variants);
                }
                FeedEvent::Unavailable { id, .. } => {
                    catalog.mark_unavailable(&id);
                }
                FeedEvent::ReloadRequest { queue_class, page } => {
                    effects.push(Effect::Broadcast(SurfaceEvent::ReloadSurface {
                        queue_class,
                        page,
                    }));
                }
                FeedEvent::ConnectionError { message } => {
                    effects.push(Effect::Broadcast(SurfaceEvent::ConnectionError { message }));
                }
            }
        }
    });

    let catalog = state.catalog();
    effects.push(Effect::Broadcast(SurfaceEvent::SnapshotLoaded {
        records: catalog.iter_sorted().cloned().collect(),
    }));
    for id in created {
        if let Some(record) = catalog.get(&id) {
            if record.available {
                effects.push(Effect::Notify(Notification::from(record)));
            }
        }
    }
    effects
}

fn apply_settings(state: &mut AppState, settings: Settings) -> Vec<Effect> {
    let mut effects = Vec::new();
    let stream_was_enabled = state.settings().stream_enabled;

    let catalog = state.catalog_mut();
    catalog.set_duplicate_detection(settings.hide_duplicate_thumbnail);
    if catalog.set_sort_type(settings.sort_type) {
        effects.push(Effect::Broadcast(SurfaceEvent::Reordered {
            ids: catalog.sorted_ids().to_vec(),
        }));
    }

    if stream_was_enabled
        && !settings.stream_enabled
        && state.connection() != ConnectionState::Disconnected
    {
        effects.push(Effect::Disconnect);
    }

    state.replace_settings(settings);
    effects
}

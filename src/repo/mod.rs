//! Entity repositories
//!
//! Each entity kind exposes the same surface: read operations that go
//! through the in-memory cache when enabled, mutations that keep the cache
//! coherent, and a realtime subscription that applies push events. Kinds
//! with a plain CRUD shape share the generic [`Repository`]; entries and
//! media have dedicated repositories with their extra behavior.

mod ai;
mod entry;
mod media;

pub use ai::AiRepository;
pub use entry::EntryRepository;
pub use media::{BinOptions, MediaRepository};

use crate::cache::{Keyed, Store};
use crate::channel::{
    ChangeEvent, RealtimeChannel, SocketEvent, Subscription, TOPIC_ENTRY_STATUS, TOPIC_GROUP,
    TOPIC_LANGUAGE, TOPIC_TEMPLATE, TOPIC_WIDGET,
};
use crate::error::{Error, Result};
use crate::transport::{ApiRequest, Transport};
use crate::types::{
    EntryStatus, Group, ItemResponse, ItemsResponse, Language, Template, Widget,
    WhereIsItUsedResult,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Latch key covering the complete entity set
const LATCH_ALL: &str = "all";

/// An entity kind served by the generic [`Repository`]
pub trait Entity: Keyed + Clone + DeserializeOwned + Send + Sync + 'static {
    /// Realtime topic carrying change events for this kind
    const TOPIC: &'static str;
    /// Instance-relative controller path
    const BASE_PATH: &'static str;
}

impl Entity for Template {
    const TOPIC: &'static str = TOPIC_TEMPLATE;
    const BASE_PATH: &'static str = "/api/v1/org/:orgId/instance/:instanceId/template";
}

impl Entity for Group {
    const TOPIC: &'static str = TOPIC_GROUP;
    const BASE_PATH: &'static str = "/api/v1/org/:orgId/instance/:instanceId/group";
}

impl Entity for Widget {
    const TOPIC: &'static str = TOPIC_WIDGET;
    const BASE_PATH: &'static str = "/api/v1/org/:orgId/instance/:instanceId/widget";
}

impl Entity for Language {
    const TOPIC: &'static str = TOPIC_LANGUAGE;
    const BASE_PATH: &'static str = "/api/v1/org/:orgId/instance/:instanceId/language";
}

impl Entity for EntryStatus {
    const TOPIC: &'static str = TOPIC_ENTRY_STATUS;
    const BASE_PATH: &'static str = "/api/v1/org/:orgId/instance/:instanceId/entry-status";
}

/// Cached CRUD repository for one entity kind
pub struct Repository<T: Entity> {
    transport: Arc<Transport>,
    store: Arc<Store<T>>,
    use_cache: bool,
    _push_sub: Option<Subscription>,
}

impl<T: Entity> Repository<T> {
    pub(crate) fn new(
        transport: Arc<Transport>,
        channel: Option<&RealtimeChannel>,
        use_cache: bool,
    ) -> Self {
        let store = Arc::new(Store::default());
        let _push_sub = channel.map(|channel| {
            let store = Arc::clone(&store);
            let transport = Arc::clone(&transport);
            channel.register(T::TOPIC, move |event| {
                let store = Arc::clone(&store);
                let transport = Arc::clone(&transport);
                async move { apply_change(&transport, &store, event).await }
            })
        });
        Self {
            transport,
            store,
            use_cache,
            _push_sub,
        }
    }

    pub async fn get_all(&self, skip_cache: bool) -> Result<Vec<T>> {
        if !skip_cache && self.use_cache && self.store.is_latched(LATCH_ALL) {
            return Ok(self.store.items());
        }
        let res: ItemsResponse<T> = self
            .transport
            .send(ApiRequest::get(format!("{}/all", T::BASE_PATH)))
            .await?;
        if self.use_cache {
            self.store.set_many(res.items.iter().cloned());
            self.store.latch(LATCH_ALL);
        }
        Ok(res.items)
    }

    pub async fn get_by_id(&self, id: &str, skip_cache: bool) -> Result<T> {
        if !skip_cache && self.use_cache {
            if let Some(hit) = self.store.find_by_id(id) {
                return Ok(hit);
            }
        }
        let res: ItemResponse<T> = self
            .transport
            .send(ApiRequest::get(format!("{}/{}", T::BASE_PATH, id)))
            .await?;
        if self.use_cache {
            self.store.set(res.item.clone());
        }
        Ok(res.item)
    }

    pub async fn create(&self, body: &impl Serialize) -> Result<T> {
        let res: ItemResponse<T> = self
            .transport
            .send(ApiRequest::post(format!("{}/create", T::BASE_PATH), body)?)
            .await?;
        if self.use_cache {
            self.store.set(res.item.clone());
        }
        Ok(res.item)
    }

    pub async fn update(&self, id: &str, body: &impl Serialize) -> Result<T> {
        let res: ItemResponse<T> = self
            .transport
            .send(ApiRequest::put(
                format!("{}/{}/update", T::BASE_PATH, id),
                body,
            )?)
            .await?;
        if self.use_cache {
            self.store.set(res.item.clone());
        }
        Ok(res.item)
    }

    /// Delete an item; drops it from the cache and clears every latch so
    /// the next list read goes to the network
    pub async fn delete_by_id(&self, id: &str) -> Result<T> {
        let res: ItemResponse<T> = self
            .transport
            .send(ApiRequest::delete(format!("{}/{}", T::BASE_PATH, id)))
            .await?;
        if self.use_cache {
            self.store.remove(id);
            self.store.clear_latches();
        }
        Ok(res.item)
    }
}

impl Repository<Template> {
    /// Pointers to everything that references this template
    pub async fn where_is_used(&self, id: &str) -> Result<WhereIsItUsedResult> {
        self.transport
            .send(ApiRequest::get(format!(
                "{}/{}/where-is-it-used",
                Template::BASE_PATH,
                id
            )))
            .await
    }
}

impl Repository<Group> {
    /// Pointers to everything that references this group
    pub async fn where_is_used(&self, id: &str) -> Result<WhereIsItUsedResult> {
        self.transport
            .send(ApiRequest::get(format!(
                "{}/{}/where-is-it-used",
                Group::BASE_PATH,
                id
            )))
            .await
    }
}

impl Repository<Widget> {
    /// Pointers to everything that references this widget
    pub async fn where_is_used(&self, id: &str) -> Result<WhereIsItUsedResult> {
        self.transport
            .send(ApiRequest::get(format!(
                "{}/{}/where-is-it-used",
                Widget::BASE_PATH,
                id
            )))
            .await
    }
}

/// Apply one push event to the cache
///
/// An update for a cached id refetches that id only and leaves latches in
/// place; updates for uncached ids are ignored. Any other event kind evicts
/// the id and clears every latch.
async fn apply_change<T: Entity>(
    transport: &Transport,
    store: &Store<T>,
    event: SocketEvent,
) -> Result<()> {
    let change = ChangeEvent::decode(&event)?;
    if change.is_update() {
        if store.contains(&change.id) {
            let res: ItemResponse<T> = transport
                .send(ApiRequest::get(format!("{}/{}", T::BASE_PATH, change.id)))
                .await?;
            store.set(res.item);
        }
    } else {
        store.remove(&change.id);
        store.clear_latches();
    }
    Ok(())
}

/// Shared lookup-miss error constructor
pub(crate) fn lookup_miss(kind: &'static str, query: &str) -> Error {
    Error::Lookup {
        kind,
        query: query.to_string(),
    }
}

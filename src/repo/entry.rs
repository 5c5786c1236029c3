//! Entry repository
//!
//! Entries are read in three shapes, each with its own cache tier: lite
//! (listing info only), raw (schema-aligned property values) and parsed
//! (application-facing key/value form). List latches are scoped per
//! template, with status-filtered variants; a tier's full per-template set
//! subsumes any status filter over it.
//!
//! Mutations accept parsed data and run it through the transcoder against
//! the template schema before hitting the backend.

use crate::cache::Store;
use crate::channel::{ChangeEvent, RealtimeChannel, SocketEvent, Subscription, TOPIC_ENTRY};
use crate::error::Result;
use crate::repo::{lookup_miss, BinOptions, MediaRepository, Repository};
use crate::transcode::{group_index, parsed_to_raw};
use crate::transport::{ApiRequest, Transport};
use crate::types::{
    Entry, EntryContent, EntryCreateBody, EntryLite, EntryMeta, EntryParsed,
    EntryParsedCreateData, EntryParsedUpdateData, EntryStatus, EntryUpdateBody, Group,
    ItemResponse, ItemsResponse, Template,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

fn base_path(template_id: &str) -> String {
    format!(
        "/api/v1/org/:orgId/instance/:instanceId/template/{}/entry",
        template_id
    )
}

struct EntryTiers {
    lite: Store<EntryLite>,
    raw: Store<Entry>,
    parsed: Store<EntryParsed>,
}

impl EntryTiers {
    fn evict(&self, id: &str) {
        self.lite.remove(id);
        self.raw.remove(id);
        self.parsed.remove(id);
    }

    fn clear_latches(&self) {
        self.lite.clear_latches();
        self.raw.clear_latches();
        self.parsed.clear_latches();
    }
}

pub struct EntryRepository {
    transport: Arc<Transport>,
    templates: Arc<Repository<Template>>,
    groups: Arc<Repository<Group>>,
    statuses: Arc<Repository<EntryStatus>>,
    media: Arc<MediaRepository>,
    tiers: Arc<EntryTiers>,
    /// Template list memoized for name resolution when the cache is off
    templates_fallback: tokio::sync::Mutex<Option<Vec<Template>>>,
    use_cache: bool,
    inject_svg: bool,
    _push_sub: Option<Subscription>,
}

impl EntryRepository {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transport: Arc<Transport>,
        channel: Option<&RealtimeChannel>,
        templates: Arc<Repository<Template>>,
        groups: Arc<Repository<Group>>,
        statuses: Arc<Repository<EntryStatus>>,
        media: Arc<MediaRepository>,
        use_cache: bool,
        inject_svg: bool,
    ) -> Self {
        let tiers = Arc::new(EntryTiers {
            lite: Store::default(),
            raw: Store::default(),
            parsed: Store::default(),
        });
        let _push_sub = channel.map(|channel| {
            let tiers = Arc::clone(&tiers);
            let transport = Arc::clone(&transport);
            channel.register(TOPIC_ENTRY, move |event| {
                let tiers = Arc::clone(&tiers);
                let transport = Arc::clone(&transport);
                async move { apply_entry_change(&transport, &tiers, event).await }
            })
        });
        Self {
            transport,
            templates,
            groups,
            statuses,
            media,
            tiers,
            templates_fallback: tokio::sync::Mutex::new(None),
            use_cache,
            inject_svg,
            _push_sub,
        }
    }

    /// Resolve a template name or id to the template object
    async fn find_template(&self, id_or_name: &str) -> Result<Template> {
        let templates = if self.use_cache {
            self.templates.get_all(false).await?
        } else {
            let mut memo = self.templates_fallback.lock().await;
            match &*memo {
                Some(templates) => templates.clone(),
                None => {
                    let templates = self.templates.get_all(false).await?;
                    *memo = Some(templates.clone());
                    templates
                }
            }
        };
        templates
            .into_iter()
            .find(|t| t.name == id_or_name || t.id == id_or_name)
            .ok_or_else(|| lookup_miss("template", id_or_name))
    }

    pub async fn get_all_lite(
        &self,
        template_id_or_name: &str,
        skip_cache: bool,
    ) -> Result<Vec<EntryLite>> {
        let template = self.find_template(template_id_or_name).await?;
        let key = format!("all_lite_{}", template.id);
        if !skip_cache && self.use_cache && self.tiers.lite.is_latched(&key) {
            return Ok(self
                .tiers
                .lite
                .find_many(|e| e.template_id == template.id));
        }
        let res: ItemsResponse<EntryLite> = self
            .transport
            .send(ApiRequest::get(format!(
                "{}/all/lite",
                base_path(&template.id)
            )))
            .await?;
        if self.use_cache {
            self.tiers.lite.set_many(res.items.iter().cloned());
            self.tiers.lite.latch(key);
        }
        Ok(res.items)
    }

    /// Parsed entries for one template
    pub async fn get_all(
        &self,
        template_id_or_name: &str,
        skip_cache: bool,
    ) -> Result<Vec<EntryParsed>> {
        let template = self.find_template(template_id_or_name).await?;
        let key = format!("all_parsed_{}", template.id);
        if !skip_cache && self.use_cache && self.tiers.parsed.is_latched(&key) {
            return Ok(self
                .tiers
                .parsed
                .find_many(|e| e.template_id == template.id));
        }
        let res: ItemsResponse<EntryParsed> = self
            .transport
            .send(ApiRequest::get(format!(
                "{}/all/parsed",
                base_path(&template.id)
            )))
            .await?;
        let mut items = res.items;
        if self.inject_svg {
            self.inject_media_svg(&mut items).await?;
        }
        if self.use_cache {
            self.tiers.parsed.set_many(items.iter().cloned());
            self.tiers.parsed.latch(key);
        }
        Ok(items)
    }

    pub async fn get_all_raw(
        &self,
        template_id_or_name: &str,
        skip_cache: bool,
    ) -> Result<Vec<Entry>> {
        let template = self.find_template(template_id_or_name).await?;
        let key = format!("all_raw_{}", template.id);
        if !skip_cache && self.use_cache && self.tiers.raw.is_latched(&key) {
            return Ok(self.tiers.raw.find_many(|e| e.template_id == template.id));
        }
        let res: ItemsResponse<Entry> = self
            .transport
            .send(ApiRequest::get(format!("{}/all", base_path(&template.id))))
            .await?;
        if self.use_cache {
            self.tiers.raw.set_many(res.items.iter().cloned());
            self.tiers.raw.latch(key);
        }
        Ok(res.items)
    }

    /// Parsed entries filtered by status id or label
    ///
    /// The per-template full set subsumes the filter: if `all_parsed_<tid>`
    /// is latched the filter is served from cache.
    pub async fn get_all_by_status(
        &self,
        template_id_or_name: &str,
        status: &str,
        skip_cache: bool,
    ) -> Result<Vec<EntryParsed>> {
        let template = self.find_template(template_id_or_name).await?;
        let all_key = format!("all_parsed_{}", template.id);
        let key = format!("all_parsed_{}_status_{}", template.id, status);
        if !skip_cache
            && self.use_cache
            && (self.tiers.parsed.is_latched(&key) || self.tiers.parsed.is_latched(&all_key))
        {
            return Ok(self.tiers.parsed.find_many(|e| {
                e.template_id == template.id
                    && e.statuses.iter().any(|s| s.id == status || s.label == status)
            }));
        }
        let res: ItemsResponse<EntryParsed> = self
            .transport
            .send(ApiRequest::get(format!(
                "{}/all_by_status/{}/parsed",
                base_path(&template.id),
                urlencoding::encode(status)
            )))
            .await?;
        let mut items = res.items;
        if self.inject_svg {
            self.inject_media_svg(&mut items).await?;
        }
        if self.use_cache {
            self.tiers.parsed.set_many(items.iter().cloned());
            self.tiers.parsed.latch(key);
        }
        Ok(items)
    }

    /// Raw entries filtered by status id or label
    pub async fn get_all_by_status_raw(
        &self,
        template_id_or_name: &str,
        status: &str,
        skip_cache: bool,
    ) -> Result<Vec<Entry>> {
        let template = self.find_template(template_id_or_name).await?;
        let all_key = format!("all_raw_{}", template.id);
        let key = format!("all_raw_{}_status_{}", template.id, status);
        if !skip_cache
            && self.use_cache
            && (self.tiers.raw.is_latched(&key) || self.tiers.raw.is_latched(&all_key))
        {
            // Raw entries carry status ids only; resolve labels first
            let statuses = self.statuses.get_all(false).await?;
            let Some(status_data) = statuses.iter().find(|s| s.id == status || s.label == status)
            else {
                return Ok(vec![]);
            };
            return Ok(self.tiers.raw.find_many(|e| {
                e.template_id == template.id
                    && e.statuses.iter().any(|s| s.id == status_data.id)
            }));
        }
        let res: ItemsResponse<Entry> = self
            .transport
            .send(ApiRequest::get(format!(
                "{}/all_by_status/{}",
                base_path(&template.id),
                urlencoding::encode(status)
            )))
            .await?;
        if self.use_cache {
            self.tiers.raw.set_many(res.items.iter().cloned());
            self.tiers.raw.latch(key);
        }
        Ok(res.items)
    }

    pub async fn get_by_id_lite(
        &self,
        entry_id: &str,
        template_id_or_name: &str,
        skip_cache: bool,
    ) -> Result<EntryLite> {
        let template = self.find_template(template_id_or_name).await?;
        if !skip_cache && self.use_cache {
            if let Some(hit) = self
                .tiers
                .lite
                .find(|e| e.id == entry_id && e.template_id == template.id)
            {
                return Ok(hit);
            }
        }
        let res: ItemResponse<EntryLite> = self
            .transport
            .send(ApiRequest::get(format!(
                "{}/{}/lite",
                base_path(&template.id),
                entry_id
            )))
            .await?;
        if self.use_cache {
            self.tiers.lite.set(res.item.clone());
        }
        Ok(res.item)
    }

    /// Parsed entry by id
    pub async fn get_by_id(
        &self,
        entry_id: &str,
        template_id_or_name: &str,
        skip_cache: bool,
    ) -> Result<EntryParsed> {
        let template = self.find_template(template_id_or_name).await?;
        if !skip_cache && self.use_cache {
            if let Some(hit) = self
                .tiers
                .parsed
                .find(|e| e.id == entry_id && e.template_id == template.id)
            {
                return Ok(hit);
            }
        }
        let res: ItemResponse<EntryParsed> = self
            .transport
            .send(ApiRequest::get(format!(
                "{}/{}/parse",
                base_path(&template.id),
                entry_id
            )))
            .await?;
        let mut item = res.item;
        if self.inject_svg {
            self.inject_media_svg(std::slice::from_mut(&mut item)).await?;
        }
        if self.use_cache {
            self.tiers.parsed.set(item.clone());
        }
        Ok(item)
    }

    /// Parsed entry by slug
    pub async fn get_by_slug(
        &self,
        entry_slug: &str,
        template_id_or_name: &str,
        skip_cache: bool,
    ) -> Result<EntryParsed> {
        let template = self.find_template(template_id_or_name).await?;
        if !skip_cache && self.use_cache {
            if let Some(hit) = self.tiers.parsed.find(|e| {
                e.template_id == template.id
                    && e.meta
                        .values()
                        .any(|m| m.get("slug").and_then(Value::as_str) == Some(entry_slug))
            }) {
                return Ok(hit);
            }
        }
        let res: ItemResponse<EntryParsed> = self
            .transport
            .send(ApiRequest::get(format!(
                "{}/{}/parse",
                base_path(&template.id),
                urlencoding::encode(entry_slug)
            )))
            .await?;
        let mut item = res.item;
        if self.inject_svg {
            self.inject_media_svg(std::slice::from_mut(&mut item)).await?;
        }
        if self.use_cache {
            self.tiers.parsed.set(item.clone());
        }
        Ok(item)
    }

    pub async fn get_by_id_raw(
        &self,
        entry_id: &str,
        template_id_or_name: &str,
        skip_cache: bool,
    ) -> Result<Entry> {
        let template = self.find_template(template_id_or_name).await?;
        if !skip_cache && self.use_cache {
            if let Some(hit) = self
                .tiers
                .raw
                .find(|e| e.id == entry_id && e.template_id == template.id)
            {
                return Ok(hit);
            }
        }
        let res: ItemResponse<Entry> = self
            .transport
            .send(ApiRequest::get(format!(
                "{}/{}",
                base_path(&template.id),
                entry_id
            )))
            .await?;
        if self.use_cache {
            self.tiers.raw.set(res.item.clone());
        }
        Ok(res.item)
    }

    /// Create an entry from parsed data, transcoding it against the
    /// template schema
    pub async fn create(
        &self,
        template_id_or_name: &str,
        data: EntryParsedCreateData,
    ) -> Result<Entry> {
        let template = self.find_template(template_id_or_name).await?;
        let groups = self.groups.get_all(false).await?;
        let index = group_index(&groups);
        let mut body = EntryCreateBody {
            meta: Vec::with_capacity(data.meta.len()),
            content: data
                .content
                .into_iter()
                .map(|c| EntryContent {
                    lng: c.lng,
                    nodes: c.nodes,
                    plain_text: String::new(),
                })
                .collect(),
            statuses: data.statuses,
        };
        for meta in &data.meta {
            body.meta.push(EntryMeta {
                lng: meta.lng.clone(),
                props: parsed_to_raw(&meta.data, &template.props, &[], &index, "entry")?,
            });
        }
        self.create_raw(&template.id, &body).await
    }

    /// Create an entry from an already raw body
    pub async fn create_raw(
        &self,
        template_id_or_name: &str,
        body: &EntryCreateBody,
    ) -> Result<Entry> {
        let template = self.find_template(template_id_or_name).await?;
        let res: ItemResponse<Entry> = self
            .transport
            .send(ApiRequest::post(
                format!("{}/create", base_path(&template.id)),
                body,
            )?)
            .await?;
        self.cache_mutation(&res.item).await?;
        Ok(res.item)
    }

    /// Update one language of an entry from parsed data
    ///
    /// The entry's current raw props for the target language feed the
    /// transcoder as previous values, so optional keys left out of the
    /// update keep their stored values.
    pub async fn update(
        &self,
        template_id_or_name: &str,
        entry_id: &str,
        data: EntryParsedUpdateData,
    ) -> Result<Entry> {
        let template = self.find_template(template_id_or_name).await?;
        let current = self.get_by_id_raw(entry_id, &template.id, false).await?;
        let old_props = current
            .meta
            .iter()
            .find(|m| m.lng == data.lng)
            .map(|m| m.props.as_slice())
            .unwrap_or(&[]);
        let groups = self.groups.get_all(false).await?;
        let index = group_index(&groups);
        let body = EntryUpdateBody {
            lng: data.lng.clone(),
            status: data.status,
            meta: crate::types::EntryMetaUpdate {
                props: parsed_to_raw(&data.meta, &template.props, old_props, &index, "entry")?,
            },
            content: crate::types::EntryContentUpdate { nodes: data.content },
        };
        self.update_raw(&template.id, entry_id, &body).await
    }

    /// Update an entry from an already raw body
    pub async fn update_raw(
        &self,
        template_id_or_name: &str,
        entry_id: &str,
        body: &EntryUpdateBody,
    ) -> Result<Entry> {
        let template = self.find_template(template_id_or_name).await?;
        let res: ItemResponse<Entry> = self
            .transport
            .send(ApiRequest::put(
                format!("{}/{}/update", base_path(&template.id), entry_id),
                body,
            )?)
            .await?;
        self.cache_mutation(&res.item).await?;
        Ok(res.item)
    }

    /// Delete an entry; evicts it from every tier and clears all latches
    pub async fn delete_by_id(
        &self,
        entry_id: &str,
        template_id_or_name: &str,
    ) -> Result<Entry> {
        let template = self.find_template(template_id_or_name).await?;
        let res: ItemResponse<Entry> = self
            .transport
            .send(ApiRequest::delete(format!(
                "{}/{}",
                base_path(&template.id),
                entry_id
            )))
            .await?;
        if self.use_cache {
            self.tiers.evict(&res.item.id);
            self.tiers.clear_latches();
        }
        Ok(res.item)
    }

    /// After create/update: upsert the raw tier and refresh the parsed view
    async fn cache_mutation(&self, entry: &Entry) -> Result<()> {
        if !self.use_cache {
            return Ok(());
        }
        self.tiers.raw.set(entry.clone());
        // Skip-cache fetch caches the fresh parsed model as a side effect
        self.get_by_id(&entry.id, &entry.template_id, true).await?;
        Ok(())
    }

    /// Inline SVG text into every SVG media object found in the parsed
    /// values, fetching each binary once
    async fn inject_media_svg(&self, entries: &mut [EntryParsed]) -> Result<()> {
        let mut targets: Vec<(String, String)> = Vec::new();
        for entry in entries.iter() {
            for value in entry.meta.values() {
                collect_svg_media(value, &mut targets);
            }
            for nodes in entry.content.values() {
                for node in nodes {
                    collect_svg_media(node, &mut targets);
                }
            }
        }
        let mut svg_by_id: HashMap<String, String> = HashMap::new();
        for (id, name) in targets {
            if svg_by_id.contains_key(&id) {
                continue;
            }
            let bytes = self.media.bin(&id, &name, &BinOptions::default()).await?;
            svg_by_id.insert(id, String::from_utf8_lossy(&bytes).into_owned());
        }
        if svg_by_id.is_empty() {
            return Ok(());
        }
        for entry in entries.iter_mut() {
            for value in entry.meta.values_mut() {
                apply_svg_media(value, &svg_by_id);
            }
            for nodes in entry.content.values_mut() {
                for node in nodes {
                    apply_svg_media(node, &svg_by_id);
                }
            }
        }
        Ok(())
    }
}

/// `(id, name)` of an SVG media object embedded in a parsed value
fn svg_media_target(value: &Value) -> Option<(String, String)> {
    let obj = value.as_object()?;
    if obj.get("type")?.as_str()? != "SVG" {
        return None;
    }
    let id = obj.get("_id")?.as_str()?;
    let name = obj.get("name")?.as_str()?;
    obj.get("mimetype")?.as_str()?;
    // Degenerate media objects without dimensions are skipped
    obj.get("width")?.as_f64()?;
    obj.get("height")?.as_f64()?;
    Some((id.to_string(), name.to_string()))
}

fn collect_svg_media(value: &Value, out: &mut Vec<(String, String)>) {
    if let Some(target) = svg_media_target(value) {
        out.push(target);
        return;
    }
    match value {
        Value::Object(map) => {
            for nested in map.values() {
                collect_svg_media(nested, out);
            }
        }
        Value::Array(items) => {
            for nested in items {
                collect_svg_media(nested, out);
            }
        }
        _ => {}
    }
}

fn apply_svg_media(value: &mut Value, svg_by_id: &HashMap<String, String>) {
    if let Some((id, _)) = svg_media_target(value) {
        if let Some(svg) = svg_by_id.get(&id) {
            if let Some(obj) = value.as_object_mut() {
                obj.insert("svg".to_string(), Value::String(svg.clone()));
            }
        }
        return;
    }
    match value {
        Value::Object(map) => {
            for nested in map.values_mut() {
                apply_svg_media(nested, svg_by_id);
            }
        }
        Value::Array(items) => {
            for nested in items {
                apply_svg_media(nested, svg_by_id);
            }
        }
        _ => {}
    }
}

/// Apply one push event across the three cache tiers
///
/// An update refreshes each tier currently holding the id, using the cached
/// copy's template id for the fetch path; any other event kind evicts the id
/// everywhere and clears all latches.
async fn apply_entry_change(
    transport: &Transport,
    tiers: &EntryTiers,
    event: SocketEvent,
) -> Result<()> {
    let change = ChangeEvent::decode(&event)?;
    if !change.is_update() {
        tiers.evict(&change.id);
        tiers.clear_latches();
        return Ok(());
    }
    if let Some(hit) = tiers.lite.find_by_id(&change.id) {
        let res: ItemResponse<EntryLite> = transport
            .send(ApiRequest::get(format!(
                "{}/{}/lite",
                base_path(&hit.template_id),
                change.id
            )))
            .await?;
        tiers.lite.set(res.item);
    }
    if let Some(hit) = tiers.raw.find_by_id(&change.id) {
        let res: ItemResponse<Entry> = transport
            .send(ApiRequest::get(format!(
                "{}/{}",
                base_path(&hit.template_id),
                change.id
            )))
            .await?;
        tiers.raw.set(res.item);
    }
    if let Some(hit) = tiers.parsed.find_by_id(&change.id) {
        let res: ItemResponse<EntryParsed> = transport
            .send(ApiRequest::get(format!(
                "{}/{}/parse",
                base_path(&hit.template_id),
                change.id
            )))
            .await?;
        tiers.parsed.set(res.item);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiKey, EntryParsedMeta};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn repo_against(server: &MockServer, use_cache: bool) -> EntryRepository {
        let transport = Arc::new(
            Transport::new(
                &server.uri(),
                "org1",
                "inst1",
                ApiKey {
                    id: "k".to_string(),
                    secret: "s".to_string(),
                },
            )
            .unwrap(),
        );
        let templates = Arc::new(Repository::new(Arc::clone(&transport), None, use_cache));
        let groups = Arc::new(Repository::new(Arc::clone(&transport), None, use_cache));
        let statuses = Arc::new(Repository::new(Arc::clone(&transport), None, use_cache));
        let media = Arc::new(MediaRepository::new(
            Arc::clone(&transport),
            None,
            use_cache,
            false,
        ));
        EntryRepository::new(
            transport, None, templates, groups, statuses, media, use_cache, false,
        )
    }

    async fn mount_templates(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v1/org/org1/instance/inst1/template/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "_id": "t1",
                    "name": "blog",
                    "props": [{
                        "id": "p1",
                        "name": "title",
                        "label": "Title",
                        "type": "STRING",
                        "required": true,
                        "array": false
                    }]
                }]
            })))
            .mount(server)
            .await;
    }

    fn entry_parsed_json(id: &str) -> serde_json::Value {
        json!({
            "_id": id,
            "templateId": "t1",
            "statuses": [{ "lng": "en", "id": "s1", "label": "Published" }],
            "meta": { "en": { "title": "Hello", "slug": "hello" } },
            "content": {}
        })
    }

    #[tokio::test]
    async fn get_all_lite_latches_per_template() {
        let server = MockServer::start().await;
        mount_templates(&server).await;
        Mock::given(method("GET"))
            .and(path(
                "/api/v1/org/org1/instance/inst1/template/t1/entry/all/lite",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "_id": "e1", "templateId": "t1", "info": [] }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let repo = repo_against(&server, true).await;
        // Template resolved by name, then by id, both cached
        let first = repo.get_all_lite("blog", false).await.unwrap();
        let second = repo.get_all_lite("t1", false).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second[0].id, "e1");
    }

    #[tokio::test]
    async fn full_set_latch_subsumes_status_filter() {
        let server = MockServer::start().await;
        mount_templates(&server).await;
        Mock::given(method("GET"))
            .and(path(
                "/api/v1/org/org1/instance/inst1/template/t1/entry/all/parsed",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [entry_parsed_json("e1")]
            })))
            .expect(1)
            .mount(&server)
            .await;
        // No all_by_status mock: a network fetch would fail the test

        let repo = repo_against(&server, true).await;
        repo.get_all("blog", false).await.unwrap();

        let by_id = repo.get_all_by_status("blog", "s1", false).await.unwrap();
        assert_eq!(by_id.len(), 1);
        let by_label = repo
            .get_all_by_status("blog", "Published", false)
            .await
            .unwrap();
        assert_eq!(by_label.len(), 1);
        let none = repo.get_all_by_status("blog", "Draft", false).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn create_transcodes_parsed_meta() {
        let server = MockServer::start().await;
        mount_templates(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/org/org1/instance/inst1/group/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(
                "/api/v1/org/org1/instance/inst1/template/t1/entry/create",
            ))
            .and(body_partial_json(json!({
                "meta": [{
                    "lng": "en",
                    "props": [{ "id": "p1", "data": ["Hello"] }]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "item": { "_id": "e1", "templateId": "t1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let repo = repo_against(&server, false).await;
        let meta = match json!({ "title": "Hello" }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let created = repo
            .create(
                "blog",
                EntryParsedCreateData {
                    statuses: vec![],
                    meta: vec![EntryParsedMeta {
                        lng: "en".to_string(),
                        data: meta,
                    }],
                    content: vec![],
                },
            )
            .await
            .unwrap();
        assert_eq!(created.id, "e1");
    }

    #[tokio::test]
    async fn get_by_slug_serves_cache_hit() {
        let server = MockServer::start().await;
        mount_templates(&server).await;
        Mock::given(method("GET"))
            .and(path(
                "/api/v1/org/org1/instance/inst1/template/t1/entry/all/parsed",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [entry_parsed_json("e1")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let repo = repo_against(&server, true).await;
        repo.get_all("blog", false).await.unwrap();
        let hit = repo.get_by_slug("hello", "blog", false).await.unwrap();
        assert_eq!(hit.id, "e1");
    }

    #[tokio::test]
    async fn unknown_template_is_a_lookup_error() {
        let server = MockServer::start().await;
        mount_templates(&server).await;

        let repo = repo_against(&server, true).await;
        let err = repo.get_all_lite("no-such-template", false).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "template \"no-such-template\" not found"
        );
    }

    #[tokio::test]
    async fn update_event_refreshes_only_populated_tiers() {
        let server = MockServer::start().await;
        mount_templates(&server).await;
        Mock::given(method("GET"))
            .and(path(
                "/api/v1/org/org1/instance/inst1/template/t1/entry/all/parsed",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [entry_parsed_json("e1")]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(
                "/api/v1/org/org1/instance/inst1/template/t1/entry/e1/parse",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "item": entry_parsed_json("e1")
            })))
            .expect(1)
            .mount(&server)
            .await;
        // No lite/raw fetch mocks: those tiers are empty and must be skipped

        let repo = repo_against(&server, true).await;
        repo.get_all("blog", false).await.unwrap();

        apply_entry_change(
            &repo.transport,
            &repo.tiers,
            SocketEvent {
                name: "entry".to_string(),
                // Entry events may also name the template
                data: json!({ "type": "update", "entryId": "e1", "templateId": "t1" }),
            },
        )
        .await
        .unwrap();

        // Latch still in place: served from cache
        let items = repo.get_all("blog", false).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn svg_media_without_dimensions_is_not_collected() {
        let mut out = Vec::new();
        collect_svg_media(
            &json!({
                "type": "SVG",
                "_id": "m1",
                "name": "logo.svg",
                "mimetype": "image/svg+xml"
            }),
            &mut out,
        );
        assert!(out.is_empty());

        collect_svg_media(
            &json!({
                "type": "SVG",
                "_id": "m1",
                "name": "logo.svg",
                "mimetype": "image/svg+xml",
                "width": 24,
                "height": 24
            }),
            &mut out,
        );
        assert_eq!(out, vec![("m1".to_string(), "logo.svg".to_string())]);
    }

    #[tokio::test]
    async fn remove_event_clears_every_tier_and_latch() {
        let server = MockServer::start().await;
        mount_templates(&server).await;
        Mock::given(method("GET"))
            .and(path(
                "/api/v1/org/org1/instance/inst1/template/t1/entry/all/parsed",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [entry_parsed_json("e1")]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let repo = repo_against(&server, true).await;
        repo.get_all("blog", false).await.unwrap();

        apply_entry_change(
            &repo.transport,
            &repo.tiers,
            SocketEvent {
                name: "entry".to_string(),
                data: json!({ "type": "remove", "entryId": "e1" }),
            },
        )
        .await
        .unwrap();

        assert!(repo.tiers.parsed.items().is_empty());
        repo.get_all("blog", false).await.unwrap();
    }
}

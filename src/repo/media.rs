//! Media repository
//!
//! Media nodes form a tree (directories and files). Reads share the
//! cache-plus-latch pattern of the generic repository; uploads go through a
//! one-shot upload token and a multipart form; binaries are fetched with
//! backend-side transform flags (thumbnail, WEBP, named size transforms).

use crate::cache::Store;
use crate::channel::{ChangeEvent, RealtimeChannel, Subscription, TOPIC_MEDIA};
use crate::error::Result;
use crate::transport::{ApiRequest, Transport};
use crate::types::{
    ItemResponse, ItemsResponse, Media, MediaCreateDirBody, MediaDeleteBody, MediaKind,
    MediaUpdateBody, MediaUploadTokenResult,
};
use reqwest::multipart::{Form, Part};
use std::sync::Arc;

const BASE_PATH: &str = "/api/v1/org/:orgId/instance/:instanceId/media";
const LATCH_ALL: &str = "all";

/// Binary fetch options mapped to backend query flags
#[derive(Debug, Clone, Default)]
pub struct BinOptions {
    /// Request the thumbnail rendition if available
    pub thumbnail: bool,
    /// Request the WEBP rendition if available
    pub webp: bool,
    /// One of the values from `media.size_transforms`
    pub size_transform: Option<String>,
}

impl BinOptions {
    fn to_query(&self) -> String {
        let mut queries = Vec::new();
        if self.webp {
            queries.push("webp=t".to_string());
        }
        if let Some(size) = &self.size_transform {
            queries.push(format!("sizeT={}", size));
        }
        if self.thumbnail {
            queries.push("tmb=t".to_string());
        }
        if queries.is_empty() {
            String::new()
        } else {
            format!("?{}", queries.join("&"))
        }
    }
}

pub struct MediaRepository {
    transport: Arc<Transport>,
    store: Arc<Store<Media>>,
    use_cache: bool,
    inject_svg: bool,
    _push_sub: Option<Subscription>,
}

impl MediaRepository {
    pub(crate) fn new(
        transport: Arc<Transport>,
        channel: Option<&RealtimeChannel>,
        use_cache: bool,
        inject_svg: bool,
    ) -> Self {
        let store = Arc::new(Store::default());
        let _push_sub = channel.map(|channel| {
            let store = Arc::clone(&store);
            let transport = Arc::clone(&transport);
            channel.register(TOPIC_MEDIA, move |event| {
                let store = Arc::clone(&store);
                let transport = Arc::clone(&transport);
                async move {
                    let change = ChangeEvent::decode(&event)?;
                    if change.is_update() {
                        if store.contains(&change.id) {
                            let res: ItemResponse<Media> = transport
                                .send(ApiRequest::get(format!("{}/{}", BASE_PATH, change.id)))
                                .await?;
                            store.set(res.item);
                        }
                    } else {
                        store.remove(&change.id);
                        store.clear_latches();
                    }
                    Ok(())
                }
            })
        });
        Self {
            transport,
            store,
            use_cache,
            inject_svg,
            _push_sub,
        }
    }

    /// Absolute path of a media node within the tree, e.g. `/dir/file.png`
    pub fn resolve_path(&self, media: &Media, all_media: &[Media]) -> String {
        if let Some(parent_id) = &media.parent_id {
            if let Some(parent) = all_media.iter().find(|m| &m.id == parent_id) {
                return format!("{}/{}", self.resolve_path(parent, all_media), media.name);
            }
        }
        format!("/{}", media.name)
    }

    pub async fn get_all(&self, skip_cache: bool) -> Result<Vec<Media>> {
        if !skip_cache && self.use_cache && self.store.is_latched(LATCH_ALL) {
            return Ok(self.store.items());
        }
        let res: ItemsResponse<Media> = self
            .transport
            .send(ApiRequest::get(format!("{}/all", BASE_PATH)))
            .await?;
        let mut items = res.items;
        if self.inject_svg {
            for item in items.iter_mut() {
                self.fill_svg(item).await?;
            }
        }
        if self.use_cache {
            self.store.set_many(items.iter().cloned());
            self.store.latch(LATCH_ALL);
        }
        Ok(items)
    }

    pub async fn get_by_id(&self, id: &str, skip_cache: bool) -> Result<Media> {
        if !skip_cache && self.use_cache {
            if let Some(hit) = self.store.find_by_id(id) {
                return Ok(hit);
            }
        }
        let res: ItemResponse<Media> = self
            .transport
            .send(ApiRequest::get(format!("{}/{}", BASE_PATH, id)))
            .await?;
        let mut item = res.item;
        if self.inject_svg {
            self.fill_svg(&mut item).await?;
        }
        if self.use_cache {
            self.store.set(item.clone());
        }
        Ok(item)
    }

    /// One-shot upload token, valid for a single [`create_file`](Self::create_file)
    pub async fn request_upload_token(&self) -> Result<String> {
        let res: MediaUploadTokenResult = self
            .transport
            .send(ApiRequest::get(format!(
                "{}/request/upload-token",
                BASE_PATH
            )))
            .await?;
        Ok(res.token)
    }

    pub async fn create_dir(&self, body: &MediaCreateDirBody) -> Result<Media> {
        let res: ItemResponse<Media> = self
            .transport
            .send(ApiRequest::post(format!("{}/create/dir", BASE_PATH), body)?)
            .await?;
        if self.use_cache {
            self.store.set(res.item.clone());
        }
        Ok(res.item)
    }

    /// Upload a file under an upload token obtained from
    /// [`request_upload_token`](Self::request_upload_token)
    pub async fn create_file(
        &self,
        upload_token: &str,
        parent_id: Option<&str>,
        name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Media> {
        let mut query = vec![format!("token={}", urlencoding::encode(upload_token))];
        if let Some(parent_id) = parent_id {
            query.push(format!("parentId={}", urlencoding::encode(parent_id)));
        }
        let path = format!("{}/create/file?{}", BASE_PATH, query.join("&"));
        let part = Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(mime_type)?;
        let form = Form::new().part("file", part);
        let res: ItemResponse<Media> = self.transport.send_multipart(&path, form).await?;
        if self.use_cache {
            self.store.set(res.item.clone());
        }
        Ok(res.item)
    }

    pub async fn update(&self, body: &MediaUpdateBody) -> Result<Media> {
        let res: ItemResponse<Media> = self
            .transport
            .send(ApiRequest::put(format!("{}/update", BASE_PATH), body)?)
            .await?;
        if self.use_cache {
            self.store.set(res.item.clone());
        }
        Ok(res.item)
    }

    /// Bulk delete; evicts the ids and clears every latch
    pub async fn delete(&self, body: &MediaDeleteBody) -> Result<()> {
        let req = ApiRequest::delete_with_body(format!("{}/delete", BASE_PATH), body)?;
        let _: serde_json::Value = self.transport.send(req).await?;
        if self.use_cache {
            let ids: Vec<&str> = body.media_ids.iter().map(String::as_str).collect();
            self.store.remove_many(&ids);
            self.store.clear_latches();
        }
        Ok(())
    }

    /// Fetch a media binary, optionally transformed by the backend
    pub async fn bin(&self, id: &str, filename: &str, options: &BinOptions) -> Result<Vec<u8>> {
        self.transport
            .send_bytes(ApiRequest::get(format!(
                "{}/{}/bin/{}{}",
                BASE_PATH,
                id,
                urlencoding::encode(filename),
                options.to_query()
            )))
            .await
    }

    /// Instance-relative URL for a media binary, carrying the API key as a
    /// query parameter so it can be used directly in markup
    pub fn bin_url(&self, id: &str, filename: &str, options: &BinOptions) -> String {
        let base = self.transport.resolve_path(BASE_PATH);
        let query = options.to_query();
        let separator = if query.is_empty() { "?" } else { "&" };
        format!(
            "{}/{}/bin/{}{}{}apiKey={}",
            base,
            id,
            urlencoding::encode(filename),
            query,
            separator,
            self.transport.api_key_query()
        )
    }

    async fn fill_svg(&self, media: &mut Media) -> Result<()> {
        if media.kind == MediaKind::Svg && media.svg.is_none() {
            let bytes = self.bin(&media.id, &media.name, &BinOptions::default()).await?;
            media.svg = Some(String::from_utf8_lossy(&bytes).into_owned());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiKey;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn media_json(id: &str, name: &str, kind: &str, parent: Option<&str>) -> serde_json::Value {
        let mut value = json!({
            "_id": id,
            "type": kind,
            "name": name,
        });
        if let Some(parent) = parent {
            value["parentId"] = json!(parent);
        }
        value
    }

    async fn repo_against(server: &MockServer, use_cache: bool, inject_svg: bool) -> MediaRepository {
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
        MediaRepository::new(transport, None, use_cache, inject_svg)
    }

    #[tokio::test]
    async fn resolve_path_walks_parents() {
        let server = MockServer::start().await;
        let repo = repo_against(&server, false, false).await;
        let all: Vec<Media> = serde_json::from_value(json!([
            media_json("d1", "images", "DIR", None),
            media_json("d2", "icons", "DIR", Some("d1")),
            media_json("f1", "logo.svg", "SVG", Some("d2")),
        ]))
        .unwrap();

        assert_eq!(repo.resolve_path(&all[2], &all), "/images/icons/logo.svg");
        assert_eq!(repo.resolve_path(&all[0], &all), "/images");
    }

    #[tokio::test]
    async fn get_all_inlines_svg_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/org/org1/instance/inst1/media/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    media_json("f1", "logo.svg", "SVG", None),
                    media_json("f2", "photo.jpg", "IMG", None),
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/org/org1/instance/inst1/media/f1/bin/logo.svg"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<svg/>"))
            .expect(1)
            .mount(&server)
            .await;

        let repo = repo_against(&server, false, true).await;
        let items = repo.get_all(false).await.unwrap();
        assert_eq!(items[0].svg.as_deref(), Some("<svg/>"));
        assert!(items[1].svg.is_none());
    }

    #[tokio::test]
    async fn bin_passes_transform_flags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/org/org1/instance/inst1/media/f1/bin/photo.jpg"))
            .and(query_param("webp", "t"))
            .and(query_param("sizeT", "300x300"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let repo = repo_against(&server, false, false).await;
        let bytes = repo
            .bin(
                "f1",
                "photo.jpg",
                &BinOptions {
                    webp: true,
                    size_transform: Some("300x300".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn bin_url_carries_api_key() {
        let server = MockServer::start().await;
        let repo = repo_against(&server, false, false).await;
        let url = repo.bin_url("f1", "photo.jpg", &BinOptions::default());
        assert_eq!(
            url,
            "/api/v1/org/org1/instance/inst1/media/f1/bin/photo.jpg?apiKey=k.s"
        );
    }

    #[tokio::test]
    async fn delete_evicts_and_clears_latches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/org/org1/instance/inst1/media/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [media_json("f1", "a.txt", "TXT", None)]
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/org/org1/instance/inst1/media/delete"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let repo = repo_against(&server, true, false).await;
        repo.get_all(false).await.unwrap();
        repo.delete(&MediaDeleteBody {
            media_ids: vec!["f1".to_string()],
        })
        .await
        .unwrap();
        // Latch cleared, so this goes back to the network
        repo.get_all(false).await.unwrap();
    }
}

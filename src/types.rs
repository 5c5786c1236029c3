//! Wire types for the Tessera CMS API
//!
//! Entity models mirror the backend's JSON representation. Property schemas
//! (`Prop`) and property values (`PropValue`) are the two halves of the
//! raw/parsed conversion performed by [`crate::transcode`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::cache::Keyed;

/// Shorthand for a parsed key/value property object
pub type JsonMap = serde_json::Map<String, Value>;

/// API key credential pair used to authenticate every request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub secret: String,
}

/// Client behavior switches
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the CMS backend
    pub cms_origin: String,
    /// Serve repeated reads from the in-memory cache layer
    pub use_mem_cache: bool,
    /// Keep caches fresh via the realtime event channel
    pub enable_socket: bool,
    /// Eagerly inline SVG text into media results and parsed entries
    pub inject_svg: bool,
    /// Verbose event logging on the realtime channel
    pub debug: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            cms_origin: "https://app.tessera.dev".to_string(),
            use_mem_cache: false,
            enable_socket: false,
            inject_svg: false,
            debug: false,
        }
    }
}

// ==================== Response wrappers ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResponse<T> {
    pub item: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

// ==================== Property schemas ====================

/// Type tag of a schema property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropType {
    Boolean,
    Number,
    String,
    Enumeration,
    Date,
    EntryPointer,
    GroupPointer,
    Media,
    RichText,
}

/// Auxiliary constraint data carried by enumeration and group-pointer props
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop_enum: Option<PropEnumData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop_group_pointer: Option<PropGroupPointerData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropEnumData {
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropGroupPointerData {
    #[serde(rename = "_id")]
    pub group_id: String,
}

/// One property definition inside a template, group or widget schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prop {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub kind: PropType,
    pub required: bool,
    pub array: bool,
    #[serde(default)]
    pub data: PropData,
}

// ==================== Property values (raw form) ====================

/// One stored property value, aligned by `id` with a schema property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropValue {
    pub id: String,
    pub data: PropValueData,
}

/// Raw value payload: a JSON value list for every type except group
/// pointers, which nest a full property list per group item.
///
/// Scalar (non-array) properties are stored as one-element lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValueData {
    Group(PropValueGroupData),
    Items(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropValueGroupData {
    #[serde(rename = "_id")]
    pub group_id: String,
    pub items: Vec<PropValueGroupItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropValueGroupItem {
    pub props: Vec<PropValue>,
}

// ==================== Entities ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub single_entry: bool,
    #[serde(default)]
    pub props: Vec<Prop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub props: Vec<Prop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub props: Vec<Prop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Language {
    #[serde(rename = "_id")]
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub native_name: String,
    #[serde(default, rename = "default")]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryStatus {
    #[serde(rename = "_id")]
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Media node kind as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaKind {
    Dir,
    Img,
    Svg,
    Vid,
    Gif,
    Txt,
    Js,
    Css,
    Html,
    Pdf,
    Oth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub name: String,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub size_transforms: Vec<String>,
    /// Inlined SVG text, populated client-side when `inject_svg` is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svg: Option<String>,
}

// ==================== Entries ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryStatusValue {
    pub lng: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub lng: String,
    pub props: Vec<PropValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryContent {
    pub lng: String,
    pub nodes: Vec<Value>,
    #[serde(default)]
    pub plain_text: String,
}

/// Raw entry model, the backend's internal storage representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    pub template_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub statuses: Vec<EntryStatusValue>,
    #[serde(default)]
    pub meta: Vec<EntryMeta>,
    #[serde(default)]
    pub content: Vec<EntryContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryLiteInfo {
    pub lng: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

/// Lightweight entry listing model (no property payloads)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryLite {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    pub template_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub statuses: Vec<EntryStatusValue>,
    #[serde(default)]
    pub info: Vec<EntryLiteInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEntryStatus {
    pub lng: String,
    pub id: String,
    #[serde(default)]
    pub label: String,
}

/// Parsed entry model: meta keyed by language, property values in their
/// application-facing shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryParsed {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    pub template_id: String,
    #[serde(default)]
    pub template_name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub statuses: Vec<ParsedEntryStatus>,
    #[serde(default)]
    pub meta: HashMap<String, Value>,
    #[serde(default)]
    pub content: HashMap<String, Vec<Value>>,
}

// ==================== Request bodies ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryCreateBody {
    pub meta: Vec<EntryMeta>,
    pub content: Vec<EntryContent>,
    pub statuses: Vec<EntryStatusValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetaUpdate {
    pub props: Vec<PropValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryContentUpdate {
    pub nodes: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryUpdateBody {
    pub lng: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub meta: EntryMetaUpdate,
    pub content: EntryContentUpdate,
}

/// Parsed-shape input for [`crate::repo::EntryRepository::create`]
#[derive(Debug, Clone)]
pub struct EntryParsedCreateData {
    pub statuses: Vec<EntryStatusValue>,
    pub meta: Vec<EntryParsedMeta>,
    pub content: Vec<EntryParsedContent>,
}

#[derive(Debug, Clone)]
pub struct EntryParsedMeta {
    pub lng: String,
    pub data: JsonMap,
}

#[derive(Debug, Clone)]
pub struct EntryParsedContent {
    pub lng: String,
    pub nodes: Vec<Value>,
}

/// Parsed-shape input for [`crate::repo::EntryRepository::update`]
#[derive(Debug, Clone)]
pub struct EntryParsedUpdateData {
    pub lng: String,
    pub status: Option<String>,
    pub meta: JsonMap,
    pub content: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUpdateBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_entry: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaCreateDirBody {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUpdateBody {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDeleteBody {
    pub media_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaUploadTokenResult {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPromptBody {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereIsItUsedPointer {
    pub entry_id: String,
    pub template_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereIsItUsedResult {
    #[serde(default)]
    pub entries: Vec<WhereIsItUsedPointer>,
    #[serde(default)]
    pub template_ids: Vec<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub widget_ids: Vec<String>,
}

// ==================== Cache keys ====================

impl Keyed for Template {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Group {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Widget {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Language {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for EntryStatus {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Media {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Entry {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for EntryLite {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for EntryParsed {
    fn key(&self) -> &str {
        &self.id
    }
}

//! SDK entry point
//!
//! A [`Client`] is bound to one org/instance pair and one API key. It owns
//! the HTTP transport, the realtime channel and one repository per entity
//! kind; repositories share the transport and, when the socket is enabled,
//! the channel.

use crate::channel::{ChannelConfig, RealtimeChannel};
use crate::error::Result;
use crate::repo::{AiRepository, EntryRepository, MediaRepository, Repository};
use crate::transport::Transport;
use crate::types::{ApiKey, ClientOptions, EntryStatus, Group, Language, Template, Widget};
use std::sync::Arc;

/// Client for one CMS instance
///
/// # Example
///
/// ```rust,no_run
/// use tessera_client::{ApiKey, Client, ClientOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::new(
///     "org-id",
///     "instance-id",
///     ApiKey {
///         id: "key-id".into(),
///         secret: "key-secret".into(),
///     },
///     ClientOptions {
///         use_mem_cache: true,
///         ..Default::default()
///     },
/// )?;
///
/// let entries = client.entries().get_all("blog", false).await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    options: ClientOptions,
    channel: Arc<RealtimeChannel>,
    templates: Arc<Repository<Template>>,
    groups: Arc<Repository<Group>>,
    languages: Arc<Repository<Language>>,
    widgets: Arc<Repository<Widget>>,
    entry_statuses: Arc<Repository<EntryStatus>>,
    media: Arc<MediaRepository>,
    entries: Arc<EntryRepository>,
    ai: Arc<AiRepository>,
}

impl Client {
    pub fn new(
        org_id: &str,
        instance_id: &str,
        api_key: ApiKey,
        options: ClientOptions,
    ) -> Result<Self> {
        let transport = Arc::new(Transport::new(
            &options.cms_origin,
            org_id,
            instance_id,
            api_key,
        )?);
        let mut channel_config = ChannelConfig::new(transport.socket_url());
        channel_config.debug = options.debug;
        let channel = Arc::new(RealtimeChannel::new(channel_config));
        let push = options.enable_socket.then_some(&*channel);

        let use_cache = options.use_mem_cache;
        let templates = Arc::new(Repository::new(Arc::clone(&transport), push, use_cache));
        let groups = Arc::new(Repository::new(Arc::clone(&transport), push, use_cache));
        let languages = Arc::new(Repository::new(Arc::clone(&transport), push, use_cache));
        let widgets = Arc::new(Repository::new(Arc::clone(&transport), push, use_cache));
        let entry_statuses = Arc::new(Repository::new(Arc::clone(&transport), push, use_cache));
        let media = Arc::new(MediaRepository::new(
            Arc::clone(&transport),
            push,
            use_cache,
            options.inject_svg,
        ));
        let entries = Arc::new(EntryRepository::new(
            Arc::clone(&transport),
            push,
            Arc::clone(&templates),
            Arc::clone(&groups),
            Arc::clone(&entry_statuses),
            Arc::clone(&media),
            use_cache,
            options.inject_svg,
        ));
        let ai = Arc::new(AiRepository::new(
            Arc::clone(&transport),
            Arc::clone(&channel),
        ));

        Ok(Self {
            options,
            channel,
            templates,
            groups,
            languages,
            widgets,
            entry_statuses,
            media,
            entries,
            ai,
        })
    }

    /// Establish the realtime channel; no-op unless `enable_socket`
    pub async fn connect(&self) -> Result<()> {
        if !self.options.enable_socket {
            return Ok(());
        }
        self.channel.connect().await
    }

    /// Tear down the realtime channel
    pub async fn disconnect(&self) {
        self.channel.disconnect().await;
    }

    pub fn templates(&self) -> &Repository<Template> {
        &self.templates
    }

    pub fn groups(&self) -> &Repository<Group> {
        &self.groups
    }

    pub fn languages(&self) -> &Repository<Language> {
        &self.languages
    }

    pub fn widgets(&self) -> &Repository<Widget> {
        &self.widgets
    }

    pub fn entry_statuses(&self) -> &Repository<EntryStatus> {
        &self.entry_statuses
    }

    pub fn media(&self) -> &MediaRepository {
        &self.media
    }

    pub fn entries(&self) -> &EntryRepository {
        &self.entries
    }

    pub fn ai(&self) -> &AiRepository {
        &self.ai
    }

    pub fn channel(&self) -> &RealtimeChannel {
        &self.channel
    }
}

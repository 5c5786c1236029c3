//! Tessera Client - Rust SDK for the Tessera CMS API
//!
//! Client library for reading and writing CMS content: templates, groups,
//! widgets, languages, entry statuses, media and entries.
//!
//! # Architecture
//!
//! - One [`Client`] per org/instance pair, authenticated by an API key
//! - Per-entity repositories with an optional in-memory read-through cache
//! - An optional realtime channel that keeps caches fresh from push events
//! - A schema-driven transcoder between raw and parsed entry properties
//!
//! # Example
//!
//! ```rust,no_run
//! use tessera_client::{ApiKey, Client, ClientOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(
//!     "org-id",
//!     "instance-id",
//!     ApiKey {
//!         id: "key-id".into(),
//!         secret: "key-secret".into(),
//!     },
//!     ClientOptions {
//!         use_mem_cache: true,
//!         enable_socket: true,
//!         ..Default::default()
//!     },
//! )?;
//! client.connect().await?;
//!
//! let posts = client.entries().get_all("blog", false).await?;
//! for post in posts {
//!     println!("{}", post.id);
//! }
//! # Ok(())
//! # }
//! ```

// Caching primitives
pub mod cache;

// Realtime event channel
pub mod channel;

// SDK entry point
pub mod client;

// Error types
pub mod error;

// Raw/parsed property transcoding
pub mod transcode;

// HTTP transport
pub mod transport;

// Entity repositories
pub mod repo;

// Wire types and entity models
pub mod types;

// Re-export the primary surface
pub use client::Client;
pub use error::{Error, Result};
pub use types::{ApiKey, ClientOptions};

// Re-export repository and channel handles
pub use channel::{ChannelState, RealtimeChannel, SocketEvent, Subscription};
pub use repo::{AiRepository, BinOptions, EntryRepository, MediaRepository, Repository};

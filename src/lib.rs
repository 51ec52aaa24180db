//! Backend-for-frontend authentication broker - server-side sessions, on-behalf-of delegation,
//! and app-token fallback in front of a downstream graph API.
//!
//! The crate shields a single-page application from ever holding long-lived credentials.
//! Inbound requests flow through the claims extractor ([`claims`]), the token broker
//! ([`broker`]) picks the credential tier (session cache, refresh, on-behalf-of exchange,
//! or app-only client credentials), and the forwarding gateway ([`gateway`]) carries the
//! resulting bearer token to the downstream API. The HTTP surface lives in [`server`].

#![deny(clippy::all, missing_docs)]

pub mod auth;
pub mod broker;
pub mod claims;
pub mod config;
pub mod error;
pub mod gateway;
pub mod login;
pub mod obs;
pub mod provider;
pub mod server;
pub mod session;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::Client as ReqwestClient;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use url;

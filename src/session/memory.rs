//! Thread-safe in-memory [`SessionStore`] implementation.
//!
//! Sessions live for the process lifetime only; a restart logs every browser
//! out. That matches a single-instance deployment, which is all this store
//! is meant for.

// self
use crate::{
	_prelude::*,
	auth::SessionTokens,
	session::{PendingLogin, SessionData, SessionId, SessionStore, StoreError, StoreFuture},
};

type SessionMap = Arc<RwLock<HashMap<SessionId, SessionData>>>;

/// Thread-safe store keeping sessions in-process.
#[derive(Clone, Debug, Default)]
pub struct MemorySessionStore(SessionMap);
impl MemorySessionStore {
	fn create_now(map: SessionMap) -> SessionId {
		let id = SessionId::random();

		map.write().insert(id.clone(), SessionData::default());

		id
	}

	fn fetch_now(map: SessionMap, id: SessionId) -> Option<SessionData> {
		map.read().get(&id).cloned()
	}

	fn put_tokens_now(
		map: SessionMap,
		id: SessionId,
		tokens: SessionTokens,
	) -> Result<(), StoreError> {
		match map.write().get_mut(&id) {
			Some(data) => {
				data.tokens = Some(tokens);

				Ok(())
			},
			None => Err(StoreError::UnknownSession { id: id.as_str().into() }),
		}
	}

	fn set_pending_now(
		map: SessionMap,
		id: SessionId,
		pending: PendingLogin,
	) -> Result<(), StoreError> {
		match map.write().get_mut(&id) {
			Some(data) => {
				data.pending_login = Some(pending);

				Ok(())
			},
			None => Err(StoreError::UnknownSession { id: id.as_str().into() }),
		}
	}

	fn take_pending_now(map: SessionMap, id: SessionId) -> Option<PendingLogin> {
		map.write().get_mut(&id).and_then(|data| data.pending_login.take())
	}

	fn destroy_now(map: SessionMap, id: SessionId) {
		map.write().remove(&id);
	}
}
impl SessionStore for MemorySessionStore {
	fn create(&self) -> StoreFuture<'_, SessionId> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::create_now(map)) })
	}

	fn fetch<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<SessionData>> {
		let map = self.0.clone();
		let id = id.to_owned();

		Box::pin(async move { Ok(Self::fetch_now(map, id)) })
	}

	fn put_tokens<'a>(
		&'a self,
		id: &'a SessionId,
		tokens: SessionTokens,
	) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let id = id.to_owned();

		Box::pin(async move { Self::put_tokens_now(map, id, tokens) })
	}

	fn set_pending_login<'a>(
		&'a self,
		id: &'a SessionId,
		pending: PendingLogin,
	) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let id = id.to_owned();

		Box::pin(async move { Self::set_pending_now(map, id, pending) })
	}

	fn take_pending_login<'a>(
		&'a self,
		id: &'a SessionId,
	) -> StoreFuture<'a, Option<PendingLogin>> {
		let map = self.0.clone();
		let id = id.to_owned();

		Box::pin(async move { Ok(Self::take_pending_now(map, id)) })
	}

	fn destroy<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let id = id.to_owned();

		Box::pin(async move {
			Self::destroy_now(map, id);

			Ok(())
		})
	}
}

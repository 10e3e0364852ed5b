use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("corrupt value under '{0}'")] Corrupt(String),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Read-modify-write step applied to the current value of one key.
/// Returning `Ok(None)` leaves the stored value untouched.
pub type Mutation = Box<dyn FnOnce(Option<String>) -> RepoResult<Option<String>> + Send>;

/// Keyed storage of serialized values plus named sequential counters.
#[async_trait]
pub trait Store: Send + Sync {
    async fn read(&self, key: &str) -> RepoResult<Option<String>>;
    async fn write(&self, key: &str, value: String) -> RepoResult<()>;
    async fn remove(&self, key: &str) -> RepoResult<()>;
    /// Applies `f` atomically; returns true when a new value was written.
    async fn modify(&self, key: &str, f: Mutation) -> RepoResult<bool>;
    /// Increments the counter and returns the new value in one step.
    /// Missing counters start at 0.
    async fn increment_counter(&self, counter: &str) -> RepoResult<i64>;
    async fn set_counter(&self, counter: &str, value: i64) -> RepoResult<()>;
}

/// An entity stored as one JSON array under `KEY`.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KEY: &'static str;
    fn id(&self) -> &str;
    fn set_id(&mut self, id: Id);
}

macro_rules! record {
    ($ty:ty, $key:literal) => {
        impl Record for $ty {
            const KEY: &'static str = $key;
            fn id(&self) -> &str { &self.id }
            fn set_id(&mut self, id: Id) { self.id = id; }
        }
    };
}

record!(User, "users");
record!(Staff, "staff");
record!(Student, "students");
record!(Class, "classes");
record!(FeeRecord, "fees");
record!(Announcement, "announcements");
record!(Assignment, "assignments");
record!(OfficialDocument, "documents");

fn decode<T: Record>(raw: Option<String>) -> RepoResult<Vec<T>> {
    match raw {
        None => Ok(Vec::new()),
        Some(s) => serde_json::from_str(&s).map_err(|e| {
            log::error!("failed to decode collection '{}': {e}", T::KEY);
            RepoError::Corrupt(T::KEY.to_string())
        }),
    }
}

fn encode<T: Record>(items: &[T]) -> RepoResult<String> {
    serde_json::to_string(items).map_err(|e| RepoError::Internal(e.to_string()))
}

/// Typed accessor over one entity collection.
pub struct Collection<'a, T> {
    store: &'a dyn Store,
    _marker: PhantomData<fn() -> T>,
}

pub fn collection<T: Record>(store: &dyn Store) -> Collection<'_, T> {
    Collection { store, _marker: PhantomData }
}

impl<'a, T: Record> Collection<'a, T> {
    /// Whole collection in insertion order.
    pub async fn get_all(&self) -> RepoResult<Vec<T>> {
        decode(self.store.read(T::KEY).await?)
    }

    pub async fn get(&self, id: &str) -> RepoResult<Option<T>> {
        Ok(self.get_all().await?.into_iter().find(|r| r.id() == id))
    }

    pub async fn find<F>(&self, pred: F) -> RepoResult<Option<T>>
    where
        F: Fn(&T) -> bool,
    {
        Ok(self.get_all().await?.into_iter().find(|r| pred(r)))
    }

    /// Appends `item`; an id already present is a conflict.
    pub async fn add(&self, item: T) -> RepoResult<T> {
        let stored = item.clone();
        self.store
            .modify(
                T::KEY,
                Box::new(move |cur| {
                    let mut items = decode::<T>(cur)?;
                    if items.iter().any(|r| r.id() == item.id()) {
                        return Err(RepoError::Conflict);
                    }
                    items.push(item);
                    Ok(Some(encode(&items)?))
                }),
            )
            .await?;
        Ok(stored)
    }

    /// Replaces the record with `id`, keeping its position and id.
    /// Returns false (and writes nothing) when no record matches.
    pub async fn update(&self, id: &str, mut item: T) -> RepoResult<bool> {
        item.set_id(id.to_string());
        let id = id.to_string();
        self.store
            .modify(
                T::KEY,
                Box::new(move |cur| {
                    let mut items = decode::<T>(cur)?;
                    match items.iter_mut().find(|r| r.id() == id) {
                        Some(slot) => {
                            *slot = item;
                            Ok(Some(encode(&items)?))
                        }
                        None => Ok(None),
                    }
                }),
            )
            .await
    }

    /// Applies `f` to the record with `id` inside one store mutation and
    /// returns the updated record, or `None` when no record matches.
    pub async fn update_with<F>(&self, id: &str, f: F) -> RepoResult<Option<T>>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        let id = id.to_string();
        let updated = Arc::new(OnceCell::new());
        let out = Arc::clone(&updated);
        self.store
            .modify(
                T::KEY,
                Box::new(move |cur| {
                    let mut items = decode::<T>(cur)?;
                    let Some(slot) = items.iter_mut().find(|r| r.id() == id) else { return Ok(None) };
                    f(slot);
                    let _ = out.set(slot.clone());
                    Ok(Some(encode(&items)?))
                }),
            )
            .await?;
        Ok(updated.get().cloned())
    }

    /// Removes the record with `id`; false when it was already gone.
    pub async fn delete(&self, id: &str) -> RepoResult<bool> {
        let id = id.to_string();
        self.store
            .modify(
                T::KEY,
                Box::new(move |cur| {
                    let mut items = decode::<T>(cur)?;
                    let before = items.len();
                    items.retain(|r| r.id() != id);
                    if items.len() == before {
                        return Ok(None);
                    }
                    Ok(Some(encode(&items)?))
                }),
            )
            .await
    }
}

fn profile_picture_key(user_id: &str) -> String {
    format!("profile_picture:{user_id}")
}

pub async fn profile_picture(store: &dyn Store, user_id: &str) -> RepoResult<Option<String>> {
    store.read(&profile_picture_key(user_id)).await
}

pub async fn set_profile_picture(store: &dyn Store, user_id: &str, data_url: String) -> RepoResult<()> {
    store.write(&profile_picture_key(user_id), data_url).await
}

pub async fn clear_profile_picture(store: &dyn Store, user_id: &str) -> RepoResult<()> {
    store.remove(&profile_picture_key(user_id)).await
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{RwLock, RwLockWriteGuard};

    const SNAPSHOT_FILE: &str = "state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        entries: HashMap<String, String>,
        counters: HashMap<String, i64>,
    }

    /// Process-local store, optionally mirrored to a JSON snapshot on disk.
    #[derive(Clone)]
    pub struct InMemStore {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemStore {
        /// Loads `<data_dir>/state.json` if present and persists after every write.
        /// An unreadable or unparsable snapshot is an error rather than an empty start.
        pub fn open(data_dir: &Path) -> RepoResult<Self> {
            let path = data_dir.join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&path)?;
            Ok(Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(path)),
            })
        }

        /// No snapshot; state lives as long as the value.
        pub fn ephemeral() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
        }

        fn load_state_from(path: &Path) -> RepoResult<State> {
            match std::fs::read(path) {
                Ok(bytes) => {
                    let state = serde_json::from_slice::<State>(&bytes).map_err(|e| {
                        log::error!("failed to parse snapshot '{}': {e}", path.display());
                        RepoError::Corrupt(path.display().to_string())
                    })?;
                    log::info!("loaded snapshot '{}'", path.display());
                    Ok(state)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::info!("no snapshot at '{}'. Starting empty.", path.display());
                    Ok(State::default())
                }
                Err(e) => Err(RepoError::Internal(format!("reading snapshot '{}': {e}", path.display()))),
            }
        }

        fn lock(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("store lock poisoned".into()))
        }

        // Called with the write lock held so snapshots land in commit order.
        // Written beside the target and renamed over it.
        fn persist(&self, state: &State) {
            let Some(path) = self.snapshot_path.as_deref() else { return };
            let bytes = match serde_json::to_vec(state) {
                Ok(b) => b,
                Err(e) => return log::error!("failed to serialize snapshot: {e}"),
            };
            if let Some(dir) = path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            let tmp = path.with_extension("json.tmp");
            if let Err(e) = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, path)) {
                log::error!("failed to write snapshot '{}': {e}", path.display());
            }
        }
    }

    #[async_trait]
    impl Store for InMemStore {
        async fn read(&self, key: &str) -> RepoResult<Option<String>> {
            let s = self.state.read().map_err(|_| RepoError::Internal("store lock poisoned".into()))?;
            Ok(s.entries.get(key).cloned())
        }

        async fn write(&self, key: &str, value: String) -> RepoResult<()> {
            let mut s = self.lock()?;
            s.entries.insert(key.to_string(), value);
            self.persist(&s);
            Ok(())
        }

        async fn remove(&self, key: &str) -> RepoResult<()> {
            let mut s = self.lock()?;
            if s.entries.remove(key).is_some() {
                self.persist(&s);
            }
            Ok(())
        }

        async fn modify(&self, key: &str, f: Mutation) -> RepoResult<bool> {
            let mut s = self.lock()?;
            let current = s.entries.get(key).cloned();
            match f(current)? {
                Some(next) => {
                    s.entries.insert(key.to_string(), next);
                    self.persist(&s);
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn increment_counter(&self, counter: &str) -> RepoResult<i64> {
            let mut s = self.lock()?;
            let value = {
                let slot = s.counters.entry(counter.to_string()).or_insert(0);
                *slot += 1;
                *slot
            };
            self.persist(&s);
            Ok(value)
        }

        async fn set_counter(&self, counter: &str, value: i64) -> RepoResult<()> {
            let mut s = self.lock()?;
            s.counters.insert(counter.to_string(), value);
            self.persist(&s);
            Ok(())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    fn internal(e: sqlx::Error) -> RepoError {
        log::error!("postgres store error: {e}");
        RepoError::Internal(e.to_string())
    }

    #[derive(Clone)]
    pub struct PgStore { pool: Pool<Postgres> }

    impl PgStore {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub async fn ensure_schema(&self) -> RepoResult<()> {
            sqlx::query("CREATE TABLE IF NOT EXISTS kv_store (key TEXT PRIMARY KEY, value TEXT)")
                .execute(&self.pool).await.map_err(internal)?;
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS id_counters (counter_type TEXT PRIMARY KEY, current_value BIGINT NOT NULL DEFAULT 0)"
            )
                .execute(&self.pool).await.map_err(internal)?;
            Ok(())
        }
    }

    #[async_trait]
    impl Store for PgStore {
        async fn read(&self, key: &str) -> RepoResult<Option<String>> {
            let value = sqlx::query_scalar::<_, Option<String>>("SELECT value FROM kv_store WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool).await.map_err(internal)?;
            Ok(value.flatten())
        }

        async fn write(&self, key: &str, value: String) -> RepoResult<()> {
            sqlx::query(
                "INSERT INTO kv_store (key, value) VALUES ($1, $2) ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value"
            )
                .bind(key).bind(value)
                .execute(&self.pool).await.map_err(internal)?;
            Ok(())
        }

        async fn remove(&self, key: &str) -> RepoResult<()> {
            sqlx::query("DELETE FROM kv_store WHERE key = $1")
                .bind(key)
                .execute(&self.pool).await.map_err(internal)?;
            Ok(())
        }

        async fn modify(&self, key: &str, f: Mutation) -> RepoResult<bool> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            // materialise the row so FOR UPDATE has something to lock
            sqlx::query("INSERT INTO kv_store (key, value) VALUES ($1, NULL) ON CONFLICT (key) DO NOTHING")
                .bind(key)
                .execute(&mut *tx).await.map_err(internal)?;
            let current = sqlx::query_scalar::<_, Option<String>>("SELECT value FROM kv_store WHERE key = $1 FOR UPDATE")
                .bind(key)
                .fetch_one(&mut *tx).await.map_err(internal)?;
            let written = match f(current)? {
                Some(next) => {
                    sqlx::query("UPDATE kv_store SET value = $2 WHERE key = $1")
                        .bind(key).bind(next)
                        .execute(&mut *tx).await.map_err(internal)?;
                    true
                }
                None => false,
            };
            tx.commit().await.map_err(internal)?;
            Ok(written)
        }

        async fn increment_counter(&self, counter: &str) -> RepoResult<i64> {
            sqlx::query_scalar::<_, i64>(r#"
                INSERT INTO id_counters (counter_type, current_value) VALUES ($1, 1)
                ON CONFLICT (counter_type) DO UPDATE SET current_value = id_counters.current_value + 1
                RETURNING current_value
            "#)
                .bind(counter)
                .fetch_one(&self.pool).await.map_err(internal)
        }

        async fn set_counter(&self, counter: &str, value: i64) -> RepoResult<()> {
            sqlx::query(
                "INSERT INTO id_counters (counter_type, current_value) VALUES ($1, $2) ON CONFLICT (counter_type) DO UPDATE SET current_value = EXCLUDED.current_value"
            )
                .bind(counter).bind(value)
                .execute(&self.pool).await.map_err(internal)?;
            Ok(())
        }
    }
}

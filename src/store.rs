/*!
 # Persisted configuration

 A thin layer over an external key/value store. Writes only reach the backend
 when a value actually changed, which keeps flash wear down on real hardware.
*/

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::color::Rgb;
use crate::effects::Effect;
use crate::{Error, Result};

/// Namespace all settings live under
pub const NAMESPACE: &str = "iot_lights";

pub const KEY_PALETTE: &str = "palette";
pub const KEY_SPEED: &str = "speed";
pub const KEY_BRIGHTNESS: &str = "brightness";
pub const KEY_EFFECT: &str = "effect";

/// A stored scalar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    U8(u8),
    Str(String),
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Value::U8(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

/// External persistence.
///
/// `set` may be buffered; nothing is guaranteed durable until `commit`.
/// A missing key is `Ok(None)`, never an error.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: BTreeMap<String, Value>,
    writes: usize,
    commits: usize,
    fail_writes: bool,
}

/// In-memory store. Clones share the same contents, so a test can keep one
/// clone to inspect what the orchestrator wrote through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let store = Self::default();
        store
            .inner
            .lock()
            .values
            .extend(values.into_iter().map(|(k, v)| (k.into(), v)));
        store
    }

    /// Number of `set` calls that reached the store
    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }

    pub fn commits(&self) -> usize {
        self.inner.lock().commits
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.inner.lock().values.get(key).cloned()
    }

    /// Make every following `set` fail, simulating a flash fault
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.inner.lock().values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(Error::Storage(format!("write of '{key}' rejected")));
        }
        inner.writes += 1;
        inner.values.insert(key.to_string(), value);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.lock().commits += 1;
        Ok(())
    }
}

/// JSON file store: `{ "<namespace>": { "<key>": value } }`.
///
/// Reads are served from memory; `commit` rewrites the whole file through a
/// temporary file and a rename so a crash never leaves half a file behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    namespace: String,
    /// Raw JSON until read; a malformed entry only fails its own key
    document: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    dirty: bool,
}

impl FileStore {
    /// Open `path`. A missing file is an empty store; unparseable JSON is an error.
    #[instrument]
    pub fn open(path: impl AsRef<Path> + std::fmt::Debug, namespace: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let document = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No store at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            namespace: namespace.to_string(),
            document,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.document.get(&self.namespace)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let Some(raw) = self.entries().and_then(|entries| entries.get(key)) else {
            return Ok(None);
        };
        Value::deserialize(raw)
            .map(Some)
            .map_err(|_| Error::TypeMismatch {
                key: key.to_string(),
                expected: "byte or string",
            })
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let raw = serde_json::to_value(value)?;
        self.document
            .entry(self.namespace.clone())
            .or_default()
            .insert(key.to_string(), raw);
        self.dirty = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let contents = serde_json::to_vec_pretty(&self.document)?;
        let tmp = self.path.with_extension("tmp");
        let path = &self.path;
        crate::blocking_io(|| {
            fs::write(&tmp, &contents)?;
            fs::rename(&tmp, path)
        })?;
        self.dirty = false;
        debug!("Committed store to {}", self.path.display());
        Ok(())
    }
}

/// Mirror of the persisted settings, as loaded at boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedConfig {
    pub palette: Rgb,
    /// Frame delay in milliseconds
    pub speed: u8,
    pub brightness: u8,
    pub effect: Effect,
}

impl Default for PersistedConfig {
    fn default() -> Self {
        Self {
            palette: Rgb::WARM,
            speed: 100,
            brightness: 64,
            effect: Effect::Rainbow,
        }
    }
}

/// Typed, write-if-changed access to the settings
#[derive(Debug)]
pub struct ConfigStore<S> {
    backend: S,
}

impl<S: KeyValueStore> ConfigStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        match self.backend.get(key)? {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(Value::U8(_)) => Err(Error::TypeMismatch {
                key: key.to_string(),
                expected: "string",
            }),
        }
    }

    pub fn get_u8(&self, key: &str) -> Result<Option<u8>> {
        match self.backend.get(key)? {
            None => Ok(None),
            Some(Value::U8(v)) => Ok(Some(v)),
            Some(Value::Str(_)) => Err(Error::TypeMismatch {
                key: key.to_string(),
                expected: "byte",
            }),
        }
    }

    /// Write and commit `value` unless the store already holds it.
    /// Returns whether a write happened.
    pub fn set_str(&mut self, key: &str, value: &str) -> Result<bool> {
        self.store([(key, Value::from(value))]).map(|written| !written.is_empty())
    }

    pub fn set_u8(&mut self, key: &str, value: u8) -> Result<bool> {
        self.store([(key, Value::from(value))]).map(|written| !written.is_empty())
    }

    /// Write every changed entry and commit once if anything was written.
    /// Returns the keys that were written.
    pub fn store<'k, I>(&mut self, entries: I) -> Result<Vec<&'k str>>
    where
        I: IntoIterator<Item = (&'k str, Value)>,
    {
        let mut written = Vec::new();
        for (key, value) in entries {
            if self.write_if_changed(key, value)? {
                written.push(key);
            }
        }
        if !written.is_empty() {
            self.backend.commit()?;
            debug!("Persisted {:?}", written);
        }
        Ok(written)
    }

    fn write_if_changed(&mut self, key: &str, value: Value) -> Result<bool> {
        // An unreadable old value is treated as absent so the write still happens
        let current = self.backend.get(key).unwrap_or_else(|e| {
            warn!("Reading '{}' before write failed: {}", key, e);
            None
        });
        if current.as_ref() == Some(&value) {
            return Ok(false);
        }
        self.backend.set(key, value)?;
        Ok(true)
    }

    /// Read the persisted settings. Missing or unreadable keys fall back to defaults.
    #[instrument(skip(self))]
    pub fn load(&self) -> PersistedConfig {
        let defaults = PersistedConfig::default();

        let palette = self
            .read(KEY_PALETTE, |store| store.get_str(KEY_PALETTE))
            .and_then(|hex| match Rgb::from_hex(&hex) {
                Ok(color) => Some(color),
                Err(e) => {
                    warn!("Ignoring stored palette: {}", e);
                    None
                }
            })
            .unwrap_or(defaults.palette);
        let speed = self
            .read(KEY_SPEED, |store| store.get_u8(KEY_SPEED))
            .unwrap_or(defaults.speed);
        let brightness = self
            .read(KEY_BRIGHTNESS, |store| store.get_u8(KEY_BRIGHTNESS))
            .unwrap_or(defaults.brightness);
        let effect = self
            .read(KEY_EFFECT, |store| store.get_u8(KEY_EFFECT))
            .and_then(|ordinal| {
                let effect = Effect::from_ordinal(ordinal);
                if effect.is_none() {
                    warn!("Ignoring unknown stored effect {}", ordinal);
                }
                effect
            })
            .unwrap_or(defaults.effect);

        let config = PersistedConfig {
            palette,
            speed,
            brightness,
            effect,
        };
        info!("Settings loaded: {:?}", config);
        config
    }

    fn read<T>(&self, key: &str, get: impl FnOnce(&Self) -> Result<Option<T>>) -> Option<T> {
        get(self).unwrap_or_else(|e| {
            warn!("Reading '{}' failed, using default: {}", key, e);
            None
        })
    }
}

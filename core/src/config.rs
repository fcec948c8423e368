use crate::errors::{PanelError, PanelResult};
use serde_json::{json, Map, Value};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// The in-memory form of `config.yaml`. The root is always a mapping.
pub type Document = Value;

/// Value shown in place of `server.password` whenever the document leaves the process
pub const MASKED_PASSWORD: &str = "*****";

/// Factory username, also used when no credentials are configured anywhere
pub const DEFAULT_USERNAME: &str = "ilovefirefly";

/// Factory password, also used when no credentials are configured anywhere
pub const DEFAULT_PASSWORD: &str = "ilovefirefly";

/// Default location of the configuration document, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Document written on first access when no configuration file exists
pub fn default_document() -> Document {
    json!({
        "app": {
            "name": "All-in-One Scripts",
            "version": "1.0.0"
        },
        "server": {
            "host": "0.0.0.0",
            "port": 8000,
            "username": DEFAULT_USERNAME,
            "password": DEFAULT_PASSWORD,
            "is_new": true
        },
        "bot": {
            "type": "onebot",
            "protocol": "ws",
            "enabled": false
        },
        "ui": {
            "background": {
                "type": "RINGS",
                "color": "#1b1b1b",
                "background_color": "#000000",
                "speed": 1.0
            }
        }
    })
}

/// YAML-backed configuration document store.
///
/// `load` and `save` are plain whole-file operations: a caller that pairs them
/// by hand races with every other writer and the last `save` wins. Writers that
/// go through [`ConfigStore::update`] are serialized and never lose each other's
/// changes.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl ConfigStore {
    /// Creates a store for the document at `path`. Nothing is read until first access.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole document.
    ///
    /// A missing file is replaced by [`default_document`], which is written back
    /// under the writer lock before returning. An empty file loads as an empty
    /// mapping.
    pub async fn load(&self) -> PanelResult<Document> {
        if let Some(document) = self.read().await? {
            return Ok(document);
        }

        let _guard = self.writer.lock().await;
        self.read_or_init().await
    }

    /// [`ConfigStore::load`] for read-only callers: a read failure is logged and
    /// an empty document is returned instead.
    pub async fn load_or_empty(&self) -> Document {
        match self.load().await {
            Ok(document) => document,
            Err(e) => {
                error!(error = %e, "Failed to read config, using empty document");
                Value::Object(Map::new())
            }
        }
    }

    /// Serializes and overwrites the whole document.
    pub async fn save(&self, document: &Document) -> PanelResult<()> {
        let content = serde_yaml::to_string(document).map_err(|e| {
            PanelError::ConfigWrite(format!("Failed to serialize config: {}", e))
        })?;

        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).await.map_err(|e| {
                    PanelError::ConfigWrite(format!("Failed to create config directory: {}", e))
                })?;
                parent.to_path_buf()
            }
            None => PathBuf::from("."),
        };
        let target = self.path.clone();
        tokio::task::spawn_blocking(move || write_replacing(&dir, &target, content.as_bytes()))
            .await
            .map_err(|e| PanelError::ConfigWrite(format!("Save task failed: {}", e)))??;

        debug!(path = %self.path.display(), "Saved config");
        Ok(())
    }

    /// Loads, applies `mutate` and saves, holding the writer lock throughout.
    ///
    /// If `mutate` fails nothing is written.
    pub async fn update<F, T>(&self, mutate: F) -> PanelResult<T>
    where
        F: FnOnce(&mut Document) -> PanelResult<T>,
    {
        let _guard = self.writer.lock().await;
        let mut document = self.read_or_init().await?;
        let output = mutate(&mut document)?;
        self.save(&document).await?;
        Ok(output)
    }

    /// Sets the value at `path` and persists the document.
    pub async fn set(&self, path: &str, value: Value) -> PanelResult<()> {
        self.update(|document| set_path(document, path, value)).await
    }
}

impl ConfigStore {
    /// Parsed document, or `None` when the file does not exist
    async fn read(&self) -> PanelResult<Option<Document>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => parse_document(&content).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PanelError::ConfigRead(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// [`ConfigStore::read`], writing the defaults when the file is missing.
    /// Callers must hold the writer lock.
    async fn read_or_init(&self) -> PanelResult<Document> {
        if let Some(document) = self.read().await? {
            return Ok(document);
        }

        info!(path = %self.path.display(), "Config file not found, writing defaults");
        let document = default_document();
        if let Err(e) = self.save(&document).await {
            warn!(error = %e, "Failed to persist default config");
        }
        Ok(document)
    }
}

/// Writes `content` to a fresh temporary file in `dir` and renames it over `target`
fn write_replacing(dir: &Path, target: &Path, content: &[u8]) -> PanelResult<()> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        PanelError::ConfigWrite(format!("Failed to create temp file in {}: {}", dir.display(), e))
    })?;
    tmp.write_all(content)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| {
            PanelError::ConfigWrite(format!("Failed to write {}: {}", tmp.path().display(), e))
        })?;
    tmp.persist(target).map_err(|e| {
        PanelError::ConfigWrite(format!("Failed to replace {}: {}", target.display(), e.error))
    })?;
    Ok(())
}

fn parse_document(content: &str) -> PanelResult<Document> {
    if content.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let document: Value = serde_yaml::from_str(content)
        .map_err(|e| PanelError::ConfigRead(format!("Failed to parse config: {}", e)))?;

    match document {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(document),
        other => Err(PanelError::ConfigRead(format!(
            "Config root must be a mapping, found {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

fn split_path(path: &str) -> PanelResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(PanelError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with a mapping"),
    }
}

/// Sets `value` at the dotted `path`, creating intermediate mappings.
///
/// Any non-mapping value found on the way is replaced by a mapping.
pub fn set_path(document: &mut Document, path: &str, value: Value) -> PanelResult<()> {
    let segments = split_path(path)?;
    let Some((leaf, parents)) = segments.split_last() else {
        return Err(PanelError::InvalidPath(path.to_string()));
    };

    let mut current = ensure_object(document);
    for key in parents {
        let child = current
            .entry((*key).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = ensure_object(child);
    }
    current.insert((*leaf).to_string(), value);
    Ok(())
}

/// Returns the value at the dotted `path`, if every segment exists.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let segments = split_path(path).ok()?;
    segments
        .into_iter()
        .try_fold(document, |current, key| current.get(key))
}

/// Replaces `server.password`, when present, with [`MASKED_PASSWORD`].
pub fn mask_secrets(document: &mut Document) {
    if let Some(server) = document.get_mut("server").and_then(Value::as_object_mut) {
        if server.contains_key("password") {
            server.insert("password".to_string(), Value::from(MASKED_PASSWORD));
        }
    }
}

/// Whether first-run setup is still pending. A missing flag counts as done.
pub fn is_new_install(document: &Document) -> bool {
    get_path(document, "server.is_new")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// `server.host` and `server.port`, falling back to `0.0.0.0:8000`
pub fn server_address(document: &Document) -> (String, u16) {
    let host = get_path(document, "server.host")
        .and_then(Value::as_str)
        .unwrap_or("0.0.0.0")
        .to_string();
    let port = get_path(document, "server.port")
        .and_then(Value::as_u64)
        .and_then(|port| u16::try_from(port).ok())
        .unwrap_or(8000);
    (host, port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("config.yaml"))
    }

    #[tokio::test]
    async fn test_missing_file_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let document = store.load().await.unwrap();
        assert_eq!(document, default_document());
        assert!(is_new_install(&document));
        assert!(store.path().exists());

        // Second load reads what was written
        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded, document);
    }

    #[tokio::test]
    async fn test_empty_file_is_empty_mapping() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "").unwrap();

        let document = store.load().await.unwrap();
        assert_eq!(document, json!({}));

        std::fs::write(store.path(), "~\n").unwrap();
        let document = store.load().await.unwrap();
        assert_eq!(document, json!({}));
    }

    #[tokio::test]
    async fn test_unreadable_document_is_read_error() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "server: [unclosed\n").unwrap();

        let result = store.load().await;
        assert!(matches!(result, Err(PanelError::ConfigRead(_))));
        assert_eq!(store.load_or_empty().await, json!({}));

        std::fs::write(store.path(), "- just\n- a list\n").unwrap();
        let result = store.load().await;
        assert!(matches!(result, Err(PanelError::ConfigRead(_))));
    }

    #[tokio::test]
    async fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("config.yaml"));

        store.save(&json!({"app": {"name": "panel"}})).await.unwrap();
        let document = store.load().await.unwrap();
        assert_eq!(get_path(&document, "app.name"), Some(&json!("panel")));
    }

    #[test]
    fn test_set_path_creates_and_replaces() {
        let mut document = json!({"ui": {"background": "plain"}});

        set_path(&mut document, "ui.background.speed", json!(2.5)).unwrap();
        assert_eq!(get_path(&document, "ui.background.speed"), Some(&json!(2.5)));

        set_path(&mut document, "bot.enabled", json!(true)).unwrap();
        assert_eq!(get_path(&document, "bot.enabled"), Some(&json!(true)));

        // A mapping can replace a scalar leaf, and the other way round
        set_path(&mut document, "bot.enabled", json!({"since": "today"})).unwrap();
        assert_eq!(get_path(&document, "bot.enabled.since"), Some(&json!("today")));
        set_path(&mut document, "bot", json!("off")).unwrap();
        assert_eq!(get_path(&document, "bot"), Some(&json!("off")));
        assert_eq!(get_path(&document, "bot.enabled"), None);
    }

    #[test]
    fn test_set_path_rejects_empty_segments() {
        let mut document = json!({});
        for path in ["", ".", "a..b", "a.", ".a"] {
            let result = set_path(&mut document, path, json!(1));
            assert!(matches!(result, Err(PanelError::InvalidPath(_))), "path {:?}", path);
        }
        assert_eq!(document, json!({}));
    }

    #[test]
    fn test_mask_secrets() {
        let mut document = default_document();
        mask_secrets(&mut document);
        assert_eq!(get_path(&document, "server.password"), Some(&json!(MASKED_PASSWORD)));
        assert_eq!(get_path(&document, "server.username"), Some(&json!(DEFAULT_USERNAME)));

        let mut without_password = json!({"server": {"port": 8000}});
        mask_secrets(&mut without_password);
        assert_eq!(without_password, json!({"server": {"port": 8000}}));
    }

    #[test]
    fn test_server_address() {
        assert_eq!(server_address(&default_document()), ("0.0.0.0".to_string(), 8000));
        assert_eq!(
            server_address(&json!({"server": {"host": "127.0.0.1", "port": 9000}})),
            ("127.0.0.1".to_string(), 9000)
        );
        assert_eq!(
            server_address(&json!({"server": {"port": 700000}})),
            ("0.0.0.0".to_string(), 8000)
        );
    }

    #[tokio::test]
    async fn test_complete_setup_clears_is_new() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(is_new_install(&store.load().await.unwrap()));
        store.set("server.is_new", json!(false)).await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert!(!is_new_install(&reloaded));
    }

    #[tokio::test]
    async fn test_update_keeps_sibling_keys() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.set("ui.background.speed", json!(2.5)).await.unwrap();

        let document = store.load().await.unwrap();
        assert_eq!(get_path(&document, "ui.background.speed"), Some(&json!(2.5)));
        assert_eq!(get_path(&document, "ui.background.type"), Some(&json!("RINGS")));
        assert_eq!(get_path(&document, "ui.background.color"), Some(&json!("#1b1b1b")));
        assert_eq!(
            get_path(&document, "ui.background.background_color"),
            Some(&json!("#000000"))
        );
    }

    #[tokio::test]
    async fn test_failed_mutation_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let before = store.load().await.unwrap();

        let result = store.set("server..port", json!(1)).await;
        assert!(matches!(result, Err(PanelError::InvalidPath(_))));
        assert_eq!(store.load().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_hand_paired_load_save_is_last_writer_wins() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut first = store.load().await.unwrap();
        let mut second = store.load().await.unwrap();
        set_path(&mut first, "bot.enabled", json!(true)).unwrap();
        set_path(&mut second, "ui.background.speed", json!(3.0)).unwrap();
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        let document = store.load().await.unwrap();
        assert_eq!(get_path(&document, "bot.enabled"), Some(&json!(false)));
        assert_eq!(get_path(&document, "ui.background.speed"), Some(&json!(3.0)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_all_persist() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&dir));
        store.load().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.set(&format!("bot.flags.f{}", i), json!(i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let document = store.load().await.unwrap();
        for i in 0..16 {
            assert_eq!(
                get_path(&document, &format!("bot.flags.f{}", i)),
                Some(&json!(i))
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fresh_store_readers_and_writers_race() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&dir));

        let mut writers = Vec::new();
        let mut readers = Vec::new();
        for i in 0..8 {
            let writer_store = Arc::clone(&store);
            writers.push(tokio::spawn(async move {
                writer_store.set(&format!("bot.flags.f{}", i), json!(i)).await
            }));
            let reader_store = Arc::clone(&store);
            readers.push(tokio::spawn(async move { reader_store.load_or_empty().await }));
        }
        for handle in writers {
            handle.await.unwrap().unwrap();
        }
        for handle in readers {
            assert!(handle.await.unwrap().is_object());
        }

        let document = store.load().await.unwrap();
        assert_eq!(get_path(&document, "app.name"), Some(&json!("All-in-One Scripts")));
        for i in 0..8 {
            assert_eq!(
                get_path(&document, &format!("bot.flags.f{}", i)),
                Some(&json!(i))
            );
        }

        // Only the document is left behind, no temporary files
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("config.yaml")]);
    }
}

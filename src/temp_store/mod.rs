//! Resumable temp-file storage for in-flight form outline data.
//!
//! Grounded on `jobcan_di/integrator/_tf_io.py` (`TempFormOutline`,
//! `JobcanTempFileIO`): a single JSON document under `<app_dir>/temp/` that
//! records, per `form_id`, which request ids still need their detail
//! fetched. `cleanup()` only deletes the file (and its directory) once every
//! outline is empty — otherwise the next run resumes from it.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// One form's in-flight detail-fetch state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormOutline {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub ids: HashSet<String>,
    #[serde(default)]
    pub last_access: String,
}

impl FormOutline {
    pub fn new(success: bool, ids: HashSet<String>, last_access: impl Into<String>) -> FormOutline {
        FormOutline { success, ids, last_access: last_access.into() }
    }

    pub fn add_ids<I: IntoIterator<Item = String>>(&mut self, ids: I) {
        self.ids.extend(ids);
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Disk-backed temp store for form outline data, rooted at `<app_dir>/temp`.
pub struct TempStore {
    temp_dir: PathBuf,
    form_outline_path: PathBuf,
}

impl TempStore {
    pub fn new(app_dir: impl AsRef<Path>) -> Result<TempStore> {
        let temp_dir = app_dir.as_ref().join("temp");
        if !temp_dir.exists() {
            fs::create_dir_all(&temp_dir)?;
        }
        let form_outline_path = temp_dir.join("form_outline_temp.json");
        Ok(TempStore { temp_dir, form_outline_path })
    }

    pub fn save(&self, data: &HashMap<i64, FormOutline>) -> Result<()> {
        let json = serde_json::to_string(data)?;
        fs::write(&self.form_outline_path, json)?;
        Ok(())
    }

    pub fn load(&self) -> Result<HashMap<i64, FormOutline>> {
        if !self.form_outline_path.exists() {
            return Ok(HashMap::new());
        }
        let raw = fs::read_to_string(&self.form_outline_path)?;
        let by_string: HashMap<String, FormOutline> = serde_json::from_str(&raw)?;
        Ok(by_string.into_iter().filter_map(|(k, v)| k.parse::<i64>().ok().map(|id| (id, v))).collect())
    }

    /// Deletes the temp file (and its directory) only if every stored
    /// outline has an empty `ids` set; otherwise leaves it in place so the
    /// next run can resume.
    pub fn cleanup(&self) -> Result<()> {
        let data = self.load()?;
        if data.is_empty() || data.values().all(FormOutline::is_empty) {
            if self.form_outline_path.exists() {
                fs::remove_file(&self.form_outline_path)?;
            }
            if self.temp_dir.exists() && fs::read_dir(&self.temp_dir)?.next().is_none() {
                fs::remove_dir(&self.temp_dir)?;
            }
        }
        Ok(())
    }
}

/// In-memory-first variant: mutations apply to the RAM copy and only reach
/// disk on an explicit `save()`/`flush()`, matching call sites that mutate
/// the map many times per form before persisting once.
pub struct MemoryTempStore {
    store: TempStore,
    data: HashMap<i64, FormOutline>,
}

impl MemoryTempStore {
    pub fn load(app_dir: impl AsRef<Path>) -> Result<MemoryTempStore> {
        let store = TempStore::new(app_dir)?;
        let data = store.load()?;
        Ok(MemoryTempStore { store, data })
    }

    pub fn get(&self, form_id: i64) -> Option<&FormOutline> {
        self.data.get(&form_id)
    }

    pub fn entry(&mut self, form_id: i64) -> &mut FormOutline {
        self.data.entry(form_id).or_default()
    }

    pub fn remove(&mut self, form_id: i64) -> Option<FormOutline> {
        self.data.remove(&form_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&i64, &FormOutline)> {
        self.data.iter()
    }

    pub fn flush(&self) -> Result<()> {
        self.store.save(&self.data)
    }

    pub fn cleanup(&self) -> Result<()> {
        self.store.cleanup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path()).unwrap();

        let mut data = HashMap::new();
        let mut outline = FormOutline::default();
        outline.add_ids(["1".to_string(), "2".to_string()]);
        outline.last_access = "2026/07/27 10:00:00".to_string();
        data.insert(42, outline);

        store.save(&data).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.get(&42).unwrap().ids.len(), 2);
        assert_eq!(loaded.get(&42).unwrap().last_access, "2026/07/27 10:00:00");
    }

    #[test]
    fn cleanup_keeps_file_when_an_outline_still_has_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path()).unwrap();

        let mut data = HashMap::new();
        let mut outline = FormOutline::default();
        outline.add_ids(["1".to_string()]);
        data.insert(1, outline);
        store.save(&data).unwrap();

        store.cleanup().unwrap();
        assert!(store.form_outline_path.exists());
    }

    #[test]
    fn cleanup_removes_file_when_every_outline_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path()).unwrap();

        let mut data = HashMap::new();
        data.insert(1, FormOutline::default());
        store.save(&data).unwrap();

        store.cleanup().unwrap();
        assert!(!store.form_outline_path.exists());
    }

    #[test]
    fn memory_variant_only_persists_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let mut mem = MemoryTempStore::load(dir.path()).unwrap();
        mem.entry(5).add_ids(["r1".to_string()]);

        let direct = TempStore::new(dir.path()).unwrap();
        assert!(direct.load().unwrap().is_empty());

        mem.flush().unwrap();
        assert_eq!(direct.load().unwrap().get(&5).unwrap().ids.len(), 1);
    }
}

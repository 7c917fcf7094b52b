//! Resumable progress tracking: a total-ordered stage/sub-stage cursor
//! (`AppProgress`), per-endpoint failure bookkeeping (`FailureRecord`), and
//! the single JSON document that ties them together (`JobcanDIStatus`).
//!
//! Grounded on `jobcan_di/status/progress.py` (stage/sub-stage enums and the
//! `APIType` mapping) and `jobcan_di/integrator/integrator_status.py`
//! (`AppProgress`, `FetchFailureRecord`, `JobcanDIStatus` persistence).

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::api_type::ApiType;
use crate::errors::{JdiError, Result};

/// Coarse progress stage. `Failed` is not part of the forward march; it only
/// ever arrives via `cancel()` and short-circuits `is_future_process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Initializing,
    BasicData,
    FormOutline,
    FormDetail,
    Terminating,
    Failed,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Initializing => "INITIALIZING",
            Stage::BasicData => "BASIC_DATA",
            Stage::FormOutline => "FORM_OUTLINE",
            Stage::FormDetail => "FORM_DETAIL",
            Stage::Terminating => "TERMINATING",
            Stage::Failed => "FAILED",
        }
    }

    pub fn from_name(name: &str) -> Option<Stage> {
        Some(match name {
            "INITIALIZING" => Stage::Initializing,
            "BASIC_DATA" => Stage::BasicData,
            "FORM_OUTLINE" => Stage::FormOutline,
            "FORM_DETAIL" => Stage::FormDetail,
            "TERMINATING" => Stage::Terminating,
            "FAILED" => Stage::Failed,
            _ => return None,
        })
    }
}

macro_rules! detail_enum {
    ($name:ident { $($variant:ident => $msg:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const COUNT: usize = detail_enum!(@count $($variant)+);

            pub fn ordinal(self) -> u8 {
                self as u8
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }

            pub fn from_name(name: &str) -> Option<$name> {
                Some(match name {
                    $(stringify!($variant) => $name::$variant,)+
                    _ => return None,
                })
            }

            fn message_template(self) -> &'static str {
                match self {
                    $($name::$variant => $msg),+
                }
            }
        }
    };
    (@count $($variant:ident)+) => {
        0 $(+ { let _ = stringify!($variant); 1 })+
    };
}

detail_enum!(InitializingStatus {
    LoadingConfig => "Loading configuration... ({}/{})",
    InitLogger => "Initializing logger... ({}/{})",
    InitNotification => "Initializing notifications... ({}/{})",
    InitDirectories => "Initializing directories... ({}/{})",
    InitToken => "Initializing API token... ({}/{})",
    InitDbConnection => "Initializing database connection... ({}/{})",
    InitDbTables => "Initializing database tables... ({}/{})",
    Completed => "Initialization complete ({}/{})",
});

detail_enum!(GetBasicDataStatus {
    GetUser => "Fetching user data... ({}/{})",
    GetGroup => "Fetching group data... ({}/{})",
    GetPosition => "Fetching position data... ({}/{})",
    GetProject => "Fetching project data... ({}/{})",
    GetCompany => "Fetching company data... ({}/{})",
    GetFixJournal => "Fetching fixed journal data... ({}/{})",
});

detail_enum!(GetFormOutlineStatus {
    GetFormInfo => "Fetching form templates... ({}/{})",
    GetOutline => "Fetching request outlines... ({}/{})",
});

detail_enum!(GetFormDetailStatus {
    SeekTarget => "Looking for requests to fetch... ({}/{})",
    GetDetail => "Fetching request detail... ({}/{})",
});

detail_enum!(TerminatingStatus {
    CloseDbConnection => "Closing database connection... ({}/{})",
    DeleteTempFiles => "Deleting temporary files... ({}/{})",
    Completed => "All processing complete ({}/{})",
});

/// The detailed sub-stage, tagged by which `Stage` it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetailedStatus {
    Initializing(InitializingStatus),
    BasicData(GetBasicDataStatus),
    FormOutline(GetFormOutlineStatus),
    FormDetail(GetFormDetailStatus),
    Terminating(TerminatingStatus),
}

impl DetailedStatus {
    pub fn stage(self) -> Stage {
        match self {
            DetailedStatus::Initializing(_) => Stage::Initializing,
            DetailedStatus::BasicData(_) => Stage::BasicData,
            DetailedStatus::FormOutline(_) => Stage::FormOutline,
            DetailedStatus::FormDetail(_) => Stage::FormDetail,
            DetailedStatus::Terminating(_) => Stage::Terminating,
        }
    }

    pub fn ordinal(self) -> u8 {
        match self {
            DetailedStatus::Initializing(s) => s.ordinal(),
            DetailedStatus::BasicData(s) => s.ordinal(),
            DetailedStatus::FormOutline(s) => s.ordinal(),
            DetailedStatus::FormDetail(s) => s.ordinal(),
            DetailedStatus::Terminating(s) => s.ordinal(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DetailedStatus::Initializing(s) => s.name(),
            DetailedStatus::BasicData(s) => s.name(),
            DetailedStatus::FormOutline(s) => s.name(),
            DetailedStatus::FormDetail(s) => s.name(),
            DetailedStatus::Terminating(s) => s.name(),
        }
    }

    /// The completed end-state: `TERMINATING.COMPLETED`.
    pub fn terminating_completed() -> DetailedStatus {
        DetailedStatus::Terminating(TerminatingStatus::Completed)
    }

    pub fn from_names(stage: &str, detail: &str) -> Result<DetailedStatus> {
        let resolved = match stage {
            "INITIALIZING" => InitializingStatus::from_name(detail).map(DetailedStatus::Initializing),
            "BASIC_DATA" => GetBasicDataStatus::from_name(detail).map(DetailedStatus::BasicData),
            "FORM_OUTLINE" => GetFormOutlineStatus::from_name(detail).map(DetailedStatus::FormOutline),
            "FORM_DETAIL" => GetFormDetailStatus::from_name(detail).map(DetailedStatus::FormDetail),
            "TERMINATING" => TerminatingStatus::from_name(detail).map(DetailedStatus::Terminating),
            other => return Err(JdiError::Merge(format!("unknown progress stage '{other}'"))),
        };
        resolved.ok_or_else(|| JdiError::Merge(format!("unknown detail '{detail}' for stage '{stage}'")))
    }

    /// A human-readable progress message, mirroring the original's per-stage
    /// message tables. `sub_count`/`sub_total` extend the denominator for
    /// stages that repeat over many items (form outline / form detail).
    pub fn message(self, sub_count: usize, sub_total: usize) -> String {
        let template = match self {
            DetailedStatus::Initializing(s) => s.message_template(),
            DetailedStatus::BasicData(s) => s.message_template(),
            DetailedStatus::FormOutline(s) => s.message_template(),
            DetailedStatus::FormDetail(s) => s.message_template(),
            DetailedStatus::Terminating(s) => s.message_template(),
        };
        let count = sub_count + self.ordinal() as usize + 1;
        let total = sub_total
            + match self {
                DetailedStatus::FormOutline(_) => GetFormOutlineStatus::COUNT,
                DetailedStatus::FormDetail(_) => GetFormDetailStatus::COUNT,
                DetailedStatus::Initializing(_) => InitializingStatus::COUNT,
                DetailedStatus::BasicData(_) => GetBasicDataStatus::COUNT,
                DetailedStatus::Terminating(_) => TerminatingStatus::COUNT,
            };
        template.replacen("{}", &count.to_string(), 1).replacen("{}", &total.to_string(), 1)
    }
}

/// Maps an `ApiType` to the stage it belongs to.
pub fn stage_for_api_type(api_type: ApiType) -> Stage {
    match api_type {
        ApiType::UserV3
        | ApiType::GroupV1
        | ApiType::PositionV1
        | ApiType::ProjectV1
        | ApiType::CompanyV1
        | ApiType::FixJournalV1 => Stage::BasicData,
        ApiType::FormV1 | ApiType::RequestOutline => Stage::FormOutline,
        ApiType::RequestDetail => Stage::FormDetail,
    }
}

/// Maps an `ApiType` to its detailed sub-stage.
pub fn detail_for_api_type(api_type: ApiType) -> DetailedStatus {
    match api_type {
        ApiType::UserV3 => DetailedStatus::BasicData(GetBasicDataStatus::GetUser),
        ApiType::GroupV1 => DetailedStatus::BasicData(GetBasicDataStatus::GetGroup),
        ApiType::PositionV1 => DetailedStatus::BasicData(GetBasicDataStatus::GetPosition),
        ApiType::ProjectV1 => DetailedStatus::BasicData(GetBasicDataStatus::GetProject),
        ApiType::CompanyV1 => DetailedStatus::BasicData(GetBasicDataStatus::GetCompany),
        ApiType::FixJournalV1 => DetailedStatus::BasicData(GetBasicDataStatus::GetFixJournal),
        ApiType::FormV1 => DetailedStatus::FormOutline(GetFormOutlineStatus::GetFormInfo),
        ApiType::RequestOutline => DetailedStatus::FormOutline(GetFormOutlineStatus::GetOutline),
        ApiType::RequestDetail => DetailedStatus::FormDetail(GetFormDetailStatus::GetDetail),
    }
}

/// A point on the progress timeline to compare against the current position,
/// optionally narrowed to one item within that (stage, sub-stage) pair.
#[derive(Debug, Clone)]
pub struct ProgressTarget {
    pub stage: Stage,
    pub detail: DetailedStatus,
    pub specific: Option<String>,
}

impl ProgressTarget {
    pub fn new(stage: Stage, detail: DetailedStatus, specific: Option<String>) -> ProgressTarget {
        ProgressTarget { stage, detail, specific }
    }

    pub fn for_api_type(api_type: ApiType, specific: Option<String>) -> ProgressTarget {
        ProgressTarget::new(stage_for_api_type(api_type), detail_for_api_type(api_type), specific)
    }
}

/// The application's current position in the `INITIALIZING → … →
/// TERMINATING` march, plus the set of items already handled at the current
/// (stage, sub-stage) pair.
#[derive(Debug, Clone)]
pub struct AppProgress {
    pub stage: Stage,
    pub detail: DetailedStatus,
    specifics: HashSet<String>,
}

impl Default for AppProgress {
    fn default() -> AppProgress {
        AppProgress {
            stage: Stage::Terminating,
            detail: DetailedStatus::terminating_completed(),
            specifics: HashSet::new(),
        }
    }
}

impl AppProgress {
    pub fn new(stage: Stage, detail: DetailedStatus) -> AppProgress {
        AppProgress { stage, detail, specifics: HashSet::new() }
    }

    /// Like [`AppProgress::new`] but restores a `specifics` set persisted
    /// from a prior run, so a reload preserves exactly where within the
    /// current (stage, sub-stage) pair the run had already reached.
    pub fn restore(stage: Stage, detail: DetailedStatus, specifics: HashSet<String>) -> AppProgress {
        AppProgress { stage, detail, specifics }
    }

    pub fn is_completed(&self) -> bool {
        self.stage == Stage::Terminating && self.detail == DetailedStatus::terminating_completed()
    }

    pub fn get(&self) -> (Stage, DetailedStatus) {
        (self.stage, self.detail)
    }

    /// Replaces the current (stage, sub-stage) pair, clearing `specifics`
    /// whenever the pair actually changes.
    pub fn set(&mut self, stage: Stage, detail: DetailedStatus) {
        if self.stage != stage || self.detail != detail {
            self.specifics.clear();
        }
        self.stage = stage;
        self.detail = detail;
    }

    pub fn add_specifics<I: IntoIterator<Item = String>>(&mut self, items: I) {
        self.specifics.extend(items);
    }

    pub fn specifics(&self) -> &HashSet<String> {
        &self.specifics
    }

    /// Whether `target` lies at or after the current position on the strict
    /// total order `INITIALIZING < … < TERMINATING.COMPLETED`. Returns
    /// `false` once the run has failed or already completed, and `false` for
    /// a target exactly at the current position whose `specific` has already
    /// been recorded.
    pub fn is_future_process(&self, target: &ProgressTarget) -> bool {
        if self.stage == Stage::Failed || self.is_completed() {
            return false;
        }
        let current_rank = (self.stage, self.detail.ordinal());
        let target_rank = (target.stage, target.detail.ordinal());
        if target_rank < current_rank {
            return false;
        }
        if target_rank == current_rank {
            if let Some(specific) = &target.specific {
                if self.specifics.contains(specific) {
                    return false;
                }
            }
        }
        true
    }
}

/// Per-endpoint bookkeeping of items that failed, so the next run can retry
/// just those items. `basic_data` is keyed by `ApiType` name; `request_detail`
/// is keyed by `form_id` (as a string, since JSON object keys are always
/// strings) and holds the request ids that failed within that form. The same
/// shape backs both [`JobcanDIStatus::failure_record`] (HTTP fetch failures)
/// and [`JobcanDIStatus::db_save_failure_record`] (database store failures)
/// so the two sources of failure can be retried independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(default)]
    basic_data: HashMap<String, Vec<String>>,
    #[serde(default)]
    request_detail: HashMap<String, Vec<String>>,
}

impl FailureRecord {
    pub fn add(&mut self, api_type: ApiType, target: impl Into<String>) {
        self.basic_data.entry(api_type.name().to_string()).or_default().push(target.into());
    }

    pub fn add_request_detail(&mut self, form_id: i64, request_id: impl Into<String>) {
        self.request_detail.entry(form_id.to_string()).or_default().push(request_id.into());
    }

    pub fn get(&self, api_type: ApiType) -> &[String] {
        self.basic_data.get(api_type.name()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_request_detail(&self) -> &HashMap<String, Vec<String>> {
        &self.request_detail
    }

    pub fn clear(&mut self) {
        self.basic_data.clear();
        self.request_detail.clear();
    }

    /// Merges `prev` and `new` around the stage the run currently sits at:
    /// stages strictly before `current` take `new` verbatim (its record of
    /// those stages is authoritative, `prev`'s was already consumed this
    /// run); stages at or after `current` union `prev` with `new` since
    /// there is still more work that might retry them.
    pub fn merge(prev: &FailureRecord, new: &FailureRecord, current: Stage) -> FailureRecord {
        let mut merged = FailureRecord::default();

        let api_types = [
            ApiType::UserV3,
            ApiType::GroupV1,
            ApiType::PositionV1,
            ApiType::ProjectV1,
            ApiType::CompanyV1,
            ApiType::FixJournalV1,
            ApiType::FormV1,
            ApiType::RequestOutline,
        ];
        for api_type in api_types {
            let prev_list = prev.get(api_type);
            let new_list = new.get(api_type);
            let merged_list = if stage_for_api_type(api_type) < current {
                new_list.to_vec()
            } else {
                union_preserving_order(prev_list, new_list)
            };
            if !merged_list.is_empty() {
                merged.basic_data.insert(api_type.name().to_string(), merged_list);
            }
        }

        let mut form_ids: Vec<&String> = prev.request_detail.keys().collect();
        for key in new.request_detail.keys() {
            if !form_ids.contains(&key) {
                form_ids.push(key);
            }
        }
        for form_id in form_ids {
            let empty = Vec::new();
            let prev_list = prev.request_detail.get(form_id).unwrap_or(&empty);
            let new_list = new.request_detail.get(form_id).unwrap_or(&empty);
            let merged_list = if Stage::FormDetail < current {
                new_list.clone()
            } else {
                union_preserving_order(prev_list, new_list)
            };
            if !merged_list.is_empty() {
                merged.request_detail.insert(form_id.clone(), merged_list);
            }
        }

        merged
    }
}

fn union_preserving_order(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen: HashSet<&String> = HashSet::new();
    let mut out = Vec::new();
    for item in a.iter().chain(b.iter()) {
        if seen.insert(item) {
            out.push(item.clone());
        }
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusDocument {
    status_outline: String,
    status_detail: String,
    #[serde(default)]
    specifics: HashSet<String>,
    fetch_failure_record: FailureRecord,
    #[serde(default)]
    db_save_failure_record: FailureRecord,
    #[serde(default)]
    config_file_path: String,
    #[serde(default)]
    form_api_last_access: HashMap<String, String>,
}

/// The single JSON status document the Integrator reads at startup and
/// rewrites on every mutation. File path is fixed: `<dir>/app_status`.
pub struct JobcanDIStatus {
    file_path: PathBuf,
    pub progress: AppProgress,
    pub failure_record: FailureRecord,
    /// Items that failed to persist to the database, kept separate from
    /// [`JobcanDIStatus::failure_record`] (which holds HTTP fetch failures)
    /// so each can be retried through its own path.
    pub db_save_failure_record: FailureRecord,
    pub config_file_path: String,
    pub form_api_last_access: HashMap<String, String>,
}

impl JobcanDIStatus {
    pub fn new(dir_path: impl AsRef<Path>) -> Result<JobcanDIStatus> {
        let dir_path = dir_path.as_ref();
        if !dir_path.exists() {
            fs::create_dir_all(dir_path)?;
        }
        Ok(JobcanDIStatus {
            file_path: dir_path.join("app_status"),
            progress: AppProgress::default(),
            failure_record: FailureRecord::default(),
            db_save_failure_record: FailureRecord::default(),
            config_file_path: String::new(),
            form_api_last_access: HashMap::new(),
        })
    }

    /// Loads the status file if it exists. A status left at
    /// `TERMINATING.COMPLETED` from a prior run resets to
    /// `INITIALIZING`/`InitializingStatus::LoadingConfig` so the next run
    /// starts a fresh pass rather than immediately reporting "done".
    pub fn load(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            return Ok(());
        }
        let raw = fs::read_to_string(&self.file_path)?;
        let doc: StatusDocument = serde_json::from_str(&raw)?;

        let stage = Stage::from_name(&doc.status_outline)
            .ok_or_else(|| JdiError::Merge(format!("unknown progress stage '{}'", doc.status_outline)))?;
        let detail = DetailedStatus::from_names(&doc.status_outline, &doc.status_detail)?;

        self.progress = if stage == Stage::Terminating && detail == DetailedStatus::terminating_completed() {
            AppProgress::new(Stage::Initializing, DetailedStatus::Initializing(InitializingStatus::LoadingConfig))
        } else {
            AppProgress::restore(stage, detail, doc.specifics)
        };
        self.failure_record = doc.fetch_failure_record;
        self.db_save_failure_record = doc.db_save_failure_record;
        self.config_file_path = doc.config_file_path;
        self.form_api_last_access = doc.form_api_last_access;
        Ok(())
    }

    /// Write-through persistence: called after every progress mutation.
    pub fn save(&self) -> Result<()> {
        let doc = StatusDocument {
            status_outline: self.progress.stage.name().to_string(),
            status_detail: self.progress.detail.name().to_string(),
            specifics: self.progress.specifics().clone(),
            fetch_failure_record: self.failure_record.clone(),
            db_save_failure_record: self.db_save_failure_record.clone(),
            config_file_path: self.config_file_path.clone(),
            form_api_last_access: self.form_api_last_access.clone(),
        };
        let json = serde_json::to_string(&doc)?;
        fs::write(&self.file_path, json)?;
        Ok(())
    }

    /// Merges a freshly-loaded `prev` status into `new` (the in-memory
    /// status of the run about to persist): progress takes `new` wholesale;
    /// both `failure_record` and `db_save_failure_record` merge around
    /// `new`'s current stage (see [`FailureRecord::merge`]);
    /// `form_api_last_access` takes the
    /// element-wise maximum of the two timestamp maps (lexicographic order
    /// is sufficient for the fixed `YYYY/MM/DD HH:MM:SS` format); every
    /// other scalar field takes `new`.
    pub fn merge(prev: &JobcanDIStatus, new: &JobcanDIStatus) -> JobcanDIStatus {
        let current = new.progress.stage;
        let failure_record = FailureRecord::merge(&prev.failure_record, &new.failure_record, current);
        let db_save_failure_record =
            FailureRecord::merge(&prev.db_save_failure_record, &new.db_save_failure_record, current);

        let mut form_api_last_access = prev.form_api_last_access.clone();
        for (form_id, timestamp) in &new.form_api_last_access {
            form_api_last_access
                .entry(form_id.clone())
                .and_modify(|existing| {
                    if timestamp.as_str() > existing.as_str() {
                        *existing = timestamp.clone();
                    }
                })
                .or_insert_with(|| timestamp.clone());
        }

        JobcanDIStatus {
            file_path: new.file_path.clone(),
            progress: new.progress.clone(),
            failure_record,
            db_save_failure_record,
            config_file_path: new.config_file_path.clone(),
            form_api_last_access,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order_matches_the_documented_march() {
        assert!(Stage::Initializing < Stage::BasicData);
        assert!(Stage::BasicData < Stage::FormOutline);
        assert!(Stage::FormOutline < Stage::FormDetail);
        assert!(Stage::FormDetail < Stage::Terminating);
    }

    #[test]
    fn api_type_mapping_matches_the_original() {
        assert_eq!(stage_for_api_type(ApiType::FixJournalV1), Stage::BasicData);
        assert_eq!(stage_for_api_type(ApiType::RequestOutline), Stage::FormOutline);
        assert_eq!(stage_for_api_type(ApiType::RequestDetail), Stage::FormDetail);
        assert_eq!(
            detail_for_api_type(ApiType::PositionV1),
            DetailedStatus::BasicData(GetBasicDataStatus::GetPosition)
        );
    }

    #[test]
    fn set_clears_specifics_only_on_pair_change() {
        let mut progress = AppProgress::new(Stage::BasicData, DetailedStatus::BasicData(GetBasicDataStatus::GetUser));
        progress.add_specifics(["123".to_string()]);
        progress.set(Stage::BasicData, DetailedStatus::BasicData(GetBasicDataStatus::GetUser));
        assert!(progress.specifics().contains("123"));
        progress.set(Stage::BasicData, DetailedStatus::BasicData(GetBasicDataStatus::GetGroup));
        assert!(progress.specifics().is_empty());
    }

    #[test]
    fn is_future_process_rejects_already_handled_specific() {
        let mut progress = AppProgress::new(Stage::FormOutline, DetailedStatus::FormOutline(GetFormOutlineStatus::GetOutline));
        progress.add_specifics(["form-1".to_string()]);
        let repeat = ProgressTarget::new(
            Stage::FormOutline,
            DetailedStatus::FormOutline(GetFormOutlineStatus::GetOutline),
            Some("form-1".to_string()),
        );
        assert!(!progress.is_future_process(&repeat));

        let other = ProgressTarget::new(
            Stage::FormOutline,
            DetailedStatus::FormOutline(GetFormOutlineStatus::GetOutline),
            Some("form-2".to_string()),
        );
        assert!(progress.is_future_process(&other));
    }

    #[test]
    fn is_future_process_false_once_completed_or_failed() {
        let completed = AppProgress::default();
        let target = ProgressTarget::new(Stage::Initializing, DetailedStatus::Initializing(InitializingStatus::LoadingConfig), None);
        assert!(!completed.is_future_process(&target));

        let mut failed = AppProgress::new(Stage::BasicData, DetailedStatus::BasicData(GetBasicDataStatus::GetUser));
        failed.stage = Stage::Failed;
        assert!(!failed.is_future_process(&target));
    }

    #[test]
    fn failure_record_merge_replaces_before_current_and_unions_after() {
        let mut prev = FailureRecord::default();
        prev.add(ApiType::UserV3, "u1");
        prev.add_request_detail(10, "r1");

        let mut new = FailureRecord::default();
        new.add(ApiType::UserV3, "u2");
        new.add_request_detail(10, "r2");

        // current = FormDetail: BasicData is strictly before, so `new` wins verbatim.
        let merged = FailureRecord::merge(&prev, &new, Stage::FormDetail);
        assert_eq!(merged.get(ApiType::UserV3), ["u2"]);
        // request_detail is at `current`, so it unions.
        assert_eq!(merged.get_request_detail().get("10").unwrap(), &vec!["r1".to_string(), "r2".to_string()]);
    }

    #[test]
    fn status_round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut status = JobcanDIStatus::new(dir.path()).unwrap();
        status.progress.set(Stage::BasicData, DetailedStatus::BasicData(GetBasicDataStatus::GetGroup));
        status.progress.add_specifics(["g1".to_string()]);
        status.failure_record.add(ApiType::GroupV1, "g1");
        status.db_save_failure_record.add(ApiType::GroupV1, "g2");
        status.form_api_last_access.insert("42".to_string(), "2026/07/27 10:00:00".to_string());
        status.save().unwrap();

        let mut reloaded = JobcanDIStatus::new(dir.path()).unwrap();
        reloaded.load().unwrap();
        assert_eq!(reloaded.progress.get(), (Stage::BasicData, DetailedStatus::BasicData(GetBasicDataStatus::GetGroup)));
        assert!(reloaded.progress.specifics().contains("g1"));
        assert_eq!(reloaded.failure_record.get(ApiType::GroupV1), ["g1"]);
        assert_eq!(reloaded.db_save_failure_record.get(ApiType::GroupV1), ["g2"]);
        assert_eq!(reloaded.form_api_last_access.get("42").unwrap(), "2026/07/27 10:00:00");
    }

    #[test]
    fn loading_a_completed_status_resets_to_initializing() {
        let dir = tempfile::tempdir().unwrap();
        let mut status = JobcanDIStatus::new(dir.path()).unwrap();
        status.progress.set(Stage::Terminating, DetailedStatus::terminating_completed());
        status.save().unwrap();

        let mut reloaded = JobcanDIStatus::new(dir.path()).unwrap();
        reloaded.load().unwrap();
        assert_eq!(reloaded.progress.stage, Stage::Initializing);
    }

    #[test]
    fn form_api_last_access_merge_takes_the_lexicographic_max() {
        let dir = tempfile::tempdir().unwrap();
        let mut prev = JobcanDIStatus::new(dir.path()).unwrap();
        prev.form_api_last_access.insert("1".to_string(), "2026/07/20 09:00:00".to_string());

        let mut new = JobcanDIStatus::new(dir.path()).unwrap();
        new.form_api_last_access.insert("1".to_string(), "2026/07/19 09:00:00".to_string());
        new.form_api_last_access.insert("2".to_string(), "2026/07/27 09:00:00".to_string());

        let merged = JobcanDIStatus::merge(&prev, &new);
        assert_eq!(merged.form_api_last_access.get("1").unwrap(), "2026/07/20 09:00:00");
        assert_eq!(merged.form_api_last_access.get("2").unwrap(), "2026/07/27 09:00:00");
    }
}

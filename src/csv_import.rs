//! CSV importer — ambient glue (not a numbered C1-C13 component) that lets
//! `DataSource::Raw` be populated from request-export CSV files rather than
//! only from the HTTP Fetcher, per SPEC_FULL.md §6.
//!
//! A Jobcan "request search" CSV export groups one or more requests per
//! file: a request's common/extended fields occupy one row, and any
//! following rows whose first column is blank are that request's detail
//! (line-item) rows.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{json, Value};

use crate::errors::{JdiError, Result};
use crate::pipeline::model::{DataSource, ResultFormat, DEFAULT_RESULTS_KEY};
use crate::pipeline::transform::{apply_conversion, ConversionMethod};

const COMMENT_TITLE: &str = "コメント";

#[derive(Debug, Clone)]
pub struct CsvImportSettings {
    pub folder: String,
    pub file_name_regex: String,
    pub delimiter: u8,
    pub quote: u8,
    pub enable_auto_form_detection: bool,
}

impl Default for CsvImportSettings {
    fn default() -> Self {
        Self {
            folder: String::new(),
            file_name_regex: String::new(),
            delimiter: b',',
            quote: b'"',
            enable_auto_form_detection: false,
        }
    }
}

/// One field descriptor: `[display title, JSON key, conversion method, description]`.
#[derive(Debug, Clone)]
pub struct FormField {
    pub title: String,
    pub json_key: String,
    pub conversion: Option<ConversionMethod>,
    pub description: String,
}

/// The fields for one form, optionally scoped to a specific `form_unique_key`
/// (request form id) rather than the whole `form_type`.
#[derive(Debug, Clone, Default)]
pub struct FormDefinition {
    pub form_type: String,
    pub form_unique_key: Option<String>,
    pub form_name: Option<String>,
    pub common: Vec<FormField>,
    pub extended: Vec<FormField>,
    pub detail: Vec<FormField>,
}

#[derive(Debug, Clone, Default)]
pub struct CsvToJsonSettings {
    pub import_settings: CsvImportSettings,
    pub form_items: IndexMap<String, Vec<FormDefinition>>,
}

impl CsvToJsonSettings {
    fn form_types(&self) -> impl Iterator<Item = &str> {
        self.form_items.keys().map(String::as_str)
    }

    fn common_form(&self, form_type: &str) -> Option<&FormDefinition> {
        self.form_items
            .get(form_type)?
            .iter()
            .find(|f| f.form_unique_key.is_none())
    }

    fn specific_form(&self, form_type: &str, form_unique_key: Option<&str>, form_name: Option<&str>) -> Option<&FormDefinition> {
        self.form_items.get(form_type)?.iter().find(|f| {
            (form_unique_key.is_some() && f.form_unique_key.as_deref() == form_unique_key)
                || (form_name.is_some() && f.form_name.as_deref() == form_name)
        })
    }

    fn form_type_for(&self, form_unique_key: Option<&str>, form_name: Option<&str>) -> Option<String> {
        for (form_type, forms) in &self.form_items {
            for form in forms {
                if form_unique_key.is_some() && form.form_unique_key.as_deref() == form_unique_key {
                    return Some(form_type.clone());
                }
                if form_name.is_some() && form.form_name.as_deref() == form_name {
                    return Some(form_type.clone());
                }
            }
        }
        None
    }
}

/// Parses the `[csv2json]` TOML table into [`CsvToJsonSettings`].
pub fn parse_csv_to_json_settings(value: &toml::Value) -> Result<CsvToJsonSettings> {
    let table = value
        .as_table()
        .ok_or_else(|| JdiError::Config("csv2json settings must be a table".into()))?;

    let import_table = table
        .get("import_settings")
        .and_then(toml::Value::as_table)
        .ok_or_else(|| JdiError::Config("csv2json.import_settings is required".into()))?;

    let folder = import_table
        .get("csv_folder_path")
        .and_then(toml::Value::as_str)
        .ok_or_else(|| JdiError::Config("csv_folder_path is required".into()))?
        .to_string();
    let file_name_regex = import_table
        .get("csv_file_name")
        .and_then(toml::Value::as_str)
        .ok_or_else(|| JdiError::Config("csv_file_name is required".into()))?
        .to_string();
    let delimiter = import_table
        .get("delimiter")
        .and_then(toml::Value::as_str)
        .and_then(|s| s.bytes().next())
        .unwrap_or(b',');
    let quote = import_table
        .get("quotechar")
        .and_then(toml::Value::as_str)
        .and_then(|s| s.bytes().next())
        .unwrap_or(b'"');
    let enable_auto_form_detection = import_table
        .get("enable_auto_form_detection")
        .and_then(toml::Value::as_bool)
        .unwrap_or(false);

    let mut form_items = IndexMap::new();
    for (key, form_table) in table {
        if !key.ends_with("_form") {
            continue;
        }
        let forms = parse_form_items(form_table, key)?;
        form_items.insert(key.clone(), forms);
    }

    Ok(CsvToJsonSettings {
        import_settings: CsvImportSettings {
            folder,
            file_name_regex,
            delimiter,
            quote,
            enable_auto_form_detection,
        },
        form_items,
    })
}

fn parse_form_items(value: &toml::Value, form_type: &str) -> Result<Vec<FormDefinition>> {
    let table = value
        .as_table()
        .ok_or_else(|| JdiError::Config(format!("'{form_type}' section must be a table")))?;

    let common_items = table
        .get("common_items")
        .ok_or_else(|| JdiError::Config(format!("'{form_type}.common_items' is required")))?;
    let common = parse_field_array(common_items, form_type)?;

    let mut forms = vec![FormDefinition {
        form_type: form_type.to_string(),
        common,
        ..Default::default()
    }];

    for (key, specific) in table {
        if key == "common_items" || key.parse::<u64>().is_err() {
            continue;
        }
        let specific_table = specific
            .as_table()
            .ok_or_else(|| JdiError::Config(format!("'{form_type}.{key}' must be a table")))?;
        let form_name = specific_table
            .get("form_name")
            .and_then(toml::Value::as_str)
            .ok_or_else(|| JdiError::Config(format!("'{form_type}.{key}.form_name' is required")))?
            .to_string();
        let extended = match specific_table.get("extended_items") {
            Some(v) => parse_field_array(v, form_type)?,
            None => Vec::new(),
        };
        let detail = match specific_table.get("detail_items") {
            Some(v) => parse_field_array(v, form_type)?,
            None => Vec::new(),
        };
        forms.push(FormDefinition {
            form_type: form_type.to_string(),
            form_unique_key: Some(key.clone()),
            form_name: Some(form_name),
            common: forms[0].common.clone(),
            extended,
            detail,
        });
    }

    Ok(forms)
}

fn parse_field_array(value: &toml::Value, context: &str) -> Result<Vec<FormField>> {
    let items = value
        .as_array()
        .ok_or_else(|| JdiError::Config(format!("form items in '{context}' must be an array")))?;

    let mut fields = Vec::with_capacity(items.len());
    let mut seen_keys = std::collections::HashSet::new();
    for (i, item) in items.iter().enumerate() {
        let arr = item
            .as_array()
            .ok_or_else(|| JdiError::Config(format!("form item {i} in '{context}' must be an array")))?;
        if arr.len() != 3 && arr.len() != 4 {
            return Err(JdiError::Config(format!(
                "form item {i} in '{context}' must have 3 or 4 elements"
            )));
        }
        let as_str = |v: &toml::Value| -> Result<String> {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| JdiError::Config(format!("form item {i} in '{context}' must be all strings")))
        };
        let title = as_str(&arr[0])?;
        let json_key = as_str(&arr[1])?;
        let raw_type = as_str(&arr[2])?;
        let description = if arr.len() == 4 { as_str(&arr[3])? } else { String::new() };

        if !seen_keys.insert(json_key.clone()) {
            return Err(JdiError::Config(format!(
                "duplicated JSON key '{json_key}' in '{context}'"
            )));
        }

        let normalized = raw_type.replace('-', "_").to_uppercase();
        let conversion = if normalized.is_empty() {
            None
        } else {
            Some(ConversionMethod::from_str_normalized(&normalized).ok_or_else(|| {
                JdiError::Config(format!("invalid conversion method '{raw_type}' in '{context}'"))
            })?)
        };

        fields.push(FormField {
            title,
            json_key,
            conversion,
            description,
        });
    }
    Ok(fields)
}

/// Groups files under `folder` whose name matches `file_name_regex`
/// (capture group 1: form label, group 2: sequence number) by label, sorted
/// by sequence ascending; preserves first-seen label order.
pub fn pick_files(folder: &Path, file_name_regex: &str) -> Result<IndexMap<String, Vec<PathBuf>>> {
    let re = Regex::new(file_name_regex)?;
    let mut unsorted: IndexMap<String, Vec<(u64, PathBuf)>> = IndexMap::new();

    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(caps) = re.captures(file_name) else {
            continue;
        };
        let Some(label) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if label.is_empty() {
            continue;
        }
        let Some(seq) = caps.get(2).and_then(|m| m.as_str().parse::<u64>().ok()) else {
            continue;
        };
        unsorted.entry(label.to_string()).or_default().push((seq, path));
    }

    let mut files = IndexMap::new();
    for (label, mut seq_paths) in unsorted {
        seq_paths.sort_by_key(|(seq, _)| *seq);
        files.insert(label, seq_paths.into_iter().map(|(_, p)| p).collect());
    }
    Ok(files)
}

fn excel_column_name(num: usize) -> String {
    if num < 26 {
        ((b'A' + num as u8) as char).to_string()
    } else {
        format!("{}{}", excel_column_name(num / 26 - 1), excel_column_name(num % 26))
    }
}

/// Auto-detects extended/detail fields from the title row when no explicit
/// `FormDefinition` covers this request: everything between the common
/// fields and the "コメント" column is extended, everything after is detail.
fn extract_additional_items(titles: &[String], common: &[FormField]) -> Result<(Vec<FormField>, Vec<FormField>)> {
    if common.is_empty() || common.last().map(|f| f.title.as_str()) != Some(COMMENT_TITLE) {
        return Err(JdiError::Config(
            "the last common item must be 'コメント' to auto-detect additional items".into(),
        ));
    }
    let common_titles: Vec<&str> = common[..common.len() - 1].iter().map(|f| f.title.as_str()).collect();

    let head: std::collections::HashSet<&str> = titles.iter().take(common_titles.len()).map(String::as_str).collect();
    let expected: std::collections::HashSet<&str> = common_titles.iter().copied().collect();
    if head != expected {
        return Err(JdiError::Config("the CSV title row does not match the common items".into()));
    }

    let comment_index = titles
        .iter()
        .position(|t| t == COMMENT_TITLE)
        .ok_or_else(|| JdiError::Config("the CSV title row must contain 'コメント'".into()))?;

    let extended = (common_titles.len()..comment_index)
        .map(|i| FormField {
            title: titles[i].clone(),
            json_key: excel_column_name(i),
            conversion: None,
            description: String::new(),
        })
        .collect();
    let detail = (comment_index + 1..titles.len())
        .map(|i| FormField {
            title: titles[i].clone(),
            json_key: excel_column_name(i),
            conversion: None,
            description: String::new(),
        })
        .collect();
    Ok((extended, detail))
}

fn single_request_items(fields: &[FormField], titles: &[String], rows: &[&[String]]) -> Result<Vec<IndexMap<String, Value>>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = IndexMap::new();
        for field in fields {
            let idx = titles
                .iter()
                .position(|t| t == &field.title)
                .ok_or_else(|| JdiError::Config(format!("title '{}' not found in CSV file", field.title)))?;
            let raw = row.get(idx).cloned().unwrap_or_default();
            let value = match field.conversion {
                Some(method) => apply_conversion(&Value::String(raw), method)?,
                None => Value::String(raw),
            };
            record.insert(field.json_key.clone(), value);
        }
        out.push(record);
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct ParsedCsvRecord {
    pub form_type: String,
    pub common: IndexMap<String, Value>,
    pub extends: IndexMap<String, Value>,
    pub details: Vec<IndexMap<String, Value>>,
}

impl ParsedCsvRecord {
    pub fn to_value(&self) -> Value {
        json!({
            "common": self.common,
            "extends": self.extends,
            "details": self.details,
        })
    }
}

fn classify_form_type(
    titles: &[String],
    settings: &CsvToJsonSettings,
    form_name: Option<&str>,
    auto_detect: bool,
) -> Option<String> {
    if let Some(found) = settings.form_type_for(None, form_name) {
        return Some(found);
    }
    if !auto_detect {
        return None;
    }

    let mut matched: Vec<(usize, String)> = Vec::new();
    for form_type in settings.form_types() {
        let Some(common_form) = settings.common_form(form_type) else {
            continue;
        };
        let mut common_titles: Vec<&str> = common_form.common.iter().map(|f| f.title.as_str()).collect();
        if common_titles.last() == Some(&COMMENT_TITLE) {
            common_titles.pop();
        }
        let head: std::collections::HashSet<&str> = titles.iter().take(common_titles.len()).map(String::as_str).collect();
        let expected: std::collections::HashSet<&str> = common_titles.iter().copied().collect();
        if head == expected {
            matched.push((common_titles.len(), form_type.to_string()));
        }
    }
    matched.into_iter().max_by_key(|(n, _)| *n).map(|(_, t)| t)
}

fn single_request_to_json(
    form_type: &str,
    titles: &[String],
    data_row: &[String],
    details: &[Vec<String>],
    settings: &CsvToJsonSettings,
    form_unique_key: Option<&str>,
    form_name: Option<&str>,
) -> Result<ParsedCsvRecord> {
    let common_form = settings
        .common_form(form_type)
        .ok_or_else(|| JdiError::Config(format!("form type '{form_type}' not found in conversion settings")))?;

    let common = single_request_items(&common_form.common, titles, &[data_row])?
        .into_iter()
        .next()
        .unwrap_or_default();

    let specific = if form_unique_key.is_some() || form_name.is_some() {
        settings.specific_form(form_type, form_unique_key, form_name)
    } else {
        None
    };

    let (extended_fields, detail_fields) = match specific {
        Some(form) => (form.extended.clone(), form.detail.clone()),
        None => extract_additional_items(titles, &common_form.common)?,
    };

    let extends = single_request_items(&extended_fields, titles, &[data_row])?
        .into_iter()
        .next()
        .unwrap_or_default();

    let detail_rows: Vec<&[String]> = details.iter().map(Vec::as_slice).collect();
    let details = if detail_fields.is_empty() {
        Vec::new()
    } else {
        single_request_items(&detail_fields, titles, &detail_rows)?
    };

    Ok(ParsedCsvRecord {
        form_type: form_type.to_string(),
        common,
        extends,
        details,
    })
}

/// Splits `rows[1..]` (the title row is `rows[0]`) into one-request groups: a
/// row starts a new request unless its first column is blank, in which case
/// it is a detail (line-item) row belonging to the previous request.
fn group_records(rows: &[Vec<String>]) -> Vec<(&Vec<String>, Vec<Vec<String>>)> {
    let mut groups = Vec::new();
    let mut i = 1usize;
    while i < rows.len() {
        let data_row = &rows[i];
        let mut details = Vec::new();
        while i + 1 < rows.len() && rows[i + 1].first().map(String::as_str) == Some("") {
            i += 1;
            details.push(rows[i].clone());
        }
        groups.push((data_row, details));
        i += 1;
    }
    groups
}

pub fn parse_csv_rows(
    rows: &[Vec<String>],
    settings: &CsvToJsonSettings,
    form_unique_key: Option<&str>,
    form_name: Option<&str>,
) -> Result<Vec<ParsedCsvRecord>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let titles = &rows[0];
    let auto_detect = settings.import_settings.enable_auto_form_detection;
    let Some(form_type) = classify_form_type(titles, settings, form_name, auto_detect) else {
        if !auto_detect {
            return Ok(Vec::new());
        }
        return Err(JdiError::Config(format!(
            "the CSV title row does not correspond to any configured form: {titles:?}"
        )));
    };

    group_records(rows)
        .into_iter()
        .map(|(data_row, details)| {
            single_request_to_json(&form_type, titles, data_row, &details, settings, form_unique_key, form_name)
        })
        .collect()
}

pub fn parse_csv_file(
    path: &Path,
    settings: &CsvToJsonSettings,
    form_unique_key: Option<&str>,
    form_name: Option<&str>,
) -> Result<Vec<ParsedCsvRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(settings.import_settings.delimiter)
        .quote(settings.import_settings.quote)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    parse_csv_rows(&rows, settings, form_unique_key, form_name)
}

pub fn csv_to_raw_data_source(source_name: &str, records: &[ParsedCsvRecord]) -> DataSource {
    DataSource::Raw {
        name: source_name.to_string(),
        result_format: ResultFormat::MultipleJsonEntries,
        results_key: DEFAULT_RESULTS_KEY.to_string(),
        data: Value::Array(records.iter().map(ParsedCsvRecord::to_value).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(title: &str, key: &str) -> FormField {
        FormField {
            title: title.to_string(),
            json_key: key.to_string(),
            conversion: None,
            description: String::new(),
        }
    }

    fn settings_with_general_form() -> CsvToJsonSettings {
        let mut form_items = IndexMap::new();
        form_items.insert(
            "general_form".to_string(),
            vec![FormDefinition {
                form_type: "general_form".to_string(),
                common: vec![field("申請書ID", "request_id"), field("コメント", "comment")],
                ..Default::default()
            }],
        );
        CsvToJsonSettings {
            import_settings: CsvImportSettings {
                enable_auto_form_detection: true,
                ..Default::default()
            },
            form_items,
        }
    }

    #[test]
    fn groups_detail_rows_under_the_preceding_request() {
        let rows = vec![
            vec!["申請書ID".into(), "コメント".into(), "品目".into()],
            vec!["1".into(), "ok".into(), "A".into()],
            vec!["".into(), "".into(), "B".into()],
            vec!["2".into(), "ok2".into(), "C".into()],
        ];
        let groups = group_records(&rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1.len(), 1);
        assert_eq!(groups[1].1.len(), 0);
    }

    #[test]
    fn parses_rows_into_records_with_auto_detected_extended_and_detail_items() {
        let settings = settings_with_general_form();
        let rows = vec![
            vec!["申請書ID".into(), "メモ".into(), "コメント".into(), "品目".into()],
            vec!["1".into(), "hello".into(), "ok".into(), "widget".into()],
        ];
        let records = parse_csv_rows(&rows, &settings, None, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].common["request_id"], json!("1"));
        assert_eq!(records[0].extends["A"], json!("hello"));
        assert_eq!(records[0].details.is_empty(), true);
    }

    #[test]
    fn pick_files_groups_by_label_and_sorts_by_sequence() {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in [
            ("request_A_20240101_12345_2.csv", "b"),
            ("request_A_20240101_12345_1.csv", "a"),
            ("request_B_20240101_12345_1.csv", "c"),
            ("unrelated.csv", "d"),
        ] {
            fs::write(dir.path().join(name), contents).unwrap();
        }
        let files = pick_files(dir.path(), r"request_(.*?)_\d+_\d+_(\d+)\.csv").unwrap();
        assert_eq!(files["A"].len(), 2);
        assert!(files["A"][0].ends_with("1.csv"));
        assert!(files["A"][1].ends_with("2.csv"));
        assert_eq!(files["B"].len(), 1);
        assert!(!files.contains_key("unrelated"));
    }
}

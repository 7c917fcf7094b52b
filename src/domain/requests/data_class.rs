//! In-memory accumulators for request sub-records that get deduplicated and
//! flushed in one pass. Grounded on
//! `jobcan_di/database/requests/_data_class.py`.

use serde_json::Value;

/// File row plus the slot in `file_associations` its parent occupies.
/// `parent_type` mirrors the original's integer tag: 0 customized_items,
/// 1 expense_specific_rows, 2 payment_specific_rows, 3 approval_steps,
/// 4 approval_process (after completion), 5 default_attachment.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: String,
    pub name: String,
    pub file_type: String,
    pub user_name: Option<String>,
    pub date: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FileAssociation {
    pub request_id: String,
    pub file_id: String,
    pub customized_item_id: Option<i64>,
    pub expense_specific_row_id: Option<i64>,
    pub payment_specific_row_id: Option<i64>,
    pub approval_step_id: Option<i64>,
    pub approval_after_completion_id: Option<i64>,
    pub default_attachment: i64,
}

pub struct FileDataList {
    request_id: String,
    files: Vec<FileRow>,
    associations: Vec<FileAssociation>,
}

impl FileDataList {
    pub fn new(request_id: impl Into<String>) -> FileDataList {
        FileDataList { request_id: request_id.into(), files: Vec::new(), associations: Vec::new() }
    }

    /// `parent_type`: 0..=4 sets the matching association column to
    /// `parent_id`; 5 (default attachment) increments `default_attachment`
    /// instead and ignores `parent_id`.
    pub fn add_file(&mut self, file_data: &Value, parent_type: u8, parent_id: Option<i64>) {
        let file_id = file_data["id"].as_str().unwrap_or_default().to_string();
        let name = file_data["name"].as_str().unwrap_or_default().to_string();
        let file_type = file_data["type"].as_str().unwrap_or_default().to_string();
        let user_name = file_data.get("user_name").and_then(Value::as_str).map(str::to_string);
        let date = file_data.get("date").and_then(Value::as_str).map(str::to_string);
        let deleted = file_data.get("deleted").and_then(Value::as_bool).unwrap_or(false);

        let idx = self.files.iter().position(|f| f.id == file_id);
        let idx = match idx {
            Some(i) => {
                if user_name.is_some() {
                    self.files[i].user_name = user_name;
                }
                if date.is_some() {
                    self.files[i].date = date;
                }
                self.files[i].deleted = deleted;
                i
            }
            None => {
                self.files.push(FileRow { id: file_id.clone(), name, file_type, user_name, date, deleted });
                self.associations.push(FileAssociation {
                    request_id: self.request_id.clone(),
                    file_id: file_id.clone(),
                    default_attachment: 0,
                    ..Default::default()
                });
                self.files.len() - 1
            }
        };

        match parent_type {
            0 => self.associations[idx].customized_item_id = parent_id,
            1 => self.associations[idx].expense_specific_row_id = parent_id,
            2 => self.associations[idx].payment_specific_row_id = parent_id,
            3 => self.associations[idx].approval_step_id = parent_id,
            4 => self.associations[idx].approval_after_completion_id = parent_id,
            5 => self.associations[idx].default_attachment += 1,
            other => panic!("unknown file parent_type {other}"),
        }
    }

    pub fn files(&self) -> &[FileRow] {
        &self.files
    }

    pub fn associations(&self) -> &[FileAssociation] {
        &self.associations
    }
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub user_name: String,
    pub date: String,
    pub text: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CommentAssociation {
    pub comment_id: Option<i64>,
    pub approval_step_id: Option<i64>,
    pub approval_after_completion_id: Option<i64>,
}

#[derive(Default)]
pub struct CommentDataList {
    comments: Vec<CommentRow>,
    associations: Vec<CommentAssociation>,
}

impl CommentDataList {
    pub fn new() -> CommentDataList {
        CommentDataList::default()
    }

    pub fn add_comment(
        &mut self,
        comment_data: &Value,
        approval_step_id: Option<i64>,
        approval_after_completion_id: Option<i64>,
    ) {
        let user_name = comment_data["user_name"].as_str().unwrap_or_default().to_string();
        let date = comment_data["date"].as_str().unwrap_or_default().to_string();
        let text = comment_data.get("text").and_then(Value::as_str).map(str::to_string);
        let deleted = comment_data.get("deleted").and_then(Value::as_bool).unwrap_or(false);

        let idx = self.comments.iter().position(|c| c.user_name == user_name && c.date == date && c.text == text);
        let idx = match idx {
            Some(i) => {
                self.comments[i].deleted = deleted;
                i
            }
            None => {
                self.comments.push(CommentRow { user_name, date, text, deleted });
                self.associations.push(CommentAssociation::default());
                self.comments.len() - 1
            }
        };

        if approval_step_id.is_some() {
            self.associations[idx].approval_step_id = approval_step_id;
        }
        if approval_after_completion_id.is_some() {
            self.associations[idx].approval_after_completion_id = approval_after_completion_id;
        }
    }

    pub fn comments(&self) -> &[CommentRow] {
        &self.comments
    }

    pub fn set_comment_ids(&mut self, ids: &[i64]) {
        for (assoc, id) in self.associations.iter_mut().zip(ids) {
            assoc.comment_id = Some(*id);
        }
    }

    pub fn associations(&self) -> &[CommentAssociation] {
        &self.associations
    }
}

#[derive(Debug, Clone)]
pub struct GenericMasterRow {
    pub record_name: String,
    pub record_code: String,
    pub customized_item_id: Option<i64>,
    pub table_data_id: Option<i64>,
    pub additional_items: Vec<String>,
}

#[derive(Default)]
pub struct GenericMasterDataList {
    masters: Vec<GenericMasterRow>,
    ids: Vec<Option<i64>>,
}

impl GenericMasterDataList {
    pub fn new() -> GenericMasterDataList {
        GenericMasterDataList::default()
    }

    pub fn add_generic_master(&mut self, data: &Value, customized_item_id: Option<i64>, table_data_id: Option<i64>) {
        let record_name = data["record_name"].as_str().unwrap_or_default().to_string();
        let record_code = data["record_code"].as_str().unwrap_or_default().to_string();
        let additional_items: Vec<String> = data
            .get("additional_items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let idx = self.masters.iter().position(|m| {
            m.record_name == record_name && m.record_code == record_code && m.additional_items == additional_items
        });
        match idx {
            Some(i) => {
                if customized_item_id.is_some() {
                    self.masters[i].customized_item_id = customized_item_id;
                }
                if table_data_id.is_some() {
                    self.masters[i].table_data_id = table_data_id;
                }
            }
            None => {
                self.masters.push(GenericMasterRow {
                    record_name,
                    record_code,
                    customized_item_id,
                    table_data_id,
                    additional_items,
                });
                self.ids.push(None);
            }
        }
    }

    pub fn masters(&self) -> &[GenericMasterRow] {
        &self.masters
    }

    pub fn set_master_ids(&mut self, ids: &[i64]) {
        for (slot, id) in self.ids.iter_mut().zip(ids) {
            *slot = Some(*id);
        }
    }

    pub fn ids_and_items(&self) -> impl Iterator<Item = (i64, &[String])> {
        self.ids.iter().zip(self.masters.iter()).map(|(id, m)| (id.expect("master id not set"), m.additional_items.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_file_dedups_by_id_and_merges_parent_slots() {
        let mut list = FileDataList::new("req1");
        list.add_file(&json!({"id": "f1", "name": "a.pdf", "type": "pdf"}), 0, Some(10));
        list.add_file(&json!({"id": "f1", "name": "a.pdf", "type": "pdf", "user_name": "Taro"}), 3, Some(20));

        assert_eq!(list.files().len(), 1);
        assert_eq!(list.files()[0].user_name.as_deref(), Some("Taro"));
        assert_eq!(list.associations()[0].customized_item_id, Some(10));
        assert_eq!(list.associations()[0].approval_step_id, Some(20));
    }

    #[test]
    fn add_file_default_attachment_increments_counter() {
        let mut list = FileDataList::new("req1");
        list.add_file(&json!({"id": "f1", "name": "a.pdf", "type": "pdf"}), 5, None);
        list.add_file(&json!({"id": "f1", "name": "a.pdf", "type": "pdf"}), 5, None);
        assert_eq!(list.associations()[0].default_attachment, 2);
    }

    #[test]
    fn add_comment_dedups_by_user_date_text_triple() {
        let mut list = CommentDataList::new();
        list.add_comment(&json!({"user_name": "u", "date": "d", "text": "hi", "deleted": false}), Some(1), None);
        list.add_comment(&json!({"user_name": "u", "date": "d", "text": "hi", "deleted": true}), None, Some(2));

        assert_eq!(list.comments().len(), 1);
        assert!(list.comments()[0].deleted);
        assert_eq!(list.associations()[0].approval_step_id, Some(1));
        assert_eq!(list.associations()[0].approval_after_completion_id, Some(2));
    }

    #[test]
    fn add_generic_master_dedups_by_name_code_and_items() {
        let mut list = GenericMasterDataList::new();
        list.add_generic_master(&json!({"record_name": "r", "record_code": "c", "additional_items": ["x"]}), Some(1), None);
        list.add_generic_master(&json!({"record_name": "r", "record_code": "c", "additional_items": ["x"]}), None, Some(2));

        assert_eq!(list.masters().len(), 1);
        assert_eq!(list.masters()[0].customized_item_id, Some(1));
        assert_eq!(list.masters()[0].table_data_id, Some(2));
    }
}

//! The API types the gateway knows how to fetch, shared by the status model,
//! the gateway and the error taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One remote endpoint family. Mirrors the original integrator's `APIType`
/// enum (`jobcan_di/status/progress.py`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApiType {
    UserV3,
    GroupV1,
    PositionV1,
    ProjectV1,
    CompanyV1,
    FixJournalV1,
    FormV1,
    RequestOutline,
    RequestDetail,
}

impl ApiType {
    /// All of the "basic data" endpoints, in the order the Gateway walks them.
    pub const BASIC_DATA: [ApiType; 6] = [
        ApiType::UserV3,
        ApiType::GroupV1,
        ApiType::PositionV1,
        ApiType::ProjectV1,
        ApiType::CompanyV1,
        ApiType::FixJournalV1,
    ];

    /// The natural-key field name used to identify one item of this type.
    pub fn unique_identifier_key(self) -> &'static str {
        match self {
            ApiType::UserV3 => "user_code",
            ApiType::GroupV1 => "group_code",
            ApiType::PositionV1 => "position_code",
            ApiType::ProjectV1 => "project_code",
            ApiType::CompanyV1 => "company_code",
            ApiType::FixJournalV1 => "id",
            ApiType::FormV1 => "id",
            ApiType::RequestOutline => "id",
            ApiType::RequestDetail => "id",
        }
    }

    /// Stable name used in JSON serialization / status files, matching the
    /// original's `Enum` member names exactly so status files stay
    /// compatible across implementations.
    pub fn name(self) -> &'static str {
        match self {
            ApiType::UserV3 => "USER_V3",
            ApiType::GroupV1 => "GROUP_V1",
            ApiType::PositionV1 => "POSITION_V1",
            ApiType::ProjectV1 => "PROJECT_V1",
            ApiType::CompanyV1 => "COMPANY_V1",
            ApiType::FixJournalV1 => "FIX_JOURNAL_V1",
            ApiType::FormV1 => "FORM_V1",
            ApiType::RequestOutline => "REQUEST_OUTLINE",
            ApiType::RequestDetail => "REQUEST_DETAIL",
        }
    }

    pub fn from_name(name: &str) -> Option<ApiType> {
        Some(match name {
            "USER_V3" => ApiType::UserV3,
            "GROUP_V1" => ApiType::GroupV1,
            "POSITION_V1" => ApiType::PositionV1,
            "PROJECT_V1" => ApiType::ProjectV1,
            "COMPANY_V1" => ApiType::CompanyV1,
            "FIX_JOURNAL_V1" => ApiType::FixJournalV1,
            "FORM_V1" => ApiType::FormV1,
            "REQUEST_OUTLINE" => ApiType::RequestOutline,
            "REQUEST_DETAIL" => ApiType::RequestDetail,
            _ => return None,
        })
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trips() {
        for api_type in ApiType::BASIC_DATA {
            assert_eq!(ApiType::from_name(api_type.name()), Some(api_type));
        }
    }

    #[test]
    fn basic_data_has_six_members() {
        assert_eq!(ApiType::BASIC_DATA.len(), 6);
    }
}

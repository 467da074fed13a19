use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::text_enum;

text_enum!(ProfessorStatus {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
    Deleted => "DELETED",
});

text_enum!(KeywordSource {
    ResearchArea => "RESEARCH_AREA",
    Publication => "PUBLICATION",
    Manual => "MANUAL",
});

/// Global (not tenant-scoped) catalog entry. `university` is the joined
/// university name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProfessorRow {
    pub id: Uuid,
    pub university: Option<String>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<String>,
    pub research_area: Option<String>,
    pub publications: Option<String>,
    pub status: ProfessorStatus,
}

impl ProfessorRow {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProfessorKeywordRow {
    pub professor_id: Uuid,
    pub keyword: String,
    pub normalized: String,
    pub weight: f64,
    pub source: KeywordSource,
}

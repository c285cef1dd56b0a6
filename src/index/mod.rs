pub mod fts;
pub mod vector;

#[derive(Debug, Clone, serde::Serialize)]
pub struct RankedRow {
    pub object_id: String,
    pub source_name: String,
    pub schema_name: Option<String>,
    pub kind: String,
    pub name_snippet: String,
    pub context_snippet: String,
    pub score: f64,
}

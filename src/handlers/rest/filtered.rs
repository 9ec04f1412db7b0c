use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
};

use crate::api::format::TypedRecords;
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult};
use crate::permission::Identity;
use crate::state::AppState;

/// POST /rest/:group/filtered/*types - List one or more types
///
/// Body (all optional, an empty body lists with defaults):
/// - filter: `{column: literal | {eq|like|in|notin: value}}`
/// - order: `[[column, "ascending"|"descending"], ...]`
/// - limit/offset: pagination, default 100/0
pub async fn filtered_post(
    State(state): State<AppState>,
    Path((group, types)): Path<(String, String)>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> ApiResult<TypedRecords> {
    let filter_data = parse_filter_body(&body)?;
    let types = split_types(&types);

    let result = state.store.list(&identity, &group, &types, &filter_data).await?;
    Ok(ApiResponse::paginated(result))
}

fn parse_filter_body(body: &[u8]) -> Result<FilterData, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(FilterData::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::invalid_json(format!("Invalid filter body: {}", e)))
}

/// Type list from the path: comma- or slash-separated.
pub fn split_types(raw: &str) -> Vec<String> {
    raw.split([',', '/'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

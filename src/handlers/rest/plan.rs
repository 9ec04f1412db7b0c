use std::collections::BTreeMap;

use axum::extract::{Path, State};
use serde::Serialize;

use crate::middleware::{ApiResponse, ApiResult};
use crate::plan::{GroupPlan, TypePlan};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescription {
    pub resource_type: String,
    pub list: Vec<String>,
    pub create: Vec<String>,
    pub update: Vec<String>,
    /// Columns a new record must carry.
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variants: Option<VariantDescription>,
}

#[derive(Debug, Serialize)]
pub struct VariantDescription {
    pub discriminator: String,
    /// Side-table column names per variant.
    pub types: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct GroupDescription {
    pub group: String,
    pub types: BTreeMap<String, TypeDescription>,
}

impl From<&TypePlan> for TypeDescription {
    fn from(plan: &TypePlan) -> Self {
        Self {
            resource_type: plan.resource_type.clone(),
            list: plan.context.list.clone(),
            create: plan.context.create.clone(),
            update: plan.context.update.clone(),
            required: plan
                .columns
                .values()
                .filter(|c| c.required)
                .map(|c| c.name.clone())
                .collect(),
            variants: plan.variants.as_ref().map(|v| VariantDescription {
                discriminator: v.discriminator.clone(),
                types: v
                    .variants
                    .iter()
                    .map(|(name, table)| (name.clone(), table.columns.iter().map(|c| c.name.clone()).collect()))
                    .collect(),
            }),
        }
    }
}

impl From<&GroupPlan> for GroupDescription {
    fn from(group: &GroupPlan) -> Self {
        Self {
            group: group.name.clone(),
            types: group
                .types
                .iter()
                .map(|(name, plan)| (name.clone(), TypeDescription::from(plan)))
                .collect(),
        }
    }
}

/// GET /rest/:group/plan - Column names per type and operation, for clients
/// building forms
pub async fn plan_get(State(state): State<AppState>, Path(group): Path<String>) -> ApiResult<GroupDescription> {
    let group = state.plan.group(&group)?;
    Ok(ApiResponse::success(GroupDescription::from(group)))
}

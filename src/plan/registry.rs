use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::column::{is_identifier, ColumnDescriptor, ColumnKind, DefaultValue, SqlType};
use super::error::PlanError;
use crate::types::Operation;

/// Plan shipped with the crate; used when no plan file is configured.
pub const DEFAULT_PLAN: &str = include_str!("../../plan/default.yaml");

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlan {
    groups: BTreeMap<String, BTreeMap<String, RawType>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawType {
    table: String,
    resource_type: Option<String>,
    columns: BTreeMap<String, RawColumn>,
    #[serde(default)]
    context: RawContext,
    variants: Option<RawVariants>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawContext {
    #[serde(default)]
    list: Vec<String>,
    #[serde(default)]
    create: Vec<String>,
    #[serde(default)]
    update: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawColumn {
    column: Option<String>,
    #[serde(default = "default_sql_type")]
    sql_type: String,
    default: Option<Value>,
    schema: Option<Value>,
    #[serde(default)]
    required: bool,
    select_expr: Option<String>,
    modify_expr: Option<String>,
}

fn default_sql_type() -> String {
    "text".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawVariants {
    discriminator: String,
    foreign_key: String,
    types: BTreeMap<String, RawVariant>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVariant {
    table: String,
    #[serde(default)]
    columns: BTreeMap<String, RawColumn>,
}

/// Column whitelists per operation, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Contexts {
    pub list: Vec<String>,
    pub create: Vec<String>,
    pub update: Vec<String>,
}

/// One side table of a variant entity.
#[derive(Debug, Clone)]
pub struct VariantTable {
    pub name: String,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl VariantTable {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct VariantPlan {
    /// API name of the base column selecting the variant.
    pub discriminator: String,
    /// Side-table column referencing the base key; also its primary key.
    pub foreign_key: String,
    pub variants: BTreeMap<String, VariantTable>,
}

impl VariantPlan {
    pub fn variant(&self, name: &str) -> Option<&VariantTable> {
        self.variants.get(name)
    }

    /// Find the variant owning a side-table column.
    pub fn owner_of(&self, column: &str) -> Option<&VariantTable> {
        self.variants.values().find(|v| v.column(column).is_some())
    }
}

#[derive(Debug, Clone)]
pub struct TypePlan {
    pub group: String,
    pub name: String,
    pub table: String,
    pub resource_type: String,
    pub columns: BTreeMap<String, ColumnDescriptor>,
    pub context: Contexts,
    pub variants: Option<VariantPlan>,
}

impl TypePlan {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.get(name)
    }

    /// Columns participating in `operation`, ordered as the context lists them.
    pub fn columns_for(&self, operation: Operation) -> Vec<&ColumnDescriptor> {
        let names = match operation {
            Operation::List => &self.context.list,
            Operation::Create => &self.context.create,
            Operation::Update => &self.context.update,
            Operation::Delete => return Vec::new(),
        };
        names.iter().filter_map(|n| self.columns.get(n)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct GroupPlan {
    pub name: String,
    pub types: BTreeMap<String, TypePlan>,
}

/// Immutable description of every group, type and column. Built once at
/// startup and shared by reference.
#[derive(Debug, Clone)]
pub struct PlanRegistry {
    groups: BTreeMap<String, GroupPlan>,
}

impl PlanRegistry {
    pub fn builtin() -> Result<Self, PlanError> {
        Self::from_yaml_str(DEFAULT_PLAN)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, PlanError> {
        let raw: RawPlan = serde_yaml::from_str(content)?;
        let mut groups = BTreeMap::new();
        for (group_name, raw_types) in raw.groups {
            check_identifier(&group_name)?;
            let mut types = BTreeMap::new();
            for (type_name, raw_type) in raw_types {
                let plan = build_type(&group_name, &type_name, raw_type)?;
                types.insert(type_name, plan);
            }
            groups.insert(group_name.clone(), GroupPlan { name: group_name, types });
        }
        Ok(Self { groups })
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupPlan> {
        self.groups.values()
    }

    pub fn group(&self, group: &str) -> Result<&GroupPlan, PlanError> {
        self.groups
            .get(group)
            .ok_or_else(|| PlanError::UnknownGroup(group.to_string()))
    }

    pub fn type_plan(&self, group: &str, type_name: &str) -> Result<&TypePlan, PlanError> {
        self.group(group)?
            .types
            .get(type_name)
            .ok_or_else(|| PlanError::UnknownType {
                group: group.to_string(),
                type_name: type_name.to_string(),
            })
    }

    pub fn resolve_columns(
        &self,
        group: &str,
        type_name: &str,
        operation: Operation,
    ) -> Result<Vec<&ColumnDescriptor>, PlanError> {
        Ok(self.type_plan(group, type_name)?.columns_for(operation))
    }

    /// Evaluate the default of a column; thunks yield a fresh value per call.
    pub fn default_for(
        &self,
        group: &str,
        type_name: &str,
        column: &str,
    ) -> Result<Option<Value>, PlanError> {
        let plan = self.type_plan(group, type_name)?;
        let descriptor = plan.column(column).or_else(|| {
            plan.variants
                .as_ref()
                .and_then(|v| v.owner_of(column))
                .and_then(|v| v.column(column))
        });
        Ok(descriptor.and_then(ColumnDescriptor::default_value))
    }
}

fn check_identifier(name: &str) -> Result<(), PlanError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(PlanError::InvalidIdentifier(name.to_string()))
    }
}

fn build_column(type_name: &str, name: &str, raw: RawColumn) -> Result<ColumnDescriptor, PlanError> {
    check_identifier(name)?;
    if name == "key" {
        return Err(PlanError::InvalidIdentifier(format!("{}.key is reserved", type_name)));
    }
    let column = raw.column.unwrap_or_else(|| name.to_string());
    check_identifier(&column)?;

    let sql_type: SqlType = raw
        .sql_type
        .parse()
        .map_err(|sql_type| PlanError::UnsupportedSqlType {
            type_name: type_name.to_string(),
            column: name.to_string(),
            sql_type,
        })?;

    let kind = match (raw.select_expr, raw.modify_expr) {
        (None, None) => ColumnKind::Literal,
        (select, modify) => {
            let select_expr = select.unwrap_or_else(|| "{column}".to_string());
            let modify_expr = modify.unwrap_or_else(|| sql_type.cast("{value}"));
            if !select_expr.contains("{column}") {
                return Err(PlanError::InvalidExpression {
                    type_name: type_name.to_string(),
                    column: name.to_string(),
                    placeholder: "{column}",
                });
            }
            if !modify_expr.contains("{value}") {
                return Err(PlanError::InvalidExpression {
                    type_name: type_name.to_string(),
                    column: name.to_string(),
                    placeholder: "{value}",
                });
            }
            ColumnKind::Computed { select_expr, modify_expr }
        }
    };

    let descriptor = ColumnDescriptor::new(
        name,
        column,
        sql_type,
        raw.default.map(DefaultValue::from_plan_value),
        kind,
        raw.schema.unwrap_or(Value::Bool(true)),
    )
    .map_err(|message| PlanError::InvalidSchema {
        type_name: type_name.to_string(),
        column: name.to_string(),
        message,
    })?;
    Ok(descriptor.with_required(raw.required))
}

fn build_type(group: &str, type_name: &str, raw: RawType) -> Result<TypePlan, PlanError> {
    check_identifier(type_name)?;
    check_identifier(&raw.table)?;

    let mut columns = BTreeMap::new();
    for (name, raw_column) in raw.columns {
        let descriptor = build_column(type_name, &name, raw_column)?;
        columns.insert(name, descriptor);
    }

    let context = Contexts {
        list: raw.context.list,
        create: raw.context.create,
        update: raw.context.update,
    };
    for (label, names) in [
        ("list", &context.list),
        ("create", &context.create),
        ("update", &context.update),
    ] {
        if let Some(missing) = names.iter().find(|n| !columns.contains_key(*n)) {
            return Err(PlanError::UnknownContextColumn {
                type_name: type_name.to_string(),
                context: label,
                column: missing.clone(),
            });
        }
    }

    if let Some(column) = columns
        .values()
        .find(|c| c.required && c.default.is_none() && !context.create.contains(&c.name))
    {
        return Err(PlanError::UnreachableRequiredColumn {
            type_name: type_name.to_string(),
            column: column.name.clone(),
        });
    }

    let variants = match raw.variants {
        Some(raw_variants) => Some(build_variants(type_name, raw_variants, &columns, &context)?),
        None => None,
    };

    Ok(TypePlan {
        group: group.to_string(),
        name: type_name.to_string(),
        resource_type: raw.resource_type.unwrap_or_else(|| type_name.to_string()),
        table: raw.table,
        columns,
        context,
        variants,
    })
}

fn build_variants(
    type_name: &str,
    raw: RawVariants,
    columns: &BTreeMap<String, ColumnDescriptor>,
    context: &Contexts,
) -> Result<VariantPlan, PlanError> {
    let invalid = |message: String| PlanError::InvalidVariant {
        type_name: type_name.to_string(),
        message,
    };

    let discriminator = columns
        .get(&raw.discriminator)
        .ok_or_else(|| invalid(format!("discriminator '{}' is not a declared column", raw.discriminator)))?;
    if discriminator.sql_type != SqlType::Text || discriminator.kind != ColumnKind::Literal {
        return Err(invalid("discriminator must be a literal text column".to_string()));
    }
    if !context.list.contains(&raw.discriminator) {
        return Err(invalid("discriminator must be part of the list context".to_string()));
    }
    check_identifier(&raw.foreign_key)?;

    let mut variants = BTreeMap::new();
    for (variant_name, raw_variant) in raw.types {
        check_identifier(&variant_name)?;
        check_identifier(&raw_variant.table)?;
        let mut variant_columns = Vec::new();
        for (name, raw_column) in raw_variant.columns {
            if columns.contains_key(&name) {
                return Err(invalid(format!(
                    "variant column '{}' of '{}' shadows a base column",
                    name, variant_name
                )));
            }
            variant_columns.push(build_column(type_name, &name, raw_column)?);
        }
        variants.insert(
            variant_name.clone(),
            VariantTable {
                name: variant_name,
                table: raw_variant.table,
                columns: variant_columns,
            },
        );
    }
    if variants.is_empty() {
        return Err(invalid("at least one variant is required".to_string()));
    }

    Ok(VariantPlan {
        discriminator: raw.discriminator,
        foreign_key: raw.foreign_key,
        variants,
    })
}

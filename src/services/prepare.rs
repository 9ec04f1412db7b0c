use uuid::Uuid;

use crate::database::{RecordInput, SideWrite, VariantStore};
use crate::plan::{collect_values, ColumnValue, FieldErrors, TypePlan};
use crate::types::Operation;

/// A validated record ready to be written.
#[derive(Debug)]
pub struct PreparedRecord<'p> {
    pub key: Uuid,
    pub base: Vec<ColumnValue<'p>>,
    pub side: SideWrite<'p>,
    /// Update an existing row rather than insert.
    pub exists: bool,
}

fn prefix(plan: &TypePlan, index: usize) -> String {
    format!("{}[{}].", plan.name, index)
}

fn discriminator_of(values: &[ColumnValue<'_>], name: &str) -> Option<Option<String>> {
    values
        .iter()
        .find(|(column, _)| column.name == name)
        .map(|(_, value)| value.as_str().map(str::to_string))
}

/// Create-context columns with defaults for omitted fields. A missing key
/// gets a fresh one.
pub fn prepare_create<'p>(
    plan: &'p TypePlan,
    input: &RecordInput,
    index: usize,
    errors: &mut FieldErrors,
) -> PreparedRecord<'p> {
    let prefix = prefix(plan, index);
    let base = collect_values(plan.columns_for(Operation::Create), &input.data, true, &prefix, errors);
    let side = match &plan.variants {
        Some(variants) => {
            let disc = discriminator_of(&base, &variants.discriminator).flatten();
            VariantStore::new(variants).plan_write(None, disc.as_deref(), &input.data, &prefix, errors)
        }
        None => SideWrite::Keep,
    };
    PreparedRecord {
        key: input.key.unwrap_or_else(Uuid::new_v4),
        base,
        side,
        exists: false,
    }
}

/// Update-context columns that were supplied; nothing else is touched.
/// `current` is the stored discriminator of a variant entity.
pub fn prepare_update<'p>(
    plan: &'p TypePlan,
    input: &RecordInput,
    key: Uuid,
    current: Option<&str>,
    index: usize,
    errors: &mut FieldErrors,
) -> PreparedRecord<'p> {
    let prefix = prefix(plan, index);
    let base = collect_values(plan.columns_for(Operation::Update), &input.data, false, &prefix, errors);
    let side = match &plan.variants {
        Some(variants) => {
            let next = match discriminator_of(&base, &variants.discriminator) {
                Some(next) => next,
                None => current.map(str::to_string),
            };
            VariantStore::new(variants).plan_write(current, next.as_deref(), &input.data, &prefix, errors)
        }
        None => SideWrite::Keep,
    };
    PreparedRecord {
        key,
        base,
        side,
        exists: true,
    }
}

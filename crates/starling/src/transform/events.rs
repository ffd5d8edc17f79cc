//! User and time dimensions from play events.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, Int32Array, RecordBatch, TimestampMicrosecondArray, UInt32Array,
};
use arrow::datatypes::{DataType, Int64Type};
use snafu::prelude::*;

use crate::error::{ComputeSnafu, TransformError};
use crate::model::{TIMEZONE, TableName};
use crate::source::Dataset;

use super::UserLevelPolicy;
use super::calendar::{Calendar, millis_to_seconds};
use super::kernels::{
    Column, conform, distinct_rows, filter_not_null, filter_plays, project, take_rows,
};

/// `users`: distinct users of play events.
///
/// Under [`UserLevelPolicy::Latest`] each user is reduced to the attributes
/// of their most recent play before distinctness is applied.
pub fn build_users(
    events: &Dataset,
    policy: UserLevelPolicy,
) -> Result<RecordBatch, TransformError> {
    let table = TableName::Users;
    let schema = table.schema();
    let all = events.concat().context(ComputeSnafu { table })?;
    let plays = filter_plays(table, &all, false)?;

    let columns = [
        Column::new("userId", "user_id", &DataType::Utf8),
        Column::new("firstName", "first_name", &DataType::Utf8),
        Column::new("lastName", "last_name", &DataType::Utf8),
        Column::new("gender", "gender", &DataType::Utf8),
        Column::new("level", "level", &DataType::Utf8),
        Column::new("ts", "ts", &DataType::Int64),
    ];
    let projected = project(table, &plays, &columns)?;
    let users = filter_not_null(table, &projected, "user_id")?;

    let users = match policy {
        UserLevelPolicy::Latest => latest_per_user(table, &users)?,
        UserLevelPolicy::Distinct => users,
    };

    // Drop the ordering column
    let users = users
        .project(&[0, 1, 2, 3, 4])
        .context(ComputeSnafu { table })?;
    let users = distinct_rows(table, &users)?;
    conform(table, users, &schema)
}

/// Keep each user's row with the largest `ts`, in source order.
///
/// Ties go to the later row and a null `ts` loses to any value.
fn latest_per_user(table: TableName, users: &RecordBatch) -> Result<RecordBatch, TransformError> {
    let ids = users.column(0).as_string::<i32>();
    let ts = users.column(5).as_primitive::<Int64Type>();

    let mut latest: HashMap<&str, (Option<i64>, usize)> = HashMap::new();
    for row in 0..users.num_rows() {
        let stamp = ts.is_valid(row).then(|| ts.value(row));
        latest
            .entry(ids.value(row))
            .and_modify(|best| {
                if stamp >= best.0 {
                    *best = (stamp, row);
                }
            })
            .or_insert((stamp, row));
    }

    let mut rows: Vec<u32> = latest.into_values().map(|(_, row)| row as u32).collect();
    rows.sort_unstable();

    take_rows(table, users, &UInt32Array::from(rows))
}

/// `time`: one row per distinct play second, ascending.
pub fn build_time(events: &Dataset) -> Result<RecordBatch, TransformError> {
    let table = TableName::Time;
    let schema = table.schema();
    let all = events.concat().context(ComputeSnafu { table })?;
    let plays = filter_plays(table, &all, true)?;
    let projected = project(table, &plays, &[Column::new("ts", "ts", &DataType::Int64)])?;

    let seconds: BTreeSet<i64> = projected
        .column(0)
        .as_primitive::<Int64Type>()
        .iter()
        .flatten()
        .map(millis_to_seconds)
        .collect();

    let calendars = seconds
        .into_iter()
        .map(Calendar::from_seconds)
        .collect::<Result<Vec<_>, _>>()
        .context(ComputeSnafu { table })?;

    let field = |f: fn(&Calendar) -> i32| -> ArrayRef {
        Arc::new(Int32Array::from_iter_values(calendars.iter().map(f)))
    };

    let start_time: ArrayRef = Arc::new(
        TimestampMicrosecondArray::from_iter_values(calendars.iter().map(|c| c.micros))
            .with_timezone(TIMEZONE),
    );

    RecordBatch::try_new(
        schema,
        vec![
            start_time,
            field(|c| c.hour),
            field(|c| c.day),
            field(|c| c.week),
            field(|c| c.month),
            field(|c| c.year),
            field(|c| c.weekday),
        ],
    )
    .context(ComputeSnafu { table })
}

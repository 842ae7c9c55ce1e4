//! Built-in scenarios, one per prepared-statement exercise.

use serde::{Deserialize, Serialize};
use stmtprobe_core::{
    Capability, IdentSpelling, OptionOverrides, ParamType, Scenario, Step, TransactionMode, Value,
};
use typed_builder::TypedBuilder;

use crate::fixtures;

/// Knobs shared by the built-in scenarios.
#[derive(Clone, Debug, Deserialize, Serialize, TypedBuilder)]
pub struct CatalogParams {
    /// Executions of each statement in the lifecycle scenario.
    #[builder(default = 5)]
    pub lifecycle_rounds: usize,
    #[builder(default = 71_234_133)]
    pub insert_delete_id: i64,
    /// An id no fixture ever inserts.
    #[builder(default = 90_134_136)]
    pub missing_id: i64,
    #[builder(default = 581_800)]
    pub batch_base_id: i64,
    #[builder(default = 4)]
    pub batch_size: usize,
    #[builder(default = 620_000)]
    pub round_trip_base_id: i64,
    #[builder(default = 3)]
    pub round_trip_rows: usize,
}

impl Default for CatalogParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

const SELECT_NAME: &str = "select name from dogs where id = ?";
const INSERT_DOG: &str = "insert into dogs values(?, ?, ?)";

fn select_name(handle: &str) -> Step {
    Step::prepare(handle, SELECT_NAME, &[ParamType::Integer])
}

fn mode_suffix(mode: TransactionMode) -> &'static str {
    match mode {
        TransactionMode::None => "autocommit",
        TransactionMode::ExplicitBegin => "explicit-transaction",
        TransactionMode::AutocommitOffWithExplicitCommit => "autocommit-off",
    }
}

/// Create, execute, list and deallocate prepared statements.
#[must_use]
pub fn prepared_statement_lifecycle(params: &CatalogParams) -> Scenario {
    let mut scenario = Scenario::new(
        "prepared-statement-lifecycle",
        "execute two statements repeatedly, then deallocate one by upper-cased name and then all",
    )
    .requires(Capability::PreparedStatementListing)
    .requires(Capability::SqlDeallocate)
    .setup(fixtures::dogs())
    .steps([
        select_name("by_id"),
        Step::prepare(
            "id_and_name",
            "select id, name from dogs where id = ?",
            &[ParamType::Integer],
        ),
    ]);
    for _ in 0..params.lifecycle_rounds {
        scenario = scenario
            .step(Step::query("by_id", vec![Value::Int(1)]))
            .step(Step::query("id_and_name", vec![Value::Int(1)]));
    }
    scenario.steps([
        Step::InspectPreparedStatements,
        Step::deallocate("by_id", IdentSpelling::UpperCase),
        Step::InspectPreparedStatements,
        Step::deallocate_all(),
        Step::InspectPreparedStatements,
    ])
}

/// Select the seed row under the given transaction mode.
#[must_use]
pub fn simple_select(mode: TransactionMode) -> Scenario {
    let name = format!("simple-select-{}", mode_suffix(mode));
    let scenario = Scenario::new(
        &name,
        "a single prepared select; with autocommit off some client libraries begin a transaction first",
    )
    .setup(fixtures::dogs())
    .steps([
        Step::transaction(mode),
        select_name("by_id"),
        Step::query("by_id", vec![Value::Int(1)]),
    ]);
    match mode {
        TransactionMode::None => scenario,
        TransactionMode::ExplicitBegin | TransactionMode::AutocommitOffWithExplicitCommit => {
            scenario.step(Step::Commit)
        }
    }
}

/// Rename the seed row and read it back.
#[must_use]
pub fn update_name(with_timestamp: bool) -> Scenario {
    let (name, update) = if with_timestamp {
        (
            "update-name-and-timestamp",
            Step::prepare(
                "rename",
                "update dogs set name = ?, birth_date = ? where id = ?",
                &[ParamType::Text, ParamType::Timestamp, ParamType::Integer],
            ),
        )
    } else {
        (
            "update-name",
            Step::prepare(
                "rename",
                "update dogs set name = ? where id = ?",
                &[ParamType::Text, ParamType::Integer],
            ),
        )
    };
    let values = if with_timestamp {
        vec![Value::text("fido"), Value::CurrentTimestamp, Value::Int(1)]
    } else {
        vec![Value::text("fido"), Value::Int(1)]
    };
    Scenario::new(name, "prepared update with text (and timestamp) parameters")
        .setup(fixtures::dogs())
        .steps([
            update,
            Step::update("rename", values),
            select_name("by_id"),
            Step::query("by_id", vec![Value::Int(1)]),
        ])
}

/// Insert and delete the same row inside the given transaction mode.
#[must_use]
pub fn insert_and_delete(mode: TransactionMode, params: &CatalogParams) -> Scenario {
    let name = format!("insert-delete-{}", mode_suffix(mode));
    let id = params.insert_delete_id;
    let mut scenario = Scenario::new(&name, "insert then delete one row; nothing must remain")
        .setup(fixtures::dogs())
        .steps([
            Step::transaction(mode),
            Step::prepare(
                "insert",
                "insert into dogs values(?, 'rando', now())",
                &[ParamType::Integer],
            ),
            Step::update("insert", vec![Value::Int(id)]),
            Step::prepare("delete", "delete from dogs where id = ?", &[ParamType::Integer]),
            Step::update("delete", vec![Value::Int(id)]),
        ]);
    if mode != TransactionMode::None {
        scenario = scenario.step(Step::Commit);
    }
    scenario.steps([select_name("by_id"), Step::query("by_id", vec![Value::Int(id)])])
}

/// Select an id that does not exist.
#[must_use]
pub fn no_data_read(params: &CatalogParams) -> Scenario {
    Scenario::new("no-data-read", "a prepared select matching no rows")
        .setup(fixtures::dogs())
        .steps([
            select_name("by_id"),
            Step::query("by_id", vec![Value::Int(params.missing_id)]),
        ])
}

/// `DISTINCT` over aliased table and columns.
#[must_use]
pub fn table_aliasing() -> Scenario {
    Scenario::new("table-aliasing", "distinct projection through a table alias")
        .setup(fixtures::ints())
        .steps([
            Step::prepare(
                "aliased",
                "select distinct i.c2 as col0, i.c1 as col1 from ints as i where i.c1 = ?",
                &[ParamType::Integer],
            ),
            Step::query("aliased", vec![Value::Int(0)]),
        ])
}

/// Lookup with every identifier quoted in backticks, as ORMs for the MySQL
/// family emit it.
#[must_use]
pub fn backtick_quoted_lookup(params: &CatalogParams) -> Scenario {
    Scenario::new(
        "backtick-quoted-lookup",
        "backtick-quoted table and column names in a prepared lookup on an empty table",
    )
    .requires(Capability::BacktickIdentifiers)
    .setup(fixtures::tasks())
    .steps([
        Step::prepare(
            "tasks",
            "select * from `tasks` where `tasks`.`contact_id` = ? and `tasks`.`contact_id` is not null",
            &[ParamType::Integer],
        ),
        Step::query("tasks", vec![Value::Int(params.missing_id)]),
    ])
}

fn batch_rows(base_id: i64, count: usize) -> impl Iterator<Item = Step> {
    (base_id..).take(count).map(|id| {
        Step::add_batch(
            "insert",
            vec![
                Value::Int(id),
                Value::Text(format!("t_{id}")),
                Value::CurrentTimestamp,
            ],
        )
    })
}

fn prepare_insert() -> Step {
    Step::prepare(
        "insert",
        INSERT_DOG,
        &[ParamType::Integer, ParamType::Text, ParamType::Timestamp],
    )
}

/// Queue several inserts and flush them as one batch.
#[must_use]
pub fn batched_inserts(rewrite: bool, params: &CatalogParams) -> Scenario {
    let name = if rewrite {
        "batched-inserts-rewritten"
    } else {
        "batched-inserts"
    };
    Scenario::new(
        name,
        "per-row batch results; a rewritten batch may report count-unknown for every row",
    )
    .overrides(OptionOverrides {
        rewrite_batched_inserts: Some(rewrite),
    })
    .setup(fixtures::dogs())
    .step(prepare_insert())
    .steps(batch_rows(params.batch_base_id, params.batch_size))
    .step(Step::flush_batch("insert"))
}

/// Exclusive upper key of `rows` ids starting at `base`.
fn key_range_end(base: i64, rows: usize) -> i64 {
    base.saturating_add(i64::try_from(rows).unwrap_or(i64::MAX))
}

/// Batch-insert rows and select exactly those rows back by key.
#[must_use]
pub fn batched_insert_round_trip(params: &CatalogParams) -> Scenario {
    let base = params.round_trip_base_id;
    let end = key_range_end(base, params.round_trip_rows);
    Scenario::new(
        "batched-insert-round-trip",
        "rows inserted through a batch come back with the values supplied",
    )
    .setup(fixtures::dogs())
    .step(prepare_insert())
    .steps(batch_rows(base, params.round_trip_rows))
    .steps([
        Step::flush_batch("insert"),
        Step::prepare(
            "range",
            "select id, name from dogs where id >= ? and id < ? order by id",
            &[ParamType::Integer, ParamType::Integer],
        ),
        Step::query("range", vec![Value::Int(base), Value::Int(end)]),
    ])
}

/// Record server version and isolation level.
#[must_use]
pub fn connection_params() -> Scenario {
    Scenario::new("connection-params", "server version and transaction isolation")
        .requires(Capability::SessionInspection)
        .step(Step::InspectSession)
}

/// Every built-in scenario, in a stable order.
#[must_use]
pub fn all(params: &CatalogParams) -> Vec<Scenario> {
    vec![
        connection_params(),
        prepared_statement_lifecycle(params),
        simple_select(TransactionMode::None),
        simple_select(TransactionMode::AutocommitOffWithExplicitCommit),
        update_name(false),
        update_name(true),
        insert_and_delete(TransactionMode::None, params),
        insert_and_delete(TransactionMode::ExplicitBegin, params),
        insert_and_delete(TransactionMode::AutocommitOffWithExplicitCommit, params),
        no_data_read(params),
        table_aliasing(),
        backtick_quoted_lookup(params),
        batched_inserts(false, params),
        batched_inserts(true, params),
        batched_insert_round_trip(params),
    ]
}

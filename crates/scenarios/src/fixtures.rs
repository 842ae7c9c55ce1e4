//! Schema fixtures sent before a scenario's first step.
//!
//! Every fixture drops and recreates its tables so repeated runs start from
//! the same state.

/// `dogs(id, name, birth_date)` with the single seed row `(1, 'kidnap')`.
#[must_use]
pub fn dogs() -> Vec<String> {
    vec![
        "drop table if exists dogs".to_owned(),
        "create table dogs (id int, name varchar(64), birth_date timestamp default CURRENT_TIMESTAMP)"
            .to_owned(),
        "insert into dogs values(1, 'kidnap', now())".to_owned(),
    ]
}

/// `ints(c1, c2)` with a duplicated row for `DISTINCT` to collapse.
#[must_use]
pub fn ints() -> Vec<String> {
    vec![
        "drop table if exists ints".to_owned(),
        "create table ints (c1 int, c2 int)".to_owned(),
        "insert into ints values (0, 10), (0, 10), (1, 11)".to_owned(),
    ]
}

/// Empty `tasks(id, contact_id, title)`.
#[must_use]
pub fn tasks() -> Vec<String> {
    vec![
        "drop table if exists tasks".to_owned(),
        "create table tasks (id int, contact_id int, title varchar(255))".to_owned(),
    ]
}

use stmtprobe_core::ParamType;

use crate::error::DriverError;

/// Index of a statement prepared on one driver.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    /// Text as written in the scenario, with `?` placeholders.
    pub source: String,
    /// Text as sent to the backend.
    pub sql: String,
    pub params: Vec<ParamType>,
}

/// Statements prepared on one session, in preparation order.
#[derive(Debug, Default)]
pub struct Statements(Vec<PreparedStatement>);

impl Statements {
    pub fn register(&mut self, source: &str, sql: String, params: &[ParamType]) -> StatementId {
        self.0.push(PreparedStatement {
            source: source.to_owned(),
            sql,
            params: params.to_vec(),
        });
        StatementId(self.0.len() - 1)
    }

    /// # Errors
    ///
    /// Returns an execution error for an id this session never issued.
    pub fn get(&self, id: StatementId) -> Result<&PreparedStatement, DriverError> {
        self.0
            .get(id.0)
            .ok_or_else(|| DriverError::execution(format!("no statement prepared as #{}", id.0)))
    }

    #[must_use]
    pub fn sql(&self, id: StatementId) -> Option<&str> {
        self.0.get(id.0).map(|s| s.sql.as_str())
    }
}

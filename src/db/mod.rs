//! Database Gateway
//!
//! Thin wrapper over one MySQL connection exposing the nine object-table
//! reads and the three output writebacks. Each synchronization task owns its
//! own gateway; the connection is opened lazily, kept across healthy cycles
//! and dropped by the task at the end of a failing cycle so the next cycle
//! reconnects (spec'd connection state machine: Disconnected -> Connecting ->
//! Open -> Failing -> Disconnected).
//!
//! Statements run in autocommit mode, one statement per call.

use log::debug;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use thiserror::Error;

use crate::config::DbSettings;
use crate::object::BinaryPv;

pub mod rows;

use rows::*;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, DbError>;

/// Errors raised by the gateway
#[derive(Debug, Error)]
pub enum DbError {
    /// The server could not be reached or refused the connection
    #[error("database unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
    /// A query or update failed on an open connection
    #[error("database query failed: {0}")]
    Query(#[source] sqlx::Error),
}

const SELECT_ANALOG_INPUTS: &str = "SELECT id, object_identifier, object_name, present_value, \
     description, status_flags, event_state, out_of_service, units, cov_increment \
     FROM tbl_analog_input_objects";

const SELECT_ANALOG_OUTPUTS: &str = "SELECT id, object_identifier, object_name, present_value, \
     description, status_flags, event_state, out_of_service, units, relinquish_default, \
     current_command_priority, cov_increment \
     FROM tbl_analog_output_objects";

const SELECT_ANALOG_VALUES: &str = "SELECT id, object_identifier, object_name, present_value, \
     description, status_flags, event_state, out_of_service, units, cov_increment \
     FROM tbl_analog_value_objects";

const SELECT_BINARY_INPUTS: &str = "SELECT id, object_identifier, object_name, present_value, \
     description, status_flags, event_state, out_of_service, polarity \
     FROM tbl_binary_input_objects";

const SELECT_BINARY_OUTPUTS: &str = "SELECT id, object_identifier, object_name, present_value, \
     description, status_flags, event_state, out_of_service, polarity, relinquish_default, \
     current_command_priority \
     FROM tbl_binary_output_objects";

const SELECT_BINARY_VALUES: &str = "SELECT id, object_identifier, object_name, present_value, \
     description, status_flags, event_state, out_of_service \
     FROM tbl_binary_value_objects";

const SELECT_MULTI_STATE_INPUTS: &str = "SELECT id, object_identifier, object_name, present_value, \
     description, status_flags, event_state, out_of_service, number_of_states, state_text \
     FROM tbl_multi_state_input_objects";

const SELECT_MULTI_STATE_OUTPUTS: &str = "SELECT id, object_identifier, object_name, present_value, \
     description, status_flags, event_state, out_of_service, number_of_states, state_text, \
     relinquish_default, current_command_priority \
     FROM tbl_multi_state_output_objects";

const SELECT_MULTI_STATE_VALUES: &str = "SELECT id, object_identifier, object_name, present_value, \
     description, status_flags, event_state, out_of_service, number_of_states, state_text \
     FROM tbl_multi_state_value_objects";

pub(crate) const UPDATE_ANALOG_OUTPUT_PV: &str =
    "UPDATE tbl_analog_output_objects SET present_value = ? WHERE object_identifier = ?";

pub(crate) const UPDATE_BINARY_OUTPUT_PV: &str =
    "UPDATE tbl_binary_output_objects SET present_value = ? WHERE object_identifier = ?";

pub(crate) const UPDATE_MULTI_STATE_OUTPUT_PV: &str =
    "UPDATE tbl_multi_state_output_objects SET present_value = ? WHERE object_identifier = ?";

/// One task's database connection plus the nine reads and three writebacks
pub struct Gateway {
    options: MySqlConnectOptions,
    host: String,
    conn: Option<MySqlConnection>,
}

impl Gateway {
    /// Build a gateway from the connection settings; no I/O happens here
    pub fn new(settings: &DbSettings) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database);
        Self {
            options,
            host: settings.host.clone(),
            conn: None,
        }
    }

    /// Whether a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Open the connection if it is not already open
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if self.conn.is_none() {
            debug!("opening database connection to {}", self.host);
            let conn = MySqlConnection::connect_with(&self.options)
                .await
                .map_err(DbError::Unavailable)?;
            self.conn = Some(conn);
        }
        Ok(())
    }

    /// Close and drop the connection; the next cycle reconnects
    pub async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            // A failed close is moot, the connection is gone either way
            let _ = conn.close().await;
        }
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection> {
        self.conn.as_mut().ok_or_else(|| {
            DbError::Unavailable(sqlx::Error::Configuration("connection not open".into()))
        })
    }

    async fn fetch<R>(&mut self, query: &'static str) -> Result<Vec<R>>
    where
        R: for<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> + Send + Unpin + 'static,
    {
        let conn = self.conn()?;
        sqlx::query_as::<_, R>(query)
            .fetch_all(conn)
            .await
            .map_err(DbError::Query)
    }

    pub async fn fetch_analog_inputs(&mut self) -> Result<Vec<AnalogInputRow>> {
        self.fetch(SELECT_ANALOG_INPUTS).await
    }

    pub async fn fetch_analog_outputs(&mut self) -> Result<Vec<AnalogOutputRow>> {
        self.fetch(SELECT_ANALOG_OUTPUTS).await
    }

    pub async fn fetch_analog_values(&mut self) -> Result<Vec<AnalogValueRow>> {
        self.fetch(SELECT_ANALOG_VALUES).await
    }

    pub async fn fetch_binary_inputs(&mut self) -> Result<Vec<BinaryInputRow>> {
        self.fetch(SELECT_BINARY_INPUTS).await
    }

    pub async fn fetch_binary_outputs(&mut self) -> Result<Vec<BinaryOutputRow>> {
        self.fetch(SELECT_BINARY_OUTPUTS).await
    }

    pub async fn fetch_binary_values(&mut self) -> Result<Vec<BinaryValueRow>> {
        self.fetch(SELECT_BINARY_VALUES).await
    }

    pub async fn fetch_multi_state_inputs(&mut self) -> Result<Vec<MultiStateInputRow>> {
        self.fetch(SELECT_MULTI_STATE_INPUTS).await
    }

    pub async fn fetch_multi_state_outputs(&mut self) -> Result<Vec<MultiStateOutputRow>> {
        self.fetch(SELECT_MULTI_STATE_OUTPUTS).await
    }

    pub async fn fetch_multi_state_values(&mut self) -> Result<Vec<MultiStateValueRow>> {
        self.fetch(SELECT_MULTI_STATE_VALUES).await
    }

    /// Write back a commanded analog output present-value
    pub async fn update_analog_output_present_value(
        &mut self,
        instance: u32,
        value: f64,
    ) -> Result<()> {
        let conn = self.conn()?;
        sqlx::query(UPDATE_ANALOG_OUTPUT_PV)
            .bind(value)
            .bind(instance)
            .execute(conn)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }

    /// Write back a commanded binary output present-value
    pub async fn update_binary_output_present_value(
        &mut self,
        instance: u32,
        value: BinaryPv,
    ) -> Result<()> {
        let conn = self.conn()?;
        sqlx::query(UPDATE_BINARY_OUTPUT_PV)
            .bind(value.as_db_str())
            .bind(instance)
            .execute(conn)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }

    /// Write back a commanded multi-state output present-value
    pub async fn update_multi_state_output_present_value(
        &mut self,
        instance: u32,
        value: u32,
    ) -> Result<()> {
        let conn = self.conn()?;
        sqlx::query(UPDATE_MULTI_STATE_OUTPUT_PV)
            .bind(value)
            .bind(instance)
            .execute(conn)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced_parens(statement: &str) -> bool {
        let mut depth = 0i32;
        for c in statement.chars() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return false;
            }
        }
        depth == 0
    }

    // The upstream management layer shipped an update statement with an
    // unclosed parenthesis; these statements must stay syntactically valid.
    #[test]
    fn test_writeback_statements_are_balanced() {
        for statement in [
            UPDATE_ANALOG_OUTPUT_PV,
            UPDATE_BINARY_OUTPUT_PV,
            UPDATE_MULTI_STATE_OUTPUT_PV,
        ] {
            assert!(balanced_parens(statement), "unbalanced: {}", statement);
            assert_eq!(statement.matches('?').count(), 2);
            assert!(statement.contains("SET present_value = ?"));
            assert!(statement.contains("WHERE object_identifier = ?"));
        }
    }

    #[test]
    fn test_select_statements_name_their_tables() {
        let pairs = [
            (SELECT_ANALOG_INPUTS, "tbl_analog_input_objects"),
            (SELECT_ANALOG_OUTPUTS, "tbl_analog_output_objects"),
            (SELECT_ANALOG_VALUES, "tbl_analog_value_objects"),
            (SELECT_BINARY_INPUTS, "tbl_binary_input_objects"),
            (SELECT_BINARY_OUTPUTS, "tbl_binary_output_objects"),
            (SELECT_BINARY_VALUES, "tbl_binary_value_objects"),
            (SELECT_MULTI_STATE_INPUTS, "tbl_multi_state_input_objects"),
            (SELECT_MULTI_STATE_OUTPUTS, "tbl_multi_state_output_objects"),
            (SELECT_MULTI_STATE_VALUES, "tbl_multi_state_value_objects"),
        ];
        for (statement, table) in pairs {
            assert!(statement.contains(table));
            assert!(balanced_parens(statement));
        }
    }
}

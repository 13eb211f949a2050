/// Partial UPDATE statements that only touch the columns a caller provided
use crate::error::ApiResult;
use sqlx::{Encode, Executor, QueryBuilder, Sqlite, Type};

/// Builds `UPDATE <table> SET col = ?, ... WHERE id = ?` from optional values.
///
/// `None` values are skipped, so unspecified fields keep their stored value.
pub struct UpdateBuilder<'args> {
    builder: QueryBuilder<'args, Sqlite>,
    columns: Vec<&'static str>,
}

impl<'args> UpdateBuilder<'args> {
    pub fn new(table: &'static str) -> Self {
        let mut builder = QueryBuilder::new("UPDATE ");
        builder.push(table).push(" SET ");
        Self {
            builder,
            columns: Vec::new(),
        }
    }

    /// Set `column` when a value is provided
    pub fn set<T>(&mut self, column: &'static str, value: Option<T>) -> &mut Self
    where
        T: 'args + Encode<'args, Sqlite> + Type<Sqlite> + Send,
    {
        if let Some(value) = value {
            if !self.columns.is_empty() {
                self.builder.push(", ");
            }
            self.builder.push(column).push(" = ").push_bind(value);
            self.columns.push(column);
        }
        self
    }

    /// True when no column has been set
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Execute against the row with the given id, returning rows affected.
    ///
    /// An empty builder executes nothing and reports zero rows.
    pub async fn execute_for_id<'e, E>(self, id: i64, executor: E) -> ApiResult<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        self.execute_where("id", id, executor).await
    }

    /// Execute against the row whose `key` column equals `id`
    pub async fn execute_where<'e, E>(
        mut self,
        key: &'static str,
        id: i64,
        executor: E,
    ) -> ApiResult<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if self.columns.is_empty() {
            return Ok(0);
        }

        self.builder.push(" WHERE ").push(key).push(" = ").push_bind(id);
        let result = self.builder.build().execute(executor).await?;
        Ok(result.rows_affected())
    }
}

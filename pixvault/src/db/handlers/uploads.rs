use crate::db::{
    errors::Result,
    handlers::repository::Repository,
    models::uploads::{UploadCreateDBRequest, UploadDBResponse},
};
use crate::types::UploadId;
use sqlx::PgConnection;

/// Filter applied to catalog reads
#[derive(Debug, Clone, Default)]
pub struct UploadFilter {
    /// Case-insensitive substring of `name`; `None` or empty matches every row
    pub search_query: Option<String>,
}

impl UploadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_query(mut self, search_query: impl Into<String>) -> Self {
        self.search_query = Some(search_query.into());
        self
    }

    /// `ILIKE` pattern for the search query, or `None` when the filter is unrestricted.
    ///
    /// `%`, `_` and `\` in the query are escaped so they match literally.
    pub fn name_pattern(&self) -> Option<String> {
        let query = self.search_query.as_deref().filter(|q| !q.is_empty())?;
        let mut pattern = String::with_capacity(query.len() + 2);
        pattern.push('%');
        for c in query.chars() {
            if matches!(c, '\\' | '%' | '_') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        Some(pattern)
    }
}

pub struct Uploads<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Uploads<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Count rows matching the filter
    #[cfg(test)]
    pub async fn count(&mut self, filter: &UploadFilter) -> Result<i64> {
        let mut query = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM uploads");
        if let Some(pattern) = filter.name_pattern() {
            query.push(" WHERE name ILIKE ").push_bind(pattern);
        }

        let count = query.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?;
        Ok(count)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Uploads<'c> {
    type CreateRequest = UploadCreateDBRequest;
    type Response = UploadDBResponse;
    type Id = UploadId;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let upload = sqlx::query_as::<_, UploadDBResponse>(
            r#"
            INSERT INTO uploads (name, storage_key, remote_url)
            VALUES ($1, $2, $3)
            RETURNING id, name, storage_key, remote_url, created_at
            "#,
        )
        .bind(&request.name)
        .bind(&request.storage_key)
        .bind(&request.remote_url)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(upload)
    }

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let upload = sqlx::query_as::<_, UploadDBResponse>(
            "SELECT id, name, storage_key, remote_url, created_at FROM uploads WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(upload)
    }
}

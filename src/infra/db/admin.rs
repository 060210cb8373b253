use async_trait::async_trait;

use crate::application::repos::{DurableAdminRepo, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl DurableAdminRepo for PostgresRepositories {
    async fn truncate_all(&self) -> Result<(), RepoError> {
        sqlx::query("TRUNCATE TABLE comment_like, comments, users")
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

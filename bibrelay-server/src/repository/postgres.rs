use std::fmt;

use async_trait::async_trait;
use bibrelay_model::ParsedMessage;
use sqlx::PgPool;
use tracing::debug;

use super::{MessageRepository, RepositoryError};

const UNIQUE_VIOLATION: &str = "23505";

pub struct PostgresMessageRepository {
    pool: PgPool,
}

impl fmt::Debug for PostgresMessageRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresMessageRepository")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl PostgresMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
        }
        _ => false,
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn exists(&self, message_id: &str) -> Result<bool, RepositoryError> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM winlink_messages WHERE message_id = $1)",
        )
        .bind(message_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn insert(
        &self,
        message: &ParsedMessage,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO winlink_messages (
                message_id,
                message_timestamp,
                origin_host,
                file_created
            )
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&message.message_id)
        .bind(message.message_timestamp)
        .bind(&message.origin_host)
        .bind(message.file_created)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(RepositoryError::Conflict(
                    message.message_id.clone(),
                ));
            }
            Err(err) => return Err(err.into()),
        }

        for (position, record) in message.bib_records.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO bib_records (
                    message_id,
                    position,
                    bib_number,
                    action,
                    time_of_day,
                    day_of_month,
                    location,
                    data_warning
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(&message.message_id)
            .bind(position as i32)
            .bind(record.bib_number)
            .bind(record.action.as_str())
            .bind(record.time_of_day.as_deref())
            .bind(record.day_of_month)
            .bind(&record.location)
            .bind(record.data_warning)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            message_id = %message.message_id,
            records = message.bib_records.len(),
            "message committed"
        );
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM winlink_messages")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }
}

use crate::domain::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ChatTurn {
    pub id: i64,
    pub user_message: String,
    pub model_message: String,
    pub created_at: String,
}

/// Persisted assistant conversation, oldest turn first on read.
pub struct ChatHistoryStore {
    pool: SqlitePool,
}

impl ChatHistoryStore {
    pub async fn init(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_message TEXT NOT NULL,
                model_message TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create chat_history table: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn save(&self, user_message: &str, model_message: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO chat_history (user_message, model_message) VALUES (?, ?)")
            .bind(user_message)
            .bind(model_message)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to save chat turn: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    /// The latest `limit` turns in chronological order.
    pub async fn recent(&self, limit: u32) -> Result<Vec<ChatTurn>> {
        let mut turns = sqlx::query_as::<_, ChatTurn>(
            "SELECT id, user_message, model_message, CAST(created_at AS TEXT) AS created_at
             FROM chat_history ORDER BY id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to load chat history: {}", e)))?;

        turns.reverse();
        Ok(turns)
    }

    /// Delete every stored turn, returning how many were removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_history")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to clear chat history: {}", e)))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::connection::connect_pool;

    async fn store() -> ChatHistoryStore {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        ChatHistoryStore::init(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_recent_returns_latest_turns_oldest_first() {
        let store = store().await;
        for i in 1..=4 {
            store
                .save(&format!("question {}", i), &format!("answer {}", i))
                .await
                .unwrap();
        }

        let turns = store.recent(2).await.unwrap();
        let users: Vec<_> = turns.iter().map(|t| t.user_message.as_str()).collect();
        assert_eq!(users, vec!["question 3", "question 4"]);
        assert_eq!(turns[1].model_message, "answer 4");
    }

    #[tokio::test]
    async fn test_clear_empties_history() {
        let store = store().await;
        store.save("hi", "hello").await.unwrap();
        store.save("pension?", "Apply at the Panchayat.").await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.recent(10).await.unwrap().is_empty());
    }
}

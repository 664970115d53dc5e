//! Relational store: documents, the embedding mirror, conversations,
//! messages, and the chatbot configuration.
//!
//! SQLite via sqlx. The embeddings table mirrors the vector index for audit
//! and rebuild; the index itself is the component that answers similarity
//! queries. Document deletion cascades to its embedding rows.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::core::errors::ApiError;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";
const DEFAULT_MODEL: &str = "openai/gpt-5";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Upload,
    Crawl,
    CrawlExa,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Upload => "upload",
            SourceType::Crawl => "crawl",
            SourceType::CrawlExa => "crawl-exa",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "crawl" => SourceType::Crawl,
            "crawl-exa" => SourceType::CrawlExa,
            _ => SourceType::Upload,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub source_type: SourceType,
    pub source_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatbotConfig {
    pub id: String,
    pub name: String,
    pub llm_model: String,
    pub temperature: f64,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatbotUpdate {
    pub name: Option<String>,
    pub llm_model: Option<String>,
    pub temperature: Option<f64>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub session_id: String,
    pub visitor_ip: Option<String>,
    pub created_at: String,
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub citations: Option<Value>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub documents: i64,
    pub conversations: i64,
    pub messages: i64,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(db_path: &Path) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| ApiError::internal(format!("failed to open database: {}", e)))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                source_type TEXT NOT NULL DEFAULT 'upload',
                source_url TEXT,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS embeddings (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_text TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(document_id) REFERENCES documents(id) ON DELETE CASCADE
            )",
            "CREATE INDEX IF NOT EXISTS idx_embeddings_document ON embeddings(document_id)",
            "CREATE TABLE IF NOT EXISTS chatbots (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                llm_model TEXT NOT NULL,
                temperature REAL NOT NULL,
                system_prompt TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL UNIQUE,
                visitor_ip TEXT,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                citations JSON,
                created_at TEXT NOT NULL,
                FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            )",
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| ApiError::internal(format!("failed to init schema: {}", e)))?;
        }

        Ok(())
    }

    // Documents

    pub async fn create_document(
        &self,
        title: &str,
        content: &str,
        source_type: SourceType,
        source_url: Option<&str>,
    ) -> Result<Document, ApiError> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO documents (id, title, content, source_type, source_url, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(title)
        .bind(content)
        .bind(source_type.as_str())
        .bind(source_url)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(Document {
            id,
            title: title.to_string(),
            content: content.to_string(),
            source_type,
            source_url: source_url.map(str::to_string),
            created_at: now,
        })
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>, ApiError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.map(|row| row_to_document(&row)))
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>, ApiError> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    /// Delete a document; embedding mirror rows cascade. Returns false when
    /// the id does not exist.
    pub async fn delete_document(&self, id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    // Embedding mirror

    pub async fn create_embedding_record(
        &self,
        id: &str,
        document_id: &str,
        chunk_text: &str,
        chunk_index: usize,
    ) -> Result<(), ApiError> {
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO embeddings (id, document_id, chunk_text, chunk_index, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(document_id)
        .bind(chunk_text)
        .bind(chunk_index as i64)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    pub async fn count_embeddings(&self, document_id: &str) -> Result<i64, ApiError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) FROM embeddings WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await
            .map(|row| row.get(0))
            .map_err(ApiError::internal)?;
        Ok(count)
    }

    // Chatbot configuration

    /// The single chatbot row; created with defaults on first access, as a
    /// fresh deployment has no configuration yet.
    pub async fn get_chatbot(&self) -> Result<ChatbotConfig, ApiError> {
        let row = sqlx::query("SELECT * FROM chatbots LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        if let Some(row) = row {
            return Ok(row_to_chatbot(&row));
        }

        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO chatbots (id, name, llm_model, temperature, system_prompt, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind("AI Assistant")
        .bind(DEFAULT_MODEL)
        .bind(0.7_f64)
        .bind(DEFAULT_SYSTEM_PROMPT)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(ChatbotConfig {
            id,
            name: "AI Assistant".to_string(),
            llm_model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }

    pub async fn update_chatbot(&self, update: ChatbotUpdate) -> Result<ChatbotConfig, ApiError> {
        let current = self.get_chatbot().await?;

        let name = update.name.unwrap_or(current.name);
        let llm_model = update.llm_model.unwrap_or(current.llm_model);
        let temperature = update.temperature.unwrap_or(current.temperature);
        let system_prompt = update.system_prompt.unwrap_or(current.system_prompt);

        if !(0.0..=2.0).contains(&temperature) {
            return Err(ApiError::BadRequest(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        sqlx::query(
            "UPDATE chatbots SET name = ?, llm_model = ?, temperature = ?, system_prompt = ?
             WHERE id = ?",
        )
        .bind(&name)
        .bind(&llm_model)
        .bind(temperature)
        .bind(&system_prompt)
        .bind(&current.id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(ChatbotConfig {
            id: current.id,
            name,
            llm_model,
            temperature,
            system_prompt,
        })
    }

    // Conversations and messages

    pub async fn get_conversation_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Conversation>, ApiError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.map(|row| row_to_conversation(&row, 0)))
    }

    /// Find or create the conversation for a session. The insert is a no-op
    /// when the session already exists, so two concurrent first messages for
    /// the same session both land in one conversation instead of one of them
    /// failing on the unique constraint.
    pub async fn get_or_create_conversation(
        &self,
        session_id: &str,
        visitor_ip: Option<&str>,
    ) -> Result<Conversation, ApiError> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO conversations (id, session_id, visitor_ip, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(session_id) DO NOTHING",
        )
        .bind(&id)
        .bind(session_id)
        .bind(visitor_ip)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        self.get_conversation_by_session(session_id)
            .await?
            .ok_or_else(|| {
                ApiError::internal(format!("conversation missing for session {}", session_id))
            })
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let rows = sqlx::query(
            "SELECT c.id, c.session_id, c.visitor_ip, c.created_at,
                    COUNT(m.id) AS message_count
             FROM conversations c
             LEFT JOIN messages m ON c.id = m.conversation_id
             GROUP BY c.id
             ORDER BY c.created_at DESC
             LIMIT 100",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| {
                let count: i64 = row.try_get("message_count").unwrap_or(0);
                row_to_conversation(row, count)
            })
            .collect())
    }

    pub async fn add_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        citations: Option<&Value>,
    ) -> Result<i64, ApiError> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, citations, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(citations.map(Value::to_string))
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE conversation_id = ? ORDER BY id ASC")
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| StoredMessage {
                id: row.try_get("id").unwrap_or_default(),
                conversation_id: row.try_get("conversation_id").unwrap_or_default(),
                role: row.try_get("role").unwrap_or_default(),
                content: row.try_get("content").unwrap_or_default(),
                citations: row
                    .try_get::<Option<String>, _>("citations")
                    .ok()
                    .flatten()
                    .and_then(|raw| serde_json::from_str(&raw).ok()),
                created_at: row.try_get("created_at").unwrap_or_default(),
            })
            .collect())
    }

    pub async fn stats(&self) -> Result<Stats, ApiError> {
        let documents = self.count_table("documents").await?;
        let conversations = self.count_table("conversations").await?;
        let messages = self.count_table("messages").await?;

        Ok(Stats {
            documents,
            conversations,
            messages,
        })
    }

    async fn count_table(&self, table: &str) -> Result<i64, ApiError> {
        // Table names come from the fixed set above, never from input.
        let query = format!("SELECT COUNT(*) FROM {}", table);
        sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .map(|row| row.get(0))
            .map_err(ApiError::internal)
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    let source_type: String = row.try_get("source_type").unwrap_or_default();
    Document {
        id: row.try_get("id").unwrap_or_default(),
        title: row.try_get("title").unwrap_or_default(),
        content: row.try_get("content").unwrap_or_default(),
        source_type: SourceType::parse(&source_type),
        source_url: row.try_get("source_url").unwrap_or(None),
        created_at: row.try_get("created_at").unwrap_or_default(),
    }
}

fn row_to_chatbot(row: &sqlx::sqlite::SqliteRow) -> ChatbotConfig {
    ChatbotConfig {
        id: row.try_get("id").unwrap_or_default(),
        name: row.try_get("name").unwrap_or_default(),
        llm_model: row.try_get("llm_model").unwrap_or_default(),
        temperature: row.try_get("temperature").unwrap_or(0.7),
        system_prompt: row
            .try_get("system_prompt")
            .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow, message_count: i64) -> Conversation {
    Conversation {
        id: row.try_get("id").unwrap_or_default(),
        session_id: row.try_get("session_id").unwrap_or_default(),
        visitor_ip: row.try_get("visitor_ip").unwrap_or(None),
        created_at: row.try_get("created_at").unwrap_or_default(),
        message_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn storage_in(dir: &tempfile::TempDir) -> Storage {
        Storage::new(&dir.path().join("test.db"))
            .await
            .expect("storage should open")
    }

    #[tokio::test]
    async fn document_round_trip() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir).await;

        let doc = storage
            .create_document("Policy", "Refunds within 30 days.", SourceType::Upload, None)
            .await
            .unwrap();

        let fetched = storage.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Policy");
        assert_eq!(fetched.source_type, SourceType::Upload);
        assert!(fetched.source_url.is_none());

        assert_eq!(storage.list_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_a_document_cascades_to_its_embeddings() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir).await;

        let doc = storage
            .create_document("Doc", "text", SourceType::Upload, None)
            .await
            .unwrap();
        storage
            .create_embedding_record("e1", &doc.id, "text", 0)
            .await
            .unwrap();
        storage
            .create_embedding_record("e2", &doc.id, "more", 1)
            .await
            .unwrap();
        assert_eq!(storage.count_embeddings(&doc.id).await.unwrap(), 2);

        assert!(storage.delete_document(&doc.id).await.unwrap());
        assert_eq!(storage.count_embeddings(&doc.id).await.unwrap(), 0);
        assert!(!storage.delete_document(&doc.id).await.unwrap());
    }

    #[tokio::test]
    async fn chatbot_defaults_are_created_once() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir).await;

        let first = storage.get_chatbot().await.unwrap();
        assert_eq!(first.system_prompt, DEFAULT_SYSTEM_PROMPT);

        let second = storage.get_chatbot().await.unwrap();
        assert_eq!(first.id, second.id);

        let updated = storage
            .update_chatbot(ChatbotUpdate {
                name: None,
                llm_model: Some("openai/gpt-5-mini".to_string()),
                temperature: Some(0.2),
                system_prompt: None,
            })
            .await
            .unwrap();
        assert_eq!(updated.llm_model, "openai/gpt-5-mini");
        assert_eq!(updated.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn rejects_out_of_range_temperature() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir).await;

        let err = storage
            .update_chatbot(ChatbotUpdate {
                name: None,
                llm_model: None,
                temperature: Some(3.5),
                system_prompt: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn conversation_is_created_lazily_and_reused() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir).await;

        assert!(storage
            .get_conversation_by_session("sess-1")
            .await
            .unwrap()
            .is_none());

        let created = storage
            .get_or_create_conversation("sess-1", Some("203.0.113.9"))
            .await
            .unwrap();
        let reused = storage
            .get_or_create_conversation("sess-1", None)
            .await
            .unwrap();
        assert_eq!(created.id, reused.id);
        assert_eq!(reused.visitor_ip.as_deref(), Some("203.0.113.9"));
    }

    #[tokio::test]
    async fn concurrent_first_messages_share_one_conversation() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage
                    .get_or_create_conversation("sess-1", None)
                    .await
                    .expect("get or create")
                    .id
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(storage.list_conversations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn messages_are_ordered_and_citations_survive() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir).await;

        let conversation = storage
            .get_or_create_conversation("sess-1", None)
            .await
            .unwrap();

        storage
            .add_message(&conversation.id, "user", "What is the refund window?", None)
            .await
            .unwrap();
        let citations = json!([{"title": "Policy", "url": null}]);
        storage
            .add_message(
                &conversation.id,
                "assistant",
                "30 days.",
                Some(&citations),
            )
            .await
            .unwrap();

        let messages = storage.get_messages(&conversation.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].citations, Some(citations));

        let listed = storage.list_conversations().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message_count, 2);

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.messages, 2);
    }
}

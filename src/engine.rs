//! Query generation engine.
//!
//! Facade tying the pieces together: shortlist suggestion, prompt
//! compilation, session management, reply parsing and result finalization.
//! One engine instance serves one conversation; turns are serialized by the
//! caller, so there is never more than one outstanding request per session.

use crate::error::{QueryGptError, Result};
use crate::formatter::{format_or_fallback, BasicFormatter, SqlFormatter};
use crate::jira::TicketContext;
use crate::llm::ChatTransport;
use crate::parser::{parse_reply, GeneratedQuery};
use crate::prompt;
use crate::schema::SchemaStore;
use crate::selector;
use crate::session::SessionManager;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct QueryEngine {
    store: SchemaStore,
    sessions: SessionManager,
    transport: Arc<dyn ChatTransport>,
    formatter: Box<dyn SqlFormatter>,
    tenant: String,
}

impl QueryEngine {
    pub fn new(transport: Arc<dyn ChatTransport>, tenant: impl Into<String>) -> Self {
        Self {
            store: SchemaStore::new(),
            sessions: SessionManager::new(transport.clone()),
            transport,
            formatter: Box::new(BasicFormatter),
            tenant: tenant.into(),
        }
    }

    /// Swap in the external SQL pretty-printer.
    pub fn with_formatter(mut self, formatter: Box<dyn SqlFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn schema(&self) -> &SchemaStore {
        &self.store
    }

    pub fn schema_mut(&mut self) -> &mut SchemaStore {
        &mut self.store
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn has_session(&self) -> bool {
        self.sessions.has_session()
    }

    /// Switching tenants is a context-changing event: the open session ends.
    pub async fn set_tenant(&mut self, tenant: impl Into<String>) {
        let tenant = tenant.into();
        if tenant != self.tenant {
            self.sessions.reset().await;
            self.tenant = tenant;
        }
    }

    /// Propose a table shortlist for a question. Never fails hard: remote
    /// problems degrade to the local keyword heuristic.
    pub async fn suggest(
        &self,
        question: &str,
        ticket: Option<&TicketContext>,
    ) -> Result<Vec<String>> {
        let ctx = self.store.context()?;
        Ok(selector::suggest_tables(
            self.transport.as_ref(),
            question,
            &self.tenant,
            &ctx.table_descriptions,
            ticket,
        )
        .await)
    }

    /// Generate a query. A non-empty table selection with a loaded schema
    /// forces a cold turn (terminating any open session); otherwise an open
    /// session continues as a follow-up carrying only the question.
    pub async fn generate(
        &mut self,
        question: &str,
        selected_tables: Option<&[String]>,
        ticket: Option<&TicketContext>,
    ) -> Result<GeneratedQuery> {
        let turn_id = Uuid::new_v4();
        let message = prompt::build_turn_message(question, &self.tenant);

        let has_selection = selected_tables.map_or(false, |t| !t.is_empty());
        let raw = if has_selection && self.store.is_loaded() {
            let ctx = self.store.context()?;
            let tables = selected_tables.unwrap_or_default();
            let instruction = prompt::build_instruction(tables, ctx, ticket);
            debug!(%turn_id, instruction_chars = instruction.len(), "compiled instruction");
            info!(%turn_id, tables = tables.len(), "cold turn, opening session");
            self.sessions.send_cold(&message, &instruction).await?
        } else if self.sessions.has_session() {
            info!(%turn_id, "follow-up turn");
            self.sessions.send_follow_up(&message).await?
        } else if has_selection {
            return Err(QueryGptError::SchemaNotLoaded);
        } else {
            return Err(QueryGptError::NoSelection);
        };

        Ok(self.finalize(&raw))
    }

    /// End-of-conversation signal: best-effort remote termination, local
    /// state cleared regardless.
    pub async fn reset(&mut self) {
        self.sessions.reset().await;
    }

    fn finalize(&self, raw: &str) -> GeneratedQuery {
        let mut parsed = parse_reply(raw);
        if parsed.is_error() {
            return parsed;
        }
        parsed.query = format_or_fallback(self.formatter.as_ref(), &parsed.query);
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{TurnReply, TurnRequest};
    use crate::schema::SchemaMetadata;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<VecDeque<TurnReply>>,
        seen: Mutex<Vec<TurnRequest>>,
        ended: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<TurnReply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().collect()),
                seen: Mutex::new(Vec::new()),
                ended: Mutex::new(Vec::new()),
            })
        }

        fn reply(text: &str, session_id: Option<&str>) -> TurnReply {
            TurnReply {
                reply: text.to_string(),
                session_id: session_id.map(String::from),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for Scripted {
        async fn send(&self, request: &TurnRequest) -> crate::error::Result<TurnReply> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted turn"))
        }

        async fn end(&self, session_id: &str) -> crate::error::Result<()> {
            self.ended.lock().unwrap().push(session_id.to_string());
            Ok(())
        }
    }

    const CSV: &str = "\
TABLE_NAME,COLUMN_NAME,DATA_TYPE,IS_NULLABLE,COLUMN_KEY,COLUMN_DEFAULT
ck_user,id,bigint,NO,PRI,
ck_user,role,varchar,YES,,
ck_user,last_login,datetime,YES,,
ck_user,status,varchar,YES,,
";

    fn metadata() -> SchemaMetadata {
        let mut table_descriptions = BTreeMap::new();
        table_descriptions.insert("ck_user".to_string(), "application users".to_string());
        SchemaMetadata {
            table_descriptions,
            ..SchemaMetadata::default()
        }
    }

    fn engine(transport: Arc<Scripted>) -> QueryEngine {
        let mut engine = QueryEngine::new(transport, "default");
        engine.schema_mut().load(CSV, metadata()).unwrap();
        engine
    }

    #[tokio::test]
    async fn test_cold_then_follow_up() {
        let transport = Scripted::new(vec![
            Scripted::reply(
                "sql query: SELECT id FROM ck_user\nexplanation: ids",
                Some("sess-1"),
            ),
            Scripted::reply(
                "sql query: SELECT role FROM ck_user\nexplanation: roles",
                None,
            ),
        ]);
        let mut engine = engine(transport.clone());

        let selection = vec!["ck_user".to_string()];
        let first = engine
            .generate("show user ids", Some(&selection), None)
            .await
            .unwrap();
        assert_eq!(first.query, "SELECT id FROM ck_user");
        assert!(engine.has_session());

        let second = engine.generate("now their roles", None, None).await.unwrap();
        assert_eq!(second.query, "SELECT role FROM ck_user");

        let seen = transport.seen.lock().unwrap();
        assert!(seen[0].system_instruction.is_some());
        assert!(seen[0].session_id.is_none());
        assert!(seen[1].system_instruction.is_none());
        assert_eq!(seen[1].session_id.as_deref(), Some("sess-1"));
        assert_eq!(seen[1].message, "User (tenant: default): now their roles");
    }

    #[tokio::test]
    async fn test_out_of_scope_reply_becomes_error_payload() {
        let transport = Scripted::new(vec![Scripted::reply(
            "QueryGPT only supports SQL query generation and optimization.",
            Some("sess-1"),
        )]);
        let mut engine = engine(transport);

        let selection = vec!["ck_user".to_string()];
        let result = engine
            .generate("what is the capital of France", Some(&selection), None)
            .await
            .unwrap();
        assert!(result.is_error());
        assert_eq!(result.query, "");
    }

    #[tokio::test]
    async fn test_no_selection_and_no_session_is_error() {
        let transport = Scripted::new(vec![]);
        let mut engine = engine(transport);
        assert!(matches!(
            engine.generate("anything", None, None).await,
            Err(QueryGptError::NoSelection)
        ));
    }

    #[tokio::test]
    async fn test_selection_without_schema_is_error() {
        let transport = Scripted::new(vec![]);
        let mut engine = QueryEngine::new(transport, "default");
        let selection = vec!["ck_user".to_string()];
        assert!(matches!(
            engine.generate("anything", Some(&selection), None).await,
            Err(QueryGptError::SchemaNotLoaded)
        ));
    }

    #[tokio::test]
    async fn test_tenant_switch_resets_session() {
        let transport = Scripted::new(vec![Scripted::reply(
            "sql query: SELECT 1\nexplanation: one",
            Some("sess-1"),
        )]);
        let mut engine = engine(transport.clone());

        let selection = vec!["ck_user".to_string()];
        engine
            .generate("q", Some(&selection), None)
            .await
            .unwrap();
        assert!(engine.has_session());

        engine.set_tenant("lbpl").await;
        assert!(!engine.has_session());
        assert_eq!(*transport.ended.lock().unwrap(), vec!["sess-1"]);

        // Same tenant again is a no-op
        engine.set_tenant("lbpl").await;
        assert_eq!(transport.ended.lock().unwrap().len(), 1);
    }
}

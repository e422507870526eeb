//! SQL generator and single-shot repair.

use crate::agent::{allowed_objects_text, GeneratedQuery};
use crate::catalog::SchemaCatalog;
use crate::error::{NlSqlError, Result};
use crate::llm::{strip_code_fences, CompletionRequest, LanguageModelGateway};
use crate::schema_rag::SchemaRetriever;
use std::sync::Arc;
use tracing::info;

pub struct SqlGenerator {
    gateway: Arc<dyn LanguageModelGateway>,
    catalog: Arc<SchemaCatalog>,
    retriever: Option<Arc<SchemaRetriever>>,
    default_limit: usize,
}

impl SqlGenerator {
    pub fn new(
        gateway: Arc<dyn LanguageModelGateway>,
        catalog: Arc<SchemaCatalog>,
        retriever: Option<Arc<SchemaRetriever>>,
        default_limit: usize,
    ) -> Self {
        Self {
            gateway,
            catalog,
            retriever,
            default_limit,
        }
    }

    fn system_prompt(&self, relevant_schema: &str) -> String {
        let snapshot = self.catalog.snapshot();
        let dialect = snapshot.dialect();
        let allowed = allowed_objects_text(&snapshot.allowed_object_list());
        let context = if relevant_schema.is_empty() {
            "None retrieved; use best judgment with allowed objects only."
        } else {
            relevant_schema
        };

        format!(
            "You are an expert {dialect} SQL query generator.\n\n\
             You MUST follow these rules:\n\n\
             1. Only query from the allowed tables/views: {allowed}\n\
             2. Only generate read-only SELECT queries.\n\
             3. Use {dialect} syntax.\n\
             4. Use explicit WHERE, GROUP BY, ORDER BY, LIMIT clauses as needed.\n\
             5. Do NOT modify data (no INSERT, UPDATE, DELETE, CREATE, DROP, etc.).\n\
             6. Respond with ONLY the SQL query. No explanations, comments, or markdown.\n\
             7. Use clear, aliased column names in SELECT when aggregating.\n\n\
             Schema context:\n{context}"
        )
    }

    fn repair_prompt(&self) -> String {
        let snapshot = self.catalog.snapshot();
        let dialect = snapshot.dialect();
        let allowed = allowed_objects_text(&snapshot.allowed_object_list());
        let limit = self.default_limit;

        format!(
            "You are an expert {dialect} SQL fixer. Given a user question, a faulty SQL, and the \
             database error, return a corrected SELECT query.\n\
             Rules:\n\
             - Only query from the allowed tables/views: {allowed}\n\
             - Only generate read-only SELECT queries.\n\
             - Use {dialect} syntax.\n\
             - Add a LIMIT if missing to keep results small (<= {limit}).\n\
             - Respond with ONLY the SQL query. No explanations, comments, or markdown.\n\n\
             Schema:\n{}",
            snapshot.schema_text()
        )
    }

    pub async fn generate(&self, question: &str) -> Result<GeneratedQuery> {
        let relevant = match &self.retriever {
            Some(retriever) => retriever.relevant_schema(question).await,
            None => String::new(),
        };
        let system_prompt = self.system_prompt(&relevant);

        info!("Generating SQL for question: {}", question);
        let completion = self
            .gateway
            .complete(CompletionRequest::new(system_prompt.clone(), question))
            .await?;

        let sql = sanitize_sql(&completion.text)?;
        info!("Generated SQL: {}", sql);
        Ok(GeneratedQuery {
            sql,
            debug_prompt: Some(system_prompt),
            usage: completion.usage,
        })
    }

    pub async fn repair(&self, question: &str, bad_sql: &str, error: &str) -> Result<GeneratedQuery> {
        let system_prompt = self.repair_prompt();
        let user_message = format!("Question: {}\nBad SQL: {}\nError: {}", question, bad_sql, error);

        info!("Repairing SQL after error: {}", error);
        let completion = self
            .gateway
            .complete(CompletionRequest::new(system_prompt.clone(), user_message))
            .await?;

        let sql = sanitize_sql(&completion.text)?;
        info!("Repaired SQL: {}", sql);
        Ok(GeneratedQuery {
            sql,
            debug_prompt: Some(system_prompt),
            usage: completion.usage,
        })
    }
}

fn sanitize_sql(raw: &str) -> Result<String> {
    let sql = strip_code_fences(raw);
    if sql.is_empty() {
        return Err(NlSqlError::GenerationFailure(
            "Model returned an empty SQL statement".to_string(),
        ));
    }
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogSnapshot;
    use crate::llm::Completion;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EchoGateway {
        reply: String,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LanguageModelGateway for EchoGateway {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
            self.requests.lock().unwrap().push(request);
            Ok(Completion {
                text: self.reply.clone(),
                usage: None,
            })
        }
    }

    fn generator(reply: &str) -> (SqlGenerator, Arc<EchoGateway>) {
        let gateway = Arc::new(EchoGateway {
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
        });
        let snapshot = CatalogSnapshot::from_json(
            r#"{"dialect": "sqlite", "views": [{"schema": "private", "name": "movielens_view",
                "columns": [{"name": "title", "type": "text", "description": "Movie title"}]}]}"#,
        )
        .unwrap();
        let catalog = Arc::new(SchemaCatalog::from_snapshot(snapshot));
        (SqlGenerator::new(gateway.clone(), catalog, None, 200), gateway)
    }

    #[tokio::test]
    async fn test_generate_strips_fences_and_names_dialect() {
        let (generator, gateway) = generator("```sql\nSELECT title FROM private.movielens_view\n```");
        let generated = generator.generate("list movies").await.unwrap();
        assert_eq!(generated.sql, "SELECT title FROM private.movielens_view");

        let requests = gateway.requests.lock().unwrap();
        assert!(requests[0].system_prompt.contains("expert sqlite SQL"));
        assert!(requests[0].system_prompt.contains("private.movielens_view"));
        assert!(requests[0].system_prompt.contains("None retrieved"));
        assert_eq!(requests[0].user_message, "list movies");
    }

    #[tokio::test]
    async fn test_repair_prompt_carries_error_and_schema() {
        let (generator, gateway) = generator("SELECT title FROM private.movielens_view LIMIT 10");
        generator
            .repair("list movies", "SELECT titel FROM x", "no such column: titel")
            .await
            .unwrap();

        let requests = gateway.requests.lock().unwrap();
        assert!(requests[0].system_prompt.contains("(<= 200)"));
        assert!(requests[0].system_prompt.contains("- title (text) - Movie title"));
        assert_eq!(
            requests[0].user_message,
            "Question: list movies\nBad SQL: SELECT titel FROM x\nError: no such column: titel"
        );
    }

    #[tokio::test]
    async fn test_empty_reply_is_generation_failure() {
        let (generator, _) = generator("```\n```");
        assert!(matches!(
            generator.generate("anything").await,
            Err(NlSqlError::GenerationFailure(_))
        ));
    }
}

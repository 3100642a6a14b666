//! Conversational retrieval over an indexed document set.
//!
//! Each [`Conversation::ask`] runs three steps:
//!
//! 1. **Condense**: when there is prior history, the chat model rewrites the
//!    follow-up question into a standalone question.
//! 2. **Retrieve**: the standalone question is used to fetch the `top_k`
//!    most similar chunks from the index.
//! 3. **Answer**: the chunks are stuffed into a system prompt, followed by
//!    the prior turns and the new question.
//!
//! The reply is computed before the history is touched, so a failed call
//! leaves the history exactly as it was. A successful call appends exactly
//! two turns: the user question, then the assistant reply.

use std::sync::Arc;

use tracing::{debug, info_span, Instrument};

use crate::error::Result;
use crate::index::Retriever;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::{Role, Turn};

const CONDENSE_PROMPT: &str = "Given the conversation below and a follow-up question, \
rewrite the follow-up question as a standalone question that can be understood without \
the conversation. Keep the original language of the question. Reply with the question only.";

const ANSWER_PROMPT: &str = "Use the following pieces of context to answer the user's \
question. If you don't know the answer, just say that you don't know; don't try to make \
up an answer.";

/// Result of one successful question.
#[derive(Debug, Clone)]
pub struct Answer {
    pub reply: String,
    /// Question actually used for retrieval.
    pub standalone_question: String,
    /// Retrieved chunk texts, most relevant first.
    pub sources: Vec<String>,
}

/// A chat bound to one retrieval source with a growing turn history.
pub struct Conversation {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn ChatModel>,
    top_k: usize,
    history: Vec<Turn>,
}

impl Conversation {
    /// Starts a conversation with an empty history.
    pub fn new(retriever: Arc<dyn Retriever>, llm: Arc<dyn ChatModel>, top_k: usize) -> Self {
        Self {
            retriever,
            llm,
            top_k: top_k.max(1),
            history: Vec::new(),
        }
    }

    /// Turns so far, alternating user and assistant, starting with user.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Answers `question` using retrieved context and the prior turns.
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        let span = info_span!("ask", turns = self.history.len(), model = self.llm.model_name());
        let answer = self.answer(question).instrument(span).await?;

        self.history.push(Turn::user(question));
        self.history.push(Turn::assistant(answer.reply.clone()));
        Ok(answer)
    }

    async fn answer(&self, question: &str) -> Result<Answer> {
        let standalone_question = if self.history.is_empty() {
            question.to_string()
        } else {
            self.condense(question).await?
        };
        debug!(standalone = %standalone_question, "retrieval question");

        let sources = self
            .retriever
            .retrieve(&standalone_question, self.top_k)
            .await?;
        debug!(hits = sources.len(), "retrieved context");

        let system = format!("{}\n----------------\n{}", ANSWER_PROMPT, sources.join("\n\n"));
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(self.history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(question));
        let reply = self.llm.complete(&messages).await?;

        Ok(Answer {
            reply: reply.trim().to_string(),
            standalone_question,
            sources,
        })
    }

    async fn condense(&self, question: &str) -> Result<String> {
        let prompt = format!(
            "Chat History:\n{}\nFollow Up Input: {}\nStandalone question:",
            format_history(&self.history),
            question
        );
        let rewritten = self
            .llm
            .complete(&[
                ChatMessage::system(CONDENSE_PROMPT),
                ChatMessage::user(prompt),
            ])
            .await?;

        let rewritten = rewritten.trim();
        Ok(if rewritten.is_empty() {
            question.to_string()
        } else {
            rewritten.to_string()
        })
    }
}

fn format_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| match t.role {
            Role::User => format!("Human: {}", t.content),
            Role::Assistant => format!("Assistant: {}", t.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

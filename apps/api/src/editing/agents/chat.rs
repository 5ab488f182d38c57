//! Chat agent: conversational replies that leave the résumé untouched.

use std::sync::Arc;

use async_trait::async_trait;

use crate::editing::agents::{
    request_structured, AgentContext, AgentReply, CallOutcome, Handler, HandlerOutput, TurnIo,
};
use crate::editing::prompts::{fill, CHAT_SCHEMA, CHAT_SYSTEM};
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::{ResponseFormat, TextGenerator};

const DEGRADED_MESSAGE: &str = "Sorry, I couldn't put together a reply just now. Please try again.";

pub struct ChatAgent {
    llm: Arc<dyn TextGenerator>,
    max_attempts: u32,
}

impl ChatAgent {
    pub fn new(llm: Arc<dyn TextGenerator>, max_attempts: u32) -> Self {
        Self { llm, max_attempts }
    }
}

fn check_reply(reply: &AgentReply) -> Result<(), String> {
    match reply {
        AgentReply::Chat {
            assistant_message, ..
        } if assistant_message.trim().is_empty() => Err("chat reply is empty".to_string()),
        AgentReply::Chat { .. } => Ok(()),
        other => Err(format!("expected chat, got {}", other.action())),
    }
}

#[async_trait]
impl Handler for ChatAgent {
    fn name(&self) -> &'static str {
        "chat_agent"
    }

    async fn handle(&self, ctx: &AgentContext<'_>, io: &mut TurnIo<'_>) -> HandlerOutput {
        let system = fill(
            CHAT_SYSTEM,
            &[
                ("grounding_instruction", GROUNDING_INSTRUCTION),
                ("context", ctx.context_block().as_str()),
            ],
        );

        let outcome = request_structured(
            self.name(),
            self.llm.as_ref(),
            &system,
            ctx.user_message,
            ResponseFormat::Json {
                schema: CHAT_SCHEMA,
            },
            self.max_attempts,
            io,
            true,
            check_reply,
        )
        .await;

        match outcome {
            CallOutcome::Done(AgentReply::Chat {
                assistant_message,
                warnings,
            }) => HandlerOutput {
                assistant_message,
                warnings,
                ..HandlerOutput::default()
            },
            CallOutcome::Done(other) => HandlerOutput::degraded(
                DEGRADED_MESSAGE,
                format!("chat agent returned {}", other.action()),
            ),
            CallOutcome::Cancelled => HandlerOutput::cancelled(io.visible_text()),
            CallOutcome::Failed(reason) => HandlerOutput::degraded(DEGRADED_MESSAGE, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::editing::models::{ResumeText, Task};
    use crate::editing::streaming::StreamingSink;
    use crate::llm_client::scripted::ScriptedGenerator;

    #[derive(Default)]
    struct Recorder {
        chunks: Mutex<Vec<String>>,
    }

    impl StreamingSink for Recorder {
        fn on_chunk(&self, delta: &str) -> anyhow::Result<()> {
            self.chunks.lock().unwrap().push(delta.to_string());
            Ok(())
        }

        fn on_plan_update(&self, _plan: &[Task]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    async fn run(llm: Arc<ScriptedGenerator>, sink: Option<&dyn StreamingSink>) -> HandlerOutput {
        let resume = ResumeText::new("Summary\nRust engineer");
        let sections = BTreeMap::new();
        let ctx = AgentContext {
            resume: &resume,
            sections: &sections,
            rule_issues: &[],
            current_task: None,
            history: &[],
            user_message: "is my summary too short?",
            decision: None,
        };
        let cancel = CancellationToken::new();
        let mut io = TurnIo::new(sink, &cancel);
        ChatAgent::new(llm, 3).handle(&ctx, &mut io).await
    }

    #[tokio::test]
    async fn test_reply_is_passed_through() {
        let llm = Arc::new(ScriptedGenerator::new([
            r#"{"action":"chat","assistant_message":"It is brief but clear."}"#,
        ]));
        let out = run(llm, None).await;
        assert_eq!(out.assistant_message, "It is brief but clear.");
        assert!(out.patches.is_empty());
        assert!(out.questions.is_empty());
    }

    #[tokio::test]
    async fn test_streamed_chunks_concatenate_to_message() {
        let llm = Arc::new(
            ScriptedGenerator::new([r#"{"action":"chat","assistant_message":"It is brief but clear."}"#])
                .streaming(7),
        );
        let recorder = Recorder::default();
        let out = run(llm, Some(&recorder)).await;
        let streamed: String = recorder.chunks.lock().unwrap().concat();
        assert_eq!(streamed, out.assistant_message);
        assert!(recorder.chunks.lock().unwrap().len() > 1);
    }

    #[tokio::test]
    async fn test_blank_reply_degrades_after_retries() {
        let blank = r#"{"action":"chat","assistant_message":"  "}"#;
        let llm = Arc::new(ScriptedGenerator::new([blank, blank, blank]));
        let out = run(llm, None).await;
        assert_eq!(out.assistant_message, DEGRADED_MESSAGE);
        assert!(out.warnings[0].contains("chat reply is empty"));
    }
}

//! Integration tests for the interactive menu loop, driven through a
//! `ScriptedConsole` and an in-process model provider.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use interp_helper::agent::{Agent, ChatAgent};
use interp_helper::console::{ScriptedConsole, WhenExhausted};
use interp_helper::models::{ChatMessage, ModelProvider};
use interp_helper::repl::{Outcome, Session};
use interp_helper::session::{TranscriptStore, Turn};
use interp_helper::system_message::SystemMessageStore;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Echoes the last user message and remembers every request.
#[derive(Clone, Default)]
struct EchoProvider {
    requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl EchoProvider {
    /// User inputs that actually reached the provider.
    fn forwarded(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|req| req.last().map(|m| m.content.clone()))
            .collect()
    }
}

#[async_trait]
impl ModelProvider for EchoProvider {
    async fn send_chat(&self, messages: &[ChatMessage]) -> Result<String, anyhow::Error> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        Ok(format!("echo: {last}"))
    }
}

struct Fixture {
    dir: TempDir,
    provider: EchoProvider,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            provider: EchoProvider::default(),
        }
    }

    fn transcripts(&self) -> TranscriptStore {
        TranscriptStore::new(self.dir.path().join("chatlog.json"))
    }

    fn system_messages(&self) -> SystemMessageStore {
        SystemMessageStore::new(self.dir.path().join(".env"))
    }

    fn session(&self) -> Session<ChatAgent<EchoProvider>> {
        let system = self.system_messages().load().unwrap();
        Session::new(
            ChatAgent::new(self.provider.clone(), system),
            self.transcripts(),
            self.system_messages(),
        )
    }
}

fn never() -> std::future::Pending<()> {
    std::future::pending()
}

// ---------------------------------------------------------------------------
// Chat sub-loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn quit_token_returns_to_menu_without_forwarding() {
    let fx = Fixture::new();
    let mut session = fx.session();
    let mut console = ScriptedConsole::new(["1", "hello", "exit", "4"], WhenExhausted::Eof);
    let out = console.transcript();

    let outcome = session.run_until(&mut console, never()).await.unwrap();

    assert_eq!(outcome, Outcome::Exited);
    assert_eq!(fx.provider.forwarded(), vec!["hello"]);
    // The menu was shown again after leaving the chat.
    assert_eq!(out.lock().unwrap().matches("--- Menu ---").count(), 2);

    let saved = fx.transcripts().load().await.unwrap();
    assert_eq!(
        saved,
        vec![Turn::user("hello"), Turn::assistant("echo: hello")]
    );
}

#[tokio::test]
async fn turns_accumulate_within_a_conversation() {
    let fx = Fixture::new();
    let mut session = fx.session();
    let mut console =
        ScriptedConsole::new(["1", "first", "", "second", "exit", "4"], WhenExhausted::Eof);

    session.run_until(&mut console, never()).await.unwrap();

    let saved = fx.transcripts().load().await.unwrap();
    let contents: Vec<&str> = saved.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(
        contents,
        ["first", "echo: first", "second", "echo: second"]
    );
    // Blank lines are not sent to the agent.
    assert_eq!(fx.provider.forwarded(), vec!["first", "second"]);
}

#[tokio::test]
async fn invalid_menu_input_is_not_fatal() {
    let fx = Fixture::new();
    let mut session = fx.session();
    let mut console = ScriptedConsole::new(["abc", "9", "4"], WhenExhausted::Eof);
    let out = console.transcript();

    let outcome = session.run_until(&mut console, never()).await.unwrap();

    assert_eq!(outcome, Outcome::Exited);
    assert_eq!(
        out.lock().unwrap().matches("Please enter a number").count(),
        2
    );
}

#[tokio::test]
async fn exit_without_chatting_keeps_previous_transcript() {
    let fx = Fixture::new();
    let previous = vec![Turn::user("old"), Turn::assistant("kept")];
    fx.transcripts().save(&previous).await.unwrap();

    let mut session = fx.session();
    let mut console = ScriptedConsole::new(["4"], WhenExhausted::Eof);
    session.run_until(&mut console, never()).await.unwrap();

    assert_eq!(fx.transcripts().load().await.unwrap(), previous);
}

// ---------------------------------------------------------------------------
// Interrupt
// ---------------------------------------------------------------------------

#[tokio::test]
async fn interrupt_mid_chat_saves_accumulated_turns() {
    let fx = Fixture::new();
    let mut session = fx.session();
    // After the scripted lines the console blocks like an idle prompt.
    let mut console = ScriptedConsole::new(["1", "one", "two"], WhenExhausted::Hang);
    let out = console.transcript();

    let interrupt = tokio::time::sleep(Duration::from_millis(50));
    let outcome = session.run_until(&mut console, interrupt).await.unwrap();

    assert_eq!(outcome, Outcome::Interrupted);
    assert!(out.lock().unwrap().contains("Interrupted"));

    let saved = fx.transcripts().load().await.unwrap();
    assert_eq!(saved.len(), 4);
    assert_eq!(saved, session.transcript());
}

// ---------------------------------------------------------------------------
// Restore
// ---------------------------------------------------------------------------

#[tokio::test]
async fn restore_loads_history_and_appends() {
    let fx = Fixture::new();
    fx.transcripts()
        .save(&[Turn::user("earlier"), Turn::assistant("earlier reply")])
        .await
        .unwrap();

    let mut session = fx.session();
    let mut console = ScriptedConsole::new(["2", "again", "exit", "4"], WhenExhausted::Eof);
    let out = console.transcript();
    session.run_until(&mut console, never()).await.unwrap();

    assert!(out.lock().unwrap().contains("[assistant] earlier reply"));

    // The restored history was sent along with the new input.
    let requests = fx.provider.requests.lock().unwrap().clone();
    let contents: Vec<&str> = requests[0].iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["earlier", "earlier reply", "again"]);

    let saved = fx.transcripts().load().await.unwrap();
    assert_eq!(saved.len(), 4);
    assert_eq!(saved[3], Turn::assistant("echo: again"));
}

#[tokio::test]
async fn restore_without_history_starts_fresh() {
    let fx = Fixture::new();
    let mut session = fx.session();
    let mut console = ScriptedConsole::new(["2", "hi", "exit", "4"], WhenExhausted::Eof);
    let out = console.transcript();
    session.run_until(&mut console, never()).await.unwrap();

    assert!(out.lock().unwrap().contains("no previous conversation"));
    assert_eq!(fx.transcripts().load().await.unwrap().len(), 2);
}

#[tokio::test]
async fn restore_reads_logs_keyed_by_message() {
    let fx = Fixture::new();
    std::fs::write(
        fx.transcripts().path(),
        r#"[{"role":"user","message":"my name is Ken"},{"role":"assistant","message":"Hello Ken"}]"#,
    )
    .unwrap();

    let mut session = fx.session();
    let mut console = ScriptedConsole::new(["2", "continue", "exit", "4"], WhenExhausted::Eof);
    let out = console.transcript();
    session.run_until(&mut console, never()).await.unwrap();

    assert!(out.lock().unwrap().contains("[assistant] Hello Ken"));

    let requests = fx.provider.requests.lock().unwrap().clone();
    let contents: Vec<&str> = requests[0].iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["my name is Ken", "Hello Ken", "continue"]);
}

#[tokio::test]
async fn restore_accepts_null_content() {
    let fx = Fixture::new();
    std::fs::write(
        fx.transcripts().path(),
        r#"[{"role":"user","content":"run ls"},{"role":"assistant","content":null,"function_call":{"name":"execute","arguments":"{}"}}]"#,
    )
    .unwrap();

    let mut session = fx.session();
    let mut console = ScriptedConsole::new(["2", "next", "exit", "4"], WhenExhausted::Eof);
    let outcome = session.run_until(&mut console, never()).await.unwrap();
    assert_eq!(outcome, Outcome::Exited);

    assert_eq!(fx.provider.forwarded(), ["next"]);
    let saved = fx.transcripts().load().await.unwrap();
    assert_eq!(saved.len(), 4);
    assert_eq!(saved[1].extra["function_call"]["name"], "execute");
}

#[tokio::test]
async fn unreadable_transcript_does_not_end_the_session() {
    let fx = Fixture::new();
    std::fs::write(fx.transcripts().path(), "{not json").unwrap();

    let mut session = fx.session();
    let mut console = ScriptedConsole::new(["2", "hi", "exit", "4"], WhenExhausted::Eof);
    let out = console.transcript();
    let outcome = session.run_until(&mut console, never()).await.unwrap();
    assert_eq!(outcome, Outcome::Exited);

    let printed = out.lock().unwrap().clone();
    assert!(printed.contains("Could not read the previous conversation"));
    assert_eq!(fx.provider.forwarded(), ["hi"]);
    assert_eq!(fx.transcripts().load().await.unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// System message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn system_message_replace_and_append() {
    let fx = Fixture::new();
    fx.system_messages().replace("Be brief.").unwrap();

    let mut session = fx.session();
    let mut console = ScriptedConsole::new(
        ["3", "1", "Answer in English.", "3", "2", " Use lists.", "4"],
        WhenExhausted::Eof,
    );
    let out = console.transcript();
    session.run_until(&mut console, never()).await.unwrap();

    assert!(out.lock().unwrap().contains("Be brief."));
    assert_eq!(
        fx.system_messages().load().unwrap(),
        "Answer in English. Use lists."
    );
    assert_eq!(
        session.agent().system_message(),
        "Answer in English. Use lists."
    );
}

#[tokio::test]
async fn system_message_reaches_the_provider() {
    let fx = Fixture::new();
    let mut session = fx.session();
    let mut console = ScriptedConsole::new(
        ["3", "", "Reply in haiku.", "1", "hi", "exit", "4"],
        WhenExhausted::Eof,
    );
    session.run_until(&mut console, never()).await.unwrap();

    let requests = fx.provider.requests.lock().unwrap().clone();
    assert_eq!(requests[0][0], ChatMessage::new("system", "Reply in haiku."));
}

#[tokio::test]
async fn blank_system_message_input_changes_nothing() {
    let fx = Fixture::new();
    fx.system_messages().replace("keep me").unwrap();

    let mut session = fx.session();
    let mut console = ScriptedConsole::new(["3", "1", "   ", "4"], WhenExhausted::Eof);
    session.run_until(&mut console, never()).await.unwrap();

    assert_eq!(fx.system_messages().load().unwrap(), "keep me");
}

//! Agent tool-loop integration tests
//!
//! The agent runs against a scripted transport, so every scenario is
//! deterministic: the test decides what the "model" answers on each round.

mod common;

use async_trait::async_trait;
use common::{ScriptedTransport, client_with, init_logging, options, text_response, tool_response};
use messages_sdk::{
    Agent, AgentOptions, AgentState, ByteStream, Client, ContentBlock, Conversation, Error,
    Message, MessageResponse, MessagesRequest, Result, Role, ToolExecutor, ToolUseBlock,
    Transport, tool,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Executor backed by a plain closure.
struct FnExecutor<F>(F);

#[async_trait]
impl<F> ToolExecutor for FnExecutor<F>
where
    F: Fn(&ToolUseBlock) -> Result<String> + Send + Sync,
{
    async fn execute(&self, tool_use: &ToolUseBlock) -> Result<String> {
        (self.0)(tool_use)
    }
}

fn answer_42() -> Arc<dyn ToolExecutor> {
    Arc::new(FnExecutor(|_: &ToolUseBlock| -> Result<String> {
        Ok("42".to_string())
    }))
}

fn tool_result(message: &Message) -> messages_sdk::ToolResultBlock {
    match &message.blocks()[..] {
        [ContentBlock::ToolResult(result)] => result.clone(),
        other => panic!("expected a single tool result, got {:?}", other),
    }
}

/// Scenario: one tool call, then a text answer
/// Expected: the answer text is returned and history holds four messages
#[tokio::test]
async fn test_single_tool_round_trip() {
    init_logging();
    let transport = Arc::new(ScriptedTransport::new(vec![
        tool_response(&[("toolu_1", "lookup", json!({"q": "answer"}))]),
        text_response("The answer is 42."),
    ]));
    let agent = Agent::with_client(client_with(options(), transport.clone())).with_executor(answer_42());

    let answer = agent.send("What is the answer?").await.unwrap();
    assert_eq!(answer, "The answer is 42.");
    assert_eq!(agent.state(), AgentState::Done);

    let history = agent.history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].tool_uses()[0].id, "toolu_1");
    assert_eq!(history[2].role, Role::User);
    assert_eq!(tool_result(&history[2]).tool_use_id, "toolu_1");
    assert_eq!(tool_result(&history[2]).content, "42");
    assert_eq!(history[3].text(), "The answer is 42.");

    // The second request carries the whole conversation so far.
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].messages.len(), 1);
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].system.as_deref(), Some("You are a test assistant."));
    assert_eq!(requests[1].stream, None);
}

/// Scenario: the model requests a tool on every round
/// Expected: exactly ten requests, then an iteration-limit error
#[tokio::test]
async fn test_iteration_limit() {
    let transport = Arc::new(ScriptedTransport::repeating(tool_response(&[(
        "toolu_loop",
        "lookup",
        json!({}),
    )])));
    let agent = Agent::with_client(client_with(options(), transport.clone())).with_executor(answer_42());

    let err = agent.send("Loop forever").await.unwrap_err();
    assert!(matches!(err, Error::IterationLimitExceeded { iterations: 10 }));
    assert!(err.to_string().contains("infinite tool-use loop"));
    assert_eq!(transport.calls(), 10);
    assert_eq!(agent.state(), AgentState::Failed);

    // user + 10 × (assistant, tool result)
    assert_eq!(agent.history().len(), 21);
}

#[tokio::test]
async fn test_custom_iteration_limit() {
    let transport = Arc::new(ScriptedTransport::repeating(tool_response(&[(
        "toolu_loop",
        "lookup",
        json!({}),
    )])));
    let options = AgentOptions::builder()
        .model("test-model")
        .max_tool_iterations(3)
        .build()
        .unwrap();
    let agent = Agent::with_client(client_with(options, transport.clone())).with_executor(answer_42());

    let err = agent.send("Loop").await.unwrap_err();
    assert!(matches!(err, Error::IterationLimitExceeded { iterations: 3 }));
    assert_eq!(transport.calls(), 3);
}

/// Scenario: the tool fails
/// Expected: the failure is sent back as an error tool result and the loop continues
#[tokio::test]
async fn test_failing_tool_does_not_abort_turn() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        tool_response(&[("toolu_1", "read_file", json!({"path": "/missing"}))]),
        text_response("The file does not exist."),
    ]));
    let executor = Arc::new(FnExecutor(|tool_use: &ToolUseBlock| -> Result<String> {
        Err(Error::tool(format!("{} failed: no such file", tool_use.name)))
    }));
    let agent = Agent::with_client(client_with(options(), transport.clone())).with_executor(executor);

    let answer = agent.send("Read /missing").await.unwrap();
    assert_eq!(answer, "The file does not exist.");

    let result = tool_result(&agent.history()[2]);
    assert!(result.content.starts_with("Error:"));
    assert!(result.content.contains("no such file"));
    assert_eq!(result.is_error, Some(true));

    // The error result went out on the wire with its flag.
    let wire = serde_json::to_value(&transport.requests()[1].messages[2]).unwrap();
    assert_eq!(wire["content"][0]["type"], "tool_result");
    assert_eq!(wire["content"][0]["is_error"], true);
}

/// Scenario: tools requested but no executor configured
/// Expected: configuration error naming every requested tool, no retry
#[tokio::test]
async fn test_missing_executor_is_configuration_error() {
    let transport = Arc::new(ScriptedTransport::new(vec![tool_response(&[
        ("toolu_1", "search", json!({})),
        ("toolu_2", "fetch", json!({})),
    ])]));
    let agent = Agent::with_client(client_with(options(), transport.clone()));

    match agent.send("Find something").await {
        Err(Error::Config(message)) => {
            assert!(message.contains("search"));
            assert!(message.contains("fetch"));
        }
        other => panic!("expected configuration error, got {:?}", other),
    }
    assert_eq!(transport.calls(), 1);
    assert_eq!(agent.history().len(), 2);
}

/// Scenario: two tool calls in one turn, the first one slower
/// Expected: both run, results appended in request order
#[tokio::test]
async fn test_tool_results_keep_request_order() {
    struct Sleepy {
        running: AtomicUsize,
        overlapped: AtomicBool,
    }

    #[async_trait]
    impl ToolExecutor for Sleepy {
        async fn execute(&self, tool_use: &ToolUseBlock) -> Result<String> {
            if self.running.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            let ms = tool_use.input["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("slept {}", ms))
        }
    }

    let transport = Arc::new(ScriptedTransport::new(vec![
        tool_response(&[
            ("toolu_slow", "sleep", json!({"ms": 50})),
            ("toolu_fast", "sleep", json!({"ms": 1})),
        ]),
        text_response("done"),
    ]));
    let executor = Arc::new(Sleepy {
        running: AtomicUsize::new(0),
        overlapped: AtomicBool::new(false),
    });
    let agent =
        Agent::with_client(client_with(options(), transport)).with_executor(executor.clone());

    agent.send("Sleep twice").await.unwrap();

    let history = agent.history();
    assert_eq!(history.len(), 5);
    assert_eq!(tool_result(&history[2]).tool_use_id, "toolu_slow");
    assert_eq!(tool_result(&history[2]).content, "slept 50");
    assert_eq!(tool_result(&history[3]).tool_use_id, "toolu_fast");
    assert!(executor.overlapped.load(Ordering::SeqCst));
}

/// Scenario: tools registered on the options
/// Expected: definitions are advertised and handlers run through the tool set
#[tokio::test]
async fn test_registered_tools() {
    let multiply = tool("multiply", "Multiply two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            Ok(json!(a * b))
        });
    let options = AgentOptions::builder()
        .model("test-model")
        .tool(multiply)
        .build()
        .unwrap();

    let transport = Arc::new(ScriptedTransport::new(vec![
        tool_response(&[
            ("toolu_1", "multiply", json!({"a": 6, "b": 7})),
            ("toolu_2", "divide", json!({"a": 1, "b": 0})),
        ]),
        text_response("6 × 7 = 42"),
    ]));
    let agent = Agent::with_client(client_with(options, transport.clone()));

    assert_eq!(agent.send("What is 6 × 7?").await.unwrap(), "6 × 7 = 42");

    let requests = transport.requests();
    let tools = requests[0].tools.as_ref().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "multiply");
    assert_eq!(tools[0].input_schema.required, vec!["a", "b"]);

    let history = agent.history();
    assert_eq!(tool_result(&history[2]).content, "42.0");
    let unknown = tool_result(&history[3]);
    assert_eq!(unknown.is_error, Some(true));
    assert!(unknown.content.contains("unknown tool 'divide'"));
}

/// Scenario: the transport fails
/// Expected: the error surfaces unchanged and the history keeps only committed messages
#[tokio::test]
async fn test_transport_error_surfaces() {
    let transport = Arc::new(ScriptedTransport::default());
    transport.push_error(Error::api(529, "Overloaded"));
    let agent = Agent::with_client(client_with(options(), transport.clone())).with_executor(answer_42());

    let err = agent.send("Hello").await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 529, .. }));
    assert_eq!(agent.state(), AgentState::Failed);
    assert_eq!(agent.history().len(), 1);
    assert_eq!(transport.calls(), 1);
}

/// Scenario: a long history with a small token budget
/// Expected: the oldest messages are pruned before the request
#[tokio::test]
async fn test_context_limit_prunes_before_request() {
    let options = AgentOptions::builder()
        .model("test-model")
        .context_token_limit(50)
        .build()
        .unwrap();
    let transport = Arc::new(ScriptedTransport::new(vec![text_response("short")]));
    let agent = Agent::with_client(client_with(options, transport.clone())).with_conversation(
        Conversation::from_messages(vec![
            Message::user("x".repeat(400)),
            Message::assistant_text("y".repeat(400)),
        ]),
    );

    agent.send("hi").await.unwrap();

    let sent = &transport.requests()[0].messages;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text(), "hi");
    assert_eq!(agent.history().len(), 2);
}

/// Scenario: two sends race on the same agent
/// Expected: they are serialized, never interleaved
#[tokio::test]
async fn test_concurrent_sends_are_serialized() {
    let transport = Arc::new(ScriptedTransport::repeating(text_response("ok")));
    let agent = Arc::new(Agent::with_client(client_with(options(), transport.clone())));

    let (a, b) = tokio::join!(agent.send("first"), agent.send("second"));
    assert_eq!(a.unwrap(), "ok");
    assert_eq!(b.unwrap(), "ok");

    let roles: Vec<Role> = agent.history().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    // The second request saw the first exchange in full.
    assert_eq!(transport.requests()[1].messages.len(), 3);
}

/// Scenario: the interrupt flag is raised by a tool that then finishes
/// Expected: the turn fails with Interrupted after committing the tool result
#[tokio::test]
async fn test_interrupt_during_tools() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        tool_response(&[("toolu_1", "slow", json!({}))]),
        text_response("never sent"),
    ]));
    let client = client_with(options(), transport.clone());
    let handle = client.interrupt_handle();
    let executor = Arc::new(FnExecutor(move |_: &ToolUseBlock| -> Result<String> {
        handle.interrupt();
        Ok("partial".to_string())
    }));
    let agent = Agent::with_client(client).with_executor(executor);

    let err = agent.send("Do something slow").await.unwrap_err();
    assert!(matches!(err, Error::Interrupted));
    assert_eq!(transport.calls(), 1);

    // The finished tool's result is kept so the tool call stays answered.
    let history = agent.history();
    assert_eq!(history.len(), 3);
    assert_eq!(tool_result(&history[2]).content, "partial");

    // The next send starts with a cleared flag.
    let answer = agent.send("Try again").await.unwrap();
    assert_eq!(answer, "never sent");
}

/// Executor whose tools never finish.
struct HangingExecutor;

#[async_trait]
impl ToolExecutor for HangingExecutor {
    async fn execute(&self, _tool_use: &ToolUseBlock) -> Result<String> {
        futures::future::pending().await
    }
}

/// Scenario: the interrupt is raised while a tool hangs
/// Expected: the turn ends promptly and the tool call is answered with an error
#[tokio::test]
async fn test_interrupt_wakes_hanging_tool() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        tool_response(&[("toolu_1", "hang", json!({})), ("toolu_2", "hang", json!({}))]),
        text_response("recovered"),
    ]));
    let agent = Agent::with_client(client_with(options(), transport.clone()))
        .with_executor(Arc::new(HangingExecutor));

    let handle = agent.interrupt_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.interrupt();
    });

    let err = tokio::time::timeout(Duration::from_secs(2), agent.send("Go"))
        .await
        .expect("interrupt did not reach the hanging tool")
        .unwrap_err();
    assert!(matches!(err, Error::Interrupted));

    let history = agent.history();
    assert_eq!(history.len(), 4);
    for (message, id) in history[2..].iter().zip(["toolu_1", "toolu_2"]) {
        let result = tool_result(message);
        assert_eq!(result.tool_use_id, id);
        assert_eq!(result.content, "Error: Operation interrupted");
        assert_eq!(result.is_error, Some(true));
    }

    // Every tool call is answered, so the history can be sent again.
    assert_eq!(agent.send("Carry on").await.unwrap(), "recovered");
    assert_eq!(transport.requests()[1].messages.len(), 5);
}

/// Transport whose requests never complete.
struct StalledTransport;

#[async_trait]
impl Transport for StalledTransport {
    async fn send(&self, _request: &MessagesRequest) -> Result<MessageResponse> {
        futures::future::pending().await
    }

    async fn open_stream(&self, _request: &MessagesRequest) -> Result<ByteStream> {
        futures::future::pending().await
    }
}

/// Scenario: the interrupt is raised while the request waits on the network
/// Expected: send fails with Interrupted without waiting for a response
#[tokio::test]
async fn test_interrupt_abandons_request_in_flight() {
    let client = Client::with_transport(options(), Arc::new(StalledTransport));
    let agent = Agent::with_client(client);

    let handle = agent.interrupt_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.interrupt();
    });

    let err = tokio::time::timeout(Duration::from_secs(2), agent.send("Anyone there?"))
        .await
        .expect("interrupt did not reach the stalled request")
        .unwrap_err();
    assert!(matches!(err, Error::Interrupted));
    assert_eq!(agent.state(), AgentState::Failed);
    assert_eq!(agent.history().len(), 1);
}

/// Scenario: the budget is too small for the question plus a tool round
/// Expected: pruning never leaves a tool result without its tool call
#[tokio::test]
async fn test_context_limit_keeps_tool_pairs() {
    let options = AgentOptions::builder()
        .model("test-model")
        .context_token_limit(150)
        .build()
        .unwrap();
    let transport = Arc::new(ScriptedTransport::new(vec![
        tool_response(&[("toolu_1", "lookup", json!({}))]),
        text_response("42"),
    ]));
    let agent = Agent::with_client(client_with(options, transport.clone())).with_executor(answer_42());

    let question = "q".repeat(200);
    assert_eq!(agent.send(question.clone()).await.unwrap(), "42");

    let sent = &transport.requests()[1].messages;
    assert_eq!(sent[0].role, Role::User);
    assert_eq!(sent[0].text(), question);
    assert_sendable(sent);
}

/// Scenario: an old tool round followed by a new question, over budget
/// Expected: the cut lands on the new question, not between the tool pair
#[tokio::test]
async fn test_context_limit_cuts_at_turn_start() {
    let options = AgentOptions::builder()
        .model("test-model")
        .context_token_limit(250)
        .build()
        .unwrap();
    let transport = Arc::new(ScriptedTransport::new(vec![text_response("done")]));
    let agent = Agent::with_client(client_with(options, transport.clone())).with_conversation(
        Conversation::from_messages(vec![
            Message::user("q".repeat(200)),
            Message::assistant(vec![ContentBlock::ToolUse(ToolUseBlock::new(
                "toolu_old",
                "lookup",
                json!({}),
            ))]),
            Message::user_with_blocks(vec![ContentBlock::ToolResult(
                messages_sdk::ToolResultBlock::new("toolu_old", "42"),
            )]),
            Message::assistant_text("a".repeat(200)),
        ]),
    );

    agent.send("next question").await.unwrap();

    let sent = &transport.requests()[0].messages;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text(), "next question");
}

/// Every tool result answers a tool call sent earlier, and the history
/// opens with a plain user message.
fn assert_sendable(messages: &[Message]) {
    assert!(messages_sdk::starts_turn(&messages[0]), "opens with {:?}", messages[0]);

    let mut calls = Vec::new();
    for message in messages {
        for block in message.blocks().iter() {
            match block {
                ContentBlock::ToolUse(tool_use) => calls.push(tool_use.id.clone()),
                ContentBlock::ToolResult(result) => assert!(
                    calls.contains(&result.tool_use_id),
                    "orphaned tool result {}",
                    result.tool_use_id
                ),
                _ => {}
            }
        }
    }
}

//! Client for single requests, streaming or not.
//!
//! [`Client`] turns [`AgentOptions`] plus a message list into a request and
//! hands it to a [`Transport`]. It keeps no conversation state of its own;
//! multi-turn history and tool execution live in [`Agent`](crate::Agent).
//!
//! # Streaming
//!
//! ```text
//! Client::stream(messages)
//!     │
//!     ├─> Transport::open_stream   (HTTP POST, stream: true)
//!     │
//!     ├─> sse::decode_stream       (bytes → lines → StreamEvent)
//!     │
//!     └─> ResponseStream
//!             ├─ as a Stream<Item = Result<StreamEvent>>
//!             ├─ .text_fragments()   text deltas only, for live display
//!             ├─ .assemble()         complete MessageResponse
//!             └─ .assemble_with(f)   both at once
//! ```
//!
//! A stream either closes cleanly or ends with exactly one error. Fragments
//! already yielded are never retracted.
//!
//! # Interruption
//!
//! The [`InterruptHandle`] is shared by every clone of the client and every
//! stream it opens. Raising it ends active streams and in-flight requests with
//! [`Error::Interrupted`], even while they wait on the network. It stays
//! raised until [`Client::clear_interrupt`]:
//!
//! ```rust,no_run
//! # use messages_sdk::{Client, AgentOptions, Message};
//! # async fn example() -> messages_sdk::Result<()> {
//! let client = Client::new(AgentOptions::builder().model("claude-sonnet-4-5").build()?)?;
//! let handle = client.interrupt_handle();
//!
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     handle.interrupt();
//! });
//!
//! let response = client.stream(vec![Message::user("Long request")]).await?.assemble().await;
//! # Ok(())
//! # }
//! ```
//!
//! Dropping a [`ResponseStream`] drops the underlying HTTP body, which closes
//! the connection.

use crate::assembler::StreamAssembler;
use crate::events::StreamEvent;
use crate::interrupt::InterruptHandle;
use crate::sse::{ByteStream, EventStream, TextStream, decode_stream};
use crate::transport::{HttpTransport, Transport};
use crate::types::{AgentOptions, Message, MessageResponse, MessagesRequest};
use crate::{Error, Result};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Sends requests built from [`AgentOptions`].
#[derive(Clone)]
pub struct Client {
    options: AgentOptions,
    transport: Arc<dyn Transport>,
    interrupt: InterruptHandle,
}

impl Client {
    /// Create a client that talks HTTP to `options.base_url()`.
    pub fn new(options: AgentOptions) -> Result<Self> {
        let transport = HttpTransport::new(&options)?;
        Ok(Self::with_transport(options, Arc::new(transport)))
    }

    /// Create a client over a custom transport.
    pub fn with_transport(options: AgentOptions, transport: Arc<dyn Transport>) -> Self {
        Self {
            options,
            transport,
            interrupt: InterruptHandle::new(),
        }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Request built from the configured options for the given messages.
    pub fn request(&self, messages: Vec<Message>) -> MessagesRequest {
        self.options.build_request(messages)
    }

    /// Send a non-streaming request.
    pub async fn send(&self, messages: Vec<Message>) -> Result<MessageResponse> {
        let request = self.request(messages);
        self.send_request(&request).await
    }

    /// Send a prepared non-streaming request.
    pub async fn send_request(&self, request: &MessagesRequest) -> Result<MessageResponse> {
        let response = self.until_interrupted(self.transport.send(request)).await?;
        log::debug!(
            "Response {}: {} blocks, stop_reason={:?}, usage={:?}",
            response.id,
            response.content.len(),
            response.stop_reason,
            response.usage
        );
        Ok(response)
    }

    /// Send a streaming request.
    ///
    /// Fails with [`Error::Interrupted`] while the interrupt is raised.
    pub async fn stream(&self, messages: Vec<Message>) -> Result<ResponseStream> {
        self.stream_request(self.request(messages)).await
    }

    /// Send a prepared request with `stream: true`.
    pub async fn stream_request(&self, mut request: MessagesRequest) -> Result<ResponseStream> {
        request.stream = Some(true);

        let body: ByteStream = self
            .until_interrupted(self.transport.open_stream(&request))
            .await?;
        Ok(ResponseStream::new(decode_stream(
            body,
            self.interrupt.clone(),
        )))
    }

    /// Run `operation` unless the interrupt is raised first.
    async fn until_interrupted<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        if self.is_interrupted() {
            return Err(Error::Interrupted);
        }
        tokio::select! {
            biased;
            _ = self.interrupt.interrupted() => {
                log::debug!("Request abandoned after interrupt");
                Err(Error::Interrupted)
            }
            result = operation => result,
        }
    }

    /// Raise the interrupt flag.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_interrupted()
    }

    /// Lower the interrupt flag so new requests and streams can proceed.
    pub fn clear_interrupt(&self) {
        self.interrupt.clear();
    }

    /// Shared interrupt handle, for raising it from another task or thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Event stream of one streamed response.
pub struct ResponseStream {
    events: EventStream,
}

impl ResponseStream {
    pub fn new(events: EventStream) -> Self {
        Self { events }
    }

    /// Text fragments in arrival order. Decode errors are logged and skipped;
    /// transport errors end the stream.
    pub fn text_fragments(self) -> TextStream {
        let fragments = self.events.filter_map(|item| async move {
            match item {
                Ok(StreamEvent::ContentBlockDelta { delta, .. }) => delta.text.map(Ok),
                Ok(StreamEvent::Error { message }) => {
                    log::warn!("Skipping undecodable stream event: {}", message);
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        });
        Box::pin(fragments)
    }

    /// Consume the stream and rebuild the full response.
    ///
    /// `Ok(None)` means the stream closed cleanly but never carried a
    /// `message_start` or usage; transport failures are `Err`.
    pub async fn assemble(self) -> Result<Option<MessageResponse>> {
        self.assemble_with(|_| {}).await
    }

    /// Like [`assemble`](Self::assemble), calling `on_text` with each text
    /// fragment as it arrives.
    pub async fn assemble_with<F>(mut self, mut on_text: F) -> Result<Option<MessageResponse>>
    where
        F: FnMut(&str),
    {
        let mut assembler = StreamAssembler::new();
        while let Some(item) = self.events.next().await {
            if let Some(fragment) = assembler.push(item?) {
                on_text(&fragment);
            }
        }
        Ok(assembler.finish())
    }
}

impl Stream for ResponseStream {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

/// One-shot streaming query: send `prompt` as a single user message and
/// stream back the text.
///
/// ```rust,no_run
/// use messages_sdk::{query, AgentOptions};
/// use futures::StreamExt;
///
/// # async fn example() -> messages_sdk::Result<()> {
/// let options = AgentOptions::builder()
///     .model("claude-sonnet-4-5")
///     .api_key("sk-...")
///     .build()?;
///
/// let mut stream = query("What's the capital of France?", &options).await?;
/// while let Some(fragment) = stream.next().await {
///     print!("{}", fragment?);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn query(prompt: &str, options: &AgentOptions) -> Result<TextStream> {
    let client = Client::new(options.clone())?;
    let stream = client.stream(vec![Message::user(prompt)]).await?;
    Ok(stream.text_fragments())
}

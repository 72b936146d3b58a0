//! Paginated message source
//!
//! The messaging platform sits behind the [`MessengerClient`] port: no
//! transport types cross into the rest of the crate. Adapters map their
//! wire types into [`crate::types::Message`] / [`crate::types::ChatRef`]
//! and implement page fetching; everything above the port only sees a
//! lazy, strictly ascending stream with built-in request pacing.
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────┐     ┌──────────────────┐
//! │ MessengerClient  │ ──► │ MessageStream │ ──► │ writer/aggregator│
//! │ (adapter, paged) │     │ (pacing,      │     │                  │
//! └──────────────────┘     │  retry,       │     └──────────────────┘
//!                          │  ordering)    │
//!                          └───────────────┘
//! ```

use crate::config::PacingConfig;
use crate::error::{Error, Result};
use crate::types::{ChatRef, Message};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;

/// Messages fetched per remote request
const PAGE_SIZE: usize = 100;

/// Opaque handle to a resolved remote chat.
///
/// Produced by [`MessengerClient::resolve`] once per ingestion run;
/// `reference` carries whatever the adapter needs to re-address the
/// chat (access hash, input peer, file path).
#[derive(Debug, Clone)]
pub struct ChatHandle {
    pub chat_id: i64,
    pub reference: Option<String>,
}

/// Port to the remote messaging platform.
///
/// The authentication handshake (phone/code/2FA) belongs to the
/// adapter; this port only exposes what ingestion needs. All methods
/// may suspend on network IO.
#[async_trait]
pub trait MessengerClient: Send + Sync {
    /// Whether the underlying session holds a valid credential
    async fn is_authorized(&self) -> Result<bool>;

    /// Display name of the signed-in account, when available
    async fn account_name(&self) -> Result<Option<String>>;

    /// Groups and broadcast channels visible to the account (private
    /// conversations excluded)
    async fn list_chats(&self) -> Result<Vec<ChatRef>>;

    /// Map a catalogue id to a live handle.
    ///
    /// Fails with [`Error::EntityResolution`] when the chat vanished
    /// or is inaccessible.
    async fn resolve(&self, chat_id: i64) -> Result<ChatHandle>;

    /// One ascending page of messages with `id > min_id`, at most
    /// `limit` long. An empty page means the history is exhausted.
    async fn fetch_messages(
        &self,
        handle: &ChatHandle,
        min_id: i64,
        limit: usize,
    ) -> Result<Vec<Message>>;
}

/// Retry strategy for transient transport failures during pagination.
///
/// Auth and entity-resolution failures are never retried regardless of
/// policy. The default is fail-fast: the caller decides whether to
/// re-run the whole pull.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
}

impl RetryPolicy {
    /// Fail on the first transport error (default)
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
        }
    }

    /// Exponential backoff: `initial_delay`, doubled per attempt,
    /// capped at 30s
    pub fn backoff(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Lazy, paced, strictly ascending message stream above a watermark.
///
/// Yields the first message with `id > min_id` onward, oldest to
/// newest, until the remote history is exhausted. After every
/// `delay_messages_chunk` yielded messages the stream suspends for
/// `delay_seconds` before the next yield (cooperatively, and never
/// mid-message) to respect the platform's rate limits.
pub struct MessageStream<'a> {
    client: &'a dyn MessengerClient,
    handle: ChatHandle,
    pacing: PacingConfig,
    retry: RetryPolicy,
    /// Highest id handed out so far (exclusive lower bound for the
    /// next fetch)
    watermark: i64,
    buffer: VecDeque<Message>,
    exhausted: bool,
    yielded_since_pause: u64,
    page_size: usize,
}

impl<'a> MessageStream<'a> {
    pub fn new(
        client: &'a dyn MessengerClient,
        handle: ChatHandle,
        min_id: i64,
        pacing: PacingConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            handle,
            pacing,
            retry,
            watermark: min_id,
            buffer: VecDeque::new(),
            exhausted: false,
            yielded_since_pause: 0,
            page_size: PAGE_SIZE,
        }
    }

    /// Override the remote page size (mainly for tests)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Next message, or `None` when the history is exhausted.
    pub async fn next(&mut self) -> Result<Option<Message>> {
        if self.buffer.is_empty() {
            if self.exhausted {
                return Ok(None);
            }
            self.fill_buffer().await?;
            if self.buffer.is_empty() {
                return Ok(None);
            }
        }

        // Rate-limit pause between yields, after every full chunk
        if self.yielded_since_pause >= self.pacing.delay_messages_chunk
            && self.pacing.delay_seconds > 0.0
        {
            tracing::debug!(
                chat_id = self.handle.chat_id,
                delay_seconds = self.pacing.delay_seconds,
                "Pacing pause"
            );
            tokio::time::sleep(Duration::from_secs_f64(self.pacing.delay_seconds)).await;
            self.yielded_since_pause = 0;
        }

        match self.buffer.pop_front() {
            Some(msg) => {
                self.watermark = msg.id;
                self.yielded_since_pause += 1;
                Ok(Some(msg))
            }
            None => Ok(None),
        }
    }

    /// Fetch the next page, applying the retry policy to transient
    /// transport failures only.
    async fn fill_buffer(&mut self) -> Result<()> {
        let mut delay = self.retry.initial_delay;

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    chat_id = self.handle.chat_id,
                    attempt,
                    max = self.retry.max_retries,
                    "Retrying page fetch after {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }

            match self
                .client
                .fetch_messages(&self.handle, self.watermark, self.page_size)
                .await
            {
                Ok(page) => {
                    self.accept_page(page)?;
                    return Ok(());
                }
                Err(e @ Error::Transport(_)) if attempt < self.retry.max_retries => {
                    tracing::warn!(
                        chat_id = self.handle.chat_id,
                        error = %e,
                        "Transient error fetching page"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!("fetch loop returns on success or error")
    }

    fn accept_page(&mut self, page: Vec<Message>) -> Result<()> {
        if page.len() < self.page_size {
            self.exhausted = true;
        }

        // Enforce the ordering contract before anything downstream
        // relies on it.
        let mut last = self.watermark;
        for msg in &page {
            if msg.id <= last {
                return Err(Error::Transport(format!(
                    "source returned out-of-order page for chat {}: id {} after {}",
                    self.handle.chat_id, msg.id, last
                )));
            }
            last = msg.id;
        }

        self.buffer.extend(page);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn msg(id: i64) -> Message {
        Message {
            id,
            date: DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap(),
            sender: None,
            text: format!("m{}", id),
        }
    }

    /// Serves a fixed ascending message set, optionally failing the
    /// first N fetches with a transport error.
    struct FixedClient {
        messages: Vec<Message>,
        fail_first: AtomicUsize,
    }

    impl FixedClient {
        fn new(messages: Vec<Message>) -> Self {
            Self {
                messages,
                fail_first: AtomicUsize::new(0),
            }
        }

        fn failing(messages: Vec<Message>, failures: usize) -> Self {
            Self {
                messages,
                fail_first: AtomicUsize::new(failures),
            }
        }
    }

    #[async_trait]
    impl MessengerClient for FixedClient {
        async fn is_authorized(&self) -> Result<bool> {
            Ok(true)
        }

        async fn account_name(&self) -> Result<Option<String>> {
            Ok(None)
        }

        async fn list_chats(&self) -> Result<Vec<ChatRef>> {
            Ok(vec![])
        }

        async fn resolve(&self, chat_id: i64) -> Result<ChatHandle> {
            Ok(ChatHandle {
                chat_id,
                reference: None,
            })
        }

        async fn fetch_messages(
            &self,
            _handle: &ChatHandle,
            min_id: i64,
            limit: usize,
        ) -> Result<Vec<Message>> {
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::Transport("connection reset".into()));
            }
            Ok(self
                .messages
                .iter()
                .filter(|m| m.id > min_id)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn no_pacing() -> PacingConfig {
        PacingConfig {
            delay_messages_chunk: 1000,
            delay_seconds: 0.0,
        }
    }

    async fn drain(stream: &mut MessageStream<'_>) -> Vec<i64> {
        let mut ids = Vec::new();
        while let Some(m) = stream.next().await.unwrap() {
            ids.push(m.id);
        }
        ids
    }

    #[tokio::test]
    async fn streams_above_min_id_in_order() {
        let client = FixedClient::new((1..=10).map(msg).collect());
        let handle = client.resolve(1).await.unwrap();
        let mut stream =
            MessageStream::new(&client, handle, 4, no_pacing(), RetryPolicy::none())
                .with_page_size(3);
        assert_eq!(drain(&mut stream).await, vec![5, 6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn empty_history_yields_nothing() {
        let client = FixedClient::new(vec![]);
        let handle = client.resolve(1).await.unwrap();
        let mut stream =
            MessageStream::new(&client, handle, 0, no_pacing(), RetryPolicy::none());
        assert_eq!(drain(&mut stream).await, Vec::<i64>::new());
    }

    #[tokio::test]
    async fn fail_fast_without_retry_policy() {
        let client = FixedClient::failing((1..=3).map(msg).collect(), 1);
        let handle = client.resolve(1).await.unwrap();
        let mut stream =
            MessageStream::new(&client, handle, 0, no_pacing(), RetryPolicy::none());
        assert!(matches!(stream.next().await, Err(Error::Transport(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_policy_retries_transient_failures() {
        let client = FixedClient::failing((1..=3).map(msg).collect(), 2);
        let handle = client.resolve(1).await.unwrap();
        let mut stream = MessageStream::new(
            &client,
            handle,
            0,
            no_pacing(),
            RetryPolicy::backoff(3, Duration::from_millis(10)),
        );
        assert_eq!(drain(&mut stream).await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn out_of_order_page_is_an_error() {
        struct Shuffled;

        #[async_trait]
        impl MessengerClient for Shuffled {
            async fn is_authorized(&self) -> Result<bool> {
                Ok(true)
            }
            async fn account_name(&self) -> Result<Option<String>> {
                Ok(None)
            }
            async fn list_chats(&self) -> Result<Vec<ChatRef>> {
                Ok(vec![])
            }
            async fn resolve(&self, chat_id: i64) -> Result<ChatHandle> {
                Ok(ChatHandle {
                    chat_id,
                    reference: None,
                })
            }
            async fn fetch_messages(
                &self,
                _handle: &ChatHandle,
                _min_id: i64,
                _limit: usize,
            ) -> Result<Vec<Message>> {
                Ok(vec![msg(5), msg(3)])
            }
        }

        let client = Shuffled;
        let handle = ChatHandle {
            chat_id: 1,
            reference: None,
        };
        let mut stream =
            MessageStream::new(&client, handle, 0, no_pacing(), RetryPolicy::none());
        assert!(matches!(stream.next().await, Err(Error::Transport(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_pauses_between_chunks() {
        // 5 messages, pause after every 2: pauses before the 3rd and
        // 5th yields, 2 * 1s total on the paused clock.
        let client = FixedClient::new((1..=5).map(msg).collect());
        let handle = client.resolve(1).await.unwrap();
        let pacing = PacingConfig {
            delay_messages_chunk: 2,
            delay_seconds: 1.0,
        };
        let mut stream =
            MessageStream::new(&client, handle, 0, pacing, RetryPolicy::none()).with_page_size(10);

        let start = tokio::time::Instant::now();
        assert_eq!(drain(&mut stream).await, vec![1, 2, 3, 4, 5]);
        let elapsed = start.elapsed();
        assert_eq!(elapsed.as_secs(), 2, "expected two pacing pauses");
    }
}

// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The messaging session for one open thread.
//!
//! A session registers bus handlers for new messages and read receipts of its
//! thread, keeps an ordered duplicate-free log, recomputes the close-request
//! state whenever the log changes, and routes outgoing sends by thread kind
//! and moderation policy. UI-facing changes are reported as [`SessionEvent`]s.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use concord_bus::{BusEvent, EventBus, EventKind, SubscriptionHandle};
use concord_core::types::{
    CloseRequestState, Message, MessageDetails, MessageId, MessageKind, NewMessage, ReadReceipt,
    ThreadId, ThreadInfo, ThreadKind, ThreadStatus, UserId, UserPreferences,
};
use concord_core::{ConcordError, MessageStore};
use concord_moderation::ModerationPipeline;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::close_state::{derive_close_state, pending_request};
use crate::log::ThreadLog;

const REQUEST_CLOSE_TEXT: &str = "Requested to close this thread.";
const CLOSE_ACCEPTED_TEXT: &str = "Accepted the request to close this thread.";
const CLOSE_DECLINED_TEXT: &str = "Declined the request to close this thread.";

/// Collaborators shared by every session of one signed-in user.
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn MessageStore>,
    pub bus: EventBus,
    pub pipeline: Arc<ModerationPipeline>,
    pub user: UserId,
    pub preferences: UserPreferences,
}

/// Something the compose surface or message list should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The message list or its read state changed.
    MessagesChanged,
    CloseStateChanged(CloseRequestState),
    /// A moderated draft awaits an explicit accept or send-original decision.
    ReviewReady(PendingReview),
    /// Moderation rejected the draft; nothing was sent.
    ReviewRejected { reason: String },
    /// Input focus should return to the compose box.
    FocusCompose,
    /// The store refused a write.
    SendFailed { reason: String },
}

/// A moderated draft held for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReview {
    pub original: String,
    pub suggested: String,
}

/// What a send produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Persisted.
    Sent(Message),
    /// Held for confirmation; see [`ThreadMessagingSession::accept_suggestion`].
    AwaitingReview(PendingReview),
    /// Moderation rejected the draft.
    Rejected { reason: String },
    /// The session closed while the draft was under review; nothing was applied.
    Discarded,
}

/// The open view of a single thread.
///
/// Dropping the session unregisters its bus handlers.
pub struct ThreadMessagingSession {
    inner: Arc<SessionInner>,
    handles: Mutex<Vec<SubscriptionHandle>>,
}

struct SessionInner {
    thread_id: ThreadId,
    user: UserId,
    store: Arc<dyn MessageStore>,
    pipeline: Arc<ModerationPipeline>,
    preferences: Mutex<UserPreferences>,
    state: Mutex<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
}

struct SessionState {
    thread: ThreadInfo,
    log: ThreadLog,
    close_state: CloseRequestState,
    pending: Option<PendingReview>,
    /// Bumped on every send; a review finishing under an older value is stale.
    review_generation: u64,
}

impl ThreadMessagingSession {
    /// Opens `thread_id`: loads the thread, registers bus handlers, then loads its history.
    ///
    /// Handlers are registered before the history load so that nothing
    /// delivered in between is lost; the log drops the overlap.
    pub async fn open(
        deps: SessionDeps,
        thread_id: ThreadId,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), ConcordError> {
        let thread = deps.store.get_thread(&thread_id).await?;
        let (events, receiver) = mpsc::unbounded_channel();

        let inner = Arc::new(SessionInner {
            thread_id: thread_id.clone(),
            user: deps.user,
            store: deps.store,
            pipeline: deps.pipeline,
            preferences: Mutex::new(deps.preferences),
            state: Mutex::new(SessionState {
                thread,
                log: ThreadLog::new(),
                close_state: CloseRequestState::NoRequest,
                pending: None,
                review_generation: 0,
            }),
            events,
            cancel: CancellationToken::new(),
        });

        let handles = vec![
            register(&deps.bus, EventKind::MessageReceived, &inner),
            register(&deps.bus, EventKind::ReadReceiptUpdated, &inner),
        ];
        let session = Self {
            inner,
            handles: Mutex::new(handles),
        };

        let history = match session.inner.store.list_messages(&thread_id).await {
            Ok(history) => history,
            Err(e) => {
                session.close();
                return Err(e);
            }
        };
        {
            let mut state = session.inner.lock();
            for message in history {
                state.log.insert(message);
            }
            state.close_state = derive_close_state(state.log.messages());
        }

        info!(thread_id = %thread_id, user = %session.inner.user, "thread session opened");
        Ok((session, receiver))
    }

    /// Unregisters every bus handler and abandons any in-flight review. Idempotent.
    pub fn close(&self) {
        self.inner.cancel.cancel();
        let handles: Vec<SubscriptionHandle> = std::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if handles.is_empty() {
            return;
        }
        for handle in &handles {
            handle.unregister();
        }
        info!(thread_id = %self.inner.thread_id, "thread session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.inner.thread_id
    }

    pub fn thread(&self) -> ThreadInfo {
        self.inner.lock().thread.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().log.messages().to_vec()
    }

    pub fn close_state(&self) -> CloseRequestState {
        self.inner.lock().close_state
    }

    pub fn is_read_by(&self, id: &MessageId, user: &UserId) -> bool {
        self.inner.lock().log.is_read_by(id, user)
    }

    pub fn pending_review(&self) -> Option<PendingReview> {
        self.inner.lock().pending.clone()
    }

    pub fn set_preferences(&self, preferences: UserPreferences) {
        *self
            .inner
            .preferences
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = preferences;
    }

    /// Sends `text` along exactly one path chosen by thread kind and policy.
    ///
    /// - AI assistant threads persist an `ai_message`.
    /// - Customer support threads persist a `customer_support` message.
    /// - Standard threads persist a `user_message`, first passing the draft
    ///   through moderation when the thread requires approval.
    ///
    /// A new send replaces any review still awaiting confirmation.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, ConcordError> {
        self.ensure_open()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ConcordError::Validation("message is empty".to_string()));
        }

        let (thread, generation) = {
            let mut state = self.inner.lock();
            state.pending = None;
            state.review_generation += 1;
            (state.thread.clone(), state.review_generation)
        };
        if thread.status == ThreadStatus::Closed {
            return Err(ConcordError::Validation("thread is closed".to_string()));
        }

        match thread.kind {
            ThreadKind::AiAssistant => {
                debug!(thread_id = %thread.id, "sending as ai_message");
                self.persist(MessageKind::AiMessage, text, None).await
            }
            ThreadKind::CustomerSupport => {
                debug!(thread_id = %thread.id, "sending as customer_support");
                self.persist(MessageKind::CustomerSupport, text, None).await
            }
            ThreadKind::Standard if !thread.require_ai_approval => {
                debug!(thread_id = %thread.id, "sending directly");
                self.persist(MessageKind::UserMessage, text, None).await
            }
            ThreadKind::Standard => self.send_moderated(text, generation).await,
        }
    }

    /// Persists the pending suggestion with its provenance.
    pub async fn accept_suggestion(&self) -> Result<Message, ConcordError> {
        self.ensure_open()?;
        let review = self.take_pending()?;
        let details = provenance(&review.suggested, &review.original);
        self.persist_message(MessageKind::UserMessage, &review.suggested, Some(details))
            .await
    }

    /// Persists the original draft of the pending review, recording what was suggested.
    pub async fn send_original(&self) -> Result<Message, ConcordError> {
        self.ensure_open()?;
        let review = self.take_pending()?;
        let details = provenance(&review.suggested, &review.original);
        self.persist_message(MessageKind::UserMessage, &review.original, Some(details))
            .await
    }

    /// Discards the pending review and hands focus back to the compose box.
    pub fn reject_suggestion(&self) -> Result<PendingReview, ConcordError> {
        self.ensure_open()?;
        let review = self.take_pending()?;
        self.inner.emit(SessionEvent::FocusCompose);
        Ok(review)
    }

    /// Marks every message from someone else as read by the current user.
    ///
    /// Returns how many messages were newly marked. Already-read messages
    /// are skipped, and the store never re-stamps an existing `read_at`.
    pub async fn mark_read(&self) -> Result<usize, ConcordError> {
        self.ensure_open()?;
        let unread: Vec<MessageId> = {
            let state = self.inner.lock();
            state
                .log
                .unread_for(&self.inner.user)
                .map(|m| m.id.clone())
                .collect()
        };

        let mut marked = 0;
        for message_id in unread {
            let stored = self
                .inner
                .store
                .upsert_read_receipt(ReadReceipt {
                    message_id,
                    user_id: self.inner.user.clone(),
                    read_at: Some(Utc::now()),
                })
                .await?;
            if self.inner.lock().log.apply_receipt(&stored) {
                marked += 1;
            }
        }

        if marked > 0 {
            debug!(thread_id = %self.inner.thread_id, marked, "messages marked read");
            self.inner.emit(SessionEvent::MessagesChanged);
        }
        Ok(marked)
    }

    /// Proposes closing the thread. A newer request supersedes an older one.
    pub async fn request_close(&self) -> Result<Message, ConcordError> {
        self.ensure_open()?;
        self.ensure_thread_open()?;
        self.persist_message(MessageKind::RequestClose, REQUEST_CLOSE_TEXT, None)
            .await
    }

    /// Accepts the pending close request and marks the thread closed.
    pub async fn accept_close(&self) -> Result<Message, ConcordError> {
        self.ensure_open()?;
        self.ensure_can_answer_close()?;
        let message = self
            .persist_message(MessageKind::CloseAccepted, CLOSE_ACCEPTED_TEXT, None)
            .await?;
        self.inner
            .store
            .update_thread_status(&self.inner.thread_id, ThreadStatus::Closed)
            .await?;
        self.inner.lock().thread.status = ThreadStatus::Closed;
        info!(thread_id = %self.inner.thread_id, "thread closed");
        Ok(message)
    }

    /// Declines the pending close request.
    pub async fn decline_close(&self) -> Result<Message, ConcordError> {
        self.ensure_open()?;
        self.ensure_can_answer_close()?;
        self.persist_message(MessageKind::CloseDeclined, CLOSE_DECLINED_TEXT, None)
            .await
    }

    async fn send_moderated(
        &self,
        draft: &str,
        generation: u64,
    ) -> Result<SendOutcome, ConcordError> {
        debug!(thread_id = %self.inner.thread_id, "sending through moderation");
        let decision = tokio::select! {
            _ = self.inner.cancel.cancelled() => return Ok(SendOutcome::Discarded),
            decision = self.inner.pipeline.review(draft, &self.inner.thread_id) => decision,
        };
        if self.inner.cancel.is_cancelled() || self.is_superseded(generation) {
            debug!(thread_id = %self.inner.thread_id, "discarding stale review");
            return Ok(SendOutcome::Discarded);
        }

        if decision.rejected {
            let reason = decision
                .reason
                .unwrap_or_else(|| self.inner.pipeline.config().rejection_reason.clone());
            debug!(thread_id = %self.inner.thread_id, reason = %reason, "draft rejected");
            self.inner.emit(SessionEvent::ReviewRejected {
                reason: reason.clone(),
            });
            self.inner.emit(SessionEvent::FocusCompose);
            return Ok(SendOutcome::Rejected { reason });
        }

        let suggested = decision
            .suggested_message
            .unwrap_or_else(|| draft.to_string());
        let auto_accept = self
            .inner
            .preferences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .auto_accept_suggestions;

        if auto_accept {
            let details = provenance(&suggested, draft);
            return self
                .persist(MessageKind::UserMessage, &suggested, Some(details))
                .await;
        }

        let review = PendingReview {
            original: draft.to_string(),
            suggested,
        };
        {
            let mut state = self.inner.lock();
            if state.review_generation != generation {
                return Ok(SendOutcome::Discarded);
            }
            state.pending = Some(review.clone());
        }
        self.inner.emit(SessionEvent::ReviewReady(review.clone()));
        Ok(SendOutcome::AwaitingReview(review))
    }

    async fn persist(
        &self,
        kind: MessageKind,
        text: &str,
        details: Option<MessageDetails>,
    ) -> Result<SendOutcome, ConcordError> {
        self.persist_message(kind, text, details)
            .await
            .map(SendOutcome::Sent)
    }

    async fn persist_message(
        &self,
        kind: MessageKind,
        text: &str,
        details: Option<MessageDetails>,
    ) -> Result<Message, ConcordError> {
        let new = NewMessage {
            thread_id: self.inner.thread_id.clone(),
            sender_id: self.inner.user.clone(),
            text: text.to_string(),
            kind,
            details,
        };

        match self.inner.store.insert_message(new).await {
            Ok(message) => {
                self.inner.absorb(message.clone());
                Ok(message)
            }
            Err(e) => {
                warn!(thread_id = %self.inner.thread_id, kind = %kind, error = %e, "failed to persist message");
                self.inner.emit(SessionEvent::SendFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.inner.lock().review_generation != generation
    }

    fn take_pending(&self) -> Result<PendingReview, ConcordError> {
        self.inner
            .lock()
            .pending
            .take()
            .ok_or_else(|| ConcordError::Validation("no review is awaiting confirmation".to_string()))
    }

    fn ensure_open(&self) -> Result<(), ConcordError> {
        if self.is_closed() {
            return Err(ConcordError::SessionClosed);
        }
        Ok(())
    }

    fn ensure_thread_open(&self) -> Result<(), ConcordError> {
        if self.inner.lock().thread.status == ThreadStatus::Closed {
            return Err(ConcordError::Validation("thread is closed".to_string()));
        }
        Ok(())
    }

    fn ensure_can_answer_close(&self) -> Result<(), ConcordError> {
        let state = self.inner.lock();
        if state.thread.status == ThreadStatus::Closed {
            return Err(ConcordError::Validation("thread is closed".to_string()));
        }
        let Some(request) = pending_request(state.log.messages()) else {
            return Err(ConcordError::Validation(
                "no close request is pending".to_string(),
            ));
        };
        if request.sender_id == self.inner.user {
            return Err(ConcordError::Validation(
                "cannot answer your own close request".to_string(),
            ));
        }
        Ok(())
    }
}

impl Drop for ThreadMessagingSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // A dropped receiver only means nobody is rendering this session.
        let _ = self.events.send(event);
    }

    fn handle(&self, event: &BusEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        match event {
            BusEvent::MessageReceived(message) if message.thread_id == self.thread_id => {
                self.absorb(message.clone());
            }
            BusEvent::ReadReceiptUpdated(receipt) => {
                let changed = self.lock().log.apply_receipt(receipt);
                if changed {
                    self.emit(SessionEvent::MessagesChanged);
                }
            }
            _ => {}
        }
    }

    /// Adds `message` to the log and republishes derived state if it was new.
    fn absorb(&self, message: Message) {
        let closes_thread = message.kind == MessageKind::CloseAccepted;
        let close_change = {
            let mut state = self.lock();
            if !state.log.insert(message) {
                return;
            }
            if closes_thread {
                state.thread.status = ThreadStatus::Closed;
            }
            let derived = derive_close_state(state.log.messages());
            let changed = derived != state.close_state;
            state.close_state = derived;
            changed.then_some(derived)
        };

        self.emit(SessionEvent::MessagesChanged);
        if let Some(close_state) = close_change {
            debug!(thread_id = %self.thread_id, state = %close_state, "close state changed");
            self.emit(SessionEvent::CloseStateChanged(close_state));
        }
    }
}

fn register(bus: &EventBus, kind: EventKind, inner: &Arc<SessionInner>) -> SubscriptionHandle {
    let weak: Weak<SessionInner> = Arc::downgrade(inner);
    bus.register(kind, move |event| {
        if let Some(inner) = weak.upgrade() {
            inner.handle(event);
        }
    })
}

fn provenance(suggested: &str, original: &str) -> MessageDetails {
    MessageDetails {
        ai_response: Some(suggested.to_string()),
        original_message: Some(original.to_string()),
    }
}

//! Conversation view controller
//!
//! Owns the selected conversation and orchestrates the cache, the unread
//! tracker and the outbox. All state lives behind `&mut self`: network calls
//! and delays run in spawned tasks which report back as [`ControllerEvent`]s
//! on an mpsc channel, and the owner feeds them into [`Controller::handle`]
//! from its event loop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::cache::{ConversationCache, DEFAULT_FRESHNESS};
use super::clock::Clock;
use super::error::{MessagingError, Notice, Severity};
use super::outbox::Outbox;
use super::service::{MessageService, OutgoingMessage, SendReceipt};
use super::unread::UnreadTracker;
use crate::models::{
    sort_chronologically, ConversationKey, ConversationSummary, Delivery, Identity, Message,
    MessageId, ThreadKey, UnreadSummary,
};

/// Delay before a mark-read is persisted, so the unread marker stays
/// visible for a moment.
pub const DEFAULT_MARK_READ_DELAY: Duration = Duration::from_secs(2);

/// Delay between a send acknowledgement and the refetch that replaces the
/// placeholder.
pub const DEFAULT_REFETCH_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub freshness: Duration,
    pub mark_read_delay: Duration,
    pub refetch_delay: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            freshness: DEFAULT_FRESHNESS,
            mark_read_delay: DEFAULT_MARK_READ_DELAY,
            refetch_delay: DEFAULT_REFETCH_DELAY,
        }
    }
}

/// Display phase of the selected conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    /// The last load failed; whatever was displayed is kept.
    Failed,
}

/// Completion of background work, fed back into [`Controller::handle`].
#[derive(Debug)]
pub enum ControllerEvent {
    ConversationLoaded {
        key: ConversationKey,
        /// Cache epoch at the time the fetch was issued.
        epoch: u64,
        result: Result<Vec<Message>, MessagingError>,
    },
    SendFinished {
        key: ConversationKey,
        local_id: MessageId,
        result: Result<SendReceipt, MessagingError>,
    },
    ReconcileDue {
        key: ConversationKey,
    },
    ReadPersisted {
        key: ConversationKey,
        result: Result<(), MessagingError>,
    },
    UnreadLoaded(Result<UnreadSummary, MessagingError>),
    ConversationsLoaded(Result<Vec<ConversationSummary>, MessagingError>),
    /// A message pushed by the real-time transport.
    Inbound(Message),
}

pub struct Controller {
    identity: Identity,
    service: Arc<dyn MessageService>,
    clock: Arc<dyn Clock>,
    settings: ControllerSettings,
    cache: ConversationCache,
    unread: UnreadTracker,
    outbox: Outbox,
    selected: Option<ConversationKey>,
    phase: Phase,
    displayed: Vec<Message>,
    conversations: Vec<ConversationSummary>,
    /// Fetches in flight, by thread, with the epoch they were issued under.
    fetching: HashMap<ThreadKey, u64>,
    unread_in_flight: bool,
    notice: Option<Notice>,
    events: mpsc::UnboundedSender<ControllerEvent>,
}

impl Controller {
    /// Create a controller for `identity`. The returned receiver yields the
    /// events that must be passed back to [`Controller::handle`].
    pub fn new(
        identity: Identity,
        service: Arc<dyn MessageService>,
        clock: Arc<dyn Clock>,
        settings: ControllerSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Self {
            unread: UnreadTracker::new(identity.role),
            cache: ConversationCache::new(Arc::clone(&clock), settings.freshness),
            identity,
            service,
            clock,
            settings,
            outbox: Outbox::new(),
            selected: None,
            phase: Phase::Idle,
            displayed: Vec::new(),
            conversations: Vec::new(),
            fetching: HashMap::new(),
            unread_in_flight: false,
            notice: None,
            events,
        };
        (controller, rx)
    }

    /// Sender for external event sources such as the real-time listener.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<ControllerEvent> {
        self.events.clone()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Key for a conversation between the local identity and `remote`.
    pub fn key_for(&self, remote: &str, job: &str) -> ConversationKey {
        ConversationKey::new(self.identity.id.clone(), remote, job)
    }

    pub fn selected(&self) -> Option<&ConversationKey> {
        self.selected.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Messages of the selected conversation, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.displayed
    }

    pub fn unread(&self) -> &UnreadTracker {
        &self.unread
    }

    /// Unread count of the selected conversation (drives the unread banner).
    pub fn unread_banner(&self) -> usize {
        self.selected.as_ref().map_or(0, |key| self.unread.count(key))
    }

    pub fn is_unread(&self, id: &MessageId) -> bool {
        self.selected
            .as_ref()
            .is_some_and(|key| self.unread.is_unread(key, id))
    }

    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    /// Whether any send is still waiting for the server. Sending never
    /// blocks viewing or selecting.
    pub fn is_sending(&self) -> bool {
        self.outbox.in_flight() > 0
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Dismiss the current notice if it is transient. Persistent and
    /// re-authentication notices stay.
    pub fn dismiss_notice(&mut self) -> bool {
        match &self.notice {
            Some(n) if n.severity == Severity::Transient => {
                self.notice = None;
                true
            }
            _ => false,
        }
    }

    fn raise(&mut self, err: &MessagingError) {
        let notice = err.notice();
        let replace = self
            .notice
            .as_ref()
            .map_or(true, |current| current.severity <= notice.severity);
        if replace {
            self.notice = Some(notice);
        }
    }

    fn is_selected(&self, key: &ConversationKey) -> bool {
        self.selected.as_ref() == Some(key)
    }

    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = ControllerEvent> + Send + 'static,
    {
        let tx = self.events.clone();
        tokio::spawn(async move {
            let event = work.await;
            if tx.send(event).is_err() {
                tracing::debug!("Controller dropped, discarding background result");
            }
        });
    }

    // -- selection and loading --

    /// Select a conversation. Served from the cache when fresh, otherwise
    /// fetched; the displayed list is cleared immediately either way.
    pub fn select(&mut self, key: ConversationKey) {
        tracing::debug!("Selecting conversation {}", key);
        self.displayed.clear();
        self.selected = Some(key.clone());
        self.cache.purge_expired();

        // The tracker is never rewritten from a snapshot. A snapshot whose
        // unread set disagrees with it is refetched instead.
        let current = self.unread.unread_ids(&key);
        match self.cache.get(&key) {
            Some(entry) if entry.unread == current => {
                tracing::debug!("Cache hit for {}", key);
                let messages = entry.messages.clone();
                self.show(&key, messages);
                self.phase = Phase::Ready;
                return;
            }
            Some(_) => {
                tracing::debug!("Cached snapshot of {} is behind the unread state", key);
                self.cache.invalidate(&key);
            }
            None => {}
        }

        self.phase = Phase::Loading;
        self.fetch(&key);
    }

    /// Leave the current conversation.
    pub fn deselect(&mut self) {
        self.selected = None;
        self.displayed.clear();
        self.phase = Phase::Idle;
    }

    fn fetch(&mut self, key: &ConversationKey) {
        let thread = key.thread();
        let epoch = self.cache.epoch(key);
        if self.fetching.get(&thread) == Some(&epoch) {
            tracing::debug!("Fetch for {} already in flight", key);
            return;
        }
        self.fetching.insert(thread, epoch);

        let service = Arc::clone(&self.service);
        let key = key.clone();
        self.spawn(async move {
            let result = service.fetch_conversation(&key).await;
            ControllerEvent::ConversationLoaded { key, epoch, result }
        });
    }

    /// Put a server list on screen, merged with this thread's placeholders.
    fn show(&mut self, key: &ConversationKey, fetched: Vec<Message>) {
        let mut merged = self.outbox.reconcile(key, fetched);
        for msg in merged.iter_mut() {
            if self.unread.was_read_locally(&msg.id) {
                msg.mark_read();
            }
        }
        self.displayed = merged;
    }

    fn on_loaded(
        &mut self,
        key: ConversationKey,
        epoch: u64,
        result: Result<Vec<Message>, MessagingError>,
    ) {
        let thread = key.thread();
        if self.fetching.get(&thread) == Some(&epoch) {
            self.fetching.remove(&thread);
        }
        let current = self.cache.epoch(&key) == epoch;
        let selected = self.is_selected(&key);

        let mut messages = match result {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!("Loading {} failed: {}", key, err);
                if selected {
                    self.phase = Phase::Failed;
                    self.raise(&err);
                } else if err == MessagingError::Unauthorized {
                    self.raise(&err);
                }
                return;
            }
        };
        sort_chronologically(&mut messages);

        if !current {
            tracing::debug!("Discarding response for {} issued before invalidation", key);
            if selected && !self.fetching.contains_key(&thread) {
                self.fetch(&key);
            }
            return;
        }

        let unread = self.unread.recompute(&key, &messages);
        self.cache
            .put_if_current(&key, epoch, messages.clone(), unread);

        if !selected {
            tracing::debug!("Conversation {} no longer selected, not displaying", key);
            return;
        }
        self.show(&key, messages);
        self.phase = Phase::Ready;
    }

    /// Invalidate and refetch the selected conversation, and refetch the
    /// unread summary. Ignored while a fetch for it is still in flight.
    pub fn refresh(&mut self) {
        self.refresh_unread_counts();

        let Some(key) = self.selected.clone() else {
            return;
        };
        if self.fetching.contains_key(&key.thread()) {
            tracing::debug!("Refresh of {} skipped, fetch in flight", key);
            return;
        }
        self.cache.invalidate(&key);
        self.fetch(&key);
    }

    pub fn refresh_unread_counts(&mut self) {
        if self.unread_in_flight {
            return;
        }
        self.unread_in_flight = true;
        let service = Arc::clone(&self.service);
        let local = self.identity.id.clone();
        self.spawn(async move {
            ControllerEvent::UnreadLoaded(service.unread_summary(&local).await)
        });
    }

    pub fn load_conversations(&mut self) {
        let service = Arc::clone(&self.service);
        let local = self.identity.id.clone();
        self.spawn(async move {
            ControllerEvent::ConversationsLoaded(service.list_conversations(&local).await)
        });
    }

    // -- sending --

    /// Send `text` in the selected conversation.
    pub fn send(&mut self, text: &str) -> Result<MessageId, MessagingError> {
        let key = self
            .selected
            .clone()
            .ok_or_else(|| MessagingError::NotFound("no conversation selected".to_string()))?;
        self.send_to(&key, text)
    }

    /// Send `text` in `key`, showing it immediately as a pending placeholder.
    pub fn send_to(
        &mut self,
        key: &ConversationKey,
        text: &str,
    ) -> Result<MessageId, MessagingError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MessagingError::EmptyMessage);
        }

        // Never place the placeholder before anything already known.
        let mut created_at = self.clock.now();
        if self.is_selected(key) {
            if let Some(last) = self.displayed.last() {
                created_at = created_at.max(last.created_at);
            }
        }

        let placeholder = Outbox::placeholder(&self.identity, key, text, created_at);
        let local_id = placeholder.id.clone();
        if self.is_selected(key) {
            self.displayed.push(placeholder.clone());
        }
        self.outbox.push(key, placeholder.clone());
        self.cache.invalidate(key);

        self.spawn_send(key.clone(), &placeholder);
        Ok(local_id)
    }

    fn spawn_send(&self, key: ConversationKey, placeholder: &Message) {
        let outgoing = OutgoingMessage::from(placeholder);
        let local_id = placeholder.id.clone();
        let service = Arc::clone(&self.service);
        tracing::debug!("Sending {} to {}", local_id, key);
        self.spawn(async move {
            let result = service.send_message(&outgoing).await;
            ControllerEvent::SendFinished {
                key,
                local_id,
                result,
            }
        });
    }

    fn set_delivery(&mut self, key: &ConversationKey, id: &MessageId, delivery: Delivery) -> bool {
        if self.outbox.set_delivery(key, id, delivery.clone()).is_none() {
            return false;
        }
        if self.is_selected(key) {
            if let Some(msg) = self.displayed.iter_mut().find(|m| &m.id == id) {
                msg.delivery = delivery;
            }
        }
        true
    }

    fn on_send_finished(
        &mut self,
        key: ConversationKey,
        local_id: MessageId,
        result: Result<SendReceipt, MessagingError>,
    ) {
        match result {
            Ok(receipt) => {
                tracing::debug!("Send {} acknowledged (server id {:?})", local_id, receipt.id);
                self.set_delivery(&key, &local_id, Delivery::Sent { server_id: receipt.id });
                let delay = self.settings.refetch_delay;
                self.spawn(async move {
                    tokio::time::sleep(delay).await;
                    ControllerEvent::ReconcileDue { key }
                });
            }
            Err(err) => {
                tracing::warn!("Send {} failed: {}", local_id, err);
                self.set_delivery(
                    &key,
                    &local_id,
                    Delivery::Failed {
                        reason: err.to_string(),
                    },
                );
                self.raise(&err);
            }
        }
    }

    fn on_reconcile_due(&mut self, key: ConversationKey) {
        self.cache.invalidate(&key);
        if self.is_selected(&key) {
            self.fetch(&key);
        }
    }

    /// Resend a failed placeholder in the selected conversation.
    pub fn retry_failed(&mut self, id: &MessageId) -> Result<(), MessagingError> {
        let key = self
            .selected
            .clone()
            .ok_or_else(|| MessagingError::NotFound("no conversation selected".to_string()))?;
        let placeholder = match self.outbox.get(&key, id) {
            Some(msg) if msg.is_failed() => msg.clone(),
            _ => return Err(MessagingError::NotFound(format!("failed message {}", id))),
        };
        self.set_delivery(&key, id, Delivery::Pending);
        self.cache.invalidate(&key);
        self.spawn_send(key, &placeholder);
        Ok(())
    }

    /// Drop a failed placeholder from the selected conversation.
    pub fn discard_failed(&mut self, id: &MessageId) -> bool {
        let Some(key) = self.selected.clone() else {
            return false;
        };
        if !self.outbox.get(&key, id).is_some_and(Message::is_failed) {
            return false;
        }
        self.outbox.remove(&key, id);
        self.displayed.retain(|m| &m.id != id);
        true
    }

    // -- read state --

    /// Mark the selected conversation read: cleared locally right away,
    /// persisted after the configured delay. A failed persist is only
    /// logged.
    pub fn mark_read(&mut self) {
        let Some(key) = self.selected.clone() else {
            return;
        };
        let cleared = self.unread.mark_read(&key);
        let remote_role = self.identity.role.other();
        for msg in self.displayed.iter_mut().filter(|m| m.sender_role == remote_role) {
            msg.mark_read();
        }
        self.cache.invalidate(&key);
        tracing::debug!("Marked {} read locally ({} cleared)", key, cleared);

        let service = Arc::clone(&self.service);
        let delay = self.settings.mark_read_delay;
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            let result = service.mark_read(&key).await;
            ControllerEvent::ReadPersisted { key, result }
        });
    }

    fn on_unread_loaded(&mut self, result: Result<UnreadSummary, MessagingError>) {
        self.unread_in_flight = false;
        match result {
            Ok(summary) => {
                if summary.count != summary.messages.len() {
                    tracing::debug!(
                        "Unread count {} differs from {} listed messages",
                        summary.count,
                        summary.messages.len()
                    );
                }
                let changed = self
                    .unread
                    .reconcile_inbox(&self.identity.id, &summary.messages);
                for key in changed {
                    self.cache.invalidate(&key);
                    if self.is_selected(&key) {
                        self.fetch(&key);
                    }
                }
            }
            Err(err) => {
                tracing::warn!("Loading unread counts failed: {}", err);
                self.raise(&err);
            }
        }
    }

    fn on_inbound(&mut self, msg: Message) {
        let Some(key) = ConversationKey::for_message(&msg, &self.identity.id) else {
            tracing::debug!("Ignoring pushed message {} not addressed to us", msg.id);
            return;
        };
        self.cache.invalidate(&key);
        if self.unread.record_inbound(&key, &msg) {
            tracing::info!("New message from {} (job {})", key.remote, key.job);
        }

        if let Some(summary) = self
            .conversations
            .iter_mut()
            .find(|s| s.key(&self.identity.id) == key)
        {
            summary.last_message = Some(msg.content.clone());
            summary.last_message_at = Some(msg.created_at);
        }

        if self.is_selected(&key) {
            let duplicate = self.displayed.iter().any(|m| {
                m.id == msg.id || (msg.server_id().is_some() && m.server_id() == msg.server_id())
            });
            if !duplicate {
                self.displayed.push(msg);
                sort_chronologically(&mut self.displayed);
            }
        }
    }

    /// Apply the result of background work.
    pub fn handle(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::ConversationLoaded { key, epoch, result } => {
                self.on_loaded(key, epoch, result)
            }
            ControllerEvent::SendFinished {
                key,
                local_id,
                result,
            } => self.on_send_finished(key, local_id, result),
            ControllerEvent::ReconcileDue { key } => self.on_reconcile_due(key),
            ControllerEvent::ReadPersisted { key, result } => match result {
                Ok(()) => tracing::debug!("Read state of {} persisted", key),
                Err(err) => {
                    tracing::warn!("Persisting read state of {} failed (not retried): {}", key, err)
                }
            },
            ControllerEvent::UnreadLoaded(result) => self.on_unread_loaded(result),
            ControllerEvent::ConversationsLoaded(result) => match result {
                Ok(conversations) => self.conversations = conversations,
                Err(err) => {
                    tracing::warn!("Loading conversations failed: {}", err);
                    self.raise(&err);
                }
            },
            ControllerEvent::Inbound(msg) => self.on_inbound(msg),
        }
    }

    /// Drop all state tied to the session once the server rejected it. Only
    /// the re-authentication notice is left.
    pub fn end_session(&mut self) {
        tracing::info!("Session ended, dropping cached conversations");
        self.cache.clear();
        self.unread.clear();
        self.outbox.clear();
        self.fetching.clear();
        self.conversations.clear();
        self.unread_in_flight = false;
        self.notice = Some(MessagingError::Unauthorized.notice());
        self.deselect();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::messaging::clock::ManualClock;
    use crate::messaging::service::fake::FakeService;
    use crate::models::fixtures::{at, server_msg};
    use crate::models::Role;

    const EMP: (&str, Role) = ("emp", Role::Employer);
    const CAND: (&str, Role) = ("cand", Role::Candidate);

    struct Harness {
        clock: ManualClock,
        service: Arc<FakeService>,
        ctrl: Controller,
        rx: mpsc::UnboundedReceiver<ControllerEvent>,
    }

    fn harness(identity: Identity) -> Harness {
        let clock = ManualClock::new(at(100));
        let service = FakeService::new(clock.clone());
        let (ctrl, rx) = Controller::new(
            identity,
            service.clone(),
            Arc::new(clock.clone()),
            ControllerSettings::default(),
        );
        Harness {
            clock,
            service,
            ctrl,
            rx,
        }
    }

    impl Harness {
        /// Handle the next event.
        async fn step(&mut self) {
            let event = self.rx.recv().await.expect("event channel closed");
            self.ctrl.handle(event);
        }

        /// Handle events until nothing arrives for five (virtual) seconds.
        async fn pump(&mut self) {
            while let Ok(Some(event)) = timeout(Duration::from_secs(5), self.rx.recv()).await {
                self.ctrl.handle(event);
            }
        }
    }

    /// Let spawned tasks reach their first await point.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn contents(ctrl: &Controller) -> Vec<&str> {
        ctrl.messages().iter().map(|m| m.content.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_then_mark_read_persists_once_after_delay() {
        let mut h = harness(Identity::new("emp", Role::Employer));
        let key = h.ctrl.key_for("cand", "job-j");
        h.service.seed(
            &key,
            vec![
                server_msg("1", CAND, EMP, "job-j", "Hi", 0, false),
                server_msg("2", EMP, CAND, "job-j", "Hello", 1, true),
            ],
        );

        h.ctrl.select(key.clone());
        assert_eq!(h.ctrl.phase(), Phase::Loading);
        h.step().await;

        assert_eq!(h.ctrl.phase(), Phase::Ready);
        assert_eq!(contents(&h.ctrl), vec!["Hi", "Hello"]);
        assert_eq!(h.ctrl.unread_banner(), 1);
        assert_eq!(h.ctrl.unread().total(), 1);

        h.ctrl.mark_read();
        assert_eq!(h.ctrl.unread_banner(), 0);
        assert_eq!(h.ctrl.unread().total(), 0);
        assert!(h.ctrl.messages().iter().all(|m| m.read));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.service.mark_read_calls(), 0);

        h.pump().await;
        assert_eq!(h.service.mark_read_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reselect_within_window_uses_cache() {
        let mut h = harness(Identity::new("emp", Role::Employer));
        let a = h.ctrl.key_for("cand", "job-1");
        let b = h.ctrl.key_for("cand", "job-2");
        h.service
            .seed(&a, vec![server_msg("1", CAND, EMP, "job-1", "A", 0, false)]);

        h.ctrl.select(a.clone());
        h.step().await;
        h.ctrl.select(b.clone());
        h.step().await;
        assert_eq!(h.service.fetch_calls(), 2);

        h.ctrl.select(a.clone());
        settle().await;
        assert_eq!(h.service.fetch_calls(), 2);
        assert_eq!(h.ctrl.phase(), Phase::Ready);
        assert_eq!(contents(&h.ctrl), vec!["A"]);
        assert_eq!(h.ctrl.unread_banner(), 1);

        h.clock.advance(ChronoDuration::seconds(31));
        h.ctrl.select(a);
        settle().await;
        assert_eq!(h.service.fetch_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_does_not_overwrite_new_selection() {
        let mut h = harness(Identity::new("emp", Role::Employer));
        let a = h.ctrl.key_for("cand", "job-a");
        let b = h.ctrl.key_for("cand", "job-b");
        h.service
            .seed(&a, vec![server_msg("1", CAND, EMP, "job-a", "from A", 0, false)]);
        h.service
            .seed(&b, vec![server_msg("2", CAND, EMP, "job-b", "from B", 0, true)]);
        let gate = h.service.hold_fetch(&a);

        h.ctrl.select(a.clone());
        h.ctrl.select(b.clone());
        assert!(h.ctrl.messages().is_empty());
        h.step().await;
        assert_eq!(contents(&h.ctrl), vec!["from B"]);

        gate.notify_one();
        h.step().await;
        assert_eq!(h.ctrl.selected(), Some(&b));
        assert_eq!(contents(&h.ctrl), vec!["from B"]);
        // A's data is still valid for A.
        assert_eq!(h.ctrl.unread().count(&a), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_send_then_reconcile() {
        let mut h = harness(Identity::new("cand", Role::Candidate));
        let key = h.ctrl.key_for("emp", "job-j");

        h.ctrl.select(key.clone());
        h.step().await;
        assert!(h.ctrl.messages().is_empty());

        let local_id = assert_ok!(h.ctrl.send("  Interested!  "));
        assert_eq!(contents(&h.ctrl), vec!["Interested!"]);
        let shown = &h.ctrl.messages()[0];
        assert_eq!(shown.id, local_id);
        assert_eq!(shown.sender_id, "cand");
        assert_eq!(shown.delivery, Delivery::Pending);
        assert!(h.ctrl.is_sending());

        h.pump().await;
        assert_eq!(h.service.send_calls(), 1);
        assert!(!h.ctrl.is_sending());
        assert_eq!(contents(&h.ctrl), vec!["Interested!"]);
        let confirmed = &h.ctrl.messages()[0];
        assert!(!confirmed.is_placeholder());
        assert_eq!(confirmed.delivery, Delivery::Confirmed);
        // Own messages never count as unread.
        assert_eq!(h.ctrl.unread().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_without_receipt_id_matches_content() {
        let mut h = harness(Identity::new("cand", Role::Candidate));
        h.service.omit_receipt_id();
        let key = h.ctrl.key_for("emp", "job-j");

        h.ctrl.select(key);
        h.step().await;
        assert_ok!(h.ctrl.send("Interested!"));
        h.pump().await;

        assert_eq!(h.ctrl.messages().len(), 1);
        assert!(!h.ctrl.messages()[0].is_placeholder());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_send_is_rejected_locally() {
        let mut h = harness(Identity::new("cand", Role::Candidate));
        let key = h.ctrl.key_for("emp", "job-j");
        h.ctrl.select(key);
        h.step().await;

        let err = assert_err!(h.ctrl.send("   \n\t"));
        assert_eq!(err, MessagingError::EmptyMessage);
        settle().await;
        assert!(h.ctrl.messages().is_empty());
        assert!(!h.ctrl.is_sending());
        assert_eq!(h.service.send_calls(), 0);
        assert_eq!(h.service.fetch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_is_flagged_then_retried() {
        let mut h = harness(Identity::new("cand", Role::Candidate));
        let key = h.ctrl.key_for("emp", "job-j");
        h.ctrl.select(key);
        h.step().await;

        h.service
            .fail_sends(Some(MessagingError::Transport("connection reset".into())));
        let id = assert_ok!(h.ctrl.send("Hello?"));
        h.pump().await;

        assert!(h.ctrl.messages()[0].is_failed());
        let notice = h.ctrl.notice().unwrap();
        assert_eq!(notice.severity, Severity::Transient);
        assert!(h.ctrl.dismiss_notice());

        h.service.fail_sends(None);
        assert_ok!(h.ctrl.retry_failed(&id));
        assert_eq!(h.ctrl.messages()[0].delivery, Delivery::Pending);
        h.pump().await;

        assert_eq!(h.service.send_calls(), 2);
        assert_eq!(h.ctrl.messages().len(), 1);
        assert!(!h.ctrl.messages()[0].is_placeholder());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_failed_placeholder() {
        let mut h = harness(Identity::new("cand", Role::Candidate));
        let key = h.ctrl.key_for("emp", "job-j");
        h.ctrl.select(key);
        h.step().await;

        h.service
            .fail_sends(Some(MessagingError::Transport("offline".into())));
        let id = assert_ok!(h.ctrl.send("lost"));
        // Pending placeholders cannot be discarded.
        assert!(!h.ctrl.discard_failed(&id));
        h.pump().await;

        assert!(h.ctrl.discard_failed(&id));
        assert!(h.ctrl.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_is_single_flight() {
        let mut h = harness(Identity::new("emp", Role::Employer));
        let key = h.ctrl.key_for("cand", "job-j");
        let gate = h.service.hold_fetch(&key);

        h.ctrl.select(key);
        settle().await;
        h.ctrl.refresh();
        h.ctrl.refresh();
        settle().await;
        assert_eq!(h.service.fetch_calls(), 1);
        assert_eq!(h.service.unread_calls(), 1);

        gate.notify_one();
        h.service.release_all();
        h.pump().await;
        assert_eq!(h.ctrl.phase(), Phase::Ready);

        h.ctrl.refresh();
        settle().await;
        assert_eq!(h.service.fetch_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_started_before_send_is_superseded() {
        let mut h = harness(Identity::new("cand", Role::Candidate));
        let key = h.ctrl.key_for("emp", "job-j");
        let gate = h.service.hold_fetch(&key);

        h.ctrl.select(key);
        settle().await;
        assert_ok!(h.ctrl.send("Interested!"));
        h.service.release_all();
        gate.notify_one();
        h.pump().await;

        assert!(h.service.fetch_calls() >= 2);
        assert_eq!(h.ctrl.phase(), Phase::Ready);
        assert_eq!(contents(&h.ctrl), vec!["Interested!"]);
        assert!(!h.ctrl.messages()[0].is_placeholder());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_failure_is_persistent() {
        let mut h = harness(Identity::new("emp", Role::Employer));
        let key = h.ctrl.key_for("cand", "job-j");
        h.service.fail_fetches(Some(MessagingError::PermissionDenied(
            "messages disabled".into(),
        )));

        h.ctrl.select(key);
        h.step().await;

        assert_eq!(h.ctrl.phase(), Phase::Failed);
        assert_eq!(h.ctrl.notice().unwrap().severity, Severity::Persistent);
        assert!(!h.ctrl.dismiss_notice());

        // A later transient error does not hide it.
        h.service
            .fail_fetches(Some(MessagingError::Transport("timeout".into())));
        h.ctrl.refresh();
        h.pump().await;
        assert_eq!(h.ctrl.notice().unwrap().severity, Severity::Persistent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_session_drops_everything_but_the_notice() {
        let mut h = harness(Identity::new("emp", Role::Employer));
        let key = h.ctrl.key_for("cand", "job-j");
        h.service
            .seed(&key, vec![server_msg("1", CAND, EMP, "job-j", "Hi", 0, false)]);
        h.ctrl.select(key.clone());
        h.step().await;
        assert_eq!(h.ctrl.unread().total(), 1);

        h.ctrl.end_session();
        assert_eq!(h.ctrl.phase(), Phase::Idle);
        assert!(h.ctrl.messages().is_empty());
        assert_eq!(h.ctrl.unread().total(), 0);
        assert_eq!(
            h.ctrl.notice().unwrap().severity,
            Severity::Reauthenticate
        );

        // Nothing was kept in the cache.
        h.ctrl.select(key);
        assert_eq!(h.ctrl.phase(), Phase::Loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reselect_after_unread_summary_keeps_new_unread() {
        let mut h = harness(Identity::new("emp", Role::Employer));
        let a = h.ctrl.key_for("cand", "job-a");
        let b = h.ctrl.key_for("cand", "job-b");
        h.service
            .seed(&a, vec![server_msg("1", CAND, EMP, "job-a", "first", 0, false)]);

        h.ctrl.select(a.clone());
        h.step().await;
        h.ctrl.select(b);
        h.step().await;
        assert_eq!(h.ctrl.unread().total(), 1);

        h.service.seed(
            &a,
            vec![
                server_msg("1", CAND, EMP, "job-a", "first", 0, false),
                server_msg("2", CAND, EMP, "job-a", "second", 1, false),
            ],
        );
        h.ctrl.refresh_unread_counts();
        h.step().await;
        assert_eq!(h.ctrl.unread().total(), 2);

        // Still inside the freshness window, but the snapshot is outdated.
        h.ctrl.select(a.clone());
        assert_eq!(h.ctrl.unread().total(), 2);
        assert_eq!(h.ctrl.phase(), Phase::Loading);
        h.step().await;

        assert_eq!(h.service.fetch_calls(), 3);
        assert_eq!(contents(&h.ctrl), vec!["first", "second"]);
        assert_eq!(h.ctrl.unread_banner(), 2);
        assert_eq!(h.ctrl.unread().total(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_keeps_cache() {
        let mut h = harness(Identity::new("emp", Role::Employer));
        let a = h.ctrl.key_for("cand", "job-1");
        let b = h.ctrl.key_for("cand", "job-2");
        h.service
            .seed(&a, vec![server_msg("1", CAND, EMP, "job-1", "A", 0, true)]);

        h.ctrl.select(a.clone());
        h.step().await;
        h.service
            .fail_fetches(Some(MessagingError::Transport("timeout".into())));
        h.ctrl.select(b);
        h.step().await;
        assert_eq!(h.ctrl.phase(), Phase::Failed);

        h.ctrl.select(a);
        assert_eq!(h.ctrl.phase(), Phase::Ready);
        assert_eq!(contents(&h.ctrl), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_updates_unread_and_display() {
        let mut h = harness(Identity::new("emp", Role::Employer));
        let key = h.ctrl.key_for("cand", "job-j");
        let other = h.ctrl.key_for("cand2", "job-j");
        h.ctrl.select(key.clone());
        h.step().await;

        let events = h.ctrl.event_sender();
        let pushed = server_msg("10", CAND, EMP, "job-j", "ping", 5, false);
        events.send(ControllerEvent::Inbound(pushed.clone())).unwrap();
        events.send(ControllerEvent::Inbound(pushed)).unwrap();
        events
            .send(ControllerEvent::Inbound(server_msg(
                "11",
                ("cand2", Role::Candidate),
                EMP,
                "job-j",
                "elsewhere",
                6,
                false,
            )))
            .unwrap();
        events
            .send(ControllerEvent::Inbound(server_msg(
                "12", EMP, CAND, "job-j", "own echo", 7, false,
            )))
            .unwrap();
        h.pump().await;

        assert_eq!(contents(&h.ctrl), vec!["ping", "own echo"]);
        assert_eq!(h.ctrl.unread().count(&key), 1);
        assert_eq!(h.ctrl.unread().count(&other), 1);
        assert_eq!(h.ctrl.unread().for_remote("cand"), 1);
        assert_eq!(h.ctrl.unread().total(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_summary_seeds_tracker() {
        let mut h = harness(Identity::new("emp", Role::Employer));
        let a = h.ctrl.key_for("cand", "job-1");
        let b = h.ctrl.key_for("cand2", "job-2");
        h.service.seed(
            &a,
            vec![
                server_msg("1", CAND, EMP, "job-1", "x", 0, false),
                server_msg("2", CAND, EMP, "job-1", "y", 1, false),
            ],
        );
        h.service.seed(
            &b,
            vec![server_msg("3", ("cand2", Role::Candidate), EMP, "job-2", "z", 0, false)],
        );

        h.ctrl.refresh_unread_counts();
        h.ctrl.refresh_unread_counts();
        h.pump().await;

        assert_eq!(h.service.unread_calls(), 1);
        assert_eq!(h.ctrl.unread().count(&a), 2);
        assert_eq!(h.ctrl.unread().for_remote("cand2"), 1);
        assert_eq!(h.ctrl.unread().total(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_read_failure_keeps_local_state() {
        let mut h = harness(Identity::new("emp", Role::Employer));
        let key = h.ctrl.key_for("cand", "job-j");
        h.service
            .seed(&key, vec![server_msg("1", CAND, EMP, "job-j", "Hi", 0, false)]);
        h.service
            .fail_mark_read(Some(MessagingError::Transport("timeout".into())));

        h.ctrl.select(key.clone());
        h.step().await;
        h.ctrl.mark_read();
        h.pump().await;
        assert_eq!(h.service.mark_read_calls(), 1);
        assert!(h.ctrl.notice().is_none());

        // The server still reports it unread; the session keeps it read.
        h.ctrl.refresh();
        h.pump().await;
        assert_eq!(h.ctrl.unread().count(&key), 0);
        assert!(h.ctrl.messages()[0].read);
        assert_eq!(h.service.mark_read_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_displayed_order_is_chronological() {
        let mut h = harness(Identity::new("emp", Role::Employer));
        let key = h.ctrl.key_for("cand", "job-j");
        h.service.seed(
            &key,
            vec![
                server_msg("3", EMP, CAND, "job-j", "c", 30, true),
                server_msg("1", CAND, EMP, "job-j", "a", 10, true),
                server_msg("2", CAND, EMP, "job-j", "b", 20, true),
            ],
        );
        h.ctrl.select(key);
        h.step().await;

        assert_eq!(contents(&h.ctrl), vec!["a", "b", "c"]);
        assert!(h
            .ctrl
            .messages()
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at));
    }
}

//! Bot service: routing, workflow dispatch, and the long-poll run loop.
//!
//! One interaction is handled at a time, in arrival order. Handler errors are
//! logged and never abort the loop; only startup failures are fatal.

pub mod broadcast;
pub mod catalog;
pub mod docs;
pub mod router;
pub mod workflow;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::BotError;
use crate::storage::Db;
use crate::vk::longpoll::{next_action, LongPoller, LoopAction};
use crate::vk::{OutgoingMessage, VkApi, VkTransport};
use router::{classify, is_admin_menu, is_start, Interaction};
use workflow::Workflow;

const BOOTSTRAP_BACKOFF: Duration = Duration::from_secs(2);

pub struct BotService<T: VkTransport> {
    pub(crate) settings: Arc<Settings>,
    pub(crate) db: Arc<Db>,
    pub(crate) vk: Arc<T>,
    admins: HashSet<i64>,
}

impl<T: VkTransport> BotService<T> {
    #[must_use]
    pub fn new(settings: Arc<Settings>, db: Arc<Db>, vk: Arc<T>) -> Self {
        let admins = settings.admin_ids();
        Self {
            settings,
            db,
            vk,
            admins,
        }
    }

    #[must_use]
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    /// Send one message, reporting success. Failures are logged, never
    /// propagated; a single undeliverable reply must not stall the loop.
    pub(crate) async fn try_reply(&self, msg: OutgoingMessage) -> bool {
        match self.vk.send_message(&msg).await {
            Ok(()) => true,
            Err(err) => {
                warn!(peer_id = msg.peer_id, error = %err, "send failed");
                false
            }
        }
    }

    pub(crate) async fn reply(&self, peer_id: i64, text: &str) {
        self.try_reply(OutgoingMessage::text(peer_id, text)).await;
    }

    pub(crate) async fn reply_kb(&self, peer_id: i64, text: &str, keyboard: String) {
        self.try_reply(OutgoingMessage::text(peer_id, text).with_keyboard(keyboard))
            .await;
    }

    /// Handle one normalized interaction end to end.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failures; transport problems are
    /// absorbed by the reply helpers.
    pub async fn handle_interaction(&self, ix: &Interaction) -> Result<(), BotError> {
        let admin = self.is_admin(ix.user_id);
        self.db.upsert_user(ix.user_id, admin)?;

        // A pending workflow owns the whole turn, including button presses.
        if admin {
            if let Some(row) = self.db.get_admin_state(ix.user_id)? {
                match Workflow::decode(&row.state, &row.data) {
                    Some(wf) => {
                        if self.handle_workflow(ix, wf).await? {
                            return Ok(());
                        }
                    }
                    None => return self.discard_workflow(ix, &row.state).await,
                }
            }
            if is_admin_menu(&ix.text, ix.payload.as_ref()) {
                if let Some(cmd) = ix.payload.as_ref().and_then(|p| p.cmd.as_deref()) {
                    if self.handle_admin_payload(ix, cmd).await? {
                        return Ok(());
                    }
                }
                self.show_admin_menu(ix.peer_id).await;
                return Ok(());
            }
        }

        if is_start(&ix.text, ix.payload.as_ref()) {
            return self.handle_start(ix).await;
        }
        if let Some(p) = ix.payload.as_ref() {
            if p.cmd_is("check_sub") {
                return self.handle_check_subscription(ix).await;
            }
            if p.cmd_is("magnet") {
                if let Some(id) = p.id {
                    return self.handle_magnet_select(ix, id).await;
                }
            }
            if p.cmd_is("list") {
                return self.handle_list_page(ix, p.page.unwrap_or(0)).await;
            }
        }

        self.reply(ix.peer_id, "Напишите /start, чтобы получить материалы.")
            .await;
        Ok(())
    }
}

impl BotService<VkApi> {
    /// Run the ingestion loop until the process is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the poll HTTP client cannot be constructed
    /// at startup; once polling begins, every failure is absorbed by the
    /// loop itself.
    pub async fn run(&self) -> Result<(), BotError> {
        let poller = LongPoller::new(self.settings.longpoll_wait)?;
        loop {
            let session = match self.vk.get_long_poll_server().await {
                Ok(session) => session,
                Err(err) => {
                    error!(error = %err, "long poll bootstrap failed");
                    tokio::time::sleep(BOOTSTRAP_BACKOFF).await;
                    continue;
                }
            };
            info!(server = %session.server, "long poll session established");
            let mut cursor = session.ts.clone();

            loop {
                match next_action(poller.poll(&session, &cursor).await) {
                    LoopAction::Handle {
                        cursor: next,
                        updates,
                    } => {
                        cursor = next;
                        for update in &updates {
                            let Some(ix) = classify(update) else { continue };
                            if let Err(err) = self.handle_interaction(&ix).await {
                                error!(user_id = ix.user_id, error = %err, "interaction failed");
                            }
                        }
                    }
                    LoopAction::Resume { cursor: next } => cursor = next,
                    LoopAction::Resession => break,
                    LoopAction::Backoff(err) => {
                        warn!(error = %err, "poll failed, backing off");
                        tokio::time::sleep(BOOTSTRAP_BACKOFF).await;
                        break;
                    }
                }
            }
        }
    }
}

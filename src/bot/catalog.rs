//! User-facing catalog flows.
//!
//! Subscription gate, magnet listing with pagination, delivery with a
//! degradation ladder (attachment, then direct URL, then an apology), and
//! one-shot referral delivery.

use tracing::warn;

use crate::bot::router::Interaction;
use crate::bot::BotService;
use crate::error::BotError;
use crate::storage::{Magnet, MagnetKind, EVENT_MAGNET_SENT, EVENT_START, EVENT_SUBSCRIBED};
use crate::vk::keyboard::{button, payload, payload_with, render};
use crate::vk::{OutgoingMessage, VkTransport};

/// Zero-based index of the last page.
#[must_use]
pub fn last_page(total: i64, page_size: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total - 1) / page_size.max(1)
    }
}

/// Clamp a requested page into the valid range.
#[must_use]
pub fn clamp_page(page: i64, total: i64, page_size: i64) -> i64 {
    page.clamp(0, last_page(total, page_size))
}

impl<T: VkTransport> BotService<T> {
    /// Session start: log it, remember an attached referral, then either walk
    /// the subscription gate or show the catalog.
    pub(crate) async fn handle_start(&self, ix: &Interaction) -> Result<(), BotError> {
        self.db.log_event(ix.user_id, EVENT_START, None)?;
        if let Some(ref_tag) = ix.ref_tag.as_deref() {
            self.db.set_pending_ref(ix.user_id, Some(ref_tag))?;
        }
        if self.gate_subscription(ix.user_id).await? {
            if !self.deliver_pending(ix.user_id, ix.peer_id).await? {
                self.show_magnet_list(ix.peer_id, 0, true).await?;
            }
        } else {
            self.ask_to_subscribe(ix.peer_id).await;
        }
        Ok(())
    }

    /// "Check subscription" button.
    pub(crate) async fn handle_check_subscription(&self, ix: &Interaction) -> Result<(), BotError> {
        if self.gate_subscription(ix.user_id).await? {
            if !self.deliver_pending(ix.user_id, ix.peer_id).await? {
                self.show_magnet_list(ix.peer_id, 0, true).await?;
            }
        } else {
            self.reply_kb(
                ix.peer_id,
                "Пока не вижу вашей подписки. Подпишитесь и нажмите кнопку еще раз.",
                self.subscribe_keyboard(),
            )
            .await;
        }
        Ok(())
    }

    /// Magnet button press.
    pub(crate) async fn handle_magnet_select(
        &self,
        ix: &Interaction,
        id: i64,
    ) -> Result<(), BotError> {
        if !self.gate_subscription(ix.user_id).await? {
            self.ask_to_subscribe(ix.peer_id).await;
            return Ok(());
        }
        let magnet = self.db.get_magnet(id)?.filter(|m| m.is_active);
        let Some(magnet) = magnet else {
            self.reply(ix.peer_id, "Этот материал больше недоступен.").await;
            self.show_magnet_list(ix.peer_id, 0, false).await?;
            return Ok(());
        };
        self.send_magnet(ix.user_id, ix.peer_id, &magnet).await?;
        Ok(())
    }

    /// Pagination button press.
    pub(crate) async fn handle_list_page(&self, ix: &Interaction, page: i64) -> Result<(), BotError> {
        if !self.gate_subscription(ix.user_id).await? {
            self.ask_to_subscribe(ix.peer_id).await;
            return Ok(());
        }
        self.show_magnet_list(ix.peer_id, page, false).await
    }

    /// Deliver one magnet and log the send. Documents fall back to their
    /// direct URL when the attachment send is refused.
    pub(crate) async fn send_magnet(
        &self,
        user_id: i64,
        peer_id: i64,
        magnet: &Magnet,
    ) -> Result<(), BotError> {
        let mut text = magnet.title.clone();
        if !magnet.description.is_empty() {
            text.push('\n');
            text.push_str(&magnet.description);
        }

        let delivered = match (magnet.kind, magnet.attachment.as_deref()) {
            (MagnetKind::Doc, Some(attachment)) => {
                let msg =
                    OutgoingMessage::text(peer_id, text.clone()).with_attachment(attachment);
                if self.try_reply(msg).await {
                    true
                } else if let Some(url) = magnet.url.as_deref() {
                    // Attachment refused (access key expired, doc deleted):
                    // hand out the direct link instead.
                    self.reply(peer_id, &format!("{text}\n{url}")).await;
                    true
                } else {
                    false
                }
            }
            _ => match magnet.url.as_deref() {
                Some(url) => {
                    self.reply(peer_id, &format!("{text}\n{url}")).await;
                    true
                }
                None => false,
            },
        };

        if delivered {
            self.db.log_event(user_id, EVENT_MAGNET_SENT, Some(magnet.id))?;
        } else {
            warn!(magnet_id = magnet.id, "magnet has no deliverable content");
            self.reply(
                peer_id,
                "Не получилось отправить материал. Напишите нам, мы поможем.",
            )
            .await;
        }
        // The delivery itself carries no buttons; always leave the user a
        // way back to the catalog.
        self.send_refresh_prompt(peer_id).await;
        Ok(())
    }

    async fn send_refresh_prompt(&self, peer_id: i64) {
        let rows = vec![vec![button(
            "🔄 Обновить материалы",
            payload_with("list", "page", 0),
            "secondary",
        )]];
        self.reply_kb(
            peer_id,
            "Если хотите посмотреть другие материалы, нажмите «Обновить материалы».",
            render(rows, false),
        )
        .await;
    }

    /// One page of the active catalog with inline navigation.
    pub(crate) async fn show_magnet_list(
        &self,
        peer_id: i64,
        page: i64,
        greet: bool,
    ) -> Result<(), BotError> {
        let total = self.db.count_magnets(true)?;
        if total == 0 {
            self.reply(peer_id, "Материалов пока нет. Загляните позже!").await;
            return Ok(());
        }
        let page_size = self.settings.page_size;
        let page = clamp_page(page, total, page_size);
        let magnets = self.db.list_magnets(true, page * page_size, page_size)?;

        let mut rows: Vec<Vec<crate::vk::keyboard::Button>> = magnets
            .iter()
            .map(|m| vec![button(&m.title, payload_with("magnet", "id", m.id), "primary")])
            .collect();

        let mut nav = Vec::new();
        if page > 0 {
            nav.push(button("⬅️", payload_with("list", "page", page - 1), "secondary"));
        }
        if page < last_page(total, page_size) {
            nav.push(button("➡️", payload_with("list", "page", page + 1), "secondary"));
        }
        if !nav.is_empty() {
            rows.push(nav);
        }
        // Refresh always restarts from the first page.
        rows.push(vec![button("🔄 Обновить", payload_with("list", "page", 0), "secondary")]);

        let text = if greet {
            "Спасибо за подписку! Выберите материал:".to_string()
        } else {
            format!("Материалы (стр. {}):", page + 1)
        };
        self.reply_kb(peer_id, &text, render(rows, false)).await;
        Ok(())
    }

    pub(crate) async fn ask_to_subscribe(&self, peer_id: i64) {
        let text = format!(
            "Чтобы получить материалы, подпишитесь на сообщество:\nhttps://vk.com/club{}\n\nЗатем нажмите кнопку ниже.",
            self.settings.vk_group_id
        );
        self.reply_kb(peer_id, &text, self.subscribe_keyboard()).await;
    }

    fn subscribe_keyboard(&self) -> String {
        render(
            vec![vec![button(
                "Проверить подписку",
                payload("check_sub"),
                "positive",
            )]],
            false,
        )
    }

    /// One boundary membership call per entry point; transport failures count
    /// as "not a member". The result is persisted on the user record before
    /// any branching, with the subscription event logged only on the
    /// false-to-true transition.
    pub(crate) async fn gate_subscription(&self, user_id: i64) -> Result<bool, BotError> {
        let member = match self.vk.is_member(user_id).await {
            Ok(member) => member,
            Err(err) => {
                warn!(user_id, error = %err, "membership check failed");
                false
            }
        };
        let current = self
            .db
            .get_user(user_id)?
            .is_some_and(|u| u.is_subscribed);
        if member != current {
            self.db.set_subscribed(user_id, member)?;
            if member {
                self.db.log_event(user_id, EVENT_SUBSCRIBED, None)?;
            }
        }
        Ok(member)
    }

    /// Deliver the magnet behind a stored referral code, consuming the code
    /// whether or not it still resolves. Returns `true` when a magnet was
    /// delivered.
    async fn deliver_pending(&self, user_id: i64, peer_id: i64) -> Result<bool, BotError> {
        let pending = self.db.get_user(user_id)?.and_then(|u| u.pending_ref);
        let Some(ref_code) = pending else {
            return Ok(false);
        };
        self.db.set_pending_ref(user_id, None)?;

        let magnet = self.db.get_magnet_by_ref(&ref_code)?.filter(|m| m.is_active);
        let Some(magnet) = magnet else {
            warn!(user_id, ref_code = %ref_code, "pending referral no longer resolves");
            return Ok(false);
        };
        self.send_magnet(user_id, peer_id, &magnet).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_page_boundaries() {
        assert_eq!(last_page(0, 8), 0);
        assert_eq!(last_page(1, 8), 0);
        assert_eq!(last_page(8, 8), 0);
        assert_eq!(last_page(9, 8), 1);
        assert_eq!(last_page(20, 8), 2);
    }

    #[test]
    fn page_clamping() {
        assert_eq!(clamp_page(-1, 20, 8), 0);
        assert_eq!(clamp_page(5, 20, 8), 2);
        assert_eq!(clamp_page(1, 20, 8), 1);
    }
}

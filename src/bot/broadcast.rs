//! Broadcast fan-out.
//!
//! Sequential delivery with a short pause between sends to stay inside the
//! platform's per-second rate limit. One failed recipient never aborts the
//! run; the initiating admin gets a delivery count at the end.

use std::time::Duration;

use tracing::{info, warn};

use crate::bot::BotService;
use crate::error::BotError;
use crate::vk::{OutgoingMessage, VkTransport};

const SEND_PAUSE: Duration = Duration::from_millis(60);

impl<T: VkTransport> BotService<T> {
    pub(crate) async fn run_broadcast(
        &self,
        text: &str,
        attachment: Option<&str>,
        report_peer: i64,
    ) -> Result<(), BotError> {
        let recipients = self.db.list_all_users()?;
        info!(recipients = recipients.len(), "broadcast started");

        let mut sent = 0u64;
        for user_id in recipients {
            let mut msg = OutgoingMessage::text(user_id, text);
            if let Some(att) = attachment {
                msg = msg.with_attachment(att);
            }
            match self.vk.send_message(&msg).await {
                Ok(()) => sent += 1,
                Err(err) => {
                    // Blocked the bot, deleted the page, rate limited: skip.
                    warn!(user_id, error = %err, "broadcast send failed");
                }
            }
            tokio::time::sleep(SEND_PAUSE).await;
        }

        info!(sent, "broadcast finished");
        self.reply(
            report_peer,
            &format!("Рассылка завершена. Отправлено: {sent}"),
        )
        .await;
        Ok(())
    }
}

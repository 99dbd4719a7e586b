//! Admin workflow engine.
//!
//! Multi-turn conversational flows for catalog management: add, edit, delete,
//! referral link, broadcast, plus the stats view. Each admin has at most one
//! active workflow, persisted as a row (workflow name + scratch JSON) and
//! re-read at the top of every interaction; in memory the state is a closed
//! tagged enum so every transition only sees the fields valid for it.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::bot::router::{extract_id, Interaction};
use crate::bot::BotService;
use crate::error::BotError;
use crate::storage::{Magnet, MagnetKind, NewMagnet};
use crate::vk::keyboard::{button, payload, payload_with, render};
use crate::vk::{OutgoingMessage, VkTransport};

/// Field targeted by an edit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Title,
    Description,
    Attachment,
    Url,
    Active,
}

impl EditTarget {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Attachment => "attachment",
            Self::Url => "url",
            Self::Active => "active",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(Self::Title),
            "description" => Some(Self::Description),
            "attachment" => Some(Self::Attachment),
            "url" => Some(Self::Url),
            "active" => Some(Self::Active),
            _ => None,
        }
    }
}

/// Admin workflow state, one variant per conversational step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Workflow {
    AddTitle,
    AddDescription {
        title: String,
    },
    AddType {
        title: String,
        description: String,
    },
    AddFile {
        title: String,
        description: String,
    },
    AddUrl {
        title: String,
        description: String,
    },
    EditSelect,
    EditField {
        id: i64,
    },
    EditValue {
        id: i64,
        target: EditTarget,
    },
    DeleteSelect,
    LinkSelect,
    Broadcast,
    BroadcastConfirm {
        text: String,
        attachment: Option<String>,
    },
}

impl Workflow {
    /// Persisted workflow name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AddTitle => "ADMIN_ADD_TITLE",
            Self::AddDescription { .. } => "ADMIN_ADD_DESC",
            Self::AddType { .. } => "ADMIN_ADD_TYPE",
            Self::AddFile { .. } => "ADMIN_ADD_FILE",
            Self::AddUrl { .. } => "ADMIN_ADD_URL",
            Self::EditSelect => "ADMIN_EDIT_SELECT",
            Self::EditField { .. } => "ADMIN_EDIT_FIELD",
            Self::EditValue { .. } => "ADMIN_EDIT_VALUE",
            Self::DeleteSelect => "ADMIN_DELETE_SELECT",
            Self::LinkSelect => "ADMIN_LINK_SELECT",
            Self::Broadcast => "ADMIN_BROADCAST",
            Self::BroadcastConfirm { .. } => "ADMIN_BROADCAST_CONFIRM",
        }
    }

    /// Scratch blob persisted alongside the workflow name.
    #[must_use]
    pub fn to_scratch(&self) -> Value {
        match self {
            Self::AddTitle
            | Self::EditSelect
            | Self::DeleteSelect
            | Self::LinkSelect
            | Self::Broadcast => json!({}),
            Self::AddDescription { title } => json!({ "title": title }),
            Self::AddType { title, description } => {
                json!({ "title": title, "description": description })
            }
            Self::AddFile { title, description } => {
                json!({ "title": title, "description": description, "type": "DOC" })
            }
            Self::AddUrl { title, description } => {
                json!({ "title": title, "description": description, "type": "URL" })
            }
            Self::EditField { id } => json!({ "id": id }),
            Self::EditValue { id, target } => json!({ "id": id, "field": target.as_str() }),
            Self::BroadcastConfirm { text, attachment } => match attachment {
                Some(att) => json!({ "text": text, "attachment": att }),
                None => json!({ "text": text }),
            },
        }
    }

    /// Rebuild the typed state from a persisted row. `None` means the row is
    /// corrupt or from an unknown workflow and must be discarded.
    #[must_use]
    pub fn decode(state: &str, data: &str) -> Option<Self> {
        let data: Value = serde_json::from_str(data).unwrap_or_else(|_| json!({}));
        let str_field = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
        let id_field = || data.get("id").and_then(Value::as_i64);
        match state {
            "ADMIN_ADD_TITLE" => Some(Self::AddTitle),
            "ADMIN_ADD_DESC" => Some(Self::AddDescription {
                title: str_field("title")?,
            }),
            "ADMIN_ADD_TYPE" => Some(Self::AddType {
                title: str_field("title")?,
                description: str_field("description")?,
            }),
            "ADMIN_ADD_FILE" => Some(Self::AddFile {
                title: str_field("title")?,
                description: str_field("description")?,
            }),
            "ADMIN_ADD_URL" => Some(Self::AddUrl {
                title: str_field("title")?,
                description: str_field("description")?,
            }),
            "ADMIN_EDIT_SELECT" => Some(Self::EditSelect),
            "ADMIN_EDIT_FIELD" => Some(Self::EditField { id: id_field()? }),
            "ADMIN_EDIT_VALUE" => Some(Self::EditValue {
                id: id_field()?,
                target: EditTarget::parse(&str_field("field")?)?,
            }),
            "ADMIN_DELETE_SELECT" => Some(Self::DeleteSelect),
            "ADMIN_LINK_SELECT" => Some(Self::LinkSelect),
            "ADMIN_BROADCAST" => Some(Self::Broadcast),
            "ADMIN_BROADCAST_CONFIRM" => Some(Self::BroadcastConfirm {
                text: str_field("text").unwrap_or_default(),
                attachment: str_field("attachment"),
            }),
            _ => None,
        }
    }
}

/// Freshly minted referral code: epoch millis plus base36 entropy, unique
/// even within one clock tick (backed by the UNIQUE column).
#[must_use]
pub fn new_ref_code() -> String {
    format!(
        "m{}{}",
        Utc::now().timestamp_millis(),
        to_base36(rand::random::<u32>())
    )
}

/// Structured commands that belong to a turn inside a workflow, as opposed to
/// the fresh `admin_*` menu commands that start one.
fn in_flow_command(cmd: &str) -> bool {
    matches!(
        cmd,
        "admin_add_type"
            | "admin_edit_select"
            | "admin_edit_field"
            | "admin_edit_active"
            | "admin_delete_select"
            | "admin_link_select"
            | "admin_broadcast_send"
            | "admin_broadcast_cancel"
    )
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

impl<T: VkTransport> BotService<T> {
    pub(crate) fn put_workflow(&self, user_id: i64, wf: &Workflow) -> Result<(), BotError> {
        self.db
            .set_admin_state(user_id, wf.name(), &wf.to_scratch().to_string())
    }

    /// Route one interaction through the active workflow. Returns `false`
    /// only when the turn was not consumed and ordinary routing should run.
    pub(crate) async fn handle_workflow(
        &self,
        ix: &Interaction,
        wf: Workflow,
    ) -> Result<bool, BotError> {
        // A fresh menu command starts over instead of being swallowed by the
        // current state's re-prompt.
        if let Some(cmd) = ix.payload.as_ref().and_then(|p| p.cmd.as_deref()) {
            if cmd.starts_with("admin_") && !in_flow_command(cmd) {
                return Ok(false);
            }
        }
        match wf {
            Workflow::AddTitle => self.wf_add_title(ix).await,
            Workflow::AddDescription { title } => self.wf_add_description(ix, title).await,
            Workflow::AddType { title, description } => {
                self.wf_add_type(ix, title, description).await
            }
            Workflow::AddFile { title, description } => {
                self.wf_add_file(ix, title, description).await
            }
            Workflow::AddUrl { title, description } => {
                self.wf_add_url(ix, title, description).await
            }
            Workflow::EditSelect => self.wf_edit_select(ix).await,
            Workflow::EditField { id } => self.wf_edit_field(ix, id).await,
            Workflow::EditValue { id, target } => self.wf_edit_value(ix, id, target).await,
            Workflow::DeleteSelect => self.wf_delete_select(ix).await,
            Workflow::LinkSelect => self.wf_link_select(ix).await,
            Workflow::Broadcast => self.wf_broadcast_collect(ix).await,
            Workflow::BroadcastConfirm { text, attachment } => {
                self.wf_broadcast_confirm(ix, text, attachment).await
            }
        }
    }

    async fn wf_add_title(&self, ix: &Interaction) -> Result<bool, BotError> {
        if ix.text.is_empty() {
            self.reply(ix.peer_id, "Введите название материала.").await;
            return Ok(true);
        }
        self.put_workflow(
            ix.user_id,
            &Workflow::AddDescription {
                title: ix.text.clone(),
            },
        )?;
        self.reply(ix.peer_id, "Кратко опишите материал (или отправьте «-»).")
            .await;
        Ok(true)
    }

    async fn wf_add_description(&self, ix: &Interaction, title: String) -> Result<bool, BotError> {
        if ix.text.is_empty() {
            self.reply(ix.peer_id, "Кратко опишите материал (или отправьте «-»).")
                .await;
            return Ok(true);
        }
        let description = if ix.text == "-" {
            String::new()
        } else {
            ix.text.clone()
        };
        self.put_workflow(ix.user_id, &Workflow::AddType { title, description })?;

        let rows = vec![vec![
            button("Файл", payload_with("admin_add_type", "type", "DOC"), "primary"),
            button(
                "Ссылка",
                payload_with("admin_add_type", "type", "URL"),
                "secondary",
            ),
        ]];
        self.reply_kb(ix.peer_id, "Выберите тип материала:", render(rows, true))
            .await;
        Ok(true)
    }

    async fn wf_add_type(
        &self,
        ix: &Interaction,
        title: String,
        description: String,
    ) -> Result<bool, BotError> {
        let kind = ix
            .payload
            .as_ref()
            .filter(|p| p.cmd_is("admin_add_type"))
            .and_then(|p| p.kind.as_deref());
        let Some(kind) = kind else {
            self.reply(ix.peer_id, "Выберите тип через кнопки ниже.").await;
            return Ok(true);
        };
        if kind.eq_ignore_ascii_case("DOC") {
            self.put_workflow(ix.user_id, &Workflow::AddFile { title, description })?;
            self.reply(
                ix.peer_id,
                "Отправьте файл документом (PDF/архив/видео до 200 МБ).",
            )
            .await;
        } else {
            self.put_workflow(ix.user_id, &Workflow::AddUrl { title, description })?;
            self.reply(ix.peer_id, "Пришлите ссылку на материал.").await;
        }
        Ok(true)
    }

    async fn wf_add_file(
        &self,
        ix: &Interaction,
        title: String,
        description: String,
    ) -> Result<bool, BotError> {
        let Some(info) = self.resolve_doc(&ix.message).await else {
            self.reply(ix.peer_id, "Не вижу файла. Отправьте материал документом.")
                .await;
            return Ok(true);
        };
        let id = self.db.create_magnet(&NewMagnet {
            title,
            description,
            kind: MagnetKind::Doc,
            attachment: Some(info.attachment.clone()),
            url: info.url,
            ref_code: new_ref_code(),
        })?;
        self.db.clear_admin_state(ix.user_id)?;
        self.reply(ix.peer_id, &format!("Материал добавлен. ID: {id}"))
            .await;

        // Echo the stored attachment back so the admin sees what users get.
        let check = OutgoingMessage::text(
            ix.peer_id,
            "Проверка выдачи файла (должен прийти документ).",
        )
        .with_attachment(info.attachment);
        if !self.try_reply(check).await {
            self.reply(
                ix.peer_id,
                "Проверка выдачи не прошла. Попробуйте переотправить файл.",
            )
            .await;
        }
        Ok(true)
    }

    async fn wf_add_url(
        &self,
        ix: &Interaction,
        title: String,
        description: String,
    ) -> Result<bool, BotError> {
        if ix.text.is_empty() {
            self.reply(ix.peer_id, "Пришлите ссылку на материал.").await;
            return Ok(true);
        }
        let id = self.db.create_magnet(&NewMagnet {
            title,
            description,
            kind: MagnetKind::Url,
            attachment: None,
            url: Some(ix.text.clone()),
            ref_code: new_ref_code(),
        })?;
        self.db.clear_admin_state(ix.user_id)?;
        self.reply(ix.peer_id, &format!("Материал добавлен. ID: {id}"))
            .await;
        Ok(true)
    }

    async fn wf_edit_select(&self, ix: &Interaction) -> Result<bool, BotError> {
        let Some(id) = extract_id(ix.payload.as_ref(), &ix.text, "admin_edit_select") else {
            self.reply(ix.peer_id, "Выберите материал кнопкой ниже или введите его ID.")
                .await;
            return Ok(true);
        };
        self.put_workflow(ix.user_id, &Workflow::EditField { id })?;
        self.show_edit_field_menu(ix.peer_id).await;
        Ok(true)
    }

    async fn wf_edit_field(&self, ix: &Interaction, id: i64) -> Result<bool, BotError> {
        let target = ix
            .payload
            .as_ref()
            .filter(|p| p.cmd_is("admin_edit_field"))
            .and_then(|p| p.field.as_deref())
            .and_then(EditTarget::parse);
        let Some(target) = target else {
            self.reply(ix.peer_id, "Выберите поле для редактирования.").await;
            return Ok(true);
        };
        self.put_workflow(ix.user_id, &Workflow::EditValue { id, target })?;

        match target {
            EditTarget::Attachment => {
                self.reply(ix.peer_id, "Отправьте новый файл документом.").await;
            }
            EditTarget::Active => {
                let rows = vec![vec![
                    button(
                        "Активен",
                        payload_with("admin_edit_active", "value", 1),
                        "positive",
                    ),
                    button(
                        "Скрыт",
                        payload_with("admin_edit_active", "value", 0),
                        "negative",
                    ),
                ]];
                self.reply_kb(ix.peer_id, "Выберите статус:", render(rows, true))
                    .await;
            }
            _ => self.reply(ix.peer_id, "Введите новое значение.").await,
        }
        Ok(true)
    }

    async fn wf_edit_value(
        &self,
        ix: &Interaction,
        id: i64,
        target: EditTarget,
    ) -> Result<bool, BotError> {
        let Some(mut magnet) = self.db.get_magnet(id)? else {
            // Deleted mid-flow by another admin: abort, clear, report.
            self.db.clear_admin_state(ix.user_id)?;
            self.reply(ix.peer_id, "Материал не найден.").await;
            return Ok(true);
        };
        if let Some(reprompt) = self.apply_edit(ix, target, &mut magnet).await {
            self.reply(ix.peer_id, reprompt).await;
            return Ok(true);
        }
        self.db.update_magnet(&magnet)?;
        self.db.clear_admin_state(ix.user_id)?;
        self.reply(ix.peer_id, "Готово. Материал обновлен.").await;
        Ok(true)
    }

    /// Apply one field edit in place. Returns a re-prompt message when the
    /// input does not fit the targeted field (no state change).
    async fn apply_edit(
        &self,
        ix: &Interaction,
        target: EditTarget,
        magnet: &mut Magnet,
    ) -> Option<&'static str> {
        match target {
            EditTarget::Attachment => {
                let Some(info) = self.resolve_doc(&ix.message).await else {
                    return Some("Не вижу файла. Отправьте новый файл документом.");
                };
                magnet.attachment = Some(info.attachment);
                magnet.url = info.url;
                magnet.kind = MagnetKind::Doc;
            }
            EditTarget::Url => {
                if ix.text.is_empty() {
                    return Some("Введите ссылку.");
                }
                magnet.url = Some(ix.text.clone());
                magnet.kind = MagnetKind::Url;
            }
            EditTarget::Title => {
                if ix.text.is_empty() {
                    return Some("Введите название.");
                }
                magnet.title = ix.text.clone();
            }
            EditTarget::Description => {
                magnet.description = if ix.text == "-" {
                    String::new()
                } else {
                    ix.text.clone()
                };
            }
            EditTarget::Active => {
                let value = ix
                    .payload
                    .as_ref()
                    .filter(|p| p.cmd_is("admin_edit_active"))
                    .and_then(|p| p.value);
                let Some(value) = value else {
                    return Some("Выберите статус кнопкой.");
                };
                magnet.is_active = value == 1;
            }
        }
        None
    }

    async fn wf_delete_select(&self, ix: &Interaction) -> Result<bool, BotError> {
        let Some(id) = extract_id(ix.payload.as_ref(), &ix.text, "admin_delete_select") else {
            self.reply(ix.peer_id, "Выберите материал кнопкой ниже или введите его ID.")
                .await;
            return Ok(true);
        };
        self.db.delete_magnet(id)?;
        self.db.clear_admin_state(ix.user_id)?;
        self.reply(ix.peer_id, "Материал удален.").await;
        Ok(true)
    }

    async fn wf_link_select(&self, ix: &Interaction) -> Result<bool, BotError> {
        let Some(id) = extract_id(ix.payload.as_ref(), &ix.text, "admin_link_select") else {
            self.reply(ix.peer_id, "Выберите материал кнопкой ниже или введите его ID.")
                .await;
            return Ok(true);
        };
        let magnet = self.db.get_magnet(id)?;
        self.db.clear_admin_state(ix.user_id)?;
        let Some(magnet) = magnet else {
            self.reply(ix.peer_id, "Материал не найден.").await;
            return Ok(true);
        };
        let link = format!(
            "https://vk.com/club{}?ref={}",
            self.settings.vk_group_id, magnet.ref_code
        );
        self.reply(
            ix.peer_id,
            &format!("Уникальная ссылка для «{}»:\n{link}", magnet.title),
        )
        .await;
        Ok(true)
    }

    async fn wf_broadcast_collect(&self, ix: &Interaction) -> Result<bool, BotError> {
        let attachment = self
            .resolve_doc(&ix.message)
            .await
            .map(|info| info.attachment);
        if ix.text.is_empty() && attachment.is_none() {
            self.reply(ix.peer_id, "Отправьте текст и/или файл для рассылки.")
                .await;
            return Ok(true);
        }
        self.put_workflow(
            ix.user_id,
            &Workflow::BroadcastConfirm {
                text: ix.text.clone(),
                attachment,
            },
        )?;
        let rows = vec![vec![
            button("Отправить", payload("admin_broadcast_send"), "positive"),
            button("Отмена", payload("admin_broadcast_cancel"), "negative"),
        ]];
        self.reply_kb(ix.peer_id, "Подтвердите рассылку:", render(rows, true))
            .await;
        Ok(true)
    }

    async fn wf_broadcast_confirm(
        &self,
        ix: &Interaction,
        text: String,
        attachment: Option<String>,
    ) -> Result<bool, BotError> {
        let cmd = ix.payload.as_ref().and_then(|p| p.cmd.as_deref());
        match cmd {
            Some("admin_broadcast_cancel") => {
                self.db.clear_admin_state(ix.user_id)?;
                self.reply(ix.peer_id, "Рассылка отменена.").await;
            }
            Some("admin_broadcast_send") => {
                self.db.clear_admin_state(ix.user_id)?;
                self.run_broadcast(&text, attachment.as_deref(), ix.peer_id)
                    .await?;
            }
            _ => {
                self.reply(ix.peer_id, "Выберите «Отправить» или «Отмена».").await;
            }
        }
        Ok(true)
    }

    /// Fresh `admin_*` menu command. Returns `false` for unknown commands.
    pub(crate) async fn handle_admin_payload(
        &self,
        ix: &Interaction,
        cmd: &str,
    ) -> Result<bool, BotError> {
        match cmd {
            "admin_add" => {
                self.put_workflow(ix.user_id, &Workflow::AddTitle)?;
                self.reply(ix.peer_id, "Введите название материала.").await;
                Ok(true)
            }
            "admin_edit" => {
                self.start_select_flow(
                    ix,
                    Workflow::EditSelect,
                    "Выберите материал для редактирования:",
                    "admin_edit_select",
                )
                .await
            }
            "admin_delete" => {
                self.start_select_flow(
                    ix,
                    Workflow::DeleteSelect,
                    "Выберите материал для удаления:",
                    "admin_delete_select",
                )
                .await
            }
            "admin_link" => {
                self.start_select_flow(
                    ix,
                    Workflow::LinkSelect,
                    "Выберите материал для ссылки:",
                    "admin_link_select",
                )
                .await
            }
            "admin_stats" => {
                self.show_stats(ix.peer_id).await?;
                Ok(true)
            }
            "admin_broadcast" => {
                self.put_workflow(ix.user_id, &Workflow::Broadcast)?;
                self.reply(ix.peer_id, "Отправьте текст и/или файл для рассылки.")
                    .await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Start a selection workflow, refusing when the catalog is empty.
    async fn start_select_flow(
        &self,
        ix: &Interaction,
        wf: Workflow,
        title: &str,
        cmd: &str,
    ) -> Result<bool, BotError> {
        if self.db.count_magnets(false)? == 0 {
            self.reply(ix.peer_id, "Материалов пока нет.").await;
            return Ok(true);
        }
        self.put_workflow(ix.user_id, &wf)?;
        self.show_admin_magnet_list(ix.peer_id, title, cmd).await?;
        Ok(true)
    }

    async fn show_admin_magnet_list(
        &self,
        peer_id: i64,
        title: &str,
        cmd: &str,
    ) -> Result<(), BotError> {
        let magnets = self.db.list_magnets(false, 0, 20)?;
        let rows = magnets
            .iter()
            .map(|m| {
                vec![button(
                    &format!("{}. {}", m.id, m.title),
                    payload_with(cmd, "id", m.id),
                    "primary",
                )]
            })
            .collect();
        self.reply_kb(peer_id, title, render(rows, false)).await;
        Ok(())
    }

    async fn show_edit_field_menu(&self, peer_id: i64) {
        let rows = vec![
            vec![
                button(
                    "Название",
                    payload_with("admin_edit_field", "field", "title"),
                    "primary",
                ),
                button(
                    "Описание",
                    payload_with("admin_edit_field", "field", "description"),
                    "secondary",
                ),
            ],
            vec![
                button(
                    "Файл",
                    payload_with("admin_edit_field", "field", "attachment"),
                    "primary",
                ),
                button(
                    "Ссылка",
                    payload_with("admin_edit_field", "field", "url"),
                    "secondary",
                ),
            ],
            vec![button(
                "Активность",
                payload_with("admin_edit_field", "field", "active"),
                "secondary",
            )],
        ];
        self.reply_kb(peer_id, "Что изменить?", render(rows, false)).await;
    }

    pub(crate) async fn show_admin_menu(&self, peer_id: i64) {
        let rows = vec![
            vec![
                button("➕ Добавить", payload("admin_add"), "positive"),
                button("✏️ Редактировать", payload("admin_edit"), "primary"),
            ],
            vec![
                button("🗑 Удалить", payload("admin_delete"), "negative"),
                button("🔗 Ссылка", payload("admin_link"), "secondary"),
            ],
            vec![
                button("📊 Статистика", payload("admin_stats"), "secondary"),
                button("📣 Рассылка", payload("admin_broadcast"), "primary"),
            ],
        ];
        self.reply_kb(peer_id, "Админ-панель. Выберите действие:", render(rows, false))
            .await;
    }

    async fn show_stats(&self, peer_id: i64) -> Result<(), BotError> {
        let stats = self.db.get_stats()?;
        let per_magnet = self.db.get_magnet_stats()?;

        let mut text = format!(
            "Статистика:\nСтартов всего: {}\nУникальных стартов: {}\nПодписались (уник.): {}\n\nСкачивания по материалам:\n",
            stats.starts_total, stats.starts_unique, stats.subscribed_unique
        );
        if per_magnet.is_empty() {
            text.push_str("Нет данных");
        } else {
            for ms in per_magnet {
                text.push_str(&format!("{}. {} — {}\n", ms.id, ms.title, ms.downloads));
            }
        }
        self.reply(peer_id, &text).await;
        Ok(())
    }

    /// Recovery for a persisted row the engine cannot decode.
    pub(crate) async fn discard_workflow(&self, ix: &Interaction, state: &str) -> Result<(), BotError> {
        warn!(user_id = ix.user_id, state, "discarding undecodable workflow state");
        self.db.clear_admin_state(ix.user_id)?;
        self.show_admin_menu(ix.peer_id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_codes_are_unique_within_a_tick() {
        let codes: std::collections::HashSet<String> =
            (0..100).map(|_| new_ref_code()).collect();
        assert_eq!(codes.len(), 100);
        assert!(codes.iter().all(|c| c.starts_with('m')));
    }

    #[test]
    fn base36_digits() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn scratch_roundtrip() {
        let states = [
            Workflow::AddTitle,
            Workflow::AddDescription {
                title: "Guide".to_string(),
            },
            Workflow::AddFile {
                title: "Guide".to_string(),
                description: String::new(),
            },
            Workflow::EditValue {
                id: 7,
                target: EditTarget::Active,
            },
            Workflow::BroadcastConfirm {
                text: "hi".to_string(),
                attachment: Some("doc1_2".to_string()),
            },
        ];
        for wf in states {
            let decoded = Workflow::decode(wf.name(), &wf.to_scratch().to_string())
                .expect("roundtrip decodes");
            assert_eq!(decoded, wf);
        }
    }

    #[test]
    fn scratch_uses_flat_keys() {
        let wf = Workflow::AddUrl {
            title: "Guide".to_string(),
            description: "d".to_string(),
        };
        let scratch = wf.to_scratch();
        assert_eq!(scratch["title"], "Guide");
        assert_eq!(scratch["type"], "URL");
    }

    #[test]
    fn corrupt_scratch_is_rejected() {
        assert!(Workflow::decode("ADMIN_EDIT_VALUE", "{}").is_none());
        assert!(Workflow::decode("ADMIN_EDIT_VALUE", "{\"id\":1,\"field\":\"bogus\"}").is_none());
        assert!(Workflow::decode("SOMETHING_ELSE", "{}").is_none());
        assert!(Workflow::decode("ADMIN_ADD_DESC", "not json").is_none());
    }
}

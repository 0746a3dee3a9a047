//! JSON-lines request/response framing.
//!
//! One request object per line, tagged by `op`, optionally carrying an `id`
//! that is echoed back:
//!
//! ```text
//! {"id":1,"op":"send_message","conversation_id":"…","sender_id":"…","content":"hi"}
//! {"id":1,"ok":true,"result":{…}}
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{Message, Role};
use crate::services::{human_readable_size, is_previewable, FanOutHandle, FileUpload};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct FilePayload {
    pub file_name: String,
    #[serde(default)]
    pub file_type: String,
    pub data_base64: String,
}

impl FilePayload {
    fn decode(self) -> AppResult<FileUpload> {
        let data = STANDARD
            .decode(self.data_base64.as_bytes())
            .map_err(|e| AppError::validation(format!("file data is not valid base64: {e}")))?;
        Ok(FileUpload::new(self.file_name, self.file_type, Bytes::from(data)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    SendMessage {
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
    },
    SendFile {
        conversation_id: Uuid,
        sender_id: Uuid,
        file: FilePayload,
    },
    SendFiles {
        conversation_id: Uuid,
        sender_id: Uuid,
        files: Vec<FilePayload>,
    },
    ListConversations {
        user_id: Uuid,
        role: Role,
    },
    ListMessages {
        conversation_id: Uuid,
    },
    CreateDirectConversation {
        user_a: Uuid,
        user_b: Uuid,
    },
    CreateGroupConversation {
        creator: Uuid,
        name: String,
        #[serde(default)]
        description: String,
        member_ids: Vec<Uuid>,
    },
    DeleteMessage {
        message_id: Uuid,
    },
    MarkConversationRead {
        conversation_id: Uuid,
        user_id: Uuid,
    },
    ListUsers,
    ListNotifications {
        user_id: Uuid,
    },
    UnreadNotificationCount {
        user_id: Uuid,
    },
    MarkNotificationRead {
        user_id: Uuid,
        notification_id: Uuid,
    },
    MarkAllNotificationsRead {
        user_id: Uuid,
    },
    DeleteNotification {
        user_id: Uuid,
        notification_id: Uuid,
    },
    ClearNotifications {
        user_id: Uuid,
    },
    Metrics,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(flatten)]
    request: Request,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ErrorBody>,
}

impl Response {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Option<Value>, error: &AppError) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error_body(error)),
        }
    }
}

fn error_body(error: &AppError) -> ErrorBody {
    ErrorBody {
        code: error.status_code(),
        message: error.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct DeliveryView {
    delivered: usize,
    failed: usize,
}

/// A message plus the display hints the UI needs for attachments. Send
/// operations also report how its notifications were delivered.
#[derive(Debug, Serialize)]
struct MessageView {
    #[serde(flatten)]
    message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previewable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delivery: Option<DeliveryView>,
}

impl MessageView {
    /// Waits for the message's fan-out so the response reflects it.
    async fn delivered(message: Message, fan_out: FanOutHandle) -> Self {
        let report = fan_out.wait().await;
        let mut view = Self::from(message);
        view.delivery = Some(DeliveryView {
            delivered: report.delivered.len(),
            failed: report.failed.len(),
        });
        view
    }
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        let size_label = message
            .attachment
            .as_ref()
            .map(|a| human_readable_size(a.file_size));
        let previewable = message
            .attachment
            .as_ref()
            .map(|a| is_previewable(&a.file_type));
        Self {
            message,
            size_label,
            previewable,
            delivery: None,
        }
    }
}

fn to_json<T: Serialize>(value: T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(format!("encode response: {e}")))
}

pub async fn handle(state: &AppState, request: Request) -> AppResult<Value> {
    let messaging = &state.messaging;
    match request {
        Request::SendMessage {
            conversation_id,
            sender_id,
            content,
        } => {
            let (message, fan_out) = messaging
                .send_message_tracked(conversation_id, sender_id, &content)
                .await?;
            to_json(MessageView::delivered(message, fan_out).await)
        }
        Request::SendFile {
            conversation_id,
            sender_id,
            file,
        } => {
            let upload = file.decode()?;
            let (message, fan_out) = messaging
                .send_file_tracked(conversation_id, sender_id, &upload)
                .await?;
            to_json(MessageView::delivered(message, fan_out).await)
        }
        Request::SendFiles {
            conversation_id,
            sender_id,
            files,
        } => {
            let decoded: Vec<AppResult<FileUpload>> =
                files.into_iter().map(FilePayload::decode).collect();
            let uploads: Vec<FileUpload> = decoded
                .iter()
                .filter_map(|d| d.as_ref().ok().cloned())
                .collect();
            let mut sent = messaging
                .send_files_tracked(conversation_id, sender_id, &uploads)
                .await
                .into_iter();

            let mut outcomes = Vec::with_capacity(decoded.len());
            for upload in decoded {
                let outcome = match upload {
                    Ok(_) => sent.next().unwrap_or_else(|| {
                        Err(AppError::Internal("missing upload outcome".into()))
                    }),
                    Err(e) => Err(e),
                };
                outcomes.push(match outcome {
                    Ok((message, fan_out)) => {
                        let result = to_json(MessageView::delivered(message, fan_out).await)?;
                        serde_json::json!({ "ok": true, "result": result })
                    }
                    Err(e) => serde_json::json!({ "ok": false, "error": error_body(&e) }),
                });
            }
            Ok(Value::Array(outcomes))
        }
        Request::ListConversations { user_id, role } => {
            to_json(messaging.list_conversations(user_id, role).await?)
        }
        Request::ListMessages { conversation_id } => {
            let views: Vec<MessageView> = messaging
                .list_messages(conversation_id)
                .await?
                .into_iter()
                .map(MessageView::from)
                .collect();
            to_json(views)
        }
        Request::CreateDirectConversation { user_a, user_b } => {
            to_json(messaging.create_direct_conversation(user_a, user_b).await?)
        }
        Request::CreateGroupConversation {
            creator,
            name,
            description,
            member_ids,
        } => to_json(
            messaging
                .create_group_conversation(creator, &name, &description, &member_ids)
                .await?,
        ),
        Request::DeleteMessage { message_id } => {
            messaging.delete_message(message_id).await?;
            Ok(serde_json::json!({ "deleted": message_id }))
        }
        Request::MarkConversationRead {
            conversation_id,
            user_id,
        } => to_json(
            messaging
                .mark_conversation_read(conversation_id, user_id)
                .await?,
        ),
        Request::ListUsers => to_json(state.directory.list_users().await?),
        Request::ListNotifications { user_id } => {
            to_json(state.notifications.list_for_user(user_id).await?)
        }
        Request::UnreadNotificationCount { user_id } => Ok(serde_json::json!({
            "unread": state.notifications.unread_count(user_id).await?
        })),
        Request::MarkNotificationRead {
            user_id,
            notification_id,
        } => to_json(
            state
                .notifications
                .mark_read(user_id, notification_id)
                .await?,
        ),
        Request::MarkAllNotificationsRead { user_id } => Ok(serde_json::json!({
            "updated": state.notifications.mark_all_read(user_id).await?
        })),
        Request::DeleteNotification {
            user_id,
            notification_id,
        } => {
            state.notifications.delete(user_id, notification_id).await?;
            Ok(serde_json::json!({ "deleted": notification_id }))
        }
        Request::ClearNotifications { user_id } => Ok(serde_json::json!({
            "removed": state.notifications.clear_all(user_id).await?
        })),
        Request::Metrics => Ok(serde_json::json!({ "text": metrics::render()? })),
    }
}

/// Parses and executes one line. Never fails: errors become error responses.
pub async fn handle_line(state: &AppState, line: &str) -> Response {
    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            let id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| v.get("id").cloned());
            return Response::failure(id, &AppError::from(e));
        }
    };

    match handle(state, envelope.request).await {
        Ok(result) => Response::success(envelope.id, result),
        Err(e) => {
            tracing::debug!(error = %e, "Request failed");
            Response::failure(envelope.id, &e)
        }
    }
}

/// Serves requests until the reader reaches EOF.
pub async fn serve<R, W>(state: &AppState, reader: R, mut writer: W) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(state, &line).await;
        let mut encoded = serde_json::to_vec(&response)
            .map_err(|e| AppError::Internal(format!("encode response: {e}")))?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }
    Ok(())
}

//! # Event types and their payloads.
//!
//! [`Payload`] is a closed sum type keyed by [`EventType`]: every variant
//! carries the data its listeners need, so a handler matches on the variant
//! instead of casting an opaque value. The event type of an [`Event`](crate::Event)
//! is always derived from its payload and can never disagree with it.
//!
//! The bus never interprets payload contents.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification that selects which listeners receive an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    /// Store an uploaded call recording.
    #[serde(rename = "file.upload_record")]
    FileUploadRecord,
    /// Persist a call record and schedule its automatic upload.
    #[serde(rename = "call_records.save_auto_upload")]
    CallRecordsSaveAutoUpload,
    /// Build and send the advisor call-duration report.
    #[serde(rename = "send.advisor.stats.wechat.report.task")]
    SendAdvisorStatsReport,
    /// Build and send the AI advisor statistics report.
    #[serde(rename = "send.ai.advisor.stats.wechat.report.task")]
    SendAiAdvisorStatsReport,
    /// Deliver a chat message through the messaging bot.
    #[serde(rename = "send.wechat.message")]
    SendWechatMessage,
    /// Append a dialog line to the conversation cache.
    #[serde(rename = "redis.add_dialog_record")]
    AddDialogRecord,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 6] = [
        EventType::FileUploadRecord,
        EventType::CallRecordsSaveAutoUpload,
        EventType::SendAdvisorStatsReport,
        EventType::SendAiAdvisorStatsReport,
        EventType::SendWechatMessage,
        EventType::AddDialogRecord,
    ];

    /// Stable dotted name used in logs and persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::FileUploadRecord => "file.upload_record",
            EventType::CallRecordsSaveAutoUpload => "call_records.save_auto_upload",
            EventType::SendAdvisorStatsReport => "send.advisor.stats.wechat.report.task",
            EventType::SendAiAdvisorStatsReport => "send.ai.advisor.stats.wechat.report.task",
            EventType::SendWechatMessage => "send.wechat.message",
            EventType::AddDialogRecord => "redis.add_dialog_record",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uploaded recording waiting to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpload {
    pub file_uuid: String,
    pub file_name: String,
    pub content_type: Option<String>,
    #[serde(skip)]
    pub content: Vec<u8>,
}

/// Call record to save, optionally followed by an automatic upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecordUpload {
    pub record_uuid: String,
    pub advisor_id: Option<String>,
    pub duration_secs: u32,
    pub audio_url: Option<String>,
}

/// Outgoing bot message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WechatMessage {
    pub to_wxid: String,
    pub message: String,
}

/// Single line of a cached conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogRecord {
    pub session_id: String,
    pub role: String,
    pub content: String,
}

/// Typed payload, one variant per [`EventType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    FileUploadRecord(FileUpload),
    CallRecordsSaveAutoUpload(CallRecordUpload),
    SendAdvisorStatsReport,
    SendAiAdvisorStatsReport,
    SendWechatMessage(WechatMessage),
    AddDialogRecord(DialogRecord),
}

impl Payload {
    /// Event type this payload belongs to.
    pub fn event_type(&self) -> EventType {
        match self {
            Payload::FileUploadRecord(_) => EventType::FileUploadRecord,
            Payload::CallRecordsSaveAutoUpload(_) => EventType::CallRecordsSaveAutoUpload,
            Payload::SendAdvisorStatsReport => EventType::SendAdvisorStatsReport,
            Payload::SendAiAdvisorStatsReport => EventType::SendAiAdvisorStatsReport,
            Payload::SendWechatMessage(_) => EventType::SendWechatMessage,
            Payload::AddDialogRecord(_) => EventType::AddDialogRecord,
        }
    }
}

impl From<WechatMessage> for Payload {
    fn from(msg: WechatMessage) -> Self {
        Payload::SendWechatMessage(msg)
    }
}

impl From<FileUpload> for Payload {
    fn from(upload: FileUpload) -> Self {
        Payload::FileUploadRecord(upload)
    }
}

impl From<CallRecordUpload> for Payload {
    fn from(record: CallRecordUpload) -> Self {
        Payload::CallRecordsSaveAutoUpload(record)
    }
}

impl From<DialogRecord> for Payload {
    fn from(record: DialogRecord) -> Self {
        Payload::AddDialogRecord(record)
    }
}

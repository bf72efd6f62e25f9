// Completed chat inquiries and their admin workflow state.
//
// Records live in process memory, keyed by a monotonically increasing id,
// with one record per chat session.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::llm::ChatMessage;

pub const DEFAULT_LANGUAGE: &str = "de";
pub const DEFAULT_STATUS: &str = "new";
pub const DEFAULT_PAGE_SIZE: usize = 50;

// Column widths of the inquiry record, in characters
pub const MAX_SESSION_ID_CHARS: usize = 100;
pub const MAX_NAME_CHARS: usize = 255;
pub const MAX_EMAIL_CHARS: usize = 255;
pub const MAX_PHONE_CHARS: usize = 100;
pub const MAX_COMPANY_CHARS: usize = 255;
pub const MAX_COUNTRY_CHARS: usize = 10;
pub const MAX_LANGUAGE_CHARS: usize = 5;
pub const MAX_STATUS_CHARS: usize = 50;
pub const MAX_ASSIGNEE_CHARS: usize = 255;

pub const DEFAULT_MAX_RECORDS: usize = 10_000;
pub const DEFAULT_MAX_MESSAGES: usize = 100;
pub const DEFAULT_MAX_TEXT_CHARS: usize = 10_000;
pub const DEFAULT_MAX_TECHNICAL_DATA_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InquiryError {
    #[error("{0}")]
    Invalid(&'static str),
    #[error("Inquiry {0} not found")]
    NotFound(u64),
    #[error("Inquiry for session {0} already exists")]
    DuplicateSession(String),
    #[error("No fields to update")]
    NoFieldsToUpdate,
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("At most {0} messages per inquiry")]
    TooManyMessages(usize),
    #[error("Inquiry store is full")]
    StoreFull,
}

// Bounds on what the public submission endpoint may store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InquiryLimits {
    pub max_records: usize,
    pub max_messages: usize,
    // per message content, summary and notes
    pub max_text_chars: usize,
    pub max_technical_data_bytes: usize,
}

impl Default for InquiryLimits {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            max_messages: DEFAULT_MAX_MESSAGES,
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            max_technical_data_bytes: DEFAULT_MAX_TECHNICAL_DATA_BYTES,
        }
    }
}

fn check_len(field: &'static str, value: Option<&str>, max: usize) -> Result<(), InquiryError> {
    match value {
        Some(v) if v.chars().count() > max => Err(InquiryError::TooLong { field, max }),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LeadData {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub country: Option<String>,
}

// Body posted by the widget once the conversation is complete
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInquiry {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub lead_data: LeadData,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub summary: Option<String>,
    pub language: Option<String>,
    pub technical_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Inquiry {
    pub id: u64,
    pub session_id: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_company: Option<String>,
    pub customer_country: Option<String>,
    pub language: String,
    pub messages: Vec<ChatMessage>,
    pub summary: Option<String>,
    pub technical_data: Option<serde_json::Value>,
    pub status: String,
    pub notes: Option<String>,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// List view, without the transcript
#[derive(Debug, Clone, Serialize)]
pub struct InquirySummary {
    pub id: u64,
    pub session_id: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_company: Option<String>,
    pub customer_country: Option<String>,
    pub language: String,
    pub summary: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Inquiry> for InquirySummary {
    fn from(i: &Inquiry) -> Self {
        Self {
            id: i.id,
            session_id: i.session_id.clone(),
            customer_name: i.customer_name.clone(),
            customer_email: i.customer_email.clone(),
            customer_company: i.customer_company.clone(),
            customer_country: i.customer_country.clone(),
            language: i.language.clone(),
            summary: i.summary.clone(),
            status: i.status.clone(),
            created_at: i.created_at,
            updated_at: i.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InquiryUpdate {
    pub status: Option<String>,
    pub notes: Option<String>,
    pub assigned_to: Option<String>,
}

impl InquiryUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.as_deref().is_none_or(str::is_empty)
            && self.notes.is_none()
            && self.assigned_to.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InquiryPage {
    pub inquiries: Vec<InquirySummary>,
    pub pagination: Pagination,
}

#[derive(Default)]
pub struct InquiryStore {
    next_id: AtomicU64,
    stored: AtomicUsize,
    records: DashMap<u64, Inquiry>,
    sessions: DashMap<String, u64>,
    limits: InquiryLimits,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

impl InquiryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: InquiryLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    pub fn limits(&self) -> &InquiryLimits {
        &self.limits
    }

    fn validate(&self, new: &NewInquiry) -> Result<(), InquiryError> {
        if new.session_id.trim().is_empty() || new.messages.is_empty() {
            return Err(InquiryError::Invalid("sessionId and messages array required"));
        }
        let limits = &self.limits;
        if new.messages.len() > limits.max_messages {
            return Err(InquiryError::TooManyMessages(limits.max_messages));
        }
        check_len("sessionId", Some(&new.session_id), MAX_SESSION_ID_CHARS)?;
        let lead = &new.lead_data;
        check_len("name", lead.name.as_deref(), MAX_NAME_CHARS)?;
        check_len("email", lead.email.as_deref(), MAX_EMAIL_CHARS)?;
        check_len("phone", lead.phone.as_deref(), MAX_PHONE_CHARS)?;
        check_len("company", lead.company.as_deref(), MAX_COMPANY_CHARS)?;
        check_len("country", lead.country.as_deref(), MAX_COUNTRY_CHARS)?;
        check_len("language", new.language.as_deref(), MAX_LANGUAGE_CHARS)?;
        check_len("summary", new.summary.as_deref(), limits.max_text_chars)?;
        for message in &new.messages {
            check_len("message", Some(&message.content), limits.max_text_chars)?;
        }
        if let Some(data) = &new.technical_data {
            // serializing a Value cannot fail
            let size = serde_json::to_vec(data).map(|v| v.len()).unwrap_or(usize::MAX);
            if size > limits.max_technical_data_bytes {
                return Err(InquiryError::TooLong {
                    field: "technicalData",
                    max: limits.max_technical_data_bytes,
                });
            }
        }
        Ok(())
    }

    // reserve one record slot, failing once the store holds max_records
    fn reserve_slot(&self) -> Result<(), InquiryError> {
        let max = self.limits.max_records;
        self.stored
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .map(|_| ())
            .map_err(|_| InquiryError::StoreFull)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn insert(&self, new: NewInquiry, now: DateTime<Utc>) -> Result<Inquiry, InquiryError> {
        self.validate(&new)?;

        let slot = match self.sessions.entry(new.session_id.clone()) {
            Entry::Occupied(_) => return Err(InquiryError::DuplicateSession(new.session_id)),
            Entry::Vacant(slot) => slot,
        };
        self.reserve_slot()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let lead = new.lead_data;
        let inquiry = Inquiry {
            id,
            session_id: new.session_id,
            customer_name: non_empty(lead.name),
            customer_email: non_empty(lead.email),
            customer_phone: non_empty(lead.phone),
            customer_company: non_empty(lead.company),
            customer_country: non_empty(lead.country),
            language: non_empty(new.language).unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            messages: new.messages,
            summary: non_empty(new.summary),
            technical_data: new.technical_data,
            status: DEFAULT_STATUS.to_string(),
            notes: None,
            assigned_to: None,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(id, inquiry.clone());
        slot.insert(id);
        Ok(inquiry)
    }

    pub fn get(&self, id: u64) -> Option<Inquiry> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    // Newest first, optionally filtered by status. `total` counts the filtered set.
    pub fn list(&self, query: &ListQuery) -> InquiryPage {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);
        let status = query.status.as_deref().filter(|s| !s.is_empty());

        let mut matching: Vec<InquirySummary> = self
            .records
            .iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .map(|r| InquirySummary::from(r.value()))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len();
        let inquiries = matching.into_iter().skip(offset).take(limit).collect();
        InquiryPage {
            inquiries,
            pagination: Pagination {
                total,
                limit,
                offset,
            },
        }
    }

    // Apply the present fields of `update`; absent fields keep their value.
    pub fn update(
        &self,
        id: u64,
        update: InquiryUpdate,
        now: DateTime<Utc>,
    ) -> Result<Inquiry, InquiryError> {
        if update.is_empty() {
            return Err(InquiryError::NoFieldsToUpdate);
        }
        check_len("status", update.status.as_deref(), MAX_STATUS_CHARS)?;
        check_len("assigned_to", update.assigned_to.as_deref(), MAX_ASSIGNEE_CHARS)?;
        check_len("notes", update.notes.as_deref(), self.limits.max_text_chars)?;
        let mut record = self.records.get_mut(&id).ok_or(InquiryError::NotFound(id))?;
        if let Some(status) = non_empty(update.status) {
            record.status = status;
        }
        if let Some(notes) = update.notes {
            record.notes = Some(notes);
        }
        if let Some(assigned_to) = update.assigned_to {
            record.assigned_to = Some(assigned_to);
        }
        record.updated_at = now;
        Ok(record.value().clone())
    }
}

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApiError;
use crate::model::{Match, Sport};

/// Raw `matchList` body. Every field is optional on the wire; a body without
/// `data` is rejected when converted into a [`Page`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchListEnvelope {
    #[serde(default)]
    pub data: Option<Vec<Match>>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub has_more: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Raw `AllSportsAndLeagues` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SportsEnvelope {
    #[serde(default)]
    pub data: Option<Vec<Sport>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SportsEnvelope {
    pub fn into_sports(self, status: u16) -> Result<Vec<Sport>, ApiError> {
        self.data
            .ok_or_else(|| ApiError::server(status, self.message.unwrap_or_else(|| "response carried no data".to_string())))
    }
}

/// One server response for a given offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub matches: Vec<Match>,
    pub offset: u32,
    pub limit: u32,
    pub total: Option<u32>,
    pub has_more: Option<bool>,
}

impl Page {
    /// Build a page from a decoded body and the offset/limit it was requested
    /// with. The requested values win over whatever the server echoes back,
    /// since pages are ordered by the offset they were requested at.
    pub fn from_envelope(envelope: MatchListEnvelope, offset: u32, limit: u32, status: u16) -> Result<Self, ApiError> {
        let mut matches = envelope
            .data
            .ok_or_else(|| ApiError::server(status, envelope.message.unwrap_or_else(|| "response carried no data".to_string())))?;

        if let Some(total) = envelope.total {
            let room = total.saturating_sub(offset) as usize;
            if matches.len() > room {
                warn!(offset, total, returned = matches.len(), "Page overruns total; truncating");
                matches.truncate(room);
            }
        }

        Ok(Page { matches, offset, limit, total: envelope.total, has_more: envelope.has_more })
    }

    /// Whether another page is known to exist after this one.
    pub fn has_more(&self) -> bool {
        if let Some(total) = self.total {
            return self.offset.saturating_add(self.limit) < total;
        }
        if let Some(flag) = self.has_more {
            return flag;
        }
        self.limit > 0 && self.matches.len() as u32 >= self.limit
    }

    pub fn next_offset(&self) -> u32 {
        self.offset.saturating_add(self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(count: usize, total: Option<u32>) -> MatchListEnvelope {
        let json = serde_json::json!({
            "data": (0..count).map(|i| serde_json::json!({
                "id": i,
                "tournament": { "id": 1, "name": "T" },
                "homeTeam": { "id": 1, "name": "H" },
                "awayTeam": { "id": 2, "name": "A" },
                "matchStatus": "upcoming",
                "startTime": "2025-01-01T00:00:00Z",
            })).collect::<Vec<_>>(),
            "total": total,
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn missing_data_is_a_server_error() {
        let err = Page::from_envelope(MatchListEnvelope::default(), 0, 20, 200).unwrap_err();
        assert_eq!(err.status(), Some(200));
        assert_eq!(err.message(), "response carried no data");
    }

    #[test]
    fn overrun_is_truncated_to_total() {
        let page = Page::from_envelope(envelope(5, Some(3)), 0, 20, 200).unwrap();
        assert_eq!(page.matches.len(), 3);
        assert!(!page.has_more());
    }

    #[test]
    fn has_more_falls_back_to_flag_then_length() {
        let mut page = Page::from_envelope(envelope(2, None), 0, 2, 200).unwrap();
        assert!(page.has_more());
        page.has_more = Some(false);
        assert!(!page.has_more());
    }
}

use crate::core::LogRecord;
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestPayload {
    pub lines: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Serialize)]
struct ReloadTail<'a> {
    cmd: &'static str,
    #[serde(flatten)]
    payload: &'a RequestPayload,
}

impl RequestPayload {
    pub fn command_frame(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&ReloadTail {
            cmd: "reload_tail",
            payload: self,
        })?)
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("lines", self.lines.to_string())];
        if let Some(keyword) = &self.keyword {
            pairs.push(("keyword", keyword.clone()));
        }
        if let Some(levels) = &self.levels {
            pairs.push(("level", levels.join(",")));
        }
        if let Some(start) = self.start {
            pairs.push(("start", start.to_string()));
        }
        if let Some(end) = self.end {
            pairs.push(("end", end.to_string()));
        }
        if let Some(file) = &self.file {
            pairs.push(("file", file.clone()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WireRecord {
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
}

impl From<WireRecord> for LogRecord {
    fn from(wire: WireRecord) -> Self {
        LogRecord::new(
            wire.ts.unwrap_or_default(),
            wire.level.unwrap_or_default(),
            wire.msg.unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Line(WireRecord),
    Error {
        #[serde(default)]
        msg: String,
    },
    Info {
        #[serde(default)]
        msg: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Snapshot {
    Bare(Vec<WireRecord>),
    Envelope { results: Vec<WireRecord> },
}

pub fn decode_frame(text: &str) -> Result<ServerFrame, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Decode a poll response, oldest record first.
pub fn decode_snapshot(body: &str) -> Result<Vec<LogRecord>, ProtocolError> {
    let records = match serde_json::from_str::<Snapshot>(body)? {
        Snapshot::Bare(records) | Snapshot::Envelope { results: records } => records,
    };
    Ok(records.into_iter().map(LogRecord::from).collect())
}

pub fn socket_url(base: &Url, token: Option<&str>, file: Option<&str>) -> Url {
    let mut url = base.clone();
    {
        let mut query = url.query_pairs_mut();
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            query.append_pair("token", token);
        }
        if let Some(file) = file.filter(|f| !f.is_empty()) {
            query.append_pair("file", file);
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    url
}

pub fn snapshot_url(base: &Url, payload: &RequestPayload) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .extend_pairs(payload.query_pairs().iter().map(|(k, v)| (*k, v.as_str())));
    url
}

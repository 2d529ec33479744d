use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use sipin_mam::RecordSource;

/// Archive lookup double used ONLY for tests.
///
/// Each `search_all` call pops the next scripted response; once the script
/// is exhausted every call returns no records. Queries are recorded.
#[derive(Default)]
pub struct ScriptedRecordSource {
    script: Mutex<VecDeque<std::result::Result<Vec<Value>, String>>>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one successful lookup result.
    pub fn respond(self, records: Vec<Value>) -> Self {
        self.push(Ok(records));
        self
    }

    /// Queue one failed lookup.
    pub fn fail(self, message: &str) -> Self {
        self.push(Err(message.to_string()));
        self
    }

    pub fn push(&self, response: std::result::Result<Vec<Value>, String>) {
        self.script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(response);
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl RecordSource for ScriptedRecordSource {
    fn source_name(&self) -> &'static str {
        "scripted"
    }

    async fn search_all(&self, query: &str) -> Result<Vec<Value>> {
        self.queries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(query.to_string());
        let next = self
            .script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match next {
            Some(Ok(records)) => Ok(records),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Ok(Vec::new()),
        }
    }
}

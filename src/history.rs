//! Per-sender conversation history: text-only user/assistant pairs, trimmed
//! to a fixed window and optionally persisted as pretty JSON.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{MAX_HISTORY_PAIRS, Turn};

pub struct HistoryStore {
    conversations: Mutex<HashMap<String, Vec<Turn>>>,
    max_pairs: usize,
    path: Option<PathBuf>,
}

impl HistoryStore {
    pub fn in_memory() -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            max_pairs: MAX_HISTORY_PAIRS,
            path: None,
        }
    }

    /// Open a store backed by `path`, loading whatever it already holds.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conversations = load(&path)?;
        info!(path = %path.display(), senders = conversations.len(), "loaded conversation history");
        Ok(Self {
            conversations: Mutex::new(conversations),
            max_pairs: MAX_HISTORY_PAIRS,
            path: Some(path),
        })
    }

    pub fn with_max_pairs(mut self, max_pairs: usize) -> Self {
        self.max_pairs = max_pairs;
        self
    }

    /// Prior turns for `sender`, oldest first.
    pub async fn snapshot(&self, sender: &str) -> Vec<Turn> {
        self.conversations
            .lock()
            .await
            .get(sender)
            .cloned()
            .unwrap_or_default()
    }

    /// Append one exchange and trim to the window. Persisting is best-effort.
    pub async fn record(&self, sender: &str, user: &str, assistant: &str) {
        let mut conversations = self.conversations.lock().await;
        let turns = conversations.entry(sender.to_string()).or_default();
        turns.push(Turn::user_text(user));
        turns.push(Turn::assistant_text(assistant));
        let keep = self.max_pairs * 2;
        if turns.len() > keep {
            turns.drain(..turns.len() - keep);
        }

        if let Some(path) = &self.path
            && let Err(e) = save(path, &conversations)
        {
            warn!(path = %path.display(), error = %e, "failed to persist conversation history");
        }
    }
}

fn load(path: &Path) -> Result<HashMap<String, Vec<Turn>>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

fn save(path: &Path, conversations: &HashMap<String, Vec<Turn>>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, conversations)?;
    Ok(())
}

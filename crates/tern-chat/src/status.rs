//! Rotating progress text shown while waiting for the assistant

use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Messages shown while a tool runs; `{tool}` is replaced by its name
const TOOL_MESSAGES: &[&str] = &[
    "Using {tool}...",
    "Running {tool}...",
    "Waiting for {tool} to respond...",
    "Processing {tool} results...",
];

/// Messages shown while the assistant is thinking
const GENERAL_MESSAGES: &[&str] = &[
    "Thinking...",
    "Analyzing your request...",
    "Gathering relevant information...",
    "Working on a response...",
    "Almost there...",
];

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"));

// tokio intervals reject a zero period
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Receives every status change; `None` clears the display
pub type StatusDisplay = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Cycling intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CyclerConfig {
    /// Rotation interval for tool messages
    #[serde(rename = "tool_interval_ms", with = "millis")]
    pub tool_interval: Duration,
    /// Rotation interval for general messages
    #[serde(rename = "general_interval_ms", with = "millis")]
    pub general_interval: Duration,
}

impl Default for CyclerConfig {
    fn default() -> Self {
        Self {
            tool_interval: Duration::from_millis(2000),
            general_interval: Duration::from_millis(3000),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Turn `web_search`, `fetch-page` or `readFile` into "Web Search", "Fetch Page", "Read File"
pub fn format_tool_name(name: &str) -> String {
    let spaced = CAMEL_BOUNDARY.replace_all(name, "$1 $2");
    spaced
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The rotation for a tool name, or the general rotation
pub fn message_pool(tool_name: Option<&str>) -> Vec<String> {
    match tool_name.filter(|t| !t.trim().is_empty()) {
        Some(tool) => {
            let tool = format_tool_name(tool);
            TOOL_MESSAGES
                .iter()
                .map(|m| m.replace("{tool}", &tool))
                .collect()
        }
        None => GENERAL_MESSAGES.iter().map(|m| m.to_string()).collect(),
    }
}

struct CycleTimer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns at most one rotation timer.
///
/// Starting a new cycle always stops the previous one. Each chat session
/// owns its own cycler. Cycling needs a Tokio runtime.
pub struct StatusCycler {
    config: CyclerConfig,
    display: StatusDisplay,
    // Serializes timer ticks against stop() so no text lands after a clear
    gate: Arc<Mutex<()>>,
    timer: Option<CycleTimer>,
    showing: bool,
}

impl StatusCycler {
    pub fn new(config: CyclerConfig, display: StatusDisplay) -> Self {
        Self {
            config,
            display,
            gate: Arc::new(Mutex::new(())),
            timer: None,
            showing: false,
        }
    }

    /// Show progress.
    ///
    /// A non-empty server `status` is shown verbatim with no rotation.
    /// Otherwise the tool pool (when `tool_name` is set) or the general pool
    /// rotates until [`stop`](Self::stop) or the next `start`.
    pub fn start(&mut self, status: Option<&str>, tool_name: Option<&str>) {
        self.stop_timer();

        let _gate = self.gate.lock();
        if let Some(status) = status.filter(|s| !s.trim().is_empty()) {
            (self.display)(Some(status));
            self.showing = true;
            return;
        }

        let is_tool = tool_name.is_some_and(|t| !t.trim().is_empty());
        let pool = message_pool(tool_name);
        let interval = if is_tool {
            self.config.tool_interval
        } else {
            self.config.general_interval
        }
        .max(MIN_INTERVAL);
        (self.display)(Some(&pool[0]));
        self.showing = true;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let display = Arc::clone(&self.display);
        let gate = Arc::clone(&self.gate);
        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            let mut index = 0;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let _gate = gate.lock();
                        if token.is_cancelled() {
                            break;
                        }
                        index = (index + 1) % pool.len();
                        display(Some(&pool[index]));
                    }
                }
            }
        });
        self.timer = Some(CycleTimer { cancel, task });
    }

    /// Stop cycling and clear the display
    pub fn stop(&mut self) {
        self.stop_timer();
        let _gate = self.gate.lock();
        if self.showing {
            self.showing = false;
            (self.display)(None);
        }
    }

    /// Whether a rotation timer is running
    pub fn is_cycling(&self) -> bool {
        self.timer.is_some()
    }

    /// Whether some status text is currently displayed
    pub fn is_showing(&self) -> bool {
        self.showing
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            let _gate = self.gate.lock();
            timer.cancel.cancel();
            timer.task.abort();
        }
    }
}

impl Drop for StatusCycler {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (StatusDisplay, Arc<Mutex<Vec<Option<String>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let display: StatusDisplay = Arc::new(move |text: Option<&str>| {
            sink.lock().push(text.map(str::to_string));
        });
        (display, seen)
    }

    #[test]
    fn test_format_tool_name() {
        assert_eq!(format_tool_name("web_search"), "Web Search");
        assert_eq!(format_tool_name("fetch-page"), "Fetch Page");
        assert_eq!(format_tool_name("readFile"), "Read File");
        assert_eq!(format_tool_name("query"), "Query");
    }

    #[test]
    fn test_tool_pool_mentions_tool() {
        let pool = message_pool(Some("web_search"));
        assert!(pool.iter().all(|m| m.contains("Web Search")));
        assert_eq!(message_pool(None)[0], "Thinking...");
        assert_eq!(message_pool(Some("  "))[0], "Thinking...");
    }

    #[test]
    fn test_tool_interval_shorter_than_general() {
        let config = CyclerConfig::default();
        assert!(config.tool_interval < config.general_interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_general_pool_rotates_on_interval() {
        let (display, seen) = recorder();
        let mut cycler = StatusCycler::new(CyclerConfig::default(), display);
        cycler.start(None, None);
        assert_eq!(seen.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(6500)).await;
        let seen_now = seen.lock().clone();
        assert_eq!(
            seen_now,
            vec![
                Some("Thinking...".to_string()),
                Some("Analyzing your request...".to_string()),
                Some("Gathering relevant information...".to_string()),
            ]
        );
        cycler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_pool_rotates_faster() {
        let (display, seen) = recorder();
        let mut cycler = StatusCycler::new(CyclerConfig::default(), display);
        cycler.start(None, Some("read_file"));
        tokio::time::sleep(Duration::from_millis(6500)).await;
        // initial + ticks at 2s, 4s, 6s
        assert_eq!(seen.lock().len(), 4);
        assert_eq!(
            seen.lock()[1].as_deref(),
            Some("Running Read File...")
        );
        cycler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_literal_status_preempts_cycling() {
        let (display, seen) = recorder();
        let mut cycler = StatusCycler::new(CyclerConfig::default(), display);
        cycler.start(None, None);
        assert!(cycler.is_cycling());
        cycler.start(Some("Reading 3 documents"), Some("read_file"));
        assert!(!cycler.is_cycling());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let seen_now = seen.lock().clone();
        assert_eq!(seen_now.last().unwrap().as_deref(), Some("Reading 3 documents"));
        assert_eq!(seen_now.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_leaves_single_timer() {
        let (display, seen) = recorder();
        let mut cycler = StatusCycler::new(CyclerConfig::default(), display);
        cycler.start(None, None);
        cycler.start(None, None);
        cycler.start(None, None);
        seen.lock().clear();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        // one tick from one timer
        assert_eq!(seen.lock().len(), 1);
        cycler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_and_silences() {
        let (display, seen) = recorder();
        let mut cycler = StatusCycler::new(CyclerConfig::default(), display);
        cycler.start(None, None);
        cycler.stop();
        cycler.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        let seen_now = seen.lock().clone();
        assert_eq!(seen_now, vec![Some("Thinking...".to_string()), None]);
        assert!(!cycler.is_showing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_rotates() {
        let (display, seen) = recorder();
        let config = CyclerConfig {
            tool_interval: Duration::ZERO,
            general_interval: Duration::ZERO,
        };
        let mut cycler = StatusCycler::new(config, display);
        cycler.start(None, None);
        tokio::time::sleep(Duration::from_millis(3)).await;
        assert!(seen.lock().len() > 1);
        assert!(cycler.is_cycling());
        cycler.stop();
    }

    #[test]
    fn test_config_from_millis() {
        let config: CyclerConfig =
            serde_json::from_str(r#"{"tool_interval_ms":500,"general_interval_ms":900}"#).unwrap();
        assert_eq!(config.tool_interval, Duration::from_millis(500));
        assert_eq!(config.general_interval, Duration::from_millis(900));
    }
}

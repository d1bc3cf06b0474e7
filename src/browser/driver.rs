use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AgentResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavDirection {
    Back,
    Forward,
}

/// One interactable element as the driver describes it to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageElement {
    pub id: u32,
    /// Simplified textual rendering (tag, role, visible text).
    pub description: String,
    /// Whether the bounding box intersects the current viewport.
    pub in_viewport: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserTab {
    pub index: usize,
    pub title: String,
    pub url: String,
    pub is_focused: bool,
}

/// Snapshot of the driven tab, rebuilt by `PageDriver::refresh_state` after
/// every action.
///
/// Element ids are stable only within one snapshot: an action must be chosen
/// and executed against the same snapshot, and ids from an older snapshot
/// fail closed during resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageState {
    pub url: String,
    /// Current viewport screenshot, base64 PNG.
    pub screenshot: String,
    pub previous_screenshot: Option<String>,
    /// Viewport screenshot with element bounding boxes and id labels drawn in.
    pub annotated_screenshot: String,
    /// Stitched screenshot of the entire page, top to bottom.
    pub full_page_screenshot: String,
    pub elements: BTreeMap<u32, PageElement>,
    pub pixels_above: f64,
    pub pixels_below: f64,
    pub page_summary: String,
    pub page_breakdown: String,
    pub tabs: Vec<BrowserTab>,
}

/// Capability surface of a single driven browser tab. The core never talks
/// to a rendering engine directly; everything it needs is behind this trait.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> AgentResult<()>;
    async fn back(&self) -> AgentResult<()>;
    async fn forward(&self) -> AgentResult<()>;

    async fn click(&self, element_id: u32) -> AgentResult<()>;
    async fn fill(&self, element_id: u32, text: &str, submit: bool) -> AgentResult<()>;

    /// Scroll by a fraction of the viewport height.
    async fn scroll(&self, direction: ScrollDirection, fraction: f64) -> AgentResult<()>;
    /// Scroll the page so that `y` is the top of the viewport. Pages with
    /// custom scroll handling may land elsewhere; callers re-poll.
    async fn scroll_to(&self, y: f64) -> AgentResult<()>;
    async fn scroll_top(&self) -> AgentResult<f64>;
    /// Pixels of page content above and below the viewport.
    async fn scroll_position(&self) -> AgentResult<(f64, f64)>;
    async fn viewport_height(&self) -> AgentResult<f64>;
    async fn page_height(&self) -> AgentResult<f64>;

    /// Capture the current viewport as a base64 PNG.
    async fn screenshot(&self) -> AgentResult<String>;
    /// Enumerate the currently interactable elements. Ids are only valid
    /// until the next refresh.
    async fn enumerate_interactable_elements(&self) -> AgentResult<BTreeMap<u32, PageElement>>;

    /// Wait until network activity settles, up to `timeout`. Implementations
    /// return an error on timeout; callers decide whether to swallow it.
    async fn wait_for_quiescence(&self, timeout: Duration) -> AgentResult<()>;

    async fn open_tabs(&self) -> AgentResult<Vec<BrowserTab>>;
    async fn focus_tab(&self, index: usize) -> AgentResult<()>;

    async fn check_for_captcha(&self) -> AgentResult<bool>;

    /// Full text content of the page, independent of the viewport.
    async fn page_text(&self) -> AgentResult<String>;

    /// Rebuild the `PageState` snapshot: new screenshots, re-enumerated
    /// elements, fresh scroll and tab info.
    async fn refresh_state(&self) -> AgentResult<()>;
    async fn state(&self) -> PageState;
}

//! Scripted page driver for loop and executor tests. Every interaction is
//! recorded; `refresh_state` bumps a generation counter that feeds the
//! screenshot names (`shot-N`) and, optionally, the element ids, so tests can
//! detect stale-snapshot usage.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;

use crate::browser::driver::{
    BrowserTab, NavDirection, PageDriver, PageElement, PageState, ScrollDirection,
};
use crate::errors::{AgentError, AgentResult};

/// Encode a blank RGBA image of the given size as base64 PNG.
pub fn synthetic_page(width: u32, height: u32) -> String {
    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(width, height));
    let mut png_bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut png_bytes),
        image::ImageFormat::Png,
    )
    .unwrap();
    base64::engine::general_purpose::STANDARD.encode(&png_bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollToBehavior {
    /// `scroll_to` lands exactly on the (clamped) requested offset.
    Exact,
    /// `scroll_to` is silently ignored, as on pages with custom scroll
    /// containers; only step scrolling moves the page.
    Ignored,
}

struct Inner {
    url: String,
    generation: u32,
    stable_ids: bool,
    element_seeds: Vec<(u32, String)>,
    captcha: VecDeque<bool>,
    click_failures: VecDeque<String>,
    clicks: Vec<u32>,
    fills: Vec<(u32, String, bool)>,
    navigations: Vec<String>,
    refreshes: u32,
    quiescence_waits: u32,
    quiescence_times_out: bool,
    scroll_top: f64,
    page_height: f64,
    viewport_height: f64,
    scroll_to_behavior: ScrollToBehavior,
    full_page_screenshot: Option<String>,
    tabs: Vec<BrowserTab>,
    page_text: String,
}

pub struct MockDriver {
    inner: Mutex<Inner>,
}

pub struct MockDriverBuilder {
    inner: Inner,
}

impl Default for MockDriverBuilder {
    fn default() -> Self {
        Self {
            inner: Inner {
                url: "https://shop.example.com/".into(),
                generation: 0,
                stable_ids: true,
                element_seeds: vec![
                    (1, "<input type=\"text\" placeholder=\"Search\">".into()),
                    (2, "<button>Search</button>".into()),
                ],
                captcha: VecDeque::new(),
                click_failures: VecDeque::new(),
                clicks: Vec::new(),
                fills: Vec::new(),
                navigations: Vec::new(),
                refreshes: 0,
                quiescence_waits: 0,
                quiescence_times_out: false,
                scroll_top: 0.0,
                page_height: 2000.0,
                viewport_height: 800.0,
                scroll_to_behavior: ScrollToBehavior::Exact,
                full_page_screenshot: None,
                tabs: vec![BrowserTab {
                    index: 0,
                    title: "Example Shop".into(),
                    url: "https://shop.example.com/".into(),
                    is_focused: true,
                }],
                page_text: "Example Shop. Everything you need.".into(),
            },
        }
    }
}

impl MockDriverBuilder {
    /// When false, element ids shift by `generation * 10` on every refresh,
    /// so ids from an older snapshot no longer resolve.
    pub fn stable_ids(mut self, stable: bool) -> Self {
        self.inner.stable_ids = stable;
        self
    }

    pub fn elements(mut self, seeds: Vec<(u32, &str)>) -> Self {
        self.inner.element_seeds = seeds
            .into_iter()
            .map(|(id, description)| (id, description.to_string()))
            .collect();
        self
    }

    pub fn captcha_sequence(mut self, hits: Vec<bool>) -> Self {
        self.inner.captcha = hits.into();
        self
    }

    pub fn fail_next_click(mut self, message: &str) -> Self {
        self.inner.click_failures.push_back(message.into());
        self
    }

    pub fn page_height(mut self, height: f64) -> Self {
        self.inner.page_height = height;
        self
    }

    pub fn viewport_height(mut self, height: f64) -> Self {
        self.inner.viewport_height = height;
        self
    }

    pub fn scroll_to_behavior(mut self, behavior: ScrollToBehavior) -> Self {
        self.inner.scroll_to_behavior = behavior;
        self
    }

    pub fn full_page_screenshot(mut self, b64: String) -> Self {
        self.inner.full_page_screenshot = Some(b64);
        self
    }

    pub fn quiescence_times_out(mut self, times_out: bool) -> Self {
        self.inner.quiescence_times_out = times_out;
        self
    }

    pub fn build(self) -> MockDriver {
        MockDriver {
            inner: Mutex::new(self.inner),
        }
    }
}

impl MockDriver {
    pub fn builder() -> MockDriverBuilder {
        MockDriverBuilder::default()
    }

    pub fn clicks(&self) -> Vec<u32> {
        self.inner.lock().unwrap().clicks.clone()
    }

    pub fn fills(&self) -> Vec<(u32, String, bool)> {
        self.inner.lock().unwrap().fills.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.inner.lock().unwrap().navigations.clone()
    }

    pub fn refreshes(&self) -> u32 {
        self.inner.lock().unwrap().refreshes
    }

    pub fn quiescence_waits(&self) -> u32 {
        self.inner.lock().unwrap().quiescence_waits
    }

    pub fn scroll_top_now(&self) -> f64 {
        self.inner.lock().unwrap().scroll_top
    }

    fn nav_direction_marker(direction: NavDirection) -> String {
        match direction {
            NavDirection::Back => "<back>".into(),
            NavDirection::Forward => "<forward>".into(),
        }
    }
}

impl Inner {
    fn id_offset(&self) -> u32 {
        if self.stable_ids {
            0
        } else {
            self.generation * 10
        }
    }

    fn snapshot(&self) -> PageState {
        let offset = self.id_offset();
        let elements: BTreeMap<u32, PageElement> = self
            .element_seeds
            .iter()
            .map(|(id, description)| {
                let shifted = id + offset;
                (
                    shifted,
                    PageElement {
                        id: shifted,
                        description: description.clone(),
                        in_viewport: true,
                    },
                )
            })
            .collect();

        PageState {
            url: self.url.clone(),
            screenshot: format!("shot-{}", self.generation),
            previous_screenshot: self
                .generation
                .checked_sub(1)
                .map(|previous| format!("shot-{previous}")),
            annotated_screenshot: format!("anno-{}", self.generation),
            full_page_screenshot: self
                .full_page_screenshot
                .clone()
                .unwrap_or_else(|| format!("full-{}", self.generation)),
            elements,
            pixels_above: self.scroll_top,
            pixels_below: (self.page_height - self.viewport_height - self.scroll_top).max(0.0),
            page_summary: "A mock storefront page.".into(),
            page_breakdown: "Header, search box, product grid.".into(),
            tabs: self.tabs.clone(),
        }
    }

    fn clamp_scroll(&self, y: f64) -> f64 {
        y.clamp(0.0, (self.page_height - self.viewport_height).max(0.0))
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn navigate(&self, url: &str) -> AgentResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.url = url.to_string();
        inner.navigations.push(url.to_string());
        Ok(())
    }

    async fn back(&self) -> AgentResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let marker = Self::nav_direction_marker(NavDirection::Back);
        inner.navigations.push(marker);
        Ok(())
    }

    async fn forward(&self) -> AgentResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let marker = Self::nav_direction_marker(NavDirection::Forward);
        inner.navigations.push(marker);
        Ok(())
    }

    async fn click(&self, element_id: u32) -> AgentResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = inner.click_failures.pop_front() {
            return Err(AgentError::Execution(message));
        }
        inner.clicks.push(element_id);
        Ok(())
    }

    async fn fill(&self, element_id: u32, text: &str, submit: bool) -> AgentResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.fills.push((element_id, text.to_string(), submit));
        Ok(())
    }

    async fn scroll(&self, direction: ScrollDirection, fraction: f64) -> AgentResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let delta = fraction * inner.viewport_height;
        let next = match direction {
            ScrollDirection::Down => inner.scroll_top + delta,
            ScrollDirection::Up => inner.scroll_top - delta,
        };
        inner.scroll_top = inner.clamp_scroll(next);
        Ok(())
    }

    async fn scroll_to(&self, y: f64) -> AgentResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.scroll_to_behavior == ScrollToBehavior::Exact {
            inner.scroll_top = inner.clamp_scroll(y);
        }
        Ok(())
    }

    async fn scroll_top(&self) -> AgentResult<f64> {
        Ok(self.inner.lock().unwrap().scroll_top)
    }

    async fn scroll_position(&self) -> AgentResult<(f64, f64)> {
        let inner = self.inner.lock().unwrap();
        Ok((
            inner.scroll_top,
            (inner.page_height - inner.viewport_height - inner.scroll_top).max(0.0),
        ))
    }

    async fn viewport_height(&self) -> AgentResult<f64> {
        Ok(self.inner.lock().unwrap().viewport_height)
    }

    async fn page_height(&self) -> AgentResult<f64> {
        Ok(self.inner.lock().unwrap().page_height)
    }

    async fn screenshot(&self) -> AgentResult<String> {
        let inner = self.inner.lock().unwrap();
        Ok(format!("shot-{}", inner.generation))
    }

    async fn enumerate_interactable_elements(&self) -> AgentResult<BTreeMap<u32, PageElement>> {
        Ok(self.inner.lock().unwrap().snapshot().elements)
    }

    async fn wait_for_quiescence(&self, _timeout: Duration) -> AgentResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.quiescence_waits += 1;
        if inner.quiescence_times_out {
            return Err(AgentError::Execution("network never settled".into()));
        }
        Ok(())
    }

    async fn open_tabs(&self) -> AgentResult<Vec<BrowserTab>> {
        Ok(self.inner.lock().unwrap().tabs.clone())
    }

    async fn focus_tab(&self, index: usize) -> AgentResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if index >= inner.tabs.len() {
            return Err(AgentError::ElementResolution(format!(
                "tab index {index} out of range"
            )));
        }
        for tab in &mut inner.tabs {
            tab.is_focused = tab.index == index;
        }
        Ok(())
    }

    async fn check_for_captcha(&self) -> AgentResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.captcha.pop_front().unwrap_or(false))
    }

    async fn page_text(&self) -> AgentResult<String> {
        Ok(self.inner.lock().unwrap().page_text.clone())
    }

    async fn refresh_state(&self) -> AgentResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.generation += 1;
        inner.refreshes += 1;
        Ok(())
    }

    async fn state(&self) -> PageState {
        self.inner.lock().unwrap().snapshot()
    }
}

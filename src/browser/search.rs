//! Content-locating procedure backing the `find` action.
//!
//! Single-shot absolute-position estimates from a model are unreliable on
//! long pages, so localization runs in two phases: a coarse pass picks the
//! full-page crop containing the target, a fine pass estimates the fractional
//! vertical position inside that crop. The combined absolute offset is
//! scrolled to directly; if the page's scroll handling puts us somewhere
//! else, iterative small-step scrolling takes over.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::browser::crops::partition_screenshot;
use crate::browser::driver::{PageDriver, ScrollDirection};
use crate::config::FindConfig;
use crate::errors::AgentResult;
use crate::llm::service::{parse_decision, CompletionService};
use crate::llm::types::{ChatMessage, DecideOptions};

#[derive(Debug, Deserialize)]
struct CropHit {
    found: bool,
    #[serde(default)]
    response: String,
    #[serde(default = "minus_one")]
    screenshot_index: i64,
}

#[derive(Debug, Deserialize)]
struct CropPosition {
    found: bool,
    #[serde(default = "minus_one_f")]
    vertical_position: f64,
}

fn minus_one() -> i64 {
    -1
}

fn minus_one_f() -> f64 {
    -1.0
}

pub struct ContentSearch {
    driver: Arc<dyn PageDriver>,
    service: Arc<dyn CompletionService>,
    model: String,
    config: FindConfig,
    timeout: Duration,
}

impl ContentSearch {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        service: Arc<dyn CompletionService>,
        model: String,
        config: FindConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            driver,
            service,
            model,
            config,
            timeout,
        }
    }

    /// Locate `content_to_find` on the page and scroll to it. Returns a
    /// result string for the model; "not found" is a result, not an error.
    pub async fn run(&self, content_to_find: &str) -> AgentResult<String> {
        let state = self.driver.state().await;
        let crops = partition_screenshot(&state.full_page_screenshot, self.config.crop_height)?;

        let hit = self.locate_crop(content_to_find, &crops).await?;
        if !hit.found
            || hit.screenshot_index < 0
            || hit.screenshot_index as usize >= crops.len()
        {
            tracing::info!(content = %content_to_find, "content not found on page");
            return Ok(format!(
                "Did not find anything on the page matching the description: {content_to_find}. \
                 If you think the content should be on the page, try a different description."
            ));
        }

        let crop_index = hit.screenshot_index as usize;
        let fraction = self
            .locate_within_crop(content_to_find, &hit.response, &crops[crop_index])
            .await?;

        let page_height = self.driver.page_height().await?;
        let viewport_height = self.driver.viewport_height().await?;
        let target = scroll_target(
            crop_index,
            fraction,
            self.config.crop_height,
            page_height,
            viewport_height,
        );

        self.driver.scroll_to(target).await?;
        let achieved = self.driver.scroll_top().await?;
        tracing::debug!(target, achieved, "direct scroll to located content");

        if (achieved - target).abs() > self.config.scroll_tolerance_px {
            self.converge_by_stepping(target).await?;
        }

        Ok(format!(
            "Found the content and scrolled to it. Content description: {}",
            hit.response
        ))
    }

    async fn locate_crop(&self, content_to_find: &str, crops: &[String]) -> AgentResult<CropHit> {
        let prompt = format!(
            "You are a helpful assistant tasked with finding content on a page. You can see the \
             page via the screenshots. The screenshots are ordered from top to bottom; the first \
             screenshot is the top of the page and the last screenshot is the bottom of the page.\n\
             \n\
             Here is what you are looking for: {content_to_find}\n\
             \n\
             Guidelines:\n\
             - It is possible that what you are looking for is not on the page.\n\
             - If you found multiple possible matches, respond with the one that you feel is the \
             most likely to be the one the user is looking for.\n\
             \n\
             Respond with a JSON object with the following fields:\n\
             {{\n\
                 \"found\": <true if you found the content, false otherwise>,\n\
                 \"response\": <whether you found the content or not, and where it is in the screenshot>,\n\
                 \"screenshot_index\": <the index of the screenshot that contains the content, if found, otherwise -1>\n\
             }}"
        );
        let message = ChatMessage::user_with_images(&prompt, crops);
        let response = self
            .service
            .decide(
                vec![message],
                DecideOptions::json(self.model.clone()).with_timeout(self.timeout),
            )
            .await?;
        parse_decision(&response, "find: locate crop")
    }

    /// Fine pass: fractional vertical position of the content within the crop.
    /// Falls back to the crop center when the model loses track of it.
    async fn locate_within_crop(
        &self,
        content_to_find: &str,
        description: &str,
        crop: &str,
    ) -> AgentResult<f64> {
        let prompt = format!(
            "You are a helpful assistant tasked with determining if some content is present in a \
             screenshot.\n\
             \n\
             Here is what you are looking for: {content_to_find}\n\
             {description}\n\
             \n\
             Respond with a JSON object with the following fields:\n\
             {{\n\
                 \"found\": <true if the content is present in the screenshot, false otherwise>,\n\
                 \"vertical_position\": <the vertical position of the content on the screenshot as \
             a float between 0 and 1, where 0 is the top of the screenshot and 1 is the bottom of \
             the screenshot. If the content is not present, return -1>\n\
             }}"
        );
        let message = ChatMessage::user_with_images(&prompt, std::slice::from_ref(&crop.to_string()));
        let response = self
            .service
            .decide(
                vec![message],
                DecideOptions::json(self.model.clone()).with_timeout(self.timeout),
            )
            .await?;
        let position: CropPosition = parse_decision(&response, "find: locate within crop")?;
        if position.found && (0.0..=1.0).contains(&position.vertical_position) {
            Ok(position.vertical_position)
        } else {
            Ok(0.5)
        }
    }

    /// Fallback for pages with custom or virtualized scroll handling: nudge
    /// toward the target in viewport-fraction steps, re-polling the achieved
    /// position, until converged or the page stops moving.
    async fn converge_by_stepping(&self, target: f64) -> AgentResult<()> {
        let mut last = self.driver.scroll_top().await?;
        loop {
            let delta = target - last;
            if delta.abs() <= self.config.scroll_tolerance_px {
                return Ok(());
            }
            let direction = if delta > 0.0 {
                ScrollDirection::Down
            } else {
                ScrollDirection::Up
            };
            self.driver
                .scroll(direction, self.config.step_fraction)
                .await?;
            let now = self.driver.scroll_top().await?;
            if (now - last).abs() < 1.0 {
                // Bottom of page or a scroll container that ignores us.
                tracing::debug!(target, achieved = now, "step scrolling stalled");
                return Ok(());
            }
            if (target - now).signum() != delta.signum() {
                // Crossed the target: one step of overshoot is as close as
                // stepping gets.
                return Ok(());
            }
            last = now;
        }
    }
}

/// Absolute scroll offset for content at `fraction` within crop `crop_index`,
/// clamped to the scrollable range. Centering the content means scrolling to
/// half a crop above its estimated position.
pub fn scroll_target(
    crop_index: usize,
    fraction: f64,
    crop_height: u32,
    page_height: f64,
    viewport_height: f64,
) -> f64 {
    let crop_height = crop_height as f64;
    let raw = crop_index as f64 * crop_height + (fraction - 0.5) * crop_height;
    raw.clamp(0.0, (page_height - viewport_height).max(0.0))
}

//! Prompt builders shared by the goal manager, action chooser, and terminal
//! decisions. Wording follows the original operator prompts; the page
//! context block is assembled from the current `PageState`.

use crate::browser::driver::{BrowserTab, PageState};

pub fn system_prompt(task: &str) -> String {
    let today = chrono::Local::now().format("%Y-%m-%d");
    format!(
        r#"You are a web browsing assistant helping to complete the following task: "{task}"

Here are the possible actions you can take:
- click_element (element_id: int): click on an element on the page
- type_text (element_id: int, text: str, submit: bool): click on a text box and type text into it. This will automatically clear the text box before typing. Set submit to true to press Enter afterwards.
- scroll (direction: up | down, amount: float = 0.75): manually scroll the page in the given direction by the given amount
- navigate (direction: back | forward): go back to the previous page or go forward to the next page
- go_to_url (url: str): go to a specific url
- switch_tab (tab_index: int): switch to a different tab
- find (content_to_find: str): search the page for specific content and automatically scrolls to its location if found. Provide as much context/detail as possible about what you are looking for.
- extract (information_to_extract: str): Gets the entire text content of the page and extracts textual information based on a descriptive query.
- submit_for_evaluation: indicate that you believe the task is complete and ready for evaluation. An external reviewer will assess and provide feedback if any aspects of the task remain incomplete.


It is currently {today}"#
    )
}

pub fn format_page_position(pixels_above: f64, pixels_below: f64) -> &'static str {
    let has_content_above = pixels_above > 0.0;
    let has_content_below = pixels_below > 0.0;
    match (has_content_above, has_content_below) {
        (true, true) => "You are in the middle of the page.",
        (true, false) => "You are at the bottom of the page.",
        (false, true) => "You are at the top of the page.",
        (false, false) => "The entire page is visible. No scrolling is needed/possible.",
    }
}

pub fn format_interactable_elements(state: &PageState) -> String {
    let mut elements_text = String::new();
    for element in state.elements.values() {
        elements_text.push_str(&format!(
            "- Element {}: {}\n",
            element.id, element.description
        ));
    }
    let elements_text = elements_text.trim_end().to_string();
    if elements_text.is_empty() {
        return "None".into();
    }

    let above = if state.pixels_above > 0.0 {
        format!(
            "... {} pixels above - scroll up to see more ...",
            state.pixels_above as u64
        )
    } else {
        "[Top of page]".into()
    };
    let below = if state.pixels_below > 0.0 {
        format!(
            "... {} pixels below - scroll down to see more ...",
            state.pixels_below as u64
        )
    } else {
        "[Bottom of page]".into()
    };
    format!("{above}\n{elements_text}\n{below}")
}

pub fn format_tabs(tabs: &[BrowserTab]) -> String {
    if tabs.is_empty() {
        return "None".into();
    }
    tabs.iter()
        .map(|tab| {
            let focus_marker = if tab.is_focused { " (focused)" } else { "" };
            format!("- Tab {}{}: {} ({})", tab.index, focus_marker, tab.title, tab.url)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The page-context block shared by every page-aware decision prompt.
pub fn page_context(state: &PageState) -> String {
    format!(
        "OPEN BROWSER TABS:\n{tabs}\n\nPAGE DETAILS:\n{position}\n\n- Summary:\n{summary}\n\n\n\
         - Detailed breakdown:\n{breakdown}\n\n\nCURRENTLY VISIBLE INTERACTABLE ELEMENTS:\n{elements}",
        tabs = format_tabs(&state.tabs),
        position = format_page_position(state.pixels_above, state.pixels_below),
        summary = state.page_summary,
        breakdown = state.page_breakdown,
        elements = format_interactable_elements(state),
    )
}

const PAGE_RULES: &str = "\
Rules:
- Always use the extract action if you need to extract specific information from the page (recipe, top comment, title, etc.), even if you can see the information on the page.
- If you need to find a specific element on the page to interact with (e.g. a button, link, etc.), use the find action instead of the scroll action. Only use the scroll action if you need to view more of the page.
- When performing a search via a search bar, use a more general query if the current query is not working.
- For date inputs, type the desired date instead of using the date picker.
- If there is a dropdown menu, select an option before proceeding.";

pub fn next_goal_prompt(state: &PageState) -> String {
    format!(
        r#"{context}


SCREENSHOTS:
The screenshots are ordered from top to bottom; the first screenshot is the top of the page and the last screenshot is the bottom of the page.


TASK:
1. Describe the current state of the task. Outline what has been done so far and what remains to be done. If any mistakes were made and backtracking is needed, explain what went wrong and what needs to be done to correct it.
2. Determine what the immediate next goal should be. This typically should be a single action to take. The goal must be possible to complete on the current page.

If you are stuck, assess the state of the page, brainstorm alternative strategies to proceed, and then determine the next goal. Don't repeatedly try the same thing if it's not working.

If the task is fully complete, suggest submitting for evaluation.


Output your response in JSON format.
{{
    "task_state": <description of the current state of the task>,
    "next_goal": <the next goal to accomplish>
}}


{rules}"#,
        context = page_context(state),
        rules = PAGE_RULES,
    )
}

pub fn goal_completion_prompt(state: &PageState, goal: &str) -> String {
    format!(
        r#"{context}


TASK:
1. Evaluate the outcome of the previous action.
- If something unintended happened, explain what went wrong and what should be done to correct it.
- If the previous action was the "extract" action, you don't need to verify the truthfulness of the extracted text.

2. Evaluate if the goal has been completed and provide feedback on the goal's completion.
- If the goal is not completed, explain why and what needs to be done to complete the goal. If the goal is completed, briefly summarize what was done to complete the goal.
- If you are stuck on completing the goal, brainstorm alternative strategies to complete the goal.

Goal: {goal}


Use the screenshots to evaluate if the goal has been completed. They capture the state of the page through time in chronological order.

Output your response in JSON format.
{{
    "previous_action_evaluation": <evaluation of the previous action>,
    "completed": <boolean indicating if the goal has been completed>,
    "feedback": <feedback>
}}"#,
        context = page_context(state),
    )
}

pub fn goal_validity_prompt(state: &PageState, goal: &str) -> String {
    format!(
        r#"{context}


TASK:
Determine if the current goal is still a good goal. Here are some examples of when the goal should be updated:
- If the goal is no longer relevant to the current page
- If the state change makes the current goal irrelevant, impossible, or suboptimal (e.g., an item goes out of stock, a required form field appears only after clicking submit)
- If a new error or notification appears that requires immediate attention (e.g., session timeout, captcha verification)
- If the website structure has changed significantly from what was expected (e.g., redirected to a different page)
- If a more efficient path to accomplish the overall task becomes available (e.g., a direct link appears)
- If prerequisites for the current goal need to be completed first (e.g., login required before proceeding)
- If the current goal was based on incorrect assumptions about the website's functionality
- If external factors have changed (e.g., price increases, availability changes)
- If the goal is too vague and needs to be made more specific based on the current page context


Current goal: {goal}

The screenshots capture the state of the page through time while the goal was being completed.


Output your response in JSON format.
{{
    "reasoning": <reasoning on why the goal should be updated or not>,
    "should_update_goal": <boolean indicating if the goal should be updated>
}}"#,
        context = page_context(state),
    )
}

pub fn action_choice_prompt(state: &PageState, goal: &str) -> String {
    format!(
        r#"{context}


About the screenshot:
- It shows the current visible portion of the page with bounding boxes drawn around interactable elements.
- The element IDs are the numbers in top-left of boxes.


TASK: Choose the next action that helps you towards the current goal.

Goal: {goal}

Guidelines:
- DO NOT REPEATEDLY TRY THE SAME ACTION IF IT IS NOT WORKING. Try an alternative strategy.
- Consider the feedback from previous actions if they failed.

{rules}"#,
        context = page_context(state),
        rules = PAGE_RULES,
    )
}

pub fn task_output_prompt(task: &str) -> String {
    format!(
        r#"TASK 1:
Provide a 1-2 sentence final response to the task. If the task was not completed, briefly explain why not.

As a reminder, the task is: {task}

TASK 2:
Determine if the task requires any information to be returned. If so, reference the message history to find the requested information and return it. DO NOT MAKE UP ANY INFORMATION. If information requested for the task is not present in the message history, simply state what information is missing.


Output your response in JSON format.
{{
    "response": <final response to the task>,
    "reasoning": <reasoning about whether the task requires any information to be returned>,
    "information": <Return the content requested by the task in natural language. If no information is requested, return an empty string>
}}"#
    )
}

pub fn extract_prompt(information_to_extract: &str, page_text: &str) -> String {
    format!(
        "You are a specialized text extraction assistant. Your task is to find and extract \
         information pertaining to the following query: {information_to_extract}.\n\
         \n\
         If there is no information on the page pertaining to the query, say so. Do not try to \
         answer the query based on information not in the page content.\n\
         \n\
         Here is the page content:\n{page_text}"
    )
}

pub const TASK_EVALUATOR_SYSTEM_PROMPT: &str = r#"As an evaluator, you will be presented with three primary components to assist you in your role:

1. Web Task Instruction: This is a clear and specific directive provided in natural language, detailing the online activity to be carried out. These requirements may include conducting searches, verifying information, comparing prices, checking availability, or any other action relevant to the specified web service (such as Amazon, Apple, ArXiv, BBC News, Booking etc).

2. Screenshots: This is a visual representation of the screen showing the process of performing a web task. It serves as visual proof of the actions taken in response to the instruction. The screenshots are ordered in chronological order.

3. Result Response: This is a textual response obtained after the execution of the web task. It serves as textual result in response to the instruction.


Your primary responsibility is to evaluate the task completion by:
1. Assessing whether the actions shown in screenshots and described in the response align with the web task instructions
2. Verifying that all conditions and parts of the instructions were met and completed successfully
3. Using screenshots as the definitive source of truth when explicit contradictions exist with the text response. The text response not being present in the screenshots is not a contradiction.

Note: The person performing the task is able to extract textual information from the page without scrolling to it first. As a result, it's possible some information they gathered in the result response cannot be verified through the screenshots.

Rules:
- If there's no evidence in the screenshots to verify the information in the result response, you should choose 'unclear'.
- You should only choose 'failed' if you have explicit evidence that the task was not completed successfully.


Provide detailed feedback explaining:
- For successful tasks: Why the task was completed correctly
- For failed tasks: What went wrong and what should have been done differently
- For unclear verdicts: What information was missing to make a determination

Output a JSON object with the following format:
{
    "verdict": <success | failed | unclear>,
    "feedback": <feedback>
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::driver::PageElement;

    #[test]
    fn page_position_covers_all_quadrants() {
        assert_eq!(
            format_page_position(100.0, 100.0),
            "You are in the middle of the page."
        );
        assert_eq!(
            format_page_position(100.0, 0.0),
            "You are at the bottom of the page."
        );
        assert_eq!(
            format_page_position(0.0, 100.0),
            "You are at the top of the page."
        );
        assert_eq!(
            format_page_position(0.0, 0.0),
            "The entire page is visible. No scrolling is needed/possible."
        );
    }

    #[test]
    fn element_formatting_marks_scroll_edges() {
        let mut state = PageState {
            pixels_above: 0.0,
            pixels_below: 420.0,
            ..Default::default()
        };
        state.elements.insert(
            3,
            PageElement {
                id: 3,
                description: "<a>Contact</a>".into(),
                in_viewport: true,
            },
        );
        let formatted = format_interactable_elements(&state);
        assert!(formatted.starts_with("[Top of page]"));
        assert!(formatted.contains("- Element 3: <a>Contact</a>"));
        assert!(formatted.ends_with("... 420 pixels below - scroll down to see more ..."));
    }

    #[test]
    fn no_elements_renders_none() {
        let state = PageState::default();
        assert_eq!(format_interactable_elements(&state), "None");
    }
}

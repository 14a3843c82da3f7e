//! Deterministic in-memory screen backend.
//!
//! `ScriptedScreen` implements every collaborator trait from scripted
//! responses: template hits, per-account delta cells, dropdown pages. It keeps
//! enough bookkeeping to catch lock violations: a frame's content is fixed at
//! capture time from the account switched to last, and a switch that arrives
//! between another task's switch and capture is counted as an interleaving.

use chrono::Utc;
use deltamon_core::{AccountId, Rect};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use crate::error::{ScreenError, ScreenResult};
use crate::traits::{
    BoxFuture, Extracted, Frame, Located, RegionLocator, ScreenCapture, TextExtractor, UiDriver,
};

/// Template name the scripted backend treats as the per-account delta cell.
pub const DEFAULT_DELTA_TEMPLATE: &str = "delta_cell";

/// Bounds reported for a located delta cell.
pub const CELL_BOUNDS: Rect = Rect {
    x: 640,
    y: 310,
    width: 90,
    height: 18,
};

/// What the delta cell of an account looks like on one scan.
#[derive(Debug, Clone, PartialEq)]
pub enum CellKind {
    Text { text: String, confidence: f64 },
    /// Template not on screen.
    NotFound,
    /// Template matched with the given (low) confidence.
    WeakMatch(f64),
    LocateError,
    CaptureError,
    ExtractError,
}

/// One scripted scan of an account's delta cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellResponse {
    pub kind: CellKind,
    /// Delay inside `locate` (while the capture gate is held).
    pub locate_delay: Duration,
    /// Delay inside `extract` (outside the capture gate).
    pub extract_delay: Duration,
}

impl CellResponse {
    fn of(kind: CellKind) -> Self {
        Self {
            kind,
            locate_delay: Duration::ZERO,
            extract_delay: Duration::ZERO,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::text_with_confidence(text, 0.95)
    }

    pub fn text_with_confidence(text: impl Into<String>, confidence: f64) -> Self {
        Self::of(CellKind::Text {
            text: text.into(),
            confidence,
        })
    }

    pub fn not_found() -> Self {
        Self::of(CellKind::NotFound)
    }

    pub fn weak_match(confidence: f64) -> Self {
        Self::of(CellKind::WeakMatch(confidence))
    }

    pub fn locate_error() -> Self {
        Self::of(CellKind::LocateError)
    }

    pub fn capture_error() -> Self {
        Self::of(CellKind::CaptureError)
    }

    pub fn extract_error() -> Self {
        Self::of(CellKind::ExtractError)
    }

    pub fn with_locate_delay(mut self, delay: Duration) -> Self {
        self.locate_delay = delay;
        self
    }

    pub fn with_extract_delay(mut self, delay: Duration) -> Self {
        self.extract_delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
enum FrameContent {
    Text { text: String, confidence: f64 },
    ExtractError,
}

#[derive(Debug, Clone)]
struct FrameEntry {
    content: FrameContent,
    delay: Duration,
}

#[derive(Debug, Default)]
struct TemplateScript {
    located: Option<Located>,
    fail_first: u32,
    calls: u32,
}

#[derive(Debug)]
struct AccountScript {
    queue: VecDeque<CellResponse>,
    fallback: CellResponse,
}

#[derive(Debug, Default)]
struct State {
    templates: HashMap<String, TemplateScript>,
    accounts: HashMap<AccountId, AccountScript>,
    current: Option<AccountId>,
    pending: Option<CellResponse>,
    switched_not_captured: bool,
    interleavings: u64,
    switch_log: Vec<AccountId>,
    switch_failures: HashSet<AccountId>,
    frames: HashMap<String, FrameEntry>,
    next_frame: u64,
    extract_calls: u64,
    dropdown_pages: Vec<String>,
    dropdown_confidence: f64,
    dropdown_open: bool,
    page: usize,
    fail_open: bool,
    opens: u32,
    scrolls: u32,
    closes: u32,
}

/// Scripted screen backend for tests and dry runs.
#[derive(Debug)]
pub struct ScriptedScreen {
    delta_template: String,
    state: Mutex<State>,
}

impl Default for ScriptedScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedScreen {
    pub fn new() -> Self {
        Self {
            delta_template: DEFAULT_DELTA_TEMPLATE.to_string(),
            state: Mutex::new(State {
                dropdown_confidence: 0.92,
                ..Default::default()
            }),
        }
    }

    pub fn with_delta_template(mut self, template: impl Into<String>) -> Self {
        self.delta_template = template.into();
        self
    }

    /// A ready-to-run screen: the dropdown trigger is located under
    /// `dropdown_template`, the list shows `accounts` on one page, and each
    /// account's cell reads the given text.
    pub fn demo(dropdown_template: &str, accounts: &[(&str, &str)]) -> Self {
        let screen = Self::new();
        screen.set_template(dropdown_template, Rect::new(420, 88, 160, 24), 0.97);
        screen.set_dropdown_pages(vec![accounts.iter().map(|(id, _)| *id).collect()]);
        for (id, text) in accounts {
            if let Ok(id) = AccountId::new(*id) {
                screen.set_account(id, CellResponse::text(*text));
            }
        }
        screen
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    /// Make `template` locatable at `bounds`.
    pub fn set_template(&self, template: &str, bounds: Rect, confidence: f64) {
        let mut state = self.state.lock();
        let entry = state.templates.entry(template.to_string()).or_default();
        entry.located = Some(Located { bounds, confidence });
    }

    /// The first `n` locate calls for `template` report not found.
    pub fn fail_template_first(&self, template: &str, n: u32) {
        let mut state = self.state.lock();
        state.templates.entry(template.to_string()).or_default().fail_first = n;
    }

    /// Default cell response for an account, used when its queue is empty.
    pub fn set_account(&self, account: AccountId, fallback: CellResponse) {
        let mut state = self.state.lock();
        match state.accounts.get_mut(&account) {
            Some(script) => script.fallback = fallback,
            None => {
                state.accounts.insert(
                    account,
                    AccountScript {
                        queue: VecDeque::new(),
                        fallback,
                    },
                );
            }
        }
    }

    /// Queue a one-shot cell response for an account.
    pub fn push_response(&self, account: AccountId, response: CellResponse) {
        let mut state = self.state.lock();
        state
            .accounts
            .entry(account)
            .or_insert_with(|| AccountScript {
                queue: VecDeque::new(),
                fallback: CellResponse::not_found(),
            })
            .queue
            .push_back(response);
    }

    /// Lines visible in the expanded dropdown, one entry per scroll page.
    pub fn set_dropdown_pages(&self, pages: Vec<Vec<&str>>) {
        let mut state = self.state.lock();
        state.dropdown_pages = pages.into_iter().map(|p| p.join("\n")).collect();
    }

    pub fn set_dropdown_confidence(&self, confidence: f64) {
        self.state.lock().dropdown_confidence = confidence;
    }

    pub fn fail_open_dropdown(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    pub fn fail_switch(&self, account: AccountId) {
        self.state.lock().switch_failures.insert(account);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Switches that happened between another switch and its capture.
    pub fn interleavings(&self) -> u64 {
        self.state.lock().interleavings
    }

    pub fn switch_log(&self) -> Vec<AccountId> {
        self.state.lock().switch_log.clone()
    }

    pub fn extract_calls(&self) -> u64 {
        self.state.lock().extract_calls
    }

    pub fn template_calls(&self, template: &str) -> u32 {
        self.state
            .lock()
            .templates
            .get(template)
            .map_or(0, |t| t.calls)
    }

    /// `(opens, scrolls, closes)` of the dropdown.
    pub fn dropdown_interactions(&self) -> (u32, u32, u32) {
        let state = self.state.lock();
        (state.opens, state.scrolls, state.closes)
    }

    pub fn is_dropdown_open(&self) -> bool {
        self.state.lock().dropdown_open
    }

    fn next_frame_id(state: &mut State) -> String {
        state.next_frame += 1;
        format!("frame-{}", state.next_frame)
    }

    async fn locate_cell(&self) -> ScreenResult<Option<Located>> {
        let response = {
            let mut state = self.state.lock();
            let Some(current) = state.current.clone() else {
                state.switched_not_captured = false;
                return Ok(None);
            };
            match state.accounts.get_mut(&current) {
                Some(script) => script
                    .queue
                    .pop_front()
                    .unwrap_or_else(|| script.fallback.clone()),
                None => CellResponse::not_found(),
            }
        };

        if !response.locate_delay.is_zero() {
            tokio::time::sleep(response.locate_delay).await;
        }

        let mut state = self.state.lock();
        match response.kind {
            CellKind::NotFound => {
                state.switched_not_captured = false;
                Ok(None)
            }
            CellKind::WeakMatch(confidence) => {
                state.switched_not_captured = false;
                Ok(Some(Located {
                    bounds: CELL_BOUNDS,
                    confidence,
                }))
            }
            CellKind::LocateError => {
                state.switched_not_captured = false;
                Err(ScreenError::Backend("template matcher crashed".to_string()))
            }
            _ => {
                state.pending = Some(response);
                Ok(Some(Located {
                    bounds: CELL_BOUNDS,
                    confidence: 0.95,
                }))
            }
        }
    }
}

impl RegionLocator for ScriptedScreen {
    fn locate<'a>(&'a self, template: &'a str) -> BoxFuture<'a, ScreenResult<Option<Located>>> {
        Box::pin(async move {
            if template == self.delta_template {
                return self.locate_cell().await;
            }
            let mut state = self.state.lock();
            let Some(script) = state.templates.get_mut(template) else {
                return Ok(None);
            };
            script.calls += 1;
            if script.calls <= script.fail_first {
                return Ok(None);
            }
            Ok(script.located)
        })
    }
}

impl ScreenCapture for ScriptedScreen {
    fn capture(&self, region: Rect) -> BoxFuture<'_, ScreenResult<Frame>> {
        Box::pin(async move {
            let mut state = self.state.lock();

            let entry = if state.dropdown_open {
                let page = state
                    .dropdown_pages
                    .get(state.page)
                    .or_else(|| state.dropdown_pages.last())
                    .cloned()
                    .unwrap_or_default();
                FrameEntry {
                    content: FrameContent::Text {
                        text: page,
                        confidence: state.dropdown_confidence,
                    },
                    delay: Duration::ZERO,
                }
            } else {
                state.switched_not_captured = false;
                let Some(response) = state.pending.take() else {
                    return Err(ScreenError::Backend("capture without a located cell".into()));
                };
                let content = match response.kind {
                    CellKind::Text { text, confidence } => FrameContent::Text { text, confidence },
                    CellKind::ExtractError => FrameContent::ExtractError,
                    _ => return Err(ScreenError::Backend("screenshot failed".to_string())),
                };
                FrameEntry {
                    content,
                    delay: response.extract_delay,
                }
            };

            let id = Self::next_frame_id(&mut state);
            state.frames.insert(id.clone(), entry);
            Ok(Frame {
                id,
                region,
                captured_at: Utc::now(),
            })
        })
    }
}

impl TextExtractor for ScriptedScreen {
    fn extract<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, ScreenResult<Extracted>> {
        Box::pin(async move {
            let entry = {
                let mut state = self.state.lock();
                state.extract_calls += 1;
                state.frames.remove(&frame.id)
            };
            let Some(entry) = entry else {
                return Err(ScreenError::Backend(format!("unknown frame {}", frame.id)));
            };
            if !entry.delay.is_zero() {
                tokio::time::sleep(entry.delay).await;
            }
            match entry.content {
                FrameContent::Text { text, confidence } => Ok(Extracted { text, confidence }),
                FrameContent::ExtractError => {
                    Err(ScreenError::Backend("ocr engine error".to_string()))
                }
            }
        })
    }
}

impl UiDriver for ScriptedScreen {
    fn open_dropdown(&self, _trigger: Rect) -> BoxFuture<'_, ScreenResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.opens += 1;
            if state.fail_open {
                return Err(ScreenError::Backend("click failed".to_string()));
            }
            state.dropdown_open = true;
            state.page = 0;
            Ok(())
        })
    }

    fn scroll_list(&self, _list: Rect) -> BoxFuture<'_, ScreenResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.scrolls += 1;
            if state.dropdown_open && state.page + 1 < state.dropdown_pages.len() {
                state.page += 1;
            }
            Ok(())
        })
    }

    fn close_dropdown(&self, _trigger: Rect) -> BoxFuture<'_, ScreenResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.closes += 1;
            state.dropdown_open = false;
            Ok(())
        })
    }

    fn switch_account<'a>(
        &'a self,
        account: &'a AccountId,
        _position: usize,
    ) -> BoxFuture<'a, ScreenResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.switch_log.push(account.clone());
            if state.switched_not_captured {
                state.interleavings += 1;
            }
            state.switched_not_captured = true;
            if state.switch_failures.contains(account) {
                return Err(ScreenError::Backend(format!("could not select {account}")));
            }
            state.current = Some(account.clone());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> AccountId {
        AccountId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_cell_reads_current_account() {
        let screen = ScriptedScreen::new();
        screen.set_account(id("A"), CellResponse::text("0.01"));
        screen.set_account(id("B"), CellResponse::text("-0.02"));

        screen.switch_account(&id("B"), 1).await.unwrap();
        let located = screen.locate(DEFAULT_DELTA_TEMPLATE).await.unwrap().unwrap();
        let frame = screen.capture(located.bounds).await.unwrap();
        let text = screen.extract(&frame).await.unwrap();
        assert_eq!(text.text, "-0.02");
        assert_eq!(screen.interleavings(), 0);
    }

    #[tokio::test]
    async fn test_queued_responses_then_fallback() {
        let screen = ScriptedScreen::new();
        screen.set_account(id("A"), CellResponse::text("0.01"));
        screen.push_response(id("A"), CellResponse::not_found());

        screen.switch_account(&id("A"), 0).await.unwrap();
        assert!(screen.locate(DEFAULT_DELTA_TEMPLATE).await.unwrap().is_none());

        screen.switch_account(&id("A"), 0).await.unwrap();
        assert!(screen.locate(DEFAULT_DELTA_TEMPLATE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_interleaving_is_counted() {
        let screen = ScriptedScreen::new();
        screen.set_account(id("A"), CellResponse::text("0.01"));
        screen.set_account(id("B"), CellResponse::text("0.02"));

        screen.switch_account(&id("A"), 0).await.unwrap();
        screen.switch_account(&id("B"), 1).await.unwrap();
        assert_eq!(screen.interleavings(), 1);
    }

    #[tokio::test]
    async fn test_template_fail_first() {
        let screen = ScriptedScreen::new();
        screen.set_template("account_dropdown", Rect::new(0, 0, 10, 10), 0.9);
        screen.fail_template_first("account_dropdown", 2);

        assert!(screen.locate("account_dropdown").await.unwrap().is_none());
        assert!(screen.locate("account_dropdown").await.unwrap().is_none());
        assert!(screen.locate("account_dropdown").await.unwrap().is_some());
        assert_eq!(screen.template_calls("account_dropdown"), 3);
    }

    #[tokio::test]
    async fn test_dropdown_pages_advance_on_scroll() {
        let screen = ScriptedScreen::new();
        screen.set_dropdown_pages(vec![vec!["A", "B"], vec!["B", "C"]]);
        let list = Rect::new(0, 0, 100, 100);

        screen.open_dropdown(list).await.unwrap();
        let f1 = screen.capture(list).await.unwrap();
        screen.scroll_list(list).await.unwrap();
        let f2 = screen.capture(list).await.unwrap();
        screen.scroll_list(list).await.unwrap();
        let f3 = screen.capture(list).await.unwrap();

        assert_eq!(screen.extract(&f1).await.unwrap().text, "A\nB");
        assert_eq!(screen.extract(&f2).await.unwrap().text, "B\nC");
        assert_eq!(screen.extract(&f3).await.unwrap().text, "B\nC");

        screen.close_dropdown(list).await.unwrap();
        assert!(!screen.is_dropdown_open());
        assert_eq!(screen.dropdown_interactions(), (1, 2, 1));
    }

    #[tokio::test]
    async fn test_demo_screen() {
        let screen = ScriptedScreen::demo("account_dropdown", &[("ACC_1", "0.02")]);
        assert!(screen.locate("account_dropdown").await.unwrap().is_some());
        screen.switch_account(&id("ACC_1"), 0).await.unwrap();
        assert!(screen.locate(DEFAULT_DELTA_TEMPLATE).await.unwrap().is_some());
    }
}

//! Browser checks driven through Playwright
//!
//! Steps that change page state (`navigate_to`, `fill_in`, `click`) are
//! recorded. Each assertion generates one Node script that replays the
//! recorded session in a fresh browser, runs a probe, and prints a single
//! JSON line that is parsed back here. Comparison happens in Rust.

use std::collections::BTreeMap;
use std::fmt;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

use crate::config::UiConfig;
use crate::error::{ComponentError, ComponentResult};

pub const AXE_VERSION: &str = "4.10.0";
pub const BETA_BANNER: &str = ".ons-phase-banner";
pub const IMPROVE_THIS_PAGE_BANNER: &str = ".improve-this-page";

static PLAYWRIGHT_AVAILABLE: OnceCell<bool> = OnceCell::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(ComponentError::InvalidConfig(format!(
                "unknown browser {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded step that changes page state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    Navigate { route: String },
    Fill { selector: String, value: String },
    Click { selector: String },
}

/// What the replayed session reports back
#[derive(Debug, Clone)]
enum Probe {
    Visible { selector: String },
    InputValue { selector: String },
    Texts { selectors: Vec<String> },
    ListItems { selector: String, depth: usize },
    Accessibility { config: AccessibilityConfig },
}

#[derive(Debug, Deserialize)]
struct ScriptOutcome {
    success: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

// ---- accessibility ----

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Violation {
    pub id: String,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub help: String,
    #[serde(default, rename = "helpUrl")]
    pub help_url: String,
    #[serde(default)]
    pub nodes: Vec<ViolationNode>,
}

impl Violation {
    fn to_error_line(&self) -> String {
        format!("{}: {} ({} violations)", self.id, self.description, self.nodes.len())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ViolationNode {
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub html: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleToggle {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOnly {
    #[serde(rename = "type")]
    pub kind: String,
    pub values: Vec<String>,
}

/// Options handed to `axe.run`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityConfig {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<String, RuleToggle>,
    pub run_only: RunOnly,
}

impl Default for AccessibilityConfig {
    fn default() -> Self {
        Self {
            rules: BTreeMap::new(),
            run_only: RunOnly {
                kind: "tag".to_string(),
                values: ["wcag2a", "wcag2aa", "wcag21a", "wcag21aa"]
                    .map(String::from)
                    .to_vec(),
            },
        }
    }
}

impl AccessibilityConfig {
    pub fn disable_rule(mut self, rule: impl Into<String>) -> Self {
        self.rules.insert(rule.into(), RuleToggle { enabled: false });
        self
    }
}

/// Empty when there are no violations
pub fn violation_message(violations: &[Violation]) -> String {
    if violations.is_empty() {
        return String::new();
    }
    let mut message = "The following accessibility rules have been violated:".to_string();
    for violation in violations {
        message.push('\n');
        message.push_str(&violation.to_error_line());
    }
    message
}

// ---- feature ----

/// Browser session state for one scenario
#[derive(Debug)]
pub struct UiFeature {
    config: UiConfig,
    actions: Vec<UiAction>,
}

impl UiFeature {
    pub fn new(config: UiConfig) -> Self {
        Self {
            config,
            actions: Vec::new(),
        }
    }

    pub fn config(&self) -> &UiConfig {
        &self.config
    }

    pub fn actions(&self) -> &[UiAction] {
        &self.actions
    }

    /// Forget the recorded session
    pub fn reset(&mut self) {
        self.actions.clear();
    }

    pub fn navigate_to(&mut self, route: &str) {
        self.actions.push(UiAction::Navigate {
            route: route.to_string(),
        });
    }

    pub fn fill_in(&mut self, selector: &str, value: &str) {
        self.actions.push(UiAction::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
        });
    }

    pub fn click(&mut self, selector: &str) {
        self.actions.push(UiAction::Click {
            selector: selector.to_string(),
        });
    }

    pub async fn element_should_be_visible(&self, selector: &str) -> ComponentResult<()> {
        self.run(&Probe::Visible {
            selector: selector.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn input_element_has_value(&self, selector: &str, expected: &str) -> ComponentResult<()> {
        let value = self
            .run(&Probe::InputValue {
                selector: selector.to_string(),
            })
            .await?;
        let actual = value.as_str().unwrap_or_default();
        if actual != expected {
            return Err(ComponentError::AssertionFailed(format!(
                "input {selector:?} has value {actual:?}, want {expected:?}"
            )));
        }
        Ok(())
    }

    pub async fn beta_banner_should_be_visible(&self) -> ComponentResult<()> {
        self.element_should_be_visible(BETA_BANNER).await
    }

    pub async fn improve_this_page_banner_should_be_visible(&self) -> ComponentResult<()> {
        self.element_should_be_visible(IMPROVE_THIS_PAGE_BANNER).await
    }

    /// `expected` is a JSON object of selector -> visible text
    pub async fn page_should_have_content(&self, expected: &str) -> ComponentResult<()> {
        let expected = parse_content_map(expected)?;
        let actual = self.visible_texts(&expected).await?;
        check_content(&expected, &actual)
    }

    /// Selectors that are not found count as a pass
    pub async fn page_should_not_have_content(&self, unexpected: &str) -> ComponentResult<()> {
        let unexpected = parse_content_map(unexpected)?;
        let actual = self.visible_texts(&unexpected).await?;
        check_absent_content(&unexpected, &actual)
    }

    /// Check the leaf text of each list entry under `[data-test='<data_test>']`.
    /// `depth` is how many first-child hops lead to the list container.
    pub async fn list_items_should_have_text(
        &self,
        data_test: &str,
        texts: &str,
        depth: usize,
    ) -> ComponentResult<()> {
        let value = self
            .run(&Probe::ListItems {
                selector: format!("[data-test='{data_test}']"),
                depth,
            })
            .await?;
        let actual: Vec<Option<String>> = serde_json::from_value(value)?;
        let expected: Vec<&str> = texts.split(',').collect();
        check_list_items(&expected, &actual)
    }

    pub async fn page_should_be_accessible(&self) -> ComponentResult<()> {
        self.page_should_be_accessible_with(AccessibilityConfig::default())
            .await
    }

    pub async fn page_should_be_accessible_with(&self, config: AccessibilityConfig) -> ComponentResult<()> {
        let value = self.run(&Probe::Accessibility { config }).await?;
        let violations: Vec<Violation> = serde_json::from_value(value)?;
        if violations.is_empty() {
            return Ok(());
        }
        Err(ComponentError::Accessibility(violation_message(&violations)))
    }

    async fn visible_texts(
        &self,
        selectors: &BTreeMap<String, String>,
    ) -> ComponentResult<BTreeMap<String, Option<String>>> {
        let value = self
            .run(&Probe::Texts {
                selectors: selectors.keys().cloned().collect(),
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Replay the session, run `probe`, and return the value it reported
    async fn run(&self, probe: &Probe) -> ComponentResult<Value> {
        ensure_playwright()?;
        let script = build_script(&self.config, &self.actions, probe)?;
        let output = self.run_script(&script).await?;
        let outcome = parse_outcome(&output)?;
        if !outcome.success {
            return Err(ComponentError::Playwright(
                outcome.error.unwrap_or_else(|| "script reported failure".to_string()),
            ));
        }
        Ok(outcome.value)
    }

    async fn run_script(&self, script: &str) -> ComponentResult<String> {
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("probe.js");
        std::fs::write(&script_path, script)?;

        debug!("Running Playwright script: {}", script_path.display());

        let mut cmd = TokioCommand::new("node");
        cmd.arg(&script_path).kill_on_drop(true);
        match &self.config.node_project_dir {
            Some(dir) => {
                cmd.current_dir(dir).env("NODE_PATH", dir.join("node_modules"));
            }
            None => {
                cmd.current_dir(temp_dir.path());
            }
        }

        let limit = Duration::from_millis(self.config.script_timeout_ms);
        let output = tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| ComponentError::Timeout(format!("Playwright script after {limit:?}")))??;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() && !stdout.contains("\"success\"") {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ComponentError::Playwright(format!(
                "Script failed:\nstdout: {}\nstderr: {}",
                stdout, stderr
            )));
        }
        Ok(stdout)
    }
}

fn ensure_playwright() -> ComponentResult<()> {
    let available = *PLAYWRIGHT_AVAILABLE.get_or_init(|| {
        let status = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        let ok = matches!(status, Ok(s) if s.success());
        info!("Playwright available: {}", ok);
        ok
    });
    if available {
        Ok(())
    } else {
        Err(ComponentError::PlaywrightNotFound)
    }
}

/// JavaScript string literal for `s`
fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn build_script(config: &UiConfig, actions: &[UiAction], probe: &Probe) -> ComponentResult<String> {
    let wait = config.wait_timeout_ms;
    let mut script = format!(
        r#"const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  try {{
    const context = await browser.newContext({{
      viewport: {{ width: {width}, height: {height} }}
    }});
    const page = await context.newPage();
    const baseUrl = {base_url};
"#,
        browser = config.browser.as_str(),
        headless = config.headless,
        width = config.viewport_width,
        height = config.viewport_height,
        base_url = js_string(&config.base_url),
    );

    for action in actions {
        script.push_str(&action_to_js(action, wait));
        script.push('\n');
    }

    script.push_str("    const value = await (async () => {\n");
    script.push_str(&probe_to_js(probe, wait)?);
    script.push_str(
        r#"
    })();
    console.log(JSON.stringify({ success: true, value: value === undefined ? null : value }));
  } catch (error) {
    console.log(JSON.stringify({ success: false, error: error.message }));
    process.exitCode = 1;
  } finally {
    await browser.close();
  }
})();
"#,
    );
    Ok(script)
}

fn action_to_js(action: &UiAction, wait: u64) -> String {
    match action {
        UiAction::Navigate { route } => {
            format!("    await page.goto(baseUrl + {});", js_string(route))
        }
        UiAction::Fill { selector, value } => format!(
            "    await page.fill({}, {}, {{ timeout: {wait} }});",
            js_string(selector),
            js_string(value)
        ),
        UiAction::Click { selector } => {
            format!("    await page.click({}, {{ timeout: {wait} }});", js_string(selector))
        }
    }
}

fn probe_to_js(probe: &Probe, wait: u64) -> ComponentResult<String> {
    let js = match probe {
        Probe::Visible { selector } => format!(
            "      await page.waitForSelector({}, {{ state: 'visible', timeout: {wait} }});\n      return true;",
            js_string(selector)
        ),
        Probe::InputValue { selector } => {
            let sel = js_string(selector);
            format!(
                "      await page.waitForSelector({sel}, {{ state: 'visible', timeout: {wait} }});\n      return await page.inputValue({sel});"
            )
        }
        Probe::Texts { selectors } => format!(
            r#"      const out = {{}};
      for (const sel of {list}) {{
        try {{
          await page.waitForSelector(sel, {{ state: 'visible', timeout: {wait} }});
          out[sel] = await page.innerText(sel);
        }} catch (e) {{
          out[sel] = null;
        }}
      }}
      return out;"#,
            list = serde_json::to_string(selectors)?
        ),
        Probe::ListItems { selector, depth } => format!(
            r#"      const root = await page.waitForSelector({sel}, {{ state: 'attached', timeout: {wait} }});
      return await root.evaluate((el, depth) => {{
        const kids = n => Array.from(n.childNodes).filter(c => !(c.nodeType === 3 && !c.nodeValue.trim()));
        let node = el;
        for (let i = 0; i < depth - 1; i++) {{
          node = kids(node)[0];
          if (!node) return [];
        }}
        return kids(node).map(child => {{
          let leaf = child;
          while (kids(leaf).length > 0) leaf = kids(leaf)[0];
          return leaf.nodeValue;
        }});
      }}, {depth});"#,
            sel = js_string(selector)
        ),
        Probe::Accessibility { config } => format!(
            r#"      await page.addScriptTag({{ url: 'https://cdnjs.cloudflare.com/ajax/libs/axe-core/{AXE_VERSION}/axe.min.js' }});
      return await page.evaluate(cfg => axe.run(document, cfg).then(r => r.violations), {cfg});"#,
            cfg = serde_json::to_string(config)?
        ),
    };
    Ok(js)
}

/// The last stdout line that parses as a script outcome
fn parse_outcome(stdout: &str) -> ComponentResult<ScriptOutcome> {
    stdout
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str::<ScriptOutcome>(line.trim()).ok())
        .ok_or_else(|| ComponentError::Playwright(format!("no result line in output: {stdout}")))
}

fn parse_content_map(json: &str) -> ComponentResult<BTreeMap<String, String>> {
    serde_json::from_str(json)
        .map_err(|e| ComponentError::InvalidArgument(format!("content must be a JSON object of strings: {e}")))
}

fn check_content(
    expected: &BTreeMap<String, String>,
    actual: &BTreeMap<String, Option<String>>,
) -> ComponentResult<()> {
    for (selector, want) in expected {
        match actual.get(selector).and_then(Option::as_deref) {
            Some(got) if got.trim() == want.trim() => {}
            Some(got) => {
                return Err(ComponentError::AssertionFailed(format!(
                    "{selector:?} has text {got:?}, want {want:?}"
                )))
            }
            None => {
                return Err(ComponentError::AssertionFailed(format!(
                    "{selector:?} is not visible on the page"
                )))
            }
        }
    }
    Ok(())
}

fn check_absent_content(
    unexpected: &BTreeMap<String, String>,
    actual: &BTreeMap<String, Option<String>>,
) -> ComponentResult<()> {
    for (selector, text) in unexpected {
        if let Some(got) = actual.get(selector).and_then(Option::as_deref) {
            if got.trim() == text.trim() {
                return Err(ComponentError::AssertionFailed(format!(
                    "unexpected content {text:?} found in selector {selector:?}"
                )));
            }
        }
    }
    Ok(())
}

fn check_list_items(expected: &[&str], actual: &[Option<String>]) -> ComponentResult<()> {
    for (i, want) in expected.iter().enumerate() {
        match actual.get(i).and_then(Option::as_deref) {
            Some(got) if got == *want => {}
            _ => {
                return Err(ComponentError::AssertionFailed(format!("no match for {want}")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn found(pairs: &[(&str, Option<&str>)]) -> BTreeMap<String, Option<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(String::from)))
            .collect()
    }

    #[test]
    fn test_browser_from_str() {
        assert_eq!("Firefox".parse::<Browser>().unwrap(), Browser::Firefox);
        assert_eq!("chrome".parse::<Browser>().unwrap(), Browser::Chromium);
        assert!("lynx".parse::<Browser>().is_err());
    }

    #[test]
    fn test_script_replays_actions_and_escapes() {
        let mut ui = UiFeature::new(UiConfig::default());
        ui.navigate_to("/search");
        ui.fill_in("#q", "it's \"quoted\"");
        ui.click("button[type='submit']");

        let script = build_script(
            ui.config(),
            ui.actions(),
            &Probe::Visible {
                selector: ".results".to_string(),
            },
        )
        .unwrap();

        assert!(script.contains("chromium.launch({ headless: true })"));
        assert!(script.contains(r#"await page.goto(baseUrl + "/search");"#));
        assert!(script.contains(r##"await page.fill("#q", "it's \"quoted\"", { timeout: 10000 });"##));
        assert!(script.contains(r#"await page.click("button[type='submit']""#));
        assert!(script.contains(r#"page.waitForSelector(".results""#));

        let goto = script.find("page.goto").unwrap();
        let click = script.find("page.click").unwrap();
        assert!(goto < click);
    }

    #[test]
    fn test_reset_clears_session() {
        let mut ui = UiFeature::new(UiConfig::default());
        ui.navigate_to("/");
        ui.reset();
        assert!(ui.actions().is_empty());
    }

    #[test]
    fn test_accessibility_config_json() {
        let cfg = serde_json::to_value(AccessibilityConfig::default().disable_rule("region")).unwrap();
        assert_eq!(cfg["runOnly"]["type"], "tag");
        assert_eq!(cfg["runOnly"]["values"][3], "wcag21aa");
        assert_eq!(cfg["rules"]["region"]["enabled"], false);

        let plain = serde_json::to_value(AccessibilityConfig::default()).unwrap();
        assert!(plain.get("rules").is_none());
    }

    #[test]
    fn test_violation_message() {
        assert_eq!(violation_message(&[]), "");

        let violations: Vec<Violation> = serde_json::from_str(
            r#"[
                {"id": "image-alt", "impact": "critical", "tags": ["wcag2a"],
                 "description": "Ensures <img> elements have alternate text",
                 "help": "Images must have alternate text", "helpUrl": "https://example.com",
                 "nodes": [{"impact": "critical", "html": "<img>"}, {"html": "<img src=x>"}]},
                {"id": "label", "description": "Ensures every form element has a label", "nodes": []}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            violation_message(&violations),
            "The following accessibility rules have been violated:\n\
             image-alt: Ensures <img> elements have alternate text (2 violations)\n\
             label: Ensures every form element has a label (0 violations)"
        );
    }

    #[test]
    fn test_parse_outcome() {
        let out = parse_outcome("noise\n{\"success\":true,\"value\":\"abc\"}\n").unwrap();
        assert!(out.success);
        assert_eq!(out.value, "abc");

        let out = parse_outcome("{\"success\":false,\"error\":\"Timeout 10000ms exceeded\"}").unwrap();
        assert!(!out.success);
        assert_eq!(out.error.as_deref(), Some("Timeout 10000ms exceeded"));

        assert!(parse_outcome("Error: Cannot find module 'playwright'").is_err());
    }

    #[test]
    fn test_check_content() {
        let expected = content(&[("h1", "Welcome"), (".lead", "Hello")]);
        check_content(&expected, &found(&[("h1", Some("Welcome\n")), (".lead", Some("Hello"))])).unwrap();
        assert!(check_content(&expected, &found(&[("h1", Some("Welcome")), (".lead", Some("Bye"))])).is_err());
        assert!(check_content(&expected, &found(&[("h1", Some("Welcome")), (".lead", None)])).is_err());
    }

    #[test]
    fn test_check_absent_content() {
        let unexpected = content(&[("h1", "Error"), (".missing", "x")]);
        check_absent_content(&unexpected, &found(&[("h1", Some("Welcome")), (".missing", None)])).unwrap();
        assert!(check_absent_content(&unexpected, &found(&[("h1", Some("Error"))])).is_err());
    }

    #[test]
    fn test_check_list_items() {
        let actual = vec![Some("Home".to_string()), Some("Areas".to_string()), None];
        check_list_items(&["Home", "Areas"], &actual).unwrap();
        assert!(check_list_items(&["Home", "Regions"], &actual).is_err());
        assert!(check_list_items(&["Home", "Areas", "Wales"], &actual).is_err());
    }

    #[test]
    fn test_bad_content_json() {
        assert!(matches!(
            parse_content_map("[1, 2]"),
            Err(ComponentError::InvalidArgument(_))
        ));
    }
}

//! [`FormLocator`] backed by a W3C WebDriver endpoint (chromedriver).
//!
//! Speaks the JSON wire protocol directly over `reqwest`: one session per
//! run, opened on the upload page, with an implicit wait so element lookups
//! tolerate a page that is still rendering. The form for a prefix is the
//! configured selector with `{prefix}` substituted; its file input and
//! submit control are that selector followed by ` input` and ` button`.

use crate::config::RouteConfig;
use crate::error::ScanRouteError;
use crate::upload::{DriverError, FormHandle, FormLocator};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// JSON key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// A live WebDriver session pointed at the upload page.
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct WebDriverSession {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    base_url: String,
    session_id: String,
    form_selector: String,
}

impl WebDriverSession {
    /// Open a browser session and navigate it to `config.server_url`.
    pub async fn connect(config: &RouteConfig) -> Result<Self, ScanRouteError> {
        let base_url = config.webdriver_url.trim_end_matches('/').to_string();
        let session_err = |reason: String| ScanRouteError::WebDriverSession {
            url: base_url.clone(),
            reason,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| session_err(e.to_string()))?;

        let value = send(
            &client,
            Method::POST,
            &format!("{base_url}/session"),
            Some(new_session_body(config.headless)),
        )
        .await
        .map_err(|e| session_err(e.to_string()))?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| session_err(format!("no sessionId in {value}")))?
            .to_string();
        info!("WebDriver session {} opened", session_id);

        let session = Self {
            inner: Arc::new(Inner {
                client,
                base_url: base_url.clone(),
                session_id,
                form_selector: config.form_selector.clone(),
            }),
        };

        let setup = async {
            session
                .command(
                    Method::POST,
                    "timeouts",
                    Some(json!({ "implicit": config.implicit_wait_ms })),
                )
                .await?;
            session
                .command(Method::POST, "url", Some(json!({ "url": config.server_url })))
                .await
        };
        if let Err(e) = setup.await {
            session.close().await;
            return Err(session_err(format!(
                "could not open {}: {}",
                config.server_url, e
            )));
        }
        debug!("Navigated to {}", config.server_url);

        Ok(session)
    }

    /// End the session and close the browser. Failures are only logged.
    pub async fn close(&self) {
        match self.command(Method::DELETE, "", None).await {
            Ok(_) => info!("WebDriver session {} closed", self.inner.session_id),
            Err(e) => warn!("Closing WebDriver session failed: {}", e),
        }
    }

    /// Element reference for the first match of a CSS selector.
    async fn find_element(&self, selector: &str) -> Result<String, DriverError> {
        let value = self
            .command(
                Method::POST,
                "element",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await
            .map_err(|e| match e {
                DriverError::Protocol { ref error, .. } if error == "no such element" => {
                    DriverError::NoSuchElement {
                        selector: selector.to_string(),
                    }
                }
                other => other,
            })?;
        element_id(&value)
    }

    /// Run a session-scoped command; `path` is relative to `/session/{id}`.
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let mut url = format!("{}/session/{}", self.inner.base_url, self.inner.session_id);
        if !path.is_empty() {
            url.push('/');
            url.push_str(path);
        }
        send(&self.inner.client, method, &url, body).await
    }
}

#[async_trait]
impl FormLocator for WebDriverSession {
    async fn locate_form(&self, prefix: char) -> Result<Box<dyn FormHandle>, DriverError> {
        let (input_sel, button_sel) = form_selectors(&self.inner.form_selector, prefix);
        let input = self.find_element(&input_sel).await?;
        let button = self.find_element(&button_sel).await?;
        Ok(Box::new(WebDriverForm {
            session: self.clone(),
            input,
            button,
        }))
    }
}

/// File input and submit button of one located form.
struct WebDriverForm {
    session: WebDriverSession,
    input: String,
    button: String,
}

#[async_trait]
impl FormHandle for WebDriverForm {
    async fn set_file(&self, path: &Path) -> Result<(), DriverError> {
        let text = path.to_string_lossy();
        self.session
            .command(
                Method::POST,
                &format!("element/{}/value", self.input),
                Some(json!({ "text": text })),
            )
            .await
            .map(|_| ())
    }

    async fn submit(&self) -> Result<(), DriverError> {
        self.session
            .command(
                Method::POST,
                &format!("element/{}/click", self.button),
                Some(json!({})),
            )
            .await
            .map(|_| ())
    }
}

/// Send one WebDriver request and unwrap its `value`.
async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, DriverError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .await
        .map_err(|e| DriverError::Http(e.to_string()))?;
    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| DriverError::Http(format!("{status}: unreadable response: {e}")))?;
    unwrap_value(status.is_success(), payload)
}

/// Body of a new-session request for Chrome.
fn new_session_body(headless: bool) -> Value {
    let mut args = vec!["--disable-gpu"];
    if headless {
        args.push("--headless=new");
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args }
            }
        }
    })
}

/// Selectors of the file input and submit control for `prefix`.
fn form_selectors(template: &str, prefix: char) -> (String, String) {
    let form = template.replace(crate::config::PREFIX_PLACEHOLDER, &prefix.to_string());
    (format!("{form} input"), format!("{form} button"))
}

/// Split a WebDriver reply into its value or its error.
fn unwrap_value(success: bool, mut payload: Value) -> Result<Value, DriverError> {
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);
    if success {
        return Ok(value);
    }
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    };
    Err(DriverError::Protocol {
        error: field("error"),
        message: field("message"),
    })
}

fn element_id(value: &Value) -> Result<String, DriverError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriverError::Http(format!("no element reference in {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_target_input_and_button_of_prefix_form() {
        let (input, button) = form_selectors(".uploadForm[data-form-type={prefix}]", 'J');
        assert_eq!(input, ".uploadForm[data-form-type=J] input");
        assert_eq!(button, ".uploadForm[data-form-type=J] button");
    }

    #[test]
    fn success_payload_yields_value() {
        let v = unwrap_value(true, json!({ "value": { "sessionId": "abc" } })).unwrap();
        assert_eq!(v["sessionId"], "abc");
    }

    #[test]
    fn null_value_is_fine_for_commands() {
        assert_eq!(unwrap_value(true, json!({ "value": null })).unwrap(), Value::Null);
    }

    #[test]
    fn error_payload_yields_protocol_error() {
        let err = unwrap_value(
            false,
            json!({ "value": { "error": "no such element", "message": "Unable to locate" } }),
        )
        .unwrap_err();
        match err {
            DriverError::Protocol { error, message } => {
                assert_eq!(error, "no such element");
                assert_eq!(message, "Unable to locate");
            }
            other => panic!("expected Protocol, got {other:?}"),
        }
    }

    #[test]
    fn element_reference_is_extracted() {
        let mut v = json!({});
        v[ELEMENT_KEY] = json!("e-42");
        assert_eq!(element_id(&v).unwrap(), "e-42");
        assert!(element_id(&json!({})).is_err());
    }

    #[test]
    fn headless_flag_adds_argument() {
        let body = new_session_body(true);
        let args = &body["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
        assert!(args.as_array().unwrap().iter().any(|a| a == "--headless=new"));
        let body = new_session_body(false);
        let args = &body["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
        assert!(!args.as_array().unwrap().iter().any(|a| a == "--headless=new"));
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sword_action_primitives::{ActionError, ElementSnapshot, Overlay, PageDriver, ReadyState};
use sword_core_types::ElementHandle;
use tracing::{debug, info};
use url::Url;

use crate::error::{AdapterError, AdapterErrorKind};
use crate::script;
use crate::transport::{CdpTransport, CommandTarget};

/// One browser tab driven through a flattened DevTools session.
#[derive(Clone)]
pub struct ChromiumPage {
    transport: Arc<dyn CdpTransport>,
    session: String,
}

impl ChromiumPage {
    /// Open `url` in a new tab and attach to it.
    pub async fn open(transport: Arc<dyn CdpTransport>, url: &str) -> Result<Self, AdapterError> {
        let url = Url::parse(url).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("invalid url '{url}': {err}"))
        })?;
        transport.start().await?;

        let created = transport
            .send_command(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": url.as_str() }),
            )
            .await?;
        let target_id = string_field(&created, "targetId")?;

        let attached = transport
            .send_command(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session = string_field(&attached, "sessionId")?;

        let page = Self::attached(transport, session);
        for domain in ["Page.enable", "Runtime.enable"] {
            page.transport
                .send_command(page.target(), domain, json!({}))
                .await?;
        }
        info!(target: "sword-cdp", url = %url, "page attached");
        Ok(page)
    }

    /// Wrap a session that is already attached.
    pub fn attached(transport: Arc<dyn CdpTransport>, session: impl Into<String>) -> Self {
        Self {
            transport,
            session: session.into(),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    fn target(&self) -> CommandTarget {
        CommandTarget::Session(self.session.clone())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, ActionError> {
        let response = self
            .transport
            .send_command(
                self.target(),
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                    "userGesture": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script raised an exception");
            return Err(ActionError::Internal(message.to_string()));
        }

        Ok(response
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn call(&self, op: &str, args: &[Value]) -> Result<Value, ActionError> {
        self.evaluate(&script::invoke(op, args)).await
    }

    /// Element operations answer `false` when the token no longer resolves.
    async fn call_on(&self, op: &str, handle: &ElementHandle) -> Result<(), ActionError> {
        match self.call(op, &[json!(handle.as_str())]).await? {
            Value::Bool(false) => Err(ActionError::Detached(handle.to_string())),
            _ => Ok(()),
        }
    }
}

fn string_field(value: &Value, field: &str) -> Result<String, AdapterError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("response without {field}"))
                .with_data(value.clone())
        })
}

fn handles(value: Value) -> Result<Vec<ElementHandle>, ActionError> {
    let tokens: Vec<String> = serde_json::from_value(value)
        .map_err(|err| ActionError::Internal(format!("unexpected handle list: {err}")))?;
    Ok(tokens.into_iter().map(ElementHandle::new).collect())
}

fn optional_handle(value: Value) -> Option<ElementHandle> {
    value.as_str().map(ElementHandle::new)
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn query(
        &self,
        selector: &str,
        scope: Option<&ElementHandle>,
    ) -> Result<Vec<ElementHandle>, ActionError> {
        let scope = scope.map_or(Value::Null, |handle| json!(handle.as_str()));
        handles(self.call("query", &[json!(selector), scope]).await?)
    }

    async fn inspect(&self, handle: &ElementHandle) -> Result<Option<ElementSnapshot>, ActionError> {
        let value = self.call("inspect", &[json!(handle.as_str())]).await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| ActionError::Internal(format!("unexpected snapshot: {err}")))
    }

    async fn find_by_text(&self, text: &str) -> Result<Vec<ElementHandle>, ActionError> {
        handles(self.call("byText", &[json!(text)]).await?)
    }

    async fn closest(
        &self,
        handle: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, ActionError> {
        let value = self
            .call("closest", &[json!(handle.as_str()), json!(selector)])
            .await?;
        Ok(optional_handle(value))
    }

    async fn click(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        self.call_on("click", handle).await
    }

    async fn scroll_into_view(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        self.call_on("scroll", handle).await
    }

    async fn remove(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        self.call_on("remove", handle).await
    }

    async fn focus(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        self.call_on("focus", handle).await
    }

    async fn highlight(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        self.call_on("highlight", handle).await
    }

    async fn current_url(&self) -> Result<String, ActionError> {
        let value = self.evaluate("window.location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn reload(&self) -> Result<(), ActionError> {
        debug!(target: "sword-cdp", session = %self.session, "reloading page");
        self.transport
            .send_command(self.target(), "Page.reload", json!({ "ignoreCache": false }))
            .await?;
        Ok(())
    }

    async fn ready_state(&self) -> Result<ReadyState, ActionError> {
        let value = self.evaluate("document.readyState").await?;
        Ok(ReadyState::parse(value.as_str().unwrap_or_default()))
    }

    async fn scroll_page(&self, fraction: f64) -> Result<(), ActionError> {
        let fraction = fraction.clamp(0.0, 1.0);
        self.evaluate(&format!(
            "window.scrollTo(0, document.documentElement.scrollHeight * {fraction})"
        ))
        .await?;
        Ok(())
    }

    async fn viewport_width(&self) -> Result<f64, ActionError> {
        let value = self.evaluate("window.innerWidth").await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    async fn show_overlay(&self, overlay: &Overlay) -> Result<(), ActionError> {
        let payload = serde_json::to_value(overlay)
            .map_err(|err| ActionError::Internal(format!("overlay encoding: {err}")))?;
        self.call("overlay", &[payload]).await?;
        Ok(())
    }

    async fn clear_overlay(&self, id: &str) -> Result<(), ActionError> {
        self.call("clearOverlay", &[json!(id)]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sword_action_primitives::{OverlayKind, Rect};

    type Reply = Box<dyn Fn(&str, &Value) -> Result<Value, AdapterError> + Send + Sync>;

    /// Records every command and answers from a closure.
    struct ScriptedTransport {
        sent: Mutex<Vec<(CommandTarget, String, Value)>>,
        reply: Reply,
    }

    impl ScriptedTransport {
        fn new(
            reply: impl Fn(&str, &Value) -> Result<Value, AdapterError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                reply: Box::new(reply),
            })
        }

        fn methods(&self) -> Vec<String> {
            self.sent.lock().iter().map(|(_, method, _)| method.clone()).collect()
        }

        fn last_expression(&self) -> String {
            self.sent
                .lock()
                .last()
                .and_then(|(_, _, params)| params.get("expression"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        }
    }

    #[async_trait]
    impl CdpTransport for ScriptedTransport {
        async fn start(&self) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn send_command(
            &self,
            target: CommandTarget,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            let reply = (self.reply)(method, &params);
            self.sent.lock().push((target, method.to_string(), params));
            reply
        }
    }

    fn value(value: Value) -> Result<Value, AdapterError> {
        Ok(json!({ "result": { "type": "object", "value": value } }))
    }

    #[tokio::test]
    async fn open_attaches_a_flat_session() {
        let transport = ScriptedTransport::new(|method, _| match method {
            "Target.createTarget" => Ok(json!({ "targetId": "T1" })),
            "Target.attachToTarget" => Ok(json!({ "sessionId": "S1" })),
            _ => Ok(json!({})),
        });
        let page = ChromiumPage::open(transport.clone(), "http://localhost:8080/mock-ticket-page/index.html")
            .await
            .unwrap();

        assert_eq!(page.session(), "S1");
        assert_eq!(
            transport.methods(),
            vec!["Target.createTarget", "Target.attachToTarget", "Page.enable", "Runtime.enable"]
        );
        let sent = transport.sent.lock();
        assert_eq!(sent[1].2["flatten"], json!(true));
        assert_eq!(sent[2].0, CommandTarget::Session("S1".into()));
    }

    #[tokio::test]
    async fn open_rejects_malformed_urls() {
        let transport = ScriptedTransport::new(|_, _| Ok(json!({})));
        let err = ChromiumPage::open(transport.clone(), "not a url").await.err().unwrap();
        assert_eq!(err.kind, AdapterErrorKind::Internal);
        assert!(transport.methods().is_empty());
    }

    #[tokio::test]
    async fn query_evaluates_in_the_session() {
        let transport = ScriptedTransport::new(|_, _| value(json!(["sw-1", "sw-2"])));
        let page = ChromiumPage::attached(transport.clone(), "S1");

        let found = page.query(".seat:not(.sold)", None).await.unwrap();
        assert_eq!(found, vec![ElementHandle::new("sw-1"), ElementHandle::new("sw-2")]);

        let sent = transport.sent.lock();
        let (target, method, params) = &sent[0];
        assert_eq!(target, &CommandTarget::Session("S1".into()));
        assert_eq!(method, "Runtime.evaluate");
        assert_eq!(params["returnByValue"], json!(true));
        drop(sent);
        assert!(transport
            .last_expression()
            .ends_with(r#"window.__sword.query(".seat:not(.sold)", null)"#));
    }

    #[tokio::test]
    async fn snapshot_decodes_into_element_snapshot() {
        let transport = ScriptedTransport::new(|_, _| {
            value(json!({
                "tag": "BUTTON",
                "id": "btnReserve",
                "classes": ["reserve-btn"],
                "attributes": { "id": "btnReserve" },
                "text": "예매하기",
                "rect": { "x": 540.0, "y": 120.0, "width": 200.0, "height": 48.0 },
                "disabled": false,
                "hidden": false
            }))
        });
        let page = ChromiumPage::attached(transport, "S1");
        let snapshot = page.inspect(&ElementHandle::new("sw-1")).await.unwrap().unwrap();
        assert_eq!(snapshot.rect, Rect::new(540.0, 120.0, 200.0, 48.0));
        assert!(snapshot.is_interactable());
        assert_eq!(snapshot.fingerprint(), "BUTTON_reserve-btn_200x48");
    }

    #[tokio::test]
    async fn stale_tokens_surface_as_detached() {
        let transport = ScriptedTransport::new(|_, _| value(json!(false)));
        let page = ChromiumPage::attached(transport.clone(), "S1");
        let handle = ElementHandle::new("sw-9");
        assert!(matches!(page.click(&handle).await, Err(ActionError::Detached(_))));

        let transport = ScriptedTransport::new(|_, _| value(Value::Null));
        let page = ChromiumPage::attached(transport, "S1");
        assert!(page.inspect(&handle).await.unwrap().is_none());
        assert!(page.closest(&handle, ".popup").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn script_exceptions_are_internal_errors() {
        let transport = ScriptedTransport::new(|_, _| {
            Ok(json!({
                "result": { "type": "object", "subtype": "error" },
                "exceptionDetails": {
                    "text": "Uncaught",
                    "exception": { "description": "SyntaxError: '[data-x' is not a valid selector" }
                }
            }))
        });
        let page = ChromiumPage::attached(transport, "S1");
        let err = page.query("[data-x", None).await.unwrap_err();
        assert_eq!(
            err,
            ActionError::Internal("SyntaxError: '[data-x' is not a valid selector".into())
        );
    }

    #[tokio::test]
    async fn transport_failures_are_io_errors() {
        let transport = ScriptedTransport::new(|_, _| {
            Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint("socket closed"))
        });
        let page = ChromiumPage::attached(transport, "S1");
        let err = page.current_url().await.unwrap_err();
        assert!(matches!(err, ActionError::CdpIo(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn overlay_is_sent_as_json() {
        let transport = ScriptedTransport::new(|_, _| value(json!(true)));
        let page = ChromiumPage::attached(transport.clone(), "S1");
        let overlay = Overlay::new("sword-captcha", OverlayKind::Alert, "CAPTCHA").line("보안문자를 입력하세요");
        page.show_overlay(&overlay).await.unwrap();

        let expression = transport.last_expression();
        assert!(expression.contains(r#""id":"sword-captcha""#));
        assert!(expression.contains(r#""kind":"alert""#));
        assert!(expression.contains("보안문자를 입력하세요"));
    }

    #[tokio::test]
    async fn reload_goes_through_the_page_domain() {
        let transport = ScriptedTransport::new(|_, _| Ok(json!({})));
        let page = ChromiumPage::attached(transport.clone(), "S1");
        page.reload().await.unwrap();
        assert_eq!(transport.methods(), vec!["Page.reload"]);
    }
}

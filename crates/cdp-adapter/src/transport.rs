//! DevTools connection: one browser, commands multiplexed over one socket.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, Message, MethodId, Response};
use futures::{future::BoxFuture, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::BrowserOptions;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::util::extract_ws_url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    /// Make sure a browser is reachable.
    async fn start(&self) -> Result<(), AdapterError>;

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

type LinkFactory = Arc<
    dyn Fn(BrowserOptions) -> BoxFuture<'static, Result<Arc<BrowserLink>, AdapterError>>
        + Send
        + Sync,
>;

/// Launches (or connects to) Chromium lazily and relaunches it when the
/// connection dies.
#[derive(Clone)]
pub struct ChromiumTransport {
    options: BrowserOptions,
    state: Arc<OnceCell<Mutex<Option<Arc<BrowserLink>>>>>,
    factory: LinkFactory,
}

impl ChromiumTransport {
    pub fn new(options: BrowserOptions) -> Self {
        let factory: LinkFactory = Arc::new(|options: BrowserOptions| {
            Box::pin(async move { BrowserLink::open(options).await.map(Arc::new) })
        });

        Self {
            options,
            state: Arc::new(OnceCell::new()),
            factory,
        }
    }

    pub fn options(&self) -> &BrowserOptions {
        &self.options
    }

    async fn link(&self) -> Result<Arc<BrowserLink>, AdapterError> {
        let cell = self.state.get_or_init(|| async { Mutex::new(None) }).await;
        let mut guard = cell.lock().await;

        match guard.as_ref() {
            Some(link) if link.is_alive() => return Ok(Arc::clone(link)),
            Some(_) => warn!(target: "sword-cdp", "chromium link lost; relaunching"),
            None => {}
        }
        let link = (self.factory)(self.options.clone()).await?;
        *guard = Some(Arc::clone(&link));
        Ok(link)
    }

    #[cfg(test)]
    fn with_factory(options: BrowserOptions, factory: LinkFactory) -> Self {
        Self {
            options,
            state: Arc::new(OnceCell::new()),
            factory,
        }
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        let link = self.link().await?;
        let version = link
            .send(
                CommandTarget::Browser,
                "Browser.getVersion",
                json!({}),
                Duration::from_millis(self.options.command_timeout_ms),
            )
            .await?;
        info!(
            target: "sword-cdp",
            product = version.get("product").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "browser ready"
        );
        Ok(())
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let link = self.link().await?;
        link
            .send(
                target,
                method,
                params,
                Duration::from_millis(self.options.command_timeout_ms),
            )
            .await
    }
}

type Pending = HashMap<CallId, oneshot::Sender<Result<Value, AdapterError>>>;

/// Chrome switches that keep a background booking tab responsive.
const CHROME_FLAGS: &[&str] = &[
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-breakpad",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-sync",
    "--no-first-run",
    "--no-default-browser-check",
    "--password-store=basic",
    "--remote-allow-origins=*",
    "--use-mock-keychain",
];

/// One queued DevTools call and where its answer goes.
struct Call {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, AdapterError>>,
}

/// Queue `method` on the socket task and wait up to `deadline` for the answer.
async fn call(
    calls: &mpsc::Sender<Call>,
    target: CommandTarget,
    method: &str,
    params: Value,
    deadline: Duration,
) -> Result<Value, AdapterError> {
    let (reply, answer) = oneshot::channel();
    let queued = Call {
        target,
        method: method.to_string(),
        params,
        reply,
    };
    if calls.send(queued).await.is_err() {
        return Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint("browser link closed"));
    }
    match tokio::time::timeout(deadline, answer).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("{method}: reply dropped"))),
        Err(_) => Err(AdapterError::new(AdapterErrorKind::Timeout)
            .with_hint(method.to_string())
            .retriable(true)),
    }
}

/// A live browser: the socket task, the optional keep-alive ping and the
/// child process when we launched it ourselves.
struct BrowserLink {
    calls: mpsc::Sender<Call>,
    socket_task: JoinHandle<()>,
    keepalive_task: Option<JoinHandle<()>>,
    child: Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
}

impl BrowserLink {
    async fn open(options: BrowserOptions) -> Result<Self, AdapterError> {
        let (child, ws_url) = match &options.websocket_url {
            Some(url) => (None, url.clone()),
            None => launch(browser_config(&options)?).await?,
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;

        let (calls, queue) = mpsc::channel(128);
        let alive = Arc::new(AtomicBool::new(true));
        let socket_task = {
            let alive = Arc::clone(&alive);
            tokio::spawn(async move {
                let outcome = pump(conn, queue).await;
                alive.store(false, Ordering::Relaxed);
                if let Err(err) = outcome {
                    error!(target: "sword-cdp", %err, "devtools socket closed with error");
                }
            })
        };
        let keepalive_task = keepalive(
            calls.clone(),
            Arc::clone(&alive),
            Duration::from_millis(options.heartbeat_interval_ms),
            Duration::from_millis(options.command_timeout_ms),
        );
        info!(target: "sword-cdp", url = %ws_url, "connected to chromium");

        Ok(Self {
            calls,
            socket_task,
            keepalive_task,
            child: Mutex::new(child),
            alive,
        })
    }

    #[cfg(test)]
    fn detached() -> (Arc<Self>, Arc<AtomicBool>) {
        let (calls, _queue) = mpsc::channel(8);
        let alive = Arc::new(AtomicBool::new(true));
        let link = Self {
            calls,
            socket_task: tokio::spawn(futures::future::pending::<()>()),
            keepalive_task: None,
            child: Mutex::new(None),
            alive: Arc::clone(&alive),
        };
        (Arc::new(link), alive)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn send(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        call(&self.calls, target, method, params, deadline).await
    }
}

impl Drop for BrowserLink {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.socket_task.abort();
        if let Some(task) = self.keepalive_task.take() {
            task.abort();
        }
        let Some(mut child) = self.child.try_lock().ok().and_then(|mut slot| slot.take()) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: "sword-cdp", ?err, "chromium did not exit");
                    }
                });
            }
            Err(_) => debug!(target: "sword-cdp", "no runtime left to stop chromium"),
        }
    }
}

/// Ask the browser for its version every `every`; a missed answer marks the
/// link dead so the next command relaunches.
fn keepalive(
    calls: mpsc::Sender<Call>,
    alive: Arc<AtomicBool>,
    every: Duration,
    deadline: Duration,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }
    let deadline = deadline.min(Duration::from_secs(5));
    Some(tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if !alive.load(Ordering::Relaxed) {
                return;
            }
            let answer = call(
                &calls,
                CommandTarget::Browser,
                "Browser.getVersion",
                json!({}),
                deadline,
            )
            .await;
            match answer {
                Ok(_) => {}
                Err(err) if err.kind == AdapterErrorKind::Timeout => {
                    warn!(target: "sword-cdp", "chromium stopped answering");
                    alive.store(false, Ordering::Relaxed);
                    return;
                }
                Err(err) => {
                    debug!(target: "sword-cdp", %err, "keep-alive ping stopped");
                    return;
                }
            }
        }
    }))
}

fn profile_dir(options: &BrowserOptions) -> Result<PathBuf, AdapterError> {
    let dir = if options.user_data_dir.is_absolute() {
        options.user_data_dir.clone()
    } else {
        std::env::current_dir()
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("cannot resolve profile directory: {err}"))
            })?
            .join(&options.user_data_dir)
    };
    fs::create_dir_all(&dir).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Launch)
            .with_hint(format!("cannot create profile directory {}: {err}", dir.display()))
    })?;
    Ok(dir)
}

fn browser_config(options: &BrowserOptions) -> Result<BrowserConfig, AdapterError> {
    let explicit = !options.executable.as_os_str().is_empty();
    if explicit && !options.executable.exists() {
        return Err(AdapterError::new(AdapterErrorKind::Launch)
            .with_hint(format!("no chrome at {}", options.executable.display()))
            .with_data(json!({
                "expected": options.executable,
                "hint": "Point SWORD_CHROME or browser.executable at chrome/chromium.",
            })));
    }

    let mut flags = CHROME_FLAGS.to_vec();
    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(options.command_timeout_ms))
        .launch_timeout(Duration::from_secs(20))
        .user_data_dir(profile_dir(options)?);
    if options.headless {
        flags.extend(["--headless=new", "--mute-audio"]);
    } else {
        builder = builder.with_head();
    }
    if options.no_sandbox {
        builder = builder.no_sandbox();
    }
    if explicit {
        builder = builder.chrome_executable(options.executable.clone());
    }
    builder.args(flags).build().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Launch).with_hint(format!("invalid browser config: {err}"))
    })
}

async fn launch(config: BrowserConfig) -> Result<(Option<Child>, String), AdapterError> {
    let mut child = config.launch().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Launch).with_hint(format!("chromium did not start: {err}"))
    })?;
    let ws_url = extract_ws_url(&mut child)
        .await
        .map_err(|err| AdapterError::new(AdapterErrorKind::Launch).with_hint(err.to_string()))?;
    Ok((Some(child), ws_url))
}

/// Socket task: submits queued calls and routes responses back by call id.
async fn pump(
    mut conn: Connection<CdpEventMessage>,
    mut queue: mpsc::Receiver<Call>,
) -> Result<(), AdapterError> {
    let mut pending = Pending::new();
    loop {
        tokio::select! {
            Some(queued) = queue.recv() => submit(&mut conn, queued, &mut pending)?,
            message = conn.next() => match message {
                Some(Ok(Message::Response(resp))) => {
                    if let Some(reply) = pending.remove(&resp.id) {
                        let _ = reply.send(payload(resp));
                    }
                }
                // Page state is read through Runtime.evaluate; events are ignored.
                Some(Ok(Message::Event(_))) => {}
                Some(Err(err)) => {
                    let err = classify(err);
                    fail_pending(&mut pending, &err);
                    return Err(err);
                }
                None => {
                    let err = AdapterError::new(AdapterErrorKind::CdpIo)
                        .with_hint("devtools socket closed");
                    fail_pending(&mut pending, &err);
                    return Ok(());
                }
            },
        }
    }
}

fn submit(
    conn: &mut Connection<CdpEventMessage>,
    queued: Call,
    pending: &mut Pending,
) -> Result<(), AdapterError> {
    let session = match queued.target {
        CommandTarget::Browser => None,
        CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
    };
    let method: MethodId = queued.method.into();
    match conn.submit_command(method, session, queued.params) {
        Ok(id) => {
            pending.insert(id, queued.reply);
            Ok(())
        }
        Err(err) => {
            let err = AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string());
            let _ = queued.reply.send(Err(err.clone()));
            Err(err)
        }
    }
}

fn fail_pending(pending: &mut Pending, err: &AdapterError) {
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(err.clone()));
    }
}

fn payload(resp: Response) -> Result<Value, AdapterError> {
    match (resp.result, resp.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("cdp error {}: {}", error.code, error.message))
            .retriable(error.code >= 500)),
        (None, None) => {
            Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("empty cdp response"))
        }
    }
}

fn classify(err: CdpError) -> AdapterError {
    let hint = err.to_string();
    match err {
        CdpError::Timeout => AdapterError::new(AdapterErrorKind::Timeout)
            .with_hint(hint)
            .retriable(true),
        CdpError::Serde(_) | CdpError::JavascriptException(_) | CdpError::FrameNotFound(_) => {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(hint)
        }
        _ => AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(hint)
            .retriable(true),
    }
}

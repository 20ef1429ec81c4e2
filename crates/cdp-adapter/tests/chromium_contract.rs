//! Contract tests against a real Chromium. Ignored by default because they
//! need a browser on the host.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use sword_action_primitives::{Environment, PageDriver};
use sword_cdp_adapter::{BrowserOptions, ChromiumPage, ChromiumTransport};
use sword_site_config::SelectorSet;

const PAGE: &str = "data:text/html,<button id='go' class='reserve-btn'>예매하기</button>\
<div class='seat' data-seat-id='A-1' style='width:30px;height:30px'>1</div>";

fn contract_enabled() -> bool {
    env::var("SWORD_CDP_CONTRACT")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

async fn open() -> ChromiumPage {
    let options = BrowserOptions {
        headless: true,
        ..BrowserOptions::default()
    };
    ChromiumPage::open(Arc::new(ChromiumTransport::new(options)), PAGE)
        .await
        .expect("page opens")
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set SWORD_CDP_CONTRACT=1"]
async fn contract_finds_and_clicks() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (SWORD_CDP_CONTRACT not enabled)");
        return;
    }

    let page = Arc::new(open().await);
    let env = Environment::new(page.clone());
    let button = env
        .wait_for_appearance(&SelectorSet::single("#go"), Duration::from_secs(5))
        .await
        .expect("button visible");
    env.click(&button, Duration::ZERO).await.expect("click");

    let snapshot = page.inspect(&button).await.unwrap().expect("still attached");
    assert_eq!(snapshot.tag, "BUTTON");
    assert!(env.page_has_text("예매하기").await.unwrap());
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set SWORD_CDP_CONTRACT=1"]
async fn contract_reload_invalidates_handles() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (SWORD_CDP_CONTRACT not enabled)");
        return;
    }

    let page = open().await;
    let seats = page.query(".seat", None).await.unwrap();
    assert_eq!(seats.len(), 1);
    page.reload().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(page.inspect(&seats[0]).await.unwrap().is_none());
}

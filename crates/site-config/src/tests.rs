use std::time::Duration;

use crate::defaults::{interpark, mocktest};
use crate::loader::SiteRegistry;
use crate::model::{RetryPolicy, SelectorSet};
use crate::SiteConfigError;

#[test]
fn builtin_tables_carry_site_values() {
    let site = interpark();
    assert_eq!(site.retry.max_attempts.click_start, 5);
    assert_eq!(site.retry.max_attempts.select_seat, 10);
    assert_eq!(site.timing.click_delay(), Duration::from_millis(50));
    assert_eq!(site.seat_preferences.zones, vec!["VIP", "R", "S"]);

    let mock = mocktest();
    assert_eq!(mock.selectors.seats, SelectorSet::single(".seat:not(.sold)"));
    assert!(!mock.features.auto_refresh);
    assert_eq!(mock.captcha.manual_timeout(), Duration::from_secs(300));
}

#[test]
fn resolves_sites_by_url() {
    let registry = SiteRegistry::builtin();
    let name = |url: &str| registry.resolve_url(url).map(|site| site.name.clone());

    assert_eq!(name("http://localhost:8080/booking").as_deref(), Some("mocktest"));
    assert_eq!(name("http://127.0.0.1/").as_deref(), Some("mocktest"));
    assert_eq!(
        name("file:///home/user/mock-ticket-page/index.html").as_deref(),
        Some("mocktest")
    );
    assert_eq!(
        name("https://tickets.interpark.com/goods/24012345").as_deref(),
        Some("interpark")
    );
    assert_eq!(name("https://example.org/"), None);
}

#[test]
fn backoff_grows_geometrically_and_caps() {
    let retry = RetryPolicy::default();
    let base = Duration::from_millis(500);
    assert_eq!(retry.backoff(base, 0), base);
    assert_eq!(retry.backoff(base, 2), Duration::from_millis(1125));
    assert_eq!(retry.backoff(base, 60), Duration::from_secs(30));
}

#[test]
fn yaml_overrides_merge_over_builtin() {
    let mut registry = SiteRegistry::builtin();
    let merged = registry
        .merge_yaml_str(
            r#"
interpark:
  timing:
    click_delay_ms: 20
  seat_preferences:
    zones: ["R"]
"#,
        )
        .unwrap();
    assert_eq!(merged, vec!["interpark".to_string()]);

    let site = registry.get("interpark").unwrap();
    assert_eq!(site.timing.click_delay_ms, 20);
    assert_eq!(site.timing.page_load_timeout_ms, 10_000);
    assert_eq!(site.seat_preferences.zones, vec!["R"]);
    assert_eq!(site.retry.max_attempts.click_start, 5);
}

#[test]
fn new_site_extends_base_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sites.yaml");
    std::fs::write(
        &path,
        r#"
staging:
  extends: mocktest
  matching:
    url_contains: []
    hosts: ["staging.tickets.test"]
"#,
    )
    .unwrap();

    let mut registry = SiteRegistry::builtin();
    registry.merge_file(&path).unwrap();

    let site = registry.resolve_url("https://staging.tickets.test/seat").unwrap();
    assert_eq!(site.name, "staging");
    assert_eq!(site.selectors.confirm_button, SelectorSet::single("#btnConfirm"));
}

#[test]
fn unknown_base_is_rejected() {
    let mut registry = SiteRegistry::builtin();
    let err = registry
        .merge_yaml_str("other:\n  extends: nowhere\n")
        .unwrap_err();
    assert!(matches!(err, SiteConfigError::UnknownBase { .. }));
    assert!(registry.get("other").is_none());
}

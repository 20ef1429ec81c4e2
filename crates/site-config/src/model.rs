use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Ordered list of CSS selectors for one page role. Earlier entries win.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorSet(pub Vec<String>);

impl SelectorSet {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(selectors.into_iter().map(Into::into).collect())
    }

    pub fn single(selector: impl Into<String>) -> Self {
        Self(vec![selector.into()])
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn joined(&self) -> String {
        self.0.join(", ")
    }
}

impl From<&[&str]> for SelectorSet {
    fn from(value: &[&str]) -> Self {
        Self::new(value.iter().copied())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    /// Base table this one is merged over when loaded from a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    pub matching: UrlMatch,
    pub selectors: Selectors,
    pub timing: Timing,
    pub retry: RetryPolicy,
    pub seat_preferences: SeatPreferences,
    pub captcha: CaptchaConfig,
    pub markers: PageMarkers,
    pub texts: TextFallbacks,
    pub payment: PaymentFlow,
    pub features: FeatureFlags,
}

/// How a page URL is attributed to this site.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlMatch {
    /// Substrings of the full URL; checked before any host rule.
    pub url_contains: Vec<String>,
    /// Substrings of the host name.
    pub hosts: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub reserve_button: SelectorSet,
    pub popup: SelectorSet,
    pub popup_close: SelectorSet,
    pub zones: SelectorSet,
    pub seats: SelectorSet,
    pub sold_seats: SelectorSet,
    pub confirm_button: SelectorSet,
    pub next_button: SelectorSet,
    pub loading: SelectorSet,
    pub seat_container: SelectorSet,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub click_delay_ms: u64,
    pub page_load_timeout_ms: u64,
    pub element_timeout_ms: u64,
    pub popup_timeout_ms: u64,
    pub seat_select_delay_ms: u64,
    pub retry_delay_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            click_delay_ms: 100,
            page_load_timeout_ms: 10_000,
            element_timeout_ms: 5_000,
            popup_timeout_ms: 3_000,
            seat_select_delay_ms: 100,
            retry_delay_ms: 500,
        }
    }
}

impl Timing {
    pub fn click_delay(&self) -> Duration {
        Duration::from_millis(self.click_delay_ms)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn popup_timeout(&self) -> Duration {
        Duration::from_millis(self.popup_timeout_ms)
    }

    pub fn seat_select_delay(&self) -> Duration {
        Duration::from_millis(self.seat_select_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxAttempts {
    pub click_start: u32,
    pub select_zone: u32,
    pub select_seat: u32,
    pub confirm: u32,
}

impl Default for MaxAttempts {
    fn default() -> Self {
        Self {
            click_start: 3,
            select_zone: 2,
            select_seat: 5,
            confirm: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: MaxAttempts,
    pub backoff_multiplier: f64,
    /// Popups dismissed per run before HANDLE_POPUP forces its way through.
    pub max_popups: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MaxAttempts::default(),
            backoff_multiplier: 1.5,
            max_popups: 5,
        }
    }
}

impl RetryPolicy {
    /// `base * multiplier^attempt`, attempt counted from zero.
    pub fn backoff(&self, base: Duration, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        Duration::from_secs_f64((base.as_secs_f64() * factor).min(MAX_BACKOFF_SECS))
    }
}

const MAX_BACKOFF_SECS: f64 = 30.0;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeatPreferences {
    pub prefer_center: bool,
    pub min_seats_distance: i64,
    /// Largest position gap still counted as consecutive.
    pub max_seats_distance: i64,
    /// Zone names in order of preference.
    pub zones: Vec<String>,
}

impl Default for SeatPreferences {
    fn default() -> Self {
        Self {
            prefer_center: true,
            min_seats_distance: 0,
            max_seats_distance: 3,
            zones: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaConfig {
    pub selectors: SelectorSet,
    pub input: SelectorSet,
    pub button: SelectorSet,
    /// Visible texts that reveal a challenge when no selector matches.
    pub texts: Vec<String>,
    /// URL substring marking a dedicated challenge page.
    pub url_marker: String,
    pub manual_timeout_ms: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            selectors: SelectorSet::default(),
            input: SelectorSet::default(),
            button: SelectorSet::default(),
            texts: vec!["보안문자".into(), "CAPTCHA".into()],
            url_marker: "captcha".into(),
            manual_timeout_ms: 300_000,
        }
    }
}

impl CaptchaConfig {
    pub fn manual_timeout(&self) -> Duration {
        Duration::from_millis(self.manual_timeout_ms)
    }
}

/// URL and DOM markers that identify where in the purchase flow the page is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageMarkers {
    pub payment_urls: Vec<String>,
    pub payment_selectors: SelectorSet,
    pub payment_step_urls: Vec<String>,
    pub payment_step_texts: Vec<String>,
    pub seat_url: String,
}

impl Default for PageMarkers {
    fn default() -> Self {
        Self {
            payment_urls: vec!["/payment".into(), "/checkout".into(), "/order".into()],
            payment_selectors: SelectorSet::new([".payment-form", "#payment"]),
            payment_step_urls: vec!["/step2".into(), "/step3".into(), "/step4".into()],
            payment_step_texts: vec!["할인 권종 선택".into(), "수령 방법".into(), "Discount".into()],
            seat_url: "/seat".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextFallbacks {
    pub reserve: Vec<String>,
    pub confirm: Vec<String>,
}

impl Default for TextFallbacks {
    fn default() -> Self {
        Self {
            reserve: vec!["예매하기".into(), "예매".into(), "Reserve".into(), "Book".into()],
            confirm: vec![
                "좌석 선택 완료".into(),
                "좌석선택완료".into(),
                "Selection Complete".into(),
                "Next".into(),
            ],
        }
    }
}

/// One optional sub-step of the payment pages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentStep {
    /// Heading text announcing the step.
    pub marker_text: String,
    /// URL substring announcing the step.
    pub marker_url: String,
    /// Clickable texts in order of preference.
    pub options: Vec<String>,
    /// Selectors tried when no preferred option is present.
    pub fallback: SelectorSet,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentFlow {
    pub discount: PaymentStep,
    pub delivery: PaymentStep,
    pub method: PaymentStep,
    pub pay_buttons: Vec<String>,
    pub dialog_confirm: Vec<String>,
    pub next_step_texts: Vec<String>,
    pub next_step_selectors: SelectorSet,
}

impl Default for PaymentFlow {
    fn default() -> Self {
        Self {
            discount: PaymentStep {
                marker_text: "할인 권종 선택".into(),
                marker_url: "step2".into(),
                options: vec!["일반".into(), "General".into()],
                fallback: SelectorSet::default(),
            },
            delivery: PaymentStep {
                marker_text: "수령 방법".into(),
                marker_url: "step3".into(),
                options: vec![
                    "현장수령".into(),
                    "모바일티켓".into(),
                    "Mobile Ticket".into(),
                    "On-site Pickup".into(),
                    "Ticket Pickup".into(),
                ],
                fallback: SelectorSet::new([".delivery-option", ".radio-label"]),
            },
            method: PaymentStep {
                marker_text: "결제 수단 선택".into(),
                marker_url: "step4".into(),
                options: vec!["계좌이체".into(), "Bank Transfer".into(), "무통장입금".into()],
                fallback: SelectorSet::default(),
            },
            pay_buttons: vec!["결제하기".into(), "Pay Now".into(), "원 결제하기".into()],
            dialog_confirm: vec!["확인".into(), "Confirm".into(), "Yes".into(), "OK".into()],
            next_step_texts: vec![
                "다음 단계".into(),
                "Next Step".into(),
                "Payment".into(),
                "결제하기".into(),
            ],
            next_step_selectors: SelectorSet::new(["#btnNextStep", ".btn-next-step"]),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Site allows a reload at opening time when the run asks for one.
    pub auto_refresh: bool,
    pub handle_popups: bool,
    pub multi_seat_select: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            handle_popups: true,
            multi_seat_select: true,
        }
    }
}

impl SiteConfig {
    pub fn is_payment_url(&self, url: &str) -> bool {
        self.markers
            .payment_urls
            .iter()
            .any(|marker| url.contains(marker.as_str()))
    }

    pub fn is_payment_step_url(&self, url: &str) -> bool {
        self.markers
            .payment_step_urls
            .iter()
            .any(|marker| url.contains(marker.as_str()))
    }
}

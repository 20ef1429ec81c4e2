use crate::model::{
    CaptchaConfig, FeatureFlags, MaxAttempts, PageMarkers, PaymentFlow, RetryPolicy,
    SeatPreferences, SelectorSet, Selectors, SiteConfig, TextFallbacks, Timing, UrlMatch,
};

pub const INTERPARK: &str = "interpark";
pub const MOCKTEST: &str = "mocktest";

pub fn builtin_sites() -> Vec<SiteConfig> {
    vec![interpark(), mocktest()]
}

pub fn interpark() -> SiteConfig {
    SiteConfig {
        name: INTERPARK.into(),
        extends: None,
        matching: UrlMatch {
            url_contains: Vec::new(),
            hosts: vec!["interpark".into()],
        },
        selectors: Selectors {
            reserve_button: SelectorSet::new([
                "#ProductForm .btn_Booking",
                ".book-now",
                "a[href*=\"Book\"]",
                "button:contains(\"예매\")",
            ]),
            popup: SelectorSet::new([
                ".popupContainer",
                ".modal-overlay",
                "#layerPopup",
                "[class*=\"popup\"]",
            ]),
            popup_close: SelectorSet::new([
                ".closeButton",
                ".btn_Close",
                "[class*=\"close\"]",
                "button:contains(\"닫기\")",
            ]),
            zones: SelectorSet::new([".area-list .zone", "[data-zone-id]", ".seat-zone"]),
            seats: SelectorSet::new([
                ".seat:not(.sold):not(.disabled)",
                "[data-seat-status=\"available\"]",
                ".seat.available",
            ]),
            sold_seats: SelectorSet::new([".seat.sold", "[data-seat-status=\"sold\"]"]),
            confirm_button: SelectorSet::new([
                "#btnConfirm",
                ".btn-confirm",
                ".complete-button",
                "button[class*=\"complete\"]",
            ]),
            next_button: SelectorSet::default(),
            loading: SelectorSet::new([".loading", ".spinner", "[class*=\"load\"]"]),
            seat_container: SelectorSet::single(".seat-container"),
        },
        timing: Timing {
            click_delay_ms: 50,
            page_load_timeout_ms: 10_000,
            element_timeout_ms: 5_000,
            popup_timeout_ms: 3_000,
            seat_select_delay_ms: 100,
            retry_delay_ms: 500,
        },
        retry: RetryPolicy {
            max_attempts: MaxAttempts {
                click_start: 5,
                select_zone: 3,
                select_seat: 10,
                confirm: 3,
            },
            backoff_multiplier: 1.5,
            max_popups: 5,
        },
        seat_preferences: SeatPreferences {
            prefer_center: true,
            min_seats_distance: 0,
            max_seats_distance: 3,
            zones: vec!["VIP".into(), "R".into(), "S".into()],
        },
        captcha: CaptchaConfig {
            selectors: SelectorSet::new(["#captcha", ".captcha-container", "iframe[src*=\"captcha\"]"]),
            ..CaptchaConfig::default()
        },
        markers: PageMarkers::default(),
        texts: TextFallbacks::default(),
        payment: PaymentFlow::default(),
        features: FeatureFlags {
            auto_refresh: true,
            handle_popups: true,
            multi_seat_select: true,
        },
    }
}

/// Local mock ticket page, also used for any localhost origin.
pub fn mocktest() -> SiteConfig {
    SiteConfig {
        name: MOCKTEST.into(),
        extends: None,
        matching: UrlMatch {
            url_contains: vec!["mock-ticket-page".into()],
            hosts: vec!["localhost".into(), "127.0.0.1".into()],
        },
        selectors: Selectors {
            reserve_button: SelectorSet::new(["#btnReserve", "#btnConfirm", ".btn-confirm", ".reserve-btn"]),
            popup: SelectorSet::new([".popup", "#popup"]),
            popup_close: SelectorSet::new([".popup button", "button[onclick*=\"closePopup\"]"]),
            zones: SelectorSet::new([".zone", ".section-box"]),
            seats: SelectorSet::single(".seat:not(.sold)"),
            sold_seats: SelectorSet::single(".seat.sold"),
            confirm_button: SelectorSet::single("#btnConfirm"),
            next_button: SelectorSet::new(["#btnNext", ".btn-next"]),
            loading: SelectorSet::single(".loading"),
            seat_container: SelectorSet::single(".seat-container"),
        },
        timing: Timing {
            click_delay_ms: 100,
            page_load_timeout_ms: 5_000,
            element_timeout_ms: 3_000,
            popup_timeout_ms: 2_000,
            seat_select_delay_ms: 150,
            retry_delay_ms: 500,
        },
        retry: RetryPolicy {
            max_attempts: MaxAttempts {
                click_start: 3,
                select_zone: 2,
                select_seat: 5,
                confirm: 3,
            },
            backoff_multiplier: 1.5,
            max_popups: 5,
        },
        seat_preferences: SeatPreferences {
            prefer_center: true,
            min_seats_distance: 0,
            max_seats_distance: 3,
            zones: vec!["VIP".into(), "R".into(), "S".into()],
        },
        captcha: CaptchaConfig {
            selectors: SelectorSet::new(["#captcha", ".captcha-container", ".captcha-wrap", "#captcha_layer"]),
            input: SelectorSet::new([
                "input[placeholder=\"문자 입력\"]",
                "#captchaConfig",
                "input[name=\"captcha\"]",
            ]),
            button: SelectorSet::new(["#btnCaptcha", ".btn_confirm"]),
            ..CaptchaConfig::default()
        },
        markers: PageMarkers::default(),
        texts: TextFallbacks::default(),
        payment: PaymentFlow::default(),
        features: FeatureFlags {
            auto_refresh: false,
            handle_popups: true,
            multi_seat_select: true,
        },
    }
}

//! Static per-site tables consumed by the booking flow: selectors per page
//! role, timing constants, retry ceilings and seat preferences.

pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;

pub use defaults::{builtin_sites, interpark, mocktest};
pub use errors::SiteConfigError;
pub use loader::SiteRegistry;
pub use model::{
    CaptchaConfig, FeatureFlags, MaxAttempts, PageMarkers, PaymentFlow, PaymentStep, RetryPolicy,
    SeatPreferences, SelectorSet, Selectors, SiteConfig, TextFallbacks, Timing, UrlMatch,
};

#[cfg(test)]
mod tests;

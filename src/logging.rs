//! Container diagnostics
//!
//! Every event the container emits is tagged with the `contexture` target,
//! and the interesting phases — boot, bean instantiation, typed
//! resolution, scope teardown — run inside spans, so the bean class and
//! scope ride along as fields on anything user code logs underneath
//! (a `PostConstruct` callback, an interceptor, a producer body).
//!
//! `init` installs a subscriber tuned for those fields: JSON when the
//! `logging-json` feature is enabled, pretty output with `logging-pretty`.
//! Skip it when the host application installs its own subscriber; the
//! container's events and spans fire into whatever is active.
//!
//! # Example
//!
//! ```rust,ignore
//! contexture::logging::init();
//!
//! // or scope the filter yourself
//! contexture::logging::init_with("contexture=trace,my_app=debug");
//! ```

use crate::bean::{Bean, ScopeKind};
use crate::meta::TypeRef;
use tracing::{Level, Span, span};

/// Target every container event and span is tagged with
pub const TARGET: &str = "contexture";

/// Span covering the whole bootstrap: scanning, registration, extension
/// hooks and deployment verification
pub fn boot_span() -> Span {
    span!(target: TARGET, Level::INFO, "container_boot")
}

/// Span around one bean instantiation.
///
/// Lifecycle callbacks, interceptor construction and recursive dependency
/// resolution all happen inside it, so nested `bean_create` spans show the
/// dependency chain being walked.
pub fn create_span(bean: &Bean) -> Span {
    span!(
        target: TARGET,
        Level::DEBUG,
        "bean_create",
        bean = %bean.class.name,
        scope = %bean.scope,
    )
}

/// Span around one typed lookup
pub fn resolve_span(required: &TypeRef) -> Span {
    span!(target: TARGET, Level::TRACE, "resolve", required = %required)
}

/// Span around the teardown of one scope instance; per-bean destroy
/// failures are logged inside it
pub fn scope_destroy_span(scope: ScopeKind) -> Span {
    span!(target: TARGET, Level::DEBUG, "scope_destroy", %scope)
}

/// Install a diagnostics subscriber with the default `contexture=debug`
/// filter. Repeated calls are no-ops, so tests and embedded containers
/// may race on it safely.
#[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
pub fn init() {
    init_with(&format!("{TARGET}=debug"));
}

/// Install a diagnostics subscriber with explicit filter directives.
/// `RUST_LOG` wins when set.
#[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
pub fn init_with(directives: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    #[cfg(feature = "logging-json")]
    let _ = builder.json().try_init();
    #[cfg(not(feature = "logging-json"))]
    let _ = builder.pretty().try_init();
}

/// No-op without a subscriber feature; events and spans still fire into
/// whatever subscriber the host installed.
#[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
pub fn init() {}

/// No-op without a subscriber feature
#[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
pub fn init_with(_directives: &str) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{BeanBuilder, BeanKind};
    use crate::meta::ClassDef;
    use std::sync::Arc;

    #[test]
    fn lifecycle_spans_work_without_a_subscriber() {
        let class = Arc::new(ClassDef::builder("acme.Svc").default_ctor().build());
        let bean = BeanBuilder::new(class, BeanKind::Managed { ctor_index: 0 })
            .scope(ScopeKind::Request)
            .build();

        let _boot = boot_span().entered();
        let _resolve = resolve_span(&TypeRef::class("acme.Svc")).entered();
        let _create = create_span(&bean).entered();
        let _teardown = scope_destroy_span(ScopeKind::Request).entered();
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        init_with("contexture=trace");
    }
}

//! Conditional injection of a notification banner into outbound HTML pages.
//!
//! The injector looks at a snapshot of request facts plus the finished
//! response body and decides whether the page's placeholder element should
//! be filled with the notification message. Every rule is a pure function
//! over call-scoped inputs; in particular the evaluation instant is passed
//! in by the caller, so the date rule never consults a global clock.

use chrono::{DateTime, Utc};
use log::debug;
use service::config::Config;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Client addresses the notification may be shown to. Matched by address
/// equality only, no CIDR ranges or wildcards.
const ALLOWED_CLIENT_IPS: [IpAddr; 2] = [
    IpAddr::V4(Ipv4Addr::LOCALHOST),
    IpAddr::V6(Ipv6Addr::LOCALHOST),
];

/// Paths the notification must never appear on.
const EXCLUDED_PATHS: [&str; 2] = ["/login", "/about"];

/// Fixed notification text, HTML-escaped before it is written into the page.
const NOTIFICATION_MESSAGE: &str =
    "This is a notification message inserted by NotificationInjector";

/// Distinguishes a top-level client request from one dispatched internally
/// while composing another response. Only top-level requests are decorated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Main,
    Sub,
}

impl RequestKind {
    pub fn is_main(&self) -> bool {
        matches!(self, RequestKind::Main)
    }
}

/// Read-only facts about an inbound request, captured once per evaluation.
#[derive(Clone, Debug)]
pub struct RequestSnapshot {
    /// Peer address of the connection, when the transport provides one.
    pub client_ip: Option<IpAddr>,
    /// Raw `User-Agent` header value, empty when the header is absent.
    pub user_agent: String,
    /// Request path, always beginning with `/` and without the query string.
    pub path: String,
    pub kind: RequestKind,
}

/// Process-lifetime settings for the injector, fixed at startup.
#[derive(Clone, Debug)]
pub struct NotificationRules {
    /// Id of the placeholder element the message is injected into.
    pub target_element_id: String,
    /// First instant (inclusive) at which the notification is shown.
    pub period_start: DateTime<Utc>,
    /// Last instant (inclusive) at which the notification is shown.
    pub period_end: DateTime<Utc>,
}

impl NotificationRules {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_element_id: config.notification_target_element_id.clone(),
            period_start: config.notification_period_start,
            period_end: config.notification_period_end,
        }
    }
}

/// Why an evaluation left the response untouched. These are expected
/// outcomes, not errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The request was dispatched internally; no rules were evaluated.
    SubRequest,
    IpNotAllowed,
    UserAgentNotAllowed,
    OutsideDatePeriod,
    PathExcluded,
    /// The response carried no text body to inspect.
    BodyUnavailable,
    /// The page does not contain the placeholder element. Many pages
    /// legitimately don't.
    PlaceholderNotFound,
}

/// Result of a single injector evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InjectionOutcome {
    /// Every rule passed and the placeholder was replaced; `body` is the
    /// rewritten page.
    Injected { body: String },
    Skipped(SkipReason),
}

/// Decides whether the notification belongs in a response and produces the
/// rewritten body when it does.
///
/// Stateless between calls and safe to share across concurrent requests;
/// the only state is the immutable [`NotificationRules`].
#[derive(Clone, Debug)]
pub struct NotificationInjector {
    rules: NotificationRules,
}

impl NotificationInjector {
    pub fn new(rules: NotificationRules) -> Self {
        Self { rules }
    }

    /// The notification is only shown to loopback clients. A request with
    /// no known peer address never qualifies.
    pub fn is_allowed_ip(&self, client_ip: Option<IpAddr>) -> bool {
        client_ip.is_some_and(|ip| ALLOWED_CLIENT_IPS.contains(&ip))
    }

    /// Clients identifying as curl are excluded, matched case-insensitively
    /// anywhere in the header. An absent or empty user agent is allowed.
    pub fn is_allowed_user_agent(&self, user_agent: &str) -> bool {
        !user_agent.to_lowercase().contains("curl")
    }

    /// Both period bounds are inclusive.
    pub fn is_within_date_period(&self, now: DateTime<Utc>) -> bool {
        self.rules.period_start <= now && now <= self.rules.period_end
    }

    pub fn is_allowed_path(&self, path: &str) -> bool {
        !EXCLUDED_PATHS.contains(&path)
    }

    /// Evaluates every rule against the request facts and, when they all
    /// pass, replaces the placeholder element in `body` with the
    /// notification message.
    ///
    /// `now` is the evaluation instant, chosen by the caller. `body` is
    /// `None` when the response has no text content. Rules run in a fixed
    /// order and the first failure short-circuits, naming itself in the
    /// returned outcome; a sub-request is skipped before any rule runs.
    pub fn process(
        &self,
        request: &RequestSnapshot,
        body: Option<&str>,
        now: DateTime<Utc>,
    ) -> InjectionOutcome {
        if !request.kind.is_main() {
            return InjectionOutcome::Skipped(SkipReason::SubRequest);
        }
        if !self.is_allowed_ip(request.client_ip) {
            return InjectionOutcome::Skipped(SkipReason::IpNotAllowed);
        }
        if !self.is_allowed_user_agent(&request.user_agent) {
            return InjectionOutcome::Skipped(SkipReason::UserAgentNotAllowed);
        }
        if !self.is_within_date_period(now) {
            return InjectionOutcome::Skipped(SkipReason::OutsideDatePeriod);
        }
        if !self.is_allowed_path(&request.path) {
            return InjectionOutcome::Skipped(SkipReason::PathExcluded);
        }

        debug!("All notification rules passed for {}", request.path);

        let Some(content) = body else {
            return InjectionOutcome::Skipped(SkipReason::BodyUnavailable);
        };

        let placeholder = format!(r#"<div id="{}"></div>"#, self.rules.target_element_id);
        if !content.contains(&placeholder) {
            return InjectionOutcome::Skipped(SkipReason::PlaceholderNotFound);
        }

        let notification = format!(
            r#"<div id="{}">{}</div>"#,
            self.rules.target_element_id,
            html_escape::encode_text(NOTIFICATION_MESSAGE)
        );

        InjectionOutcome::Injected {
            // A page carries at most one placeholder; replace only the first
            // occurrence so reprocessing an already injected page is a no-op.
            body: content.replacen(&placeholder, &notification, 1),
        }
    }
}

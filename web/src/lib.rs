//! Web layer of the notification demo: the demo page controllers, the route
//! table, and the response middleware that fills the notification
//! placeholder on eligible pages.

use domain::notification::NotificationInjector;
use domain::stopwatch::Stopwatch;
use std::sync::Arc;

pub(crate) mod controller;
pub mod middleware;
pub mod router;

// Web-level state shared with the response pipeline
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub injector: Arc<NotificationInjector>,
    pub stopwatch: Stopwatch,
}

impl AppState {
    pub fn new(injector: Arc<NotificationInjector>, stopwatch: Stopwatch) -> Self {
        Self {
            injector,
            stopwatch,
        }
    }
}

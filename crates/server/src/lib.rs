use std::sync::Arc;

use db::DBService;
use services::services::{
    lifecycle::LifecycleService,
    notify::Notifier,
    overdue::OverdueSweeper,
};

pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;

#[cfg(test)]
pub mod test_support;

/// Everything a request handler needs, injected explicitly instead of
/// reached through globals.
#[derive(Clone)]
pub struct AppState {
    db: DBService,
    lifecycle: LifecycleService,
    sweeper: OverdueSweeper,
    notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(db: DBService, notifier: Arc<dyn Notifier>) -> Self {
        let sweeper = OverdueSweeper::spawn(db.pool.clone());
        Self {
            db,
            lifecycle: LifecycleService::new(),
            sweeper,
            notifier,
        }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn lifecycle(&self) -> &LifecycleService {
        &self.lifecycle
    }

    pub fn sweeper(&self) -> &OverdueSweeper {
        &self.sweeper
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }
}

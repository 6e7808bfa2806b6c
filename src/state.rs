use crate::store::CounterStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CounterStore>,
    pub admin_password: Arc<str>,
}

impl AppState {
    pub fn new(store: Arc<CounterStore>, admin_password: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            admin_password: admin_password.into(),
        }
    }
}

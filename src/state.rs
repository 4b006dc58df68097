use crate::config::Config;
use crate::store::CommentStore;
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub store: CommentStore,
    pub config: Config,
}

impl FromRef<AppState> for CommentStore {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use channelgate_access::AccessService;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub access: Arc<AccessService>,
}

impl AppState {
    pub fn new(pool: PgPool, access: AccessService) -> Self {
        Self {
            pool,
            access: Arc::new(access),
        }
    }
}

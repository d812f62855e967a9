/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Session handle construction.

use crate::application::Application;
use crate::fix_session::FixSession;
use async_trait::async_trait;
use fixlink_session::config::SessionConfig;
use fixlink_session::handle::SessionHandle;
use std::sync::Arc;

/// Builds the handle for each configured session when the initiator starts.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Creates the handle for one session.
    async fn create(&self, config: &SessionConfig) -> Box<dyn SessionHandle>;
}

/// Factory producing [`FixSession`] handles bound to one application.
#[derive(Debug)]
pub struct FixSessionFactory<A: Application> {
    application: Arc<A>,
}

impl<A: Application> FixSessionFactory<A> {
    /// Creates a factory sharing `application` across all sessions.
    #[must_use]
    pub fn new(application: Arc<A>) -> Self {
        Self { application }
    }
}

#[async_trait]
impl<A: Application + 'static> SessionFactory for FixSessionFactory<A> {
    async fn create(&self, config: &SessionConfig) -> Box<dyn SessionHandle> {
        self.application.on_create(&config.session_id).await;
        Box::new(FixSession::new(config.clone(), Arc::clone(&self.application)))
    }
}

use std::sync::Arc;

use crate::{
    config::Config,
    error::AppResult,
    repository::{InMemoryUserDirectory, UserDirectory},
    services::{
        BlobStore, Collaborators, FsBlobStore, InMemoryBlobStore, MessagingService,
        NotificationService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Arc<dyn UserDirectory>,
    pub messaging: Arc<MessagingService>,
    /// Recipient-side inbox over the same notification repository the
    /// dispatcher writes to.
    pub notifications: Arc<NotificationService>,
}

impl AppState {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let notifications = Arc::new(NotificationService::new(
            collaborators.notifications.clone(),
        ));
        let directory = collaborators.directory.clone();
        let messaging = Arc::new(MessagingService::new(
            collaborators,
            config.attachments.store_timeout,
        ));

        Self {
            config: Arc::new(config),
            directory,
            messaging,
            notifications,
        }
    }

    /// Wires in-memory repositories, the seeded directory and the configured
    /// blob store.
    pub async fn from_config(config: Config) -> AppResult<Self> {
        let directory: Arc<dyn UserDirectory> = match &config.seed_users_file {
            Some(path) => Arc::new(InMemoryUserDirectory::from_json_file(path).await?),
            None => {
                tracing::warn!("SEED_USERS_FILE not set, starting with an empty user directory");
                Arc::new(InMemoryUserDirectory::new())
            }
        };

        let blobs: Arc<dyn BlobStore> = match &config.attachments.dir {
            Some(dir) => Arc::new(FsBlobStore::open(dir.clone()).await?),
            None => Arc::new(InMemoryBlobStore::new()),
        };

        let collaborators = Collaborators::in_memory(directory).with_blobs(blobs);
        Ok(Self::new(config, collaborators))
    }

    /// Lets notification fan-outs that are still running finish.
    pub async fn shutdown(&self) {
        self.messaging.dispatcher().drain().await;
    }
}

use crate::core::reader::PageReader;
use crate::core::session::SessionManager;
use crate::domain::model::ScrapeResult;
use crate::domain::ports::SessionLauncher;
use crate::utils::error::Result;
use std::sync::Arc;

/// Reads project pages through the shared session, recycling it after driver faults.
pub struct ProjectFetcher<L: SessionLauncher> {
    sessions: Arc<SessionManager<L>>,
    reader: PageReader,
}

impl<L: SessionLauncher> ProjectFetcher<L> {
    pub fn new(sessions: Arc<SessionManager<L>>, reader: PageReader) -> Self {
        Self { sessions, reader }
    }

    pub fn sessions(&self) -> &Arc<SessionManager<L>> {
        &self.sessions
    }

    pub async fn fetch(&self, url: &str) -> Result<ScrapeResult> {
        let outcome = {
            let session = self.sessions.acquire().await?;
            self.reader.read_project(&*session, url).await
        };

        match outcome {
            Ok(result) => Ok(result),
            Err(e) => {
                if e.is_driver_fault() {
                    self.sessions.recycle("driver fault during page read").await;
                }
                Err(e.into())
            }
        }
    }
}

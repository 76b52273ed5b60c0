use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};

use crate::{FragmentStream, GenerationProvider, GenerationRequest};

const CANNED_ANSWER: [&str; 3] = [
    "This is a placeholder answer ",
    "from the dummy generation provider. ",
    "Configure a real provider to get grounded responses.",
];

/// Offline provider that replays fixed fragments. No network access.
#[derive(Debug, Clone)]
pub struct DummyProvider {
    fragments: Vec<String>,
    delay: Option<Duration>,
}

impl DummyProvider {
    pub fn new(fragments: Vec<String>) -> Self {
        Self {
            fragments,
            delay: None,
        }
    }

    /// Sleeps for `delay` before each fragment, to mimic a slow backend.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Default for DummyProvider {
    fn default() -> Self {
        Self::new(CANNED_ANSWER.iter().map(ToString::to_string).collect())
    }
}

#[async_trait]
impl GenerationProvider for DummyProvider {
    fn provider_name(&self) -> &str {
        "dummy"
    }

    async fn stream_generate(&self, _request: GenerationRequest) -> FragmentStream {
        let delay = self.delay;
        stream::iter(self.fragments.clone())
            .filter(|fragment| futures::future::ready(!fragment.is_empty()))
            .then(move |fragment| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                fragment
            })
            .boxed()
    }
}

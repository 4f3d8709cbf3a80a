use async_trait::async_trait;
use rl_schemas::{Fetcher, FetcherKey};

/// Read side of the fetcher/key registry.
#[async_trait]
pub trait FetcherDirectory: Send + Sync {
    /// One joined read of a key and its owning fetcher.
    async fn lookup_key(&self, key_id: &str) -> anyhow::Result<Option<(FetcherKey, Fetcher)>>;
}

/// Fire-and-forget recorder of key/fetcher activity.
///
/// Implementations must not block and must not report failure to the caller.
pub trait TouchSink: Send + Sync {
    fn touch(&self, fetcher_id: &str, key_id: &str);
}

/// Sink that drops every touch. Used by tools that authenticate without a
/// side-effect queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTouch;

impl TouchSink for NoopTouch {
    fn touch(&self, _fetcher_id: &str, _key_id: &str) {}
}

//! Token streams returned by the client

use crate::backend::BackendRole;
use crate::error::Result;
use futures_core::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Ordered text fragments from one completion request.
///
/// Items are `Ok(fragment)` in arrival order; an `Err` item is terminal and
/// nothing follows it. The backend that served the request travels with the
/// stream instead of living on the client, so concurrent requests never see
/// each other's fallback state.
pub struct TokenStream {
    served_by: BackendRole,
    inner: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
}

impl TokenStream {
    pub fn new<S>(served_by: BackendRole, stream: S) -> Self
    where
        S: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            served_by,
            inner: Box::pin(stream),
        }
    }

    /// Which backend is producing this stream.
    pub fn served_by(&self) -> BackendRole {
        self.served_by
    }

    /// Concatenate every fragment, failing on the first terminal error.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(fragment) = self.inner.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

impl Stream for TokenStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for TokenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStream")
            .field("served_by", &self.served_by)
            .finish_non_exhaustive()
    }
}

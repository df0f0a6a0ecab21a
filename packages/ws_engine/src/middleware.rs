//! Handler and middleware traits, and the onion composition.
//!
//! Middleware registered first wraps outermost: for `[m1, m2]` around `h`
//! the order is `m1 -> m2 -> h -> m2 -> m1`. A middleware short-circuits by
//! returning without calling [`Next::run`]. Errors propagate to the caller
//! of the composed handler unchanged.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::connection::Connection;
use crate::message::Message;

/// Message handler. Implemented for `Fn(Arc<Connection>, Arc<Message>) -> impl Future`.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, conn: Arc<Connection>, message: Arc<Message>) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Arc<Connection>, Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call(&self, conn: Arc<Connection>, message: Arc<Message>) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(self(conn, message))
    }
}

/// Connect/disconnect hook.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn call(&self, conn: Arc<Connection>) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> ConnectionHandler for F
where
    F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call(&self, conn: Arc<Connection>) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(self(conn))
    }
}

/// The rest of the chain, handed to each middleware.
#[derive(Clone)]
pub struct Next {
    inner: Arc<dyn Handler>,
}

impl Next {
    pub async fn run(self, conn: Arc<Connection>, message: Arc<Message>) -> anyhow::Result<()> {
        self.inner.call(conn, message).await
    }
}

/// Implemented for `Fn(Arc<Connection>, Arc<Message>, Next) -> impl Future`.
pub trait Middleware: Send + Sync + 'static {
    fn call(
        &self,
        conn: Arc<Connection>,
        message: Arc<Message>,
        next: Next,
    ) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Arc<Connection>, Arc<Message>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call(
        &self,
        conn: Arc<Connection>,
        message: Arc<Message>,
        next: Next,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(self(conn, message, next))
    }
}

/// Handler that accepts every message and does nothing.
pub fn noop() -> Arc<dyn Handler> {
    Arc::new(|_: Arc<Connection>, _: Arc<Message>| async { Ok::<_, anyhow::Error>(()) })
}

/// Wrap `handler` in `middleware`, first element outermost.
pub fn compose(middleware: &[Arc<dyn Middleware>], handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
    middleware.iter().rev().fold(handler, |inner, layer| {
        let layer = Arc::clone(layer);
        Arc::new(move |conn: Arc<Connection>, message: Arc<Message>| {
            layer.call(
                conn,
                message,
                Next {
                    inner: Arc::clone(&inner),
                },
            )
        }) as Arc<dyn Handler>
    })
}

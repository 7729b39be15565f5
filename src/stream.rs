//! Ownership of the single logical stream to the database.
//!
//! A [`StreamConnection`] holds at most one open stream. The stream is
//! opened lazily by [`StreamConnection::acquire_stream`], replaced when the
//! server or a failed exchange closes it, and refused for good after
//! [`StreamConnection::close`].

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use crate::{
    decode::ensure_close_success,
    transport::{HttpTransport, Transport},
    wire::{PipelineRequest, PipelineResult, Request},
    BunnyDbError, Result,
};

/// Shared handle to one server stream.
///
/// Clones refer to the same stream; equality is stream identity.
#[derive(Clone, Debug)]
pub struct StreamHandle {
    inner: Arc<StreamInner>,
}

#[derive(Debug)]
struct StreamInner {
    id: u64,
    closed: AtomicBool,
    session: tokio::sync::Mutex<Session>,
}

#[derive(Debug, Default)]
struct Session {
    baton: Option<String>,
    base_url: Option<String>,
}

impl StreamHandle {
    fn open(id: u64) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id,
                closed: AtomicBool::new(false),
                session: tokio::sync::Mutex::new(Session::default()),
            }),
        }
    }

    /// Sequence number of the stream within its connection, starting at 1.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn mark_closed(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

impl PartialEq for StreamHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for StreamHandle {}

#[derive(Debug, Default)]
struct ConnectionState {
    current: Option<StreamHandle>,
    closed: bool,
    opened: u64,
}

/// Exclusive owner of the logical stream to the database.
#[derive(Debug)]
pub struct StreamConnection<T = HttpTransport> {
    transport: T,
    state: Mutex<ConnectionState>,
}

impl<T: Transport> StreamConnection<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: Mutex::new(ConnectionState::default()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn into_transport(self) -> T {
        self.transport
    }

    /// Returns the open stream, opening a new one when there is none or the
    /// previous one was closed.
    ///
    /// Fails with [`BunnyDbError::ConnectionClosed`] after [`Self::close`].
    pub fn acquire_stream(&self) -> Result<StreamHandle> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(BunnyDbError::ConnectionClosed);
        }
        if let Some(stream) = state.current.as_ref().filter(|stream| !stream.is_closed()) {
            return Ok(stream.clone());
        }

        state.opened += 1;
        let stream = StreamHandle::open(state.opened);

        #[cfg(feature = "tracing")]
        tracing::info!(stream = stream.id(), "opening stream");

        state.current = Some(stream.clone());
        Ok(stream)
    }

    /// Returns `true` once [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Number of streams opened over the lifetime of this connection.
    pub fn streams_opened(&self) -> u64 {
        self.lock_state().opened
    }

    /// Sends one request on `stream` and returns its single result.
    ///
    /// The stream's session lock is held for the whole exchange. Transport
    /// failures and protocol violations close the stream.
    pub(crate) async fn exchange(
        &self,
        stream: &StreamHandle,
        request: Request,
    ) -> Result<PipelineResult> {
        if self.is_closed() {
            return Err(BunnyDbError::ConnectionClosed);
        }

        let mut session = stream.inner.session.lock().await;
        if stream.is_closed() {
            return Err(BunnyDbError::StreamClosed);
        }

        let payload = PipelineRequest {
            baton: session.baton.clone(),
            requests: vec![request],
        };

        let response = match self
            .transport
            .send(session.base_url.as_deref(), &payload)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(stream = stream.id(), error = %err, "stream exchange failed");

                stream.mark_closed();
                return Err(err);
            }
        };

        session.baton = response.baton;
        if response.base_url.is_some() {
            session.base_url = response.base_url;
        }
        if session.baton.is_none() {
            #[cfg(feature = "tracing")]
            tracing::debug!(stream = stream.id(), "server closed stream");

            stream.mark_closed();
        }

        if response.results.len() != 1 {
            stream.mark_closed();
            return Err(BunnyDbError::Decode(format!(
                "result count mismatch: expected 1, got {}",
                response.results.len()
            )));
        }

        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| BunnyDbError::Decode("missing pipeline result".to_owned()))
    }

    /// Closes the connection permanently.
    ///
    /// The open stream, if the server holds one for us, is released with a
    /// `close` request. Calling this again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let current = {
            let mut state = self.lock_state();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.current.take()
        };

        #[cfg(feature = "tracing")]
        tracing::info!("closing connection");

        let Some(stream) = current else {
            return Ok(());
        };

        let mut session = stream.inner.session.lock().await;
        if stream.is_closed() {
            return Ok(());
        }
        stream.mark_closed();

        let Some(baton) = session.baton.take() else {
            return Ok(());
        };
        let payload = PipelineRequest {
            baton: Some(baton),
            requests: vec![Request::Close {}],
        };
        let response = self
            .transport
            .send(session.base_url.as_deref(), &payload)
            .await?;
        let result = response.results.into_iter().next().ok_or_else(|| {
            BunnyDbError::Decode("missing close result".to_owned())
        })?;
        ensure_close_success(result)
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

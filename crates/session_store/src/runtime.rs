// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Runtime abstraction for the background reclaimer.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub(crate) struct Runtime {
    kind: RuntimeKind,
}

#[derive(Debug, Clone)]
enum RuntimeKind {
    Tokio(Handle),
}

impl Runtime {
    /// The Tokio runtime the caller is running on, if any.
    pub(crate) fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::from_handle)
    }

    pub(crate) fn from_handle(handle: Handle) -> Self {
        Self {
            kind: RuntimeKind::Tokio(handle),
        }
    }

    pub(crate) fn spawn<T>(&self, work: T) -> JoinHandle<()>
    where
        T: Future<Output = ()> + Send + 'static,
    {
        match &self.kind {
            RuntimeKind::Tokio(handle) => handle.spawn(work),
        }
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured logging of store activity.
//!
//! Events are emitted through [`tracing`]; field names are stable so log pipelines can
//! filter on them.

use std::borrow::Cow;

use crate::reclaimer::SweepTrigger;
use crate::store::SweepReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionOperation {
    Get,
    Put,
    Delete,
    Clear,
    Sweep,
    Reclaim,
}

impl SessionOperation {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Get => "session.get",
            Self::Put => "session.put",
            Self::Delete => "session.delete",
            Self::Clear => "session.clear",
            Self::Sweep => "session.sweep",
            Self::Reclaim => "session.reclaim",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionActivity {
    Hit,
    Miss,
    Expired,
    Mismatch,
    Inserted,
    Replaced,
    Rejected,
    Removed,
    Started,
    Stopped,
}

impl SessionActivity {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "session.hit",
            Self::Miss => "session.miss",
            Self::Expired => "session.expired",
            Self::Mismatch => "session.type_mismatch",
            Self::Inserted => "session.inserted",
            Self::Replaced => "session.replaced",
            Self::Rejected => "session.rejected",
            Self::Removed => "session.removed",
            Self::Started => "session.started",
            Self::Stopped => "session.stopped",
        }
    }
}

/// Emits store events when logging is enabled.
#[derive(Debug, Clone)]
pub(crate) struct Telemetry {
    name: Cow<'static, str>,
    enabled: bool,
}

impl Telemetry {
    pub(crate) fn new(name: Cow<'static, str>, enabled: bool) -> Self {
        Self { name, enabled }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn record(&self, operation: SessionOperation, activity: SessionActivity) {
        if !self.enabled {
            return;
        }

        let name = self.name.as_ref();
        let op = operation.as_str();
        let ev = activity.as_str();

        // Tracing levels must be constant at the call site.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(session.name = name, session.operation = op, session.activity = ev, "session.event")
            };
        }

        match activity {
            SessionActivity::Hit | SessionActivity::Miss | SessionActivity::Inserted | SessionActivity::Removed => {
                emit_event!(trace);
            }
            SessionActivity::Expired | SessionActivity::Replaced | SessionActivity::Rejected => emit_event!(debug),
            SessionActivity::Mismatch => emit_event!(warn),
            SessionActivity::Started | SessionActivity::Stopped => emit_event!(info),
        }
    }

    pub(crate) fn record_clear(&self, removed: usize) {
        if !self.enabled {
            return;
        }

        tracing::debug!(
            session.name = self.name.as_ref(),
            session.operation = SessionOperation::Clear.as_str(),
            session.removed = removed,
            "session.clear"
        );
    }

    pub(crate) fn record_sweep(&self, trigger: SweepTrigger, report: &SweepReport) {
        if !self.enabled {
            return;
        }

        tracing::debug!(
            session.name = self.name.as_ref(),
            session.operation = SessionOperation::Sweep.as_str(),
            session.trigger = trigger.as_str(),
            session.visited = report.visited,
            session.evicted = report.evicted,
            session.remaining = report.remaining,
            "session.sweep"
        );
    }
}

use serde::Serialize;
use tracing::debug;

/// Identifies one dispatch or analytics cycle of a view.
///
/// Epochs grow monotonically per view; only the latest one may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Epoch(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading,
    Success,
    Failed,
}

/// Presentation state of one view: `Idle -> Loading -> {Success, Failed}`.
///
/// A view is owned by a single caller and mutated through `&mut`, so the
/// only ordering hazard is a response arriving after a newer request was
/// issued. [`ViewState::begin`] hands out an [`Epoch`] and every commit
/// checks it.
#[derive(Debug, Clone, Serialize)]
pub struct ViewState<T> {
    #[serde(skip)]
    epoch: Epoch,
    phase: Phase,
    data: T,
    error: Option<String>,
}

impl<T: Default> Default for ViewState<T> {
    fn default() -> Self {
        Self {
            epoch: Epoch(0),
            phase: Phase::Idle,
            data: T::default(),
            error: None,
        }
    }
}

impl<T> ViewState<T> {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Starts a new request, superseding any request still in flight.
    pub fn begin(&mut self) -> Epoch {
        self.epoch = Epoch(self.epoch.0 + 1);
        self.phase = Phase::Loading;
        self.error = None;
        self.epoch
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.epoch == epoch
    }

    /// Reports a problem detected before any request was issued.
    ///
    /// A request still in flight keeps the view loading; only the message is
    /// shown until that request finishes.
    pub fn reject(&mut self, message: impl Into<String>) {
        if self.phase != Phase::Loading {
            self.phase = Phase::Failed;
        }
        self.error = Some(message.into());
    }

    /// Applies the outcome of the request started at `epoch`.
    ///
    /// `update` receives the data slot and returns the error message, if
    /// any. Returns `false` without touching the state when `epoch` has
    /// been superseded.
    pub fn finish<F>(&mut self, epoch: Epoch, update: F) -> bool
    where
        F: FnOnce(&mut T) -> Option<String>,
    {
        if !self.is_current(epoch) {
            debug!(?epoch, latest = ?self.epoch, "discarding stale response");
            return false;
        }
        self.error = update(&mut self.data);
        self.phase = if self.error.is_some() {
            Phase::Failed
        } else {
            Phase::Success
        };
        true
    }
}

/// Destructive actions awaiting user confirmation. At most one is open at
/// a time; requesting another replaces it (last request wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    DeletePost { post_id: i64 },
    DeleteComment { comment_id: i64, post_id: i64 },
}

impl PendingAction {
    pub fn message(&self) -> &'static str {
        match self {
            PendingAction::DeletePost { .. } => {
                "Are you sure you want to delete this post? This action cannot be undone."
            }
            PendingAction::DeleteComment { .. } => {
                "Are you sure you want to delete this comment? This action cannot be undone."
            }
        }
    }
}

/// Single-slot gate between a delete gesture and the network call. Nothing
/// destructive executes except through `take()`.
#[derive(Debug, Default)]
pub struct Gate {
    pending: Option<PendingAction>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, action: PendingAction) {
        self.pending = Some(action);
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Consume the open slot for execution. `None` when nothing is pending,
    /// so a stray confirm gesture is a no-op.
    pub fn take(&mut self) -> Option<PendingAction> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.pending.is_some()
    }
}

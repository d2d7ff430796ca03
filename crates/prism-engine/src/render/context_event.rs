/// Kind of a device context notification.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContextEventKind {
    Lost,
    Restored,
}

/// A context notification delivered by the host.
///
/// The renderer calls [`prevent_default`](Self::prevent_default) on `Lost`
/// events to signal that it will wait for a restore instead of letting the
/// platform tear the context down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEvent {
    kind: ContextEventKind,
    default_prevented: bool,
}

impl ContextEvent {
    pub fn lost() -> Self {
        Self { kind: ContextEventKind::Lost, default_prevented: false }
    }

    pub fn restored() -> Self {
        Self { kind: ContextEventKind::Restored, default_prevented: false }
    }

    #[inline]
    pub fn kind(&self) -> ContextEventKind {
        self.kind
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    #[inline]
    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Startup refresh flow state. Both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Pending,
    RefreshSucceeded,
    RefreshFailed,
}

impl RefreshState {
    pub fn is_finished(&self) -> bool {
        match self {
            RefreshState::Pending => false,
            RefreshState::RefreshSucceeded | RefreshState::RefreshFailed => true,
        }
    }
}
